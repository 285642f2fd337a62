// SPDX-License-Identifier: GPL-3.0-only

//! Scripted backend for integration tests
//!
//! Every completion the session hands over is parked until the test resolves
//! it, so tests control exactly when (and whether) the "native" side answers.

#![allow(dead_code)]

use camera_session::backends::camera::types::{
    BackendError, BackendHandle, BackendResult, DeviceDescriptor, Facing, PreviewSurface,
    RecordingEvents, Resolution, ZoomRange,
};
use camera_session::backends::camera::{DeviceRegistry, PlatformCameraBackend};
use camera_session::session::bridge::Completer;
use camera_session::{CaptureSession, Config, FlashMode};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub const WAIT: Duration = Duration::from_secs(5);

pub fn res(width: u32, height: u32) -> Resolution {
    Resolution::new(width, height).unwrap()
}

pub fn front_camera() -> DeviceDescriptor {
    DeviceDescriptor::new(
        "test:front",
        "Front Test Camera",
        Facing::Front,
        false,
        ZoomRange::fixed(),
        vec![res(640, 480), res(1280, 720)],
    )
    .unwrap()
}

pub fn back_camera() -> DeviceDescriptor {
    DeviceDescriptor::new(
        "test:back",
        "Back Test Camera",
        Facing::Back,
        true,
        ZoomRange::new(1.0, 4.0).unwrap(),
        vec![res(640, 480), res(1920, 1080)],
    )
    .unwrap()
}

/// One recording the session asked for
pub struct PendingRecording {
    pub handle: u64,
    pub destination: PathBuf,
    pub events: RecordingEvents,
}

#[derive(Default)]
struct Parked {
    ready: VecDeque<(u64, Completer<BackendResult<()>>)>,
    photos: VecDeque<Completer<BackendResult<Vec<u8>>>>,
    resolutions: VecDeque<(Resolution, Completer<BackendResult<()>>)>,
    recordings: VecDeque<PendingRecording>,
    /// Recordings that were acknowledged and are waiting to finalize
    active: HashMap<u64, PendingRecording>,
}

/// Backend whose completions are driven by the test
pub struct ScriptedBackend {
    devices: Mutex<BackendResult<Vec<DeviceDescriptor>>>,
    enumerate_delay: Mutex<Duration>,
    parked: Mutex<Parked>,
    open: Mutex<Vec<u64>>,
    closed: Mutex<Vec<u64>>,
    bound: Mutex<HashMap<u64, PreviewSurface>>,
    next_handle: AtomicU64,
    pub enumerate_calls: AtomicUsize,
    pub bind_calls: AtomicUsize,
    pub unbind_calls: AtomicUsize,
    pub capture_calls: AtomicUsize,
    pub stop_calls: AtomicUsize,
    pub zoom_calls: AtomicUsize,
    pub flash_calls: AtomicUsize,
    pub resolution_calls: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedBackend {
    pub fn new(devices: Vec<DeviceDescriptor>) -> Arc<Self> {
        Arc::new(Self {
            devices: Mutex::new(Ok(devices)),
            enumerate_delay: Mutex::new(Duration::ZERO),
            parked: Mutex::new(Parked::default()),
            open: Mutex::new(Vec::new()),
            closed: Mutex::new(Vec::new()),
            bound: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
            enumerate_calls: AtomicUsize::new(0),
            bind_calls: AtomicUsize::new(0),
            unbind_calls: AtomicUsize::new(0),
            capture_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            zoom_calls: AtomicUsize::new(0),
            flash_calls: AtomicUsize::new(0),
            resolution_calls: AtomicUsize::new(0),
        })
    }

    pub fn set_devices(&self, devices: BackendResult<Vec<DeviceDescriptor>>) {
        *lock(&self.devices) = devices;
    }

    pub fn set_enumerate_delay(&self, delay: Duration) {
        *lock(&self.enumerate_delay) = delay;
    }

    pub fn open_handles(&self) -> Vec<u64> {
        lock(&self.open).clone()
    }

    pub fn closed_handles(&self) -> Vec<u64> {
        lock(&self.closed).clone()
    }

    pub fn bound_surface(&self, handle: u64) -> Option<PreviewSurface> {
        lock(&self.bound).get(&handle).cloned()
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    // ===== Driving completions =====

    /// Resolve the oldest pending `open`
    pub async fn complete_ready(&self, result: BackendResult<()>) -> u64 {
        let (handle, ready) = wait_for(|| lock(&self.parked).ready.pop_front()).await;
        ready.complete(result);
        handle
    }

    /// Wait until an `open` is pending without resolving it
    pub async fn ready_requested(&self) {
        wait_for(|| (!lock(&self.parked).ready.is_empty()).then_some(())).await;
    }

    pub async fn complete_photo(&self, result: BackendResult<Vec<u8>>) {
        let done = wait_for(|| lock(&self.parked).photos.pop_front()).await;
        done.complete(result);
    }

    pub async fn photo_requested(&self) {
        wait_for(|| (!lock(&self.parked).photos.is_empty()).then_some(())).await;
    }

    pub async fn complete_resolution(&self, result: BackendResult<()>) -> Resolution {
        let (resolution, applied) = wait_for(|| lock(&self.parked).resolutions.pop_front()).await;
        applied.complete(result);
        resolution
    }

    pub async fn resolution_requested(&self) {
        wait_for(|| (!lock(&self.parked).resolutions.is_empty()).then_some(())).await;
    }

    pub async fn recording_requested(&self) {
        wait_for(|| (!lock(&self.parked).recordings.is_empty()).then_some(())).await;
    }

    /// Write `contents` to the destination and acknowledge the start
    pub async fn ack_recording(&self, contents: &[u8]) -> PathBuf {
        let recording = wait_for(|| lock(&self.parked).recordings.pop_front()).await;
        std::fs::write(&recording.destination, contents).unwrap();
        recording.events.started.complete(Ok(()));
        let destination = recording.destination.clone();
        lock(&self.parked).active.insert(recording.handle, recording);
        destination
    }

    /// Refuse the oldest pending start
    pub async fn fail_recording(&self, err: BackendError) {
        let recording = wait_for(|| lock(&self.parked).recordings.pop_front()).await;
        recording.events.started.complete(Err(err.clone()));
        recording.events.finalized.complete(Err(err));
    }

    /// Finish the active recording on `handle`
    pub fn finalize_recording(&self, handle: u64, result: BackendResult<()>) {
        let recording = lock(&self.parked)
            .active
            .remove(&handle)
            .expect("no active recording");
        let outcome = result.map(|()| recording.destination.clone());
        recording.events.finalized.complete(outcome);
    }

    /// Finish the active recording on `handle` after moving the artifact to
    /// a path of the backend's choosing
    pub fn finalize_elsewhere(&self, handle: u64) -> PathBuf {
        let recording = lock(&self.parked)
            .active
            .remove(&handle)
            .expect("no active recording");
        let muxed = recording.destination.with_extension("mp4");
        std::fs::rename(&recording.destination, &muxed).unwrap();
        recording.events.finalized.complete(Ok(muxed.clone()));
        muxed
    }

    /// Finish a start that was never acknowledged (cancel path)
    pub async fn finalize_unacknowledged(&self) {
        let recording = wait_for(|| lock(&self.parked).recordings.pop_front()).await;
        std::fs::write(&recording.destination, b"late").unwrap();
        recording.events.started.complete(Ok(()));
        recording
            .events
            .finalized
            .complete(Ok(recording.destination.clone()));
    }
}

impl PlatformCameraBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn enumerate_devices(&self) -> BackendResult<Vec<DeviceDescriptor>> {
        self.enumerate_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.enumerate_delay);
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        lock(&self.devices).clone()
    }

    fn open(
        &self,
        device: &DeviceDescriptor,
        ready: Completer<BackendResult<()>>,
    ) -> BackendResult<BackendHandle> {
        let id = self.next_handle.fetch_add(1, Ordering::SeqCst);
        lock(&self.open).push(id);
        lock(&self.parked).ready.push_back((id, ready));
        Ok(BackendHandle::new(id, device.id()))
    }

    fn close(&self, handle: BackendHandle) {
        lock(&self.open).retain(|id| *id != handle.id());
        lock(&self.closed).push(handle.id());
        lock(&self.bound).remove(&handle.id());
        // Native close aborts an active recording
        if let Some(recording) = lock(&self.parked).active.remove(&handle.id()) {
            recording
                .events
                .finalized
                .complete(Err(BackendError::Other("closed".to_string())));
        }
    }

    fn bind_preview(&self, handle: &BackendHandle, surface: &PreviewSurface) -> BackendResult<()> {
        self.bind_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.bound).insert(handle.id(), surface.clone());
        Ok(())
    }

    fn unbind_preview(&self, handle: &BackendHandle) -> BackendResult<()> {
        self.unbind_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.bound).remove(&handle.id());
        Ok(())
    }

    fn capture_photo(&self, _handle: &BackendHandle, done: Completer<BackendResult<Vec<u8>>>) {
        self.capture_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.parked).photos.push_back(done);
    }

    fn start_recording(
        &self,
        handle: &BackendHandle,
        destination: &Path,
        events: RecordingEvents,
    ) -> BackendResult<()> {
        lock(&self.parked).recordings.push_back(PendingRecording {
            handle: handle.id(),
            destination: destination.to_path_buf(),
            events,
        });
        Ok(())
    }

    fn stop_recording(&self, _handle: &BackendHandle) -> BackendResult<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn set_zoom(&self, _handle: &BackendHandle, _level: f32) -> BackendResult<()> {
        self.zoom_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn set_flash(&self, _handle: &BackendHandle, _mode: FlashMode) -> BackendResult<()> {
        self.flash_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn set_resolution_filter(
        &self,
        _handle: &BackendHandle,
        resolution: Resolution,
        applied: Completer<BackendResult<()>>,
    ) {
        self.resolution_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.parked).resolutions.push_back((resolution, applied));
    }
}

/// Poll `probe` until it yields, failing the test after [`WAIT`]
pub async fn wait_for<T>(mut probe: impl FnMut() -> Option<T>) -> T {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        if let Some(value) = probe() {
            return value;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for backend request"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Session wired to `backend`, with temp recordings under `temp_dir`
pub fn session_with(backend: &Arc<ScriptedBackend>, temp_dir: &Path) -> Arc<CaptureSession> {
    let config = Config {
        temp_dir: Some(temp_dir.to_path_buf()),
        operation_timeout_ms: WAIT.as_millis() as u64,
        finalize_timeout_ms: WAIT.as_millis() as u64,
        ..Config::default()
    };
    let backend: Arc<dyn PlatformCameraBackend> = backend.clone();
    let registry = DeviceRegistry::new(Arc::clone(&backend));
    Arc::new(CaptureSession::new(backend, registry, &config))
}

/// Entries left in `dir`
pub fn leftover_files(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
        Err(_) => Vec::new(),
    }
}
