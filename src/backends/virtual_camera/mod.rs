// SPDX-License-Identifier: GPL-3.0-only

//! Virtual camera backend
//!
//! An in-process [`PlatformCameraBackend`] that behaves like a native driver
//! without touching hardware: completions fire from worker threads after a
//! short simulated latency, stills are rendered test patterns encoded as
//! JPEG, and recordings stream synthetic chunks into the destination file
//! until stopped.
//!
//! # Architecture
//!
//! ```text
//! open ──▶ VirtualStream (per handle) ──▶ worker threads
//!                 │                          │
//!                 │ resolution/zoom/flash    ├─ ready / applied callbacks
//!                 │                          ├─ still: render → JPEG → done
//!                 ▼                          └─ recording: chunks → finalized
//!           preview surface (bound id only)
//! ```

mod pattern;

use crate::backends::camera::types::{
    BackendError, BackendHandle, BackendResult, DeviceDescriptor, PreviewSurface,
    RecordingEvents, Resolution,
};
use crate::backends::camera::PlatformCameraBackend;
use crate::constants::virtual_camera as timing;
use crate::flash::FlashMode;
use crate::session::bridge::Completer;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

const RECORDING_RUNNING: u8 = 0;
const RECORDING_STOP: u8 = 1;
const RECORDING_ABORT: u8 = 2;

/// Per-handle simulated stream
struct VirtualStream {
    device: DeviceDescriptor,
    resolution: Resolution,
    zoom: f32,
    flash: FlashMode,
    preview: Option<PreviewSurface>,
    recording: Option<Arc<AtomicU8>>,
}

/// Simulated camera driver
pub struct VirtualCameraBackend {
    devices: Vec<DeviceDescriptor>,
    streams: Mutex<HashMap<u64, VirtualStream>>,
    next_handle: AtomicU64,
}

impl VirtualCameraBackend {
    pub fn new(devices: Vec<DeviceDescriptor>) -> Self {
        info!(count = devices.len(), "Creating virtual camera backend");
        Self {
            devices,
            streams: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    #[cfg(test)]
    fn open_handles(&self) -> usize {
        lock(&self.streams).len()
    }

    fn with_stream<T>(
        &self,
        handle: &BackendHandle,
        f: impl FnOnce(&mut VirtualStream) -> BackendResult<T>,
    ) -> BackendResult<T> {
        let mut streams = lock(&self.streams);
        let stream = streams
            .get_mut(&handle.id())
            .ok_or(BackendError::InvalidHandle(handle.id()))?;
        f(stream)
    }
}

impl PlatformCameraBackend for VirtualCameraBackend {
    fn name(&self) -> &'static str {
        "virtual"
    }

    fn enumerate_devices(&self) -> BackendResult<Vec<DeviceDescriptor>> {
        let devices = self.devices.clone();
        debug!(count = devices.len(), "Enumerated virtual devices");
        Ok(devices)
    }

    fn open(
        &self,
        device: &DeviceDescriptor,
        ready: Completer<BackendResult<()>>,
    ) -> BackendResult<BackendHandle> {
        let known = self.devices.iter().any(|d| d.id() == device.id());
        if !known {
            return Err(BackendError::DeviceNotFound(device.id().to_string()));
        }

        let resolution = device
            .max_resolution()
            .ok_or_else(|| BackendError::InitializationFailed(format!("{} has no resolutions", device)))?;

        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        lock(&self.streams).insert(
            id,
            VirtualStream {
                device: device.clone(),
                resolution,
                zoom: device.zoom_range().min,
                flash: FlashMode::Off,
                preview: None,
                recording: None,
            },
        );
        info!(handle = id, device = %device.id(), %resolution, "Opened virtual device");

        after(timing::OPEN_LATENCY, move || {
            ready.complete(Ok(()));
        });

        Ok(BackendHandle::new(id, device.id()))
    }

    fn close(&self, handle: BackendHandle) {
        let Some(stream) = lock(&self.streams).remove(&handle.id()) else {
            warn!(handle = handle.id(), "Closing unknown virtual handle");
            return;
        };
        if let Some(recording) = stream.recording {
            recording.store(RECORDING_ABORT, Ordering::SeqCst);
        }
        info!(handle = handle.id(), device = %stream.device.id(), "Closed virtual device");
    }

    fn bind_preview(&self, handle: &BackendHandle, surface: &PreviewSurface) -> BackendResult<()> {
        self.with_stream(handle, |stream| {
            debug!(handle = handle.id(), surface = surface.id(), "Binding preview");
            stream.preview = Some(surface.clone());
            Ok(())
        })
    }

    fn unbind_preview(&self, handle: &BackendHandle) -> BackendResult<()> {
        self.with_stream(handle, |stream| {
            match stream.preview.take() {
                Some(surface) => {
                    debug!(handle = handle.id(), surface = surface.id(), "Unbinding preview")
                }
                None => debug!(handle = handle.id(), "No preview bound"),
            }
            Ok(())
        })
    }

    fn capture_photo(&self, handle: &BackendHandle, done: Completer<BackendResult<Vec<u8>>>) {
        let params = self.with_stream(handle, |stream| {
            Ok((stream.resolution, stream.zoom, stream.flash))
        });
        let (resolution, zoom, flash) = match params {
            Ok(params) => params,
            Err(err) => {
                done.complete(Err(err));
                return;
            }
        };

        after(timing::CAPTURE_LATENCY, move || {
            let result = pattern::render_jpeg(resolution, zoom, flash.uses_led());
            if let Ok(bytes) = &result {
                debug!(bytes = bytes.len(), %resolution, "Rendered virtual still");
            }
            done.complete(result);
        });
    }

    fn start_recording(
        &self,
        handle: &BackendHandle,
        destination: &Path,
        events: RecordingEvents,
    ) -> BackendResult<()> {
        let control = self.with_stream(handle, |stream| {
            if stream.recording.is_some() {
                return Err(BackendError::RecordingInProgress);
            }
            let control = Arc::new(AtomicU8::new(RECORDING_RUNNING));
            stream.recording = Some(Arc::clone(&control));
            Ok(control)
        })?;

        let destination = destination.to_path_buf();
        info!(handle = handle.id(), destination = %destination.display(), "Starting virtual recording");
        std::thread::spawn(move || record(destination, control, events));
        Ok(())
    }

    fn stop_recording(&self, handle: &BackendHandle) -> BackendResult<()> {
        self.with_stream(handle, |stream| {
            let control = stream
                .recording
                .take()
                .ok_or(BackendError::NoRecordingInProgress)?;
            control.store(RECORDING_STOP, Ordering::SeqCst);
            debug!(handle = handle.id(), "Stopping virtual recording");
            Ok(())
        })
    }

    fn set_zoom(&self, handle: &BackendHandle, level: f32) -> BackendResult<()> {
        self.with_stream(handle, |stream| {
            stream.zoom = stream.device.zoom_range().clamp(level);
            debug!(handle = handle.id(), zoom = stream.zoom, "Zoom set");
            Ok(())
        })
    }

    fn set_flash(&self, handle: &BackendHandle, mode: FlashMode) -> BackendResult<()> {
        self.with_stream(handle, |stream| {
            if mode.uses_led() && !stream.device.flash_supported() {
                return Err(BackendError::Other(format!(
                    "{} has no flash",
                    stream.device.id()
                )));
            }
            stream.flash = mode;
            debug!(handle = handle.id(), %mode, "Flash mode set");
            Ok(())
        })
    }

    fn set_resolution_filter(
        &self,
        handle: &BackendHandle,
        resolution: Resolution,
        applied: Completer<BackendResult<()>>,
    ) {
        let result = self.with_stream(handle, |stream| {
            if !stream.device.supports_resolution(&resolution) {
                return Err(BackendError::Other(format!(
                    "{} does not support {}",
                    stream.device.id(),
                    resolution
                )));
            }
            stream.resolution = resolution;
            Ok(())
        });

        match result {
            Ok(()) => after(timing::RECONFIGURE_LATENCY, move || {
                applied.complete(Ok(()));
            }),
            Err(err) => {
                applied.complete(Err(err));
            }
        }
    }
}

/// Recording worker: stream chunks until told to stop or abort
fn record(destination: PathBuf, control: Arc<AtomicU8>, events: RecordingEvents) {
    let mut file = match std::fs::File::create(&destination) {
        Ok(file) => file,
        Err(err) => {
            let err = BackendError::from(err);
            events.started.complete(Err(err.clone()));
            events.finalized.complete(Err(err));
            return;
        }
    };
    events.started.complete(Ok(()));

    let mut frame: u64 = 0;
    let result = loop {
        match control.load(Ordering::SeqCst) {
            RECORDING_RUNNING => {}
            RECORDING_STOP => break file.flush().map_err(BackendError::from),
            _ => break Err(BackendError::Other("recording aborted".to_string())),
        }

        if let Err(err) = file.write_all(&pattern::chunk(frame, timing::CHUNK_SIZE)) {
            break Err(BackendError::from(err));
        }
        frame += 1;
        std::thread::sleep(timing::FRAME_INTERVAL);
    };

    match result {
        Ok(()) => {
            debug!(frames = frame, destination = %destination.display(), "Virtual recording finalized");
            events.finalized.complete(Ok(destination));
        }
        Err(err) => {
            warn!(error = %err, "Virtual recording failed");
            events.finalized.complete(Err(err));
        }
    }
}

/// Run `f` on a worker thread after `delay`, like a native callback
fn after(delay: Duration, f: impl FnOnce() + Send + 'static) {
    std::thread::spawn(move || {
        std::thread::sleep(delay);
        f();
    });
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
