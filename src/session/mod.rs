// SPDX-License-Identifier: GPL-3.0-only

//! Capture session: the state machine that owns one camera
//!
//! A [`CaptureSession`] holds at most one backend handle and drives it through
//! connect, preview, still capture, recording and disconnect. Operations that
//! wait on the hardware are single-flight: while one is suspended, other
//! exclusive requests are rejected with `SessionBusy` rather than queued.
//! Zoom and flash are exempt and apply to the open handle immediately.
//!
//! # Cancellation
//!
//! Every suspending operation takes a [`CancellationToken`]. Cancelling before
//! the backend has acknowledged a request aborts it and releases everything
//! locally. Cancelling [`CaptureSession::stop_recording`] does **not** abandon
//! the native recording: the call still waits for finalize, deletes the
//! temporary artifact, returns the session to `PreviewActive`, and only then
//! reports `OperationCancelled`. A cancelled result therefore does not mean
//! nothing happened.
//!
//! # Disconnect
//!
//! [`CaptureSession::disconnect`] works from any state. It tears down any
//! recording (discarding partial output) and the handle, and makes suspended
//! operations return `DeviceUnavailable` without touching the new state.

pub mod bridge;
pub mod recording;
pub mod state;

pub use recording::RecordingSummary;
pub use state::{Operation, SessionEvent, SessionState};

use crate::backends::camera::types::{
    BackendError, BackendHandle, DeviceDescriptor, PreviewSurface, RecordingEvents, Resolution,
};
use crate::backends::camera::{DeviceRegistry, PlatformCameraBackend};
use crate::config::Config;
use crate::constants::EVENT_CHANNEL_CAPACITY;
use crate::errors::{SessionError, SessionResult};
use crate::flash::FlashMode;
use crate::storage::{self, RecordingSink, TempRecording};
use bridge::{Outcome, completion};
use chrono::{DateTime, Local};
use futures::Stream;
use recording::{PendingArtifact, RecordingContext, RecordingSlot};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A still delivered by [`CaptureSession::take_picture`]
#[derive(Debug, Clone)]
pub struct CapturedPhoto {
    /// Encoded image as produced by the backend
    pub data: Vec<u8>,
    pub device_id: String,
    /// Capture resolution filter in effect, if one was set
    pub resolution: Option<Resolution>,
    pub captured_at: DateTime<Local>,
}

/// Session tunables taken from [`Config`]
#[derive(Debug, Clone)]
struct SessionSettings {
    operation_timeout: Duration,
    finalize_timeout: Duration,
    temp_dir: PathBuf,
    default_flash: FlashMode,
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            operation_timeout: config.operation_timeout(),
            finalize_timeout: config.finalize_timeout(),
            temp_dir: config.recording_temp_dir(),
            default_flash: config.default_flash_mode,
        }
    }
}

/// Mutable session state, guarded by one mutex that is never held across
/// an await
struct Inner {
    state: SessionState,
    /// Exclusive operation currently suspended
    in_flight: Option<Operation>,
    device: Option<DeviceDescriptor>,
    handle: Option<BackendHandle>,
    /// Handle acquired by a connect that has not seen ready yet
    pending_handle: Option<BackendHandle>,
    /// Last surface given to `start_preview`
    surface: Option<PreviewSurface>,
    preview_bound: bool,
    /// Resolution filter currently applied on the handle
    resolution: Option<Resolution>,
    zoom: Option<f32>,
    flash: FlashMode,
    /// Some exactly while the state is `Recording`
    recording: Option<RecordingSlot>,
    /// Bumped by every disconnect; suspended operations compare it on resume
    epoch: u64,
    /// Fired by disconnect to wake suspended operations
    abort: CancellationToken,
}

/// Camera session state machine
pub struct CaptureSession {
    backend: Arc<dyn PlatformCameraBackend>,
    registry: DeviceRegistry,
    settings: SessionSettings,
    inner: Mutex<Inner>,
    events: broadcast::Sender<SessionEvent>,
}

impl CaptureSession {
    pub fn new(
        backend: Arc<dyn PlatformCameraBackend>,
        registry: DeviceRegistry,
        config: &Config,
    ) -> Self {
        let settings = SessionSettings::from(config);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            backend,
            registry,
            inner: Mutex::new(Inner {
                state: SessionState::Idle,
                in_flight: None,
                device: None,
                handle: None,
                pending_handle: None,
                surface: None,
                preview_bound: false,
                resolution: None,
                zoom: None,
                flash: settings.default_flash,
                recording: None,
                epoch: 0,
                abort: CancellationToken::new(),
            }),
            settings,
            events,
        }
    }

    // ===== Observation =====

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    /// Device bound by the last successful connect
    pub fn device(&self) -> Option<DeviceDescriptor> {
        self.lock().device.clone()
    }

    pub fn is_preview_bound(&self) -> bool {
        self.lock().preview_bound
    }

    /// Zoom applied on the handle, if any was set
    pub fn zoom(&self) -> Option<f32> {
        self.lock().zoom
    }

    pub fn flash_mode(&self) -> FlashMode {
        self.lock().flash
    }

    /// Resolution filter currently applied
    pub fn capture_resolution(&self) -> Option<Resolution> {
        self.lock().resolution
    }

    pub fn is_recording(&self) -> bool {
        self.lock().recording.is_some()
    }

    /// Time since the active recording was acknowledged
    pub fn recording_elapsed(&self) -> Option<Duration> {
        self.lock().recording.as_ref().map(RecordingSlot::elapsed)
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// `SessionStateChanged` and failure notifications
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Stream of states entered, in order
    pub fn state_changes(&self) -> impl Stream<Item = SessionState> + Send + 'static {
        let mut events = self.events.subscribe();
        async_stream::stream! {
            loop {
                match events.recv().await {
                    Ok(SessionEvent::StateChanged { to, .. }) => yield to,
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "State stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    // ===== Connect / Disconnect =====

    /// Open `device` (or the registry's first device) and wait until ready
    ///
    /// Valid from `Idle` only. A second connect while connecting is rejected.
    pub async fn connect(
        &self,
        device: Option<DeviceDescriptor>,
        token: &CancellationToken,
    ) -> SessionResult<()> {
        let op = Operation::Connect;
        let (epoch, abort) = {
            let mut inner = self.lock();
            match inner.state {
                SessionState::Idle => {}
                SessionState::Connecting => {
                    return Err(self.reject(SessionError::busy(op, op)));
                }
                state => {
                    return Err(self.reject(SessionError::InvalidState {
                        operation: op,
                        state,
                    }));
                }
            }
            inner.in_flight = Some(op);
            self.transition(&mut inner, SessionState::Connecting);
            (inner.epoch, inner.abort.clone())
        };
        let mut flight = InFlight::new(self, op, epoch, abort);

        match self.open_device(&flight, device, token).await {
            Ok(device) => {
                let opened = flight.settle(|session, inner| session.promote(inner, device));
                match opened {
                    Some(Ok(())) => Ok(()),
                    Some(Err(err)) => Err(self.report(op, err)),
                    None => Err(self.report(op, superseded(op))),
                }
            }
            Err(err) => {
                let pending = flight.settle(|session, inner| {
                    session.transition(inner, SessionState::Idle);
                    inner.pending_handle.take()
                });
                if let Some(handle) = pending.flatten() {
                    debug!(handle = handle.id(), "Releasing partially opened handle");
                    self.backend.close(handle);
                }
                Err(self.report(op, err))
            }
        }
    }

    /// Disconnect, then connect to `device`
    pub async fn switch_device(
        &self,
        device: DeviceDescriptor,
        token: &CancellationToken,
    ) -> SessionResult<()> {
        info!(device = %device.id(), "Switching device");
        self.disconnect().await;
        self.connect(Some(device), token).await
    }

    /// Tear everything down and return to `Idle`
    ///
    /// Idempotent. Any recording is stopped and its partial output deleted.
    pub async fn disconnect(&self) {
        let (handle, pending, recording) = {
            let mut inner = self.lock();
            if inner.state == SessionState::Idle && inner.handle.is_none() {
                debug!("Disconnect on idle session");
                return;
            }

            inner.epoch += 1;
            inner.abort.cancel();
            inner.abort = CancellationToken::new();
            inner.in_flight = None;
            inner.device = None;
            inner.preview_bound = false;
            inner.resolution = None;
            inner.zoom = None;
            self.transition(&mut inner, SessionState::Idle);
            (
                inner.handle.take(),
                inner.pending_handle.take(),
                inner.recording.take(),
            )
        };

        if let Some(handle) = handle {
            if matches!(recording, Some(RecordingSlot::Active(_)))
                && let Err(err) = self.backend.stop_recording(&handle)
            {
                debug!(error = %err, "Stop on disconnect failed");
            }
            info!(handle = handle.id(), device = %handle.device_id(), "Closing device");
            self.backend.close(handle);
        }
        if let Some(handle) = pending {
            self.backend.close(handle);
        }
        // A stopping recording is cleaned up by the stop call that owns it
        if let Some(RecordingSlot::Active(context)) = recording {
            info!("Discarding in-flight recording");
            context.discard().await;
        }
    }

    // ===== Preview =====

    /// Bind the live preview to `surface`
    ///
    /// While connecting, the surface is remembered and bound once ready.
    pub fn start_preview(&self, surface: PreviewSurface) -> SessionResult<()> {
        let op = Operation::StartPreview;
        let mut inner = self.lock();

        if inner.state == SessionState::Connecting {
            debug!(surface = surface.id(), "Preview deferred until connected");
            inner.surface = Some(surface);
            return Ok(());
        }

        let Some(handle) = inner.handle.as_ref() else {
            return Err(self.reject(not_connected(op)));
        };

        if inner.preview_bound && inner.surface.as_ref() == Some(&surface) {
            return Ok(());
        }
        if inner.preview_bound {
            self.backend.unbind_preview(handle)?;
        }
        self.backend.bind_preview(handle, &surface)?;
        info!(surface = surface.id(), "Preview started");
        inner.surface = Some(surface);
        inner.preview_bound = true;
        Ok(())
    }

    /// Unbind the preview surface; the device stays open
    pub fn stop_preview(&self) -> SessionResult<()> {
        let op = Operation::StopPreview;
        let mut inner = self.lock();
        let Some(handle) = inner.handle.as_ref() else {
            return Err(self.reject(not_connected(op)));
        };
        if !inner.preview_bound {
            return Ok(());
        }
        self.backend.unbind_preview(handle)?;
        inner.preview_bound = false;
        info!("Preview stopped");
        Ok(())
    }

    // ===== Still capture =====

    /// Capture one still and return its encoded bytes
    pub async fn take_picture(&self, token: &CancellationToken) -> SessionResult<CapturedPhoto> {
        let op = Operation::TakePicture;
        let (done, mut photo) = completion();
        let (epoch, abort, device_id, resolution) = {
            let mut inner = self.lock();
            self.admit(&inner, op)?;
            let Some(handle) = inner.handle.as_ref() else {
                return Err(self.reject(not_connected(op)));
            };
            self.backend.capture_photo(handle, done);
            let device_id = handle.device_id().to_string();
            inner.in_flight = Some(op);
            self.transition(&mut inner, SessionState::Capturing);
            (inner.epoch, inner.abort.clone(), device_id, inner.resolution)
        };
        let mut flight = InFlight::new(self, op, epoch, abort);

        let outcome = photo
            .wait(token, &flight.abort, self.settings.operation_timeout)
            .await;
        flight.settle(|session, inner| session.transition(inner, SessionState::PreviewActive));

        let data = resolve(outcome, op, "still capture").map_err(|err| self.report(op, err))?;
        info!(bytes = data.len(), device = %device_id, "Picture taken");
        Ok(CapturedPhoto {
            data,
            device_id,
            resolution,
            captured_at: Local::now(),
        })
    }

    // ===== Recording =====

    /// Start recording; the finished artifact goes to `sink` on stop
    pub async fn start_recording(
        &self,
        sink: RecordingSink,
        token: &CancellationToken,
    ) -> SessionResult<()> {
        let op = Operation::StartRecording;
        let (epoch, abort) = {
            let mut inner = self.lock();
            self.admit(&inner, op)?;
            inner.in_flight = Some(op);
            (inner.epoch, inner.abort.clone())
        };
        let mut flight = InFlight::new(self, op, epoch, abort);

        let temp = match TempRecording::allocate(&self.settings.temp_dir).await {
            Ok(temp) => temp,
            Err(err) => {
                flight.settle(|_, _| ());
                return Err(self.report(op, err.into()));
            }
        };

        let (started, mut started_signal) = completion();
        let (finalized, finalized_signal) = completion();
        let issued = self.with_handle(epoch, |handle| {
            self.backend.start_recording(
                handle,
                temp.path(),
                RecordingEvents { started, finalized },
            )
        });
        let issued = match issued {
            Some(issued) => issued.map_err(SessionError::from),
            None => Err(superseded(op)),
        };
        if let Err(err) = issued {
            flight.settle(|_, _| ());
            temp.release().await;
            return Err(self.report(op, err));
        }
        // The backend owns the path from here; if this future is dropped the
        // file is removed only after finalize
        let artifact = PendingArtifact::new(temp, finalized_signal, self.settings.finalize_timeout);

        let outcome = started_signal
            .wait(token, &flight.abort, self.settings.operation_timeout)
            .await;

        let err = match outcome {
            Outcome::Resolved(Ok(())) => {
                let mut context = Some(RecordingContext {
                    sink,
                    artifact,
                    started_at: Instant::now(),
                });
                flight.settle(|session, inner| {
                    inner.recording = context.take().map(RecordingSlot::Active);
                    session.transition(inner, SessionState::Recording);
                });
                match context {
                    // Disconnected between ack and here
                    Some(context) => {
                        context.discard().await;
                        superseded(op)
                    }
                    None => {
                        info!("Recording started");
                        return Ok(());
                    }
                }
            }
            Outcome::Resolved(Err(err)) => {
                flight.settle(|_, _| ());
                artifact.release().await;
                SessionError::BackendFailure(err)
            }
            outcome => {
                // The backend may have started anyway; stop it and let it
                // finish writing before the file is removed
                if let Some(Err(err)) =
                    self.with_handle(epoch, |handle| self.backend.stop_recording(handle))
                {
                    debug!(error = %err, "Stop after aborted start failed");
                }
                artifact.discard().await;
                flight.settle(|_, _| ());
                match resolve::<()>(outcome, op, "recording start") {
                    Err(err) => err,
                    Ok(()) => superseded(op),
                }
            }
        };
        Err(self.report(op, err))
    }

    /// Stop recording, wait for finalize and copy the artifact into the sink
    ///
    /// Cancellation cannot abandon the native recording. If `token` fires,
    /// this still waits for finalize and deletes the temporary artifact, then
    /// returns `OperationCancelled` with nothing written to the sink.
    pub async fn stop_recording(
        &self,
        token: &CancellationToken,
    ) -> SessionResult<RecordingSummary> {
        let op = Operation::StopRecording;
        let (epoch, abort, context, device_id) = {
            let mut inner = self.lock();
            if !inner.state.has_handle() && inner.state != SessionState::Connecting {
                return Err(self.reject(not_connected(op)));
            }
            if let Some(holder) = inner.in_flight {
                return Err(self.reject(SessionError::busy(op, holder)));
            }
            if inner.state != SessionState::Recording {
                let state = inner.state;
                return Err(self.reject(SessionError::InvalidState {
                    operation: op,
                    state,
                }));
            }
            let Some(RecordingSlot::Active(context)) = inner.recording.take() else {
                warn!("Recording state without an active recording");
                self.transition(&mut inner, SessionState::PreviewActive);
                return Err(self.reject(SessionError::InvalidState {
                    operation: op,
                    state: SessionState::PreviewActive,
                }));
            };
            let Some(handle) = inner.handle.as_ref() else {
                inner.recording = Some(RecordingSlot::Active(context));
                return Err(self.reject(not_connected(op)));
            };
            if let Err(err) = self.backend.stop_recording(handle) {
                // Finalize may already have fired with the real cause
                warn!(error = %err, "Backend rejected stop; waiting for finalize anyway");
            }
            let device_id = handle.device_id().to_string();
            inner.recording = Some(RecordingSlot::Stopping {
                started_at: context.started_at,
            });
            inner.in_flight = Some(op);
            (inner.epoch, inner.abort.clone(), context, device_id)
        };
        let mut flight = InFlight::new(self, op, epoch, abort);

        let RecordingContext {
            mut sink,
            mut artifact,
            started_at,
        } = context;

        let finalized = resolve(artifact.finalized().await, op, "recording finalize");
        let foreign = match &finalized {
            Ok(path) if path != artifact.path() => Some(path.clone()),
            _ => None,
        };

        let result = match finalized {
            Ok(_) if flight.is_superseded() => Err(superseded(op)),
            Ok(_) if token.is_cancelled() => Err(SessionError::OperationCancelled(op)),
            Ok(path) => {
                if foreign.is_some() {
                    warn!(
                        artifact = %path.display(),
                        expected = %artifact.path().display(),
                        "Backend finalized to an unexpected path"
                    );
                }
                storage::copy_into_sink(&path, &mut sink)
                    .await
                    .map_err(SessionError::from)
            }
            Err(err) => Err(err),
        };

        drop(sink);
        if let Some(path) = foreign {
            storage::remove_artifact(&path).await;
        }
        artifact.release().await;
        flight.settle(|session, inner| {
            inner.recording = None;
            session.transition(inner, SessionState::PreviewActive);
        });

        match result {
            Ok(bytes_written) => {
                let duration = started_at.elapsed();
                info!(bytes = bytes_written, ?duration, "Recording saved");
                Ok(RecordingSummary {
                    device_id,
                    bytes_written,
                    duration,
                })
            }
            Err(err) => Err(self.report(op, err)),
        }
    }

    // ===== Controls =====

    /// Set zoom, clamped to the device's range. No-op when not connected.
    pub fn update_zoom(&self, level: f32) {
        let mut inner = self.lock();
        let (Some(handle), Some(device)) = (inner.handle.as_ref(), inner.device.as_ref()) else {
            debug!(level, "Zoom ignored: not connected");
            return;
        };
        let level = device.zoom_range().clamp(level);
        match self.backend.set_zoom(handle, level) {
            Ok(()) => {
                debug!(level, "Zoom updated");
                inner.zoom = Some(level);
            }
            Err(err) => warn!(error = %err, level, "Failed to set zoom"),
        }
    }

    /// Set flash mode. No-op when not connected or the device has no flash.
    pub fn update_flash_mode(&self, mode: FlashMode) {
        let mut inner = self.lock();
        let (Some(handle), Some(device)) = (inner.handle.as_ref(), inner.device.as_ref()) else {
            debug!(%mode, "Flash ignored: not connected");
            return;
        };
        if mode.uses_led() && !device.flash_supported() {
            warn!(%mode, device = %device.id(), "Device has no flash");
            return;
        }
        match self.backend.set_flash(handle, mode) {
            Ok(()) => {
                debug!(%mode, "Flash mode updated");
                inner.flash = mode;
            }
            Err(err) => warn!(error = %err, %mode, "Failed to set flash mode"),
        }
    }

    /// Change the capture resolution
    ///
    /// A no-op if `resolution` is already applied. Otherwise reconfigures the
    /// backend and, if a preview is bound, rebinds it so the change shows.
    pub async fn update_capture_resolution(
        &self,
        resolution: Resolution,
        token: &CancellationToken,
    ) -> SessionResult<()> {
        let op = Operation::UpdateCaptureResolution;
        let (applied, mut applied_signal) = completion();
        let (epoch, abort) = {
            let mut inner = self.lock();
            if inner.state.has_handle() && inner.resolution == Some(resolution) {
                debug!(%resolution, "Resolution already applied");
                return Ok(());
            }
            self.admit(&inner, op)?;
            let Some(handle) = inner.handle.as_ref() else {
                return Err(self.reject(not_connected(op)));
            };
            info!(%resolution, "Reconfiguring capture resolution");
            self.backend.set_resolution_filter(handle, resolution, applied);
            inner.in_flight = Some(op);
            (inner.epoch, inner.abort.clone())
        };
        let mut flight = InFlight::new(self, op, epoch, abort);

        let outcome = applied_signal
            .wait(token, &flight.abort, self.settings.operation_timeout)
            .await;

        match outcome {
            Outcome::Resolved(Ok(())) => {
                flight.settle(|session, inner| {
                    inner.resolution = Some(resolution);
                    session.restart_preview(inner);
                });
                Ok(())
            }
            Outcome::Resolved(Err(err)) => {
                // Backend refused; the previous filter is still in effect
                flight.settle(|_, _| ());
                Err(self.report(op, err.into()))
            }
            outcome => {
                // Unknown whether the filter took effect; force the next
                // request through
                flight.settle(|_, inner| inner.resolution = None);
                let err = match resolve::<()>(outcome, op, "resolution change") {
                    Err(err) => err,
                    Ok(()) => superseded(op),
                };
                Err(self.report(op, err))
            }
        }
    }

    // ===== Internals =====

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn transition(&self, inner: &mut Inner, to: SessionState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        info!(%from, %to, "Session state changed");
        let _ = self.events.send(SessionEvent::StateChanged { from, to });
    }

    /// Gate for exclusive operations that need an open, idle handle
    fn admit(&self, inner: &Inner, op: Operation) -> SessionResult<()> {
        if !inner.state.has_handle() && inner.state != SessionState::Connecting {
            return Err(self.reject(not_connected(op)));
        }
        if let Some(holder) = inner.in_flight {
            return Err(self.reject(SessionError::busy(op, holder)));
        }
        if inner.state == SessionState::Recording {
            return Err(self.reject(SessionError::busy(op, Operation::Recording)));
        }
        Ok(())
    }

    /// Run `f` against the bound handle if no disconnect happened since `epoch`
    fn with_handle<R>(&self, epoch: u64, f: impl FnOnce(&BackendHandle) -> R) -> Option<R> {
        let inner = self.lock();
        if inner.epoch != epoch {
            return None;
        }
        inner.handle.as_ref().map(f)
    }

    /// Finish a connect: the pending handle becomes the session's handle
    fn promote(&self, inner: &mut Inner, device: DeviceDescriptor) -> SessionResult<()> {
        let Some(handle) = inner.pending_handle.take() else {
            self.transition(inner, SessionState::Idle);
            return Err(SessionError::DeviceUnavailable(
                "handle released during connect".to_string(),
            ));
        };

        let flash = inner.flash;
        if flash.uses_led() && !device.flash_supported() {
            debug!(%flash, "Device has no flash, leaving it off");
            inner.flash = FlashMode::Off;
        } else if let Err(err) = self.backend.set_flash(&handle, flash) {
            warn!(error = %err, %flash, "Failed to apply flash mode");
        }

        if let Some(surface) = inner.surface.as_ref() {
            match self.backend.bind_preview(&handle, surface) {
                Ok(()) => inner.preview_bound = true,
                Err(err) => warn!(error = %err, surface = surface.id(), "Failed to bind preview"),
            }
        }

        info!(device = %device.id(), handle = handle.id(), "Connected");
        inner.handle = Some(handle);
        inner.device = Some(device);
        inner.resolution = None;
        inner.zoom = None;
        self.transition(inner, SessionState::PreviewActive);
        Ok(())
    }

    /// Rebind the preview so a new resolution takes effect
    fn restart_preview(&self, inner: &mut Inner) {
        if !inner.preview_bound {
            return;
        }
        let (Some(handle), Some(surface)) = (inner.handle.as_ref(), inner.surface.as_ref()) else {
            return;
        };
        let restarted = self
            .backend
            .unbind_preview(handle)
            .and_then(|()| self.backend.bind_preview(handle, surface));
        if let Err(err) = restarted {
            warn!(error = %err, "Failed to restart preview");
            inner.preview_bound = false;
        } else {
            debug!(surface = surface.id(), "Preview restarted");
        }
    }

    async fn open_device(
        &self,
        flight: &InFlight<'_>,
        requested: Option<DeviceDescriptor>,
        token: &CancellationToken,
    ) -> SessionResult<DeviceDescriptor> {
        let op = Operation::Connect;
        let device = match requested {
            Some(device) => device,
            None => self.default_device(token).await?,
        };
        info!(device = %device.id(), backend = self.backend.name(), "Connecting");

        let (ready, mut ready_signal) = completion();
        let handle = self.backend.open(&device, ready)?;

        {
            let mut inner = self.lock();
            if inner.epoch != flight.epoch {
                drop(inner);
                self.backend.close(handle);
                return Err(superseded(op));
            }
            inner.pending_handle = Some(handle);
        }

        let outcome = ready_signal
            .wait(token, &flight.abort, self.settings.operation_timeout)
            .await;
        resolve(outcome, op, "device ready")?;
        Ok(device)
    }

    /// First registry device, refreshing first if the snapshot is empty
    async fn default_device(&self, token: &CancellationToken) -> SessionResult<DeviceDescriptor> {
        let empty = self.registry.snapshot().is_none_or(|list| list.is_empty());
        if empty {
            debug!("Device snapshot empty, refreshing");
            self.registry
                .refresh_available_devices(token)
                .await
                .map_err(|err| match err {
                    SessionError::OperationCancelled(_) => {
                        SessionError::OperationCancelled(Operation::Connect)
                    }
                    err => err,
                })?;
        }
        self.registry
            .default_device()
            .ok_or_else(|| SessionError::DeviceUnavailable("no camera devices found".to_string()))
    }

    /// Clean up after an exclusive operation whose future was dropped
    fn abandon(&self, op: Operation, epoch: u64) {
        let handle = {
            let mut inner = self.lock();
            if inner.epoch != epoch || inner.in_flight != Some(op) {
                return;
            }
            warn!(operation = %op, "Operation dropped before completion");
            inner.in_flight = None;
            match op {
                Operation::Connect => {
                    self.transition(&mut inner, SessionState::Idle);
                    inner.pending_handle.take()
                }
                Operation::TakePicture => {
                    self.transition(&mut inner, SessionState::PreviewActive);
                    None
                }
                // The dropped future's artifact guard finishes the cleanup
                Operation::StopRecording => {
                    inner.recording = None;
                    self.transition(&mut inner, SessionState::PreviewActive);
                    None
                }
                Operation::StartRecording => {
                    if let Some(Err(err)) =
                        inner.handle.as_ref().map(|h| self.backend.stop_recording(h))
                    {
                        debug!(error = %err, "Stop after dropped start failed");
                    }
                    None
                }
                Operation::UpdateCaptureResolution => {
                    inner.resolution = None;
                    None
                }
                _ => None,
            }
        };
        if let Some(handle) = handle {
            self.backend.close(handle);
        }
    }

    /// Log and publish a failure from a suspending operation
    fn report(&self, op: Operation, err: SessionError) -> SessionError {
        if err.is_cancelled() {
            info!(operation = %op, "Operation cancelled");
        } else {
            warn!(operation = %op, error = %err, "Operation failed");
        }
        let _ = self.events.send(SessionEvent::OperationFailed {
            operation: op,
            error: err.clone(),
        });
        err
    }

    /// Log an immediate rejection (no suspension happened)
    fn reject(&self, err: SessionError) -> SessionError {
        debug!(error = %err, "Request rejected");
        err
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        let inner = self
            .inner
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(handle) = inner.handle.take() {
            if matches!(inner.recording, Some(RecordingSlot::Active(_)))
                && let Err(err) = self.backend.stop_recording(&handle)
            {
                debug!(error = %err, "Stop on drop failed");
            }
            debug!(handle = handle.id(), "Closing device on drop");
            self.backend.close(handle);
        }
        if let Some(handle) = inner.pending_handle.take() {
            self.backend.close(handle);
        }
        // An active context defers removing its file until finalize
        inner.recording.take();
    }
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("CaptureSession")
            .field("backend", &self.backend.name())
            .field("state", &inner.state)
            .field("device", &inner.device.as_ref().map(DeviceDescriptor::id))
            .field("in_flight", &inner.in_flight)
            .finish()
    }
}

/// Marks an exclusive operation as suspended; cleans up if dropped unsettled
struct InFlight<'a> {
    session: &'a CaptureSession,
    op: Operation,
    epoch: u64,
    abort: CancellationToken,
    settled: bool,
}

impl<'a> InFlight<'a> {
    fn new(session: &'a CaptureSession, op: Operation, epoch: u64, abort: CancellationToken) -> Self {
        Self {
            session,
            op,
            epoch,
            abort,
            settled: false,
        }
    }

    fn is_superseded(&self) -> bool {
        self.session.lock().epoch != self.epoch
    }

    /// Release the session and apply `f`, unless a disconnect superseded us
    fn settle<R>(&mut self, f: impl FnOnce(&CaptureSession, &mut Inner) -> R) -> Option<R> {
        self.settled = true;
        let mut inner = self.session.lock();
        if inner.epoch != self.epoch {
            debug!(operation = %self.op, "Superseded by disconnect");
            return None;
        }
        if inner.in_flight == Some(self.op) {
            inner.in_flight = None;
        }
        Some(f(self.session, &mut inner))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.session.abandon(self.op, self.epoch);
        }
    }
}

/// Map a bridge outcome onto the session error taxonomy
fn resolve<T>(
    outcome: Outcome<Result<T, BackendError>>,
    op: Operation,
    what: &str,
) -> SessionResult<T> {
    match outcome {
        Outcome::Resolved(Ok(value)) => Ok(value),
        Outcome::Resolved(Err(err)) => Err(SessionError::BackendFailure(err)),
        Outcome::Cancelled => Err(SessionError::OperationCancelled(op)),
        Outcome::Aborted => Err(superseded(op)),
        Outcome::TimedOut => Err(SessionError::BackendFailure(BackendError::Timeout(
            what.to_string(),
        ))),
        Outcome::Abandoned => Err(SessionError::BackendFailure(BackendError::Abandoned(
            what.to_string(),
        ))),
    }
}

fn not_connected(op: Operation) -> SessionError {
    SessionError::DeviceUnavailable(format!("cannot {}: no device connected", op))
}

fn superseded(op: Operation) -> SessionError {
    SessionError::DeviceUnavailable(format!("session disconnected during {}", op))
}
