// SPDX-License-Identifier: GPL-3.0-only

//! Device discovery with change detection
//!
//! The registry caches the device list as an immutable snapshot. A refresh
//! builds a new list and swaps it in whole; readers clone the `Arc` and never
//! observe a half-updated list.
//!
//! Refreshes are coalesced: while one is running, further callers join it
//! instead of querying the backend again.

use super::PlatformCameraBackend;
use super::types::{BackendError, DeviceDescriptor};
use crate::constants::EVENT_CHANNEL_CAPACITY;
use crate::errors::{SessionError, SessionResult};
use crate::session::Operation;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Immutable device list snapshot
pub type DeviceList = Arc<[DeviceDescriptor]>;

type RefreshFuture = Shared<BoxFuture<'static, SessionResult<DeviceList>>>;

struct RegistryState {
    /// `None` until the first successful refresh
    snapshot: RwLock<Option<DeviceList>>,
    in_flight: Mutex<Option<(u64, RefreshFuture)>>,
    next_refresh_id: AtomicU64,
    changes: broadcast::Sender<DeviceList>,
}

impl RegistryState {
    /// Swap in `devices` and notify if the list changed
    ///
    /// "Not yet refreshed" counts as an empty list for change detection.
    fn apply(&self, devices: Vec<DeviceDescriptor>) -> DeviceList {
        let mut snapshot = self
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let changed = match snapshot.as_deref() {
            Some(current) => current != devices.as_slice(),
            None => !devices.is_empty(),
        };

        if !changed {
            if let Some(current) = snapshot.as_ref() {
                debug!(count = current.len(), "Device list unchanged");
                return Arc::clone(current);
            }
        }

        let list: DeviceList = devices.into();
        *snapshot = Some(Arc::clone(&list));
        drop(snapshot);

        if changed {
            info!(count = list.len(), "Device list changed");
            // No receivers is fine
            let _ = self.changes.send(Arc::clone(&list));
        }
        list
    }

    fn finish(&self, id: u64) {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if matches!(in_flight.as_ref(), Some((current, _)) if *current == id) {
            *in_flight = None;
        }
    }
}

/// Cached, change-aware view of the backend's devices
///
/// Cheap to clone; clones share the cache.
#[derive(Clone)]
pub struct DeviceRegistry {
    backend: Arc<dyn PlatformCameraBackend>,
    state: Arc<RegistryState>,
}

impl DeviceRegistry {
    pub fn new(backend: Arc<dyn PlatformCameraBackend>) -> Self {
        let (changes, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            backend,
            state: Arc::new(RegistryState {
                snapshot: RwLock::new(None),
                in_flight: Mutex::new(None),
                next_refresh_id: AtomicU64::new(1),
                changes,
            }),
        }
    }

    /// Current snapshot; `None` if never refreshed
    pub fn snapshot(&self) -> Option<DeviceList> {
        self.state
            .snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// First device of the current snapshot
    pub fn default_device(&self) -> Option<DeviceDescriptor> {
        self.snapshot().and_then(|list| list.first().cloned())
    }

    /// Look up a device by id in the current snapshot
    pub fn find(&self, id: &str) -> Option<DeviceDescriptor> {
        self.snapshot()
            .and_then(|list| list.iter().find(|device| device.id() == id).cloned())
    }

    /// Receive every changed device list (`DeviceListChanged`)
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceList> {
        self.state.changes.subscribe()
    }

    /// Re-query the backend and update the cache
    ///
    /// Joins a refresh that is already running. Cancelling `token` only stops
    /// this caller from waiting; the refresh itself still completes and
    /// updates the cache.
    pub async fn refresh_available_devices(
        &self,
        token: &CancellationToken,
    ) -> SessionResult<DeviceList> {
        let refresh = self.join_or_start_refresh();

        tokio::select! {
            result = refresh => result,
            _ = token.cancelled() => {
                debug!("Device refresh waiter cancelled");
                Err(SessionError::OperationCancelled(Operation::RefreshDevices))
            }
        }
    }

    fn join_or_start_refresh(&self) -> RefreshFuture {
        let mut in_flight = self
            .state
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some((id, refresh)) = in_flight.as_ref() {
            debug!(refresh = id, "Joining in-flight device refresh");
            return refresh.clone();
        }

        let id = self.state.next_refresh_id.fetch_add(1, Ordering::Relaxed);
        let backend = Arc::clone(&self.backend);
        let state = Arc::clone(&self.state);

        debug!(refresh = id, backend = backend.name(), "Starting device refresh");

        // Spawned so the refresh finishes even if every waiter goes away
        let task = tokio::spawn(async move {
            let enumerated = tokio::task::spawn_blocking(move || backend.enumerate_devices()).await;

            let result = match enumerated {
                Ok(Ok(devices)) => Ok(state.apply(devices)),
                Ok(Err(err)) => {
                    warn!(error = %err, "Device enumeration failed");
                    Err(SessionError::BackendFailure(err))
                }
                Err(err) => {
                    warn!(error = %err, "Device enumeration task failed");
                    Err(SessionError::BackendFailure(BackendError::Crashed(
                        err.to_string(),
                    )))
                }
            };

            state.finish(id);
            result
        });

        let refresh = async move {
            task.await.unwrap_or_else(|err| {
                Err(SessionError::BackendFailure(BackendError::Crashed(
                    err.to_string(),
                )))
            })
        }
        .boxed()
        .shared();

        *in_flight = Some((id, refresh.clone()));
        refresh
    }
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("backend", &self.backend.name())
            .field("devices", &self.snapshot().map(|list| list.len()))
            .finish()
    }
}
