//! Shared state of a managed connection and the handlers of platform events.
//!
//! The handlers run on the event thread only. They never take the request lock of
//! [crate::BleManager]; they only hold the state lock for short critical sections,
//! so a request waiting for an event can never block the delivery of that event.

use std::sync::Arc;

use async_lock::Mutex;
use log::{debug, error, info, trace, warn};

use super::async_util::Excluder;
use super::callback::{GattCallback, GattEvent};
use super::characteristic::Characteristic;
use super::descriptor::Descriptor;
use super::error::{Error, ErrorCode, GattStatus, NativeError};
use super::manager::BleManagerListener;
use super::notification::NotificationRegistry;
use super::platform::GattPlatform;
use super::types::{ConnectionHandle, DeviceId, LinkState, ProfileState};
use super::Result;

#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub device: Option<DeviceId>,
    /// The connection object of the established link.
    pub active: Option<ConnectionHandle>,
    /// The connection object opened by the `connect` call in progress.
    pub pending: Option<ConnectionHandle>,
    pub link: LinkState,
    /// Set while a disconnection is requested by the user.
    pub ask_disconnection: bool,
}

pub(crate) struct Session {
    pub platform: Arc<dyn GattPlatform>,
    pub callback: GattCallback,
    pub state: Mutex<SessionState>,
    pub connect: Excluder<Result<()>>,
    pub disconnect: Excluder<Result<()>>,
    pub discover_services: Excluder<Result<()>>,
    pub configure: Excluder<Result<()>>,
    pub notifications: NotificationRegistry,
    pub listener: Mutex<Option<Arc<dyn BleManagerListener>>>,
}

fn not_connected(msg: &str) -> Error {
    Error::new(ErrorCode::BleNotConnected, None, msg)
}

impl Session {
    pub fn new(platform: Arc<dyn GattPlatform>, callback: GattCallback) -> Self {
        Self {
            platform,
            callback,
            state: Mutex::new(SessionState::default()),
            connect: Excluder::new(),
            disconnect: Excluder::new(),
            discover_services: Excluder::new(),
            configure: Excluder::new(),
            notifications: NotificationRegistry::new(),
            listener: Mutex::new(None),
        }
    }

    pub fn active_handle(&self) -> Option<ConnectionHandle> {
        self.state.lock_blocking().active
    }

    pub fn handle_event(&self, event: GattEvent) {
        trace!("processing {event:?}");
        match event {
            GattEvent::ConnectionStateChanged {
                handle,
                status,
                new_state,
            } => self.on_connection_state_change(handle, status, new_state),
            GattEvent::ServicesDiscovered { handle, status } => {
                self.on_services_discovered(handle, status)
            }
            GattEvent::DescriptorWritten {
                handle,
                descriptor,
                status,
            } => self.on_descriptor_write(handle, &descriptor, status),
            GattEvent::CharacteristicChanged {
                handle,
                characteristic,
                value,
            } => self.on_characteristic_changed(handle, &characteristic, value),
        }
    }

    fn on_connection_state_change(
        &self,
        handle: ConnectionHandle,
        status: GattStatus,
        new_state: ProfileState,
    ) {
        info!("connection state of {handle} changed: status = {status}, new state = {new_state:?}");

        if new_state == ProfileState::Disconnected && !self.on_disconnected(handle) {
            let is_pending = self.state.lock_blocking().pending == Some(handle);
            if !is_pending {
                // the `connect` call in progress closes its own connection object.
                warn!("disconnection of another connection {handle}");
                self.platform.close_connection(handle);
            }
        }

        match status {
            GattStatus::Success => {
                if new_state == ProfileState::Connected {
                    self.on_connected(handle);
                }
            }
            GattStatus::Interrupted => {
                warn!("connection of {handle} interrupted ({status}), possibly transient");
                self.connect.unlock(Err(Error::native(
                    ErrorCode::BleConnection,
                    NativeError::Status(status),
                )));
            }
            _ => {
                error!("connection state change of {handle} failed: {status}");
                self.connect.unlock(Err(Error::native(
                    ErrorCode::BleConnection,
                    NativeError::Status(status),
                )));
            }
        }
    }

    fn on_connected(&self, handle: ConnectionHandle) {
        let mut state = self.state.lock_blocking();
        if state.pending != Some(handle) && state.active != Some(handle) {
            drop(state);
            warn!("ignoring the connection of stale connection object {handle}");
            self.platform.close_connection(handle);
            return;
        }
        state.active = Some(handle);
        state.link = LinkState::Connected;
        drop(state);
        self.connect.unlock(Ok(()));
    }

    /// Tears the session down if `handle` is the active connection.
    ///
    /// Pending requests fail with [ErrorCode::BleNotConnected]; the listener is notified
    /// unless the disconnection was requested. Returns `false` if `handle` is not active.
    pub fn on_disconnected(&self, handle: ConnectionHandle) -> bool {
        let mut state = self.state.lock_blocking();
        if state.active != Some(handle) {
            return false;
        }
        state.active = None;
        if state.pending == Some(handle) {
            state.pending = None;
        }
        state.link = LinkState::Disconnected;
        let asked = state.ask_disconnection;
        drop(state);

        info!("{handle} disconnected");
        self.platform.close_connection(handle);

        if asked {
            self.disconnect.unlock(Ok(()));
        }
        if self
            .discover_services
            .cancel(Err(not_connected("disconnected while discovering services")))
        {
            debug!("service discovery aborted by the disconnection");
        }
        if self.configure.cancel(Err(not_connected(
            "disconnected while configuring a characteristic",
        ))) {
            debug!("characteristic configuration aborted by the disconnection");
        }

        if !asked {
            let listener = self.listener.lock_blocking().clone();
            if let Some(listener) = listener {
                listener.on_unsolicited_disconnect();
            }
        }
        true
    }

    fn on_services_discovered(&self, handle: ConnectionHandle, status: GattStatus) {
        if self.active_handle() != Some(handle) {
            debug!("ignoring service discovery result of inactive {handle}");
            return;
        }
        let result = if status.is_success() {
            Ok(())
        } else {
            warn!("service discovery of {handle} failed: {status}");
            Err(Error::native(
                ErrorCode::BleServicesDiscovering,
                NativeError::Status(status),
            ))
        };
        if !self.discover_services.unlock(result) {
            debug!("ignoring the late service discovery answer on {handle}");
        }
    }

    fn on_descriptor_write(&self, handle: ConnectionHandle, descriptor: &Descriptor, status: GattStatus) {
        if self.active_handle() != Some(handle) {
            debug!("ignoring descriptor write result of inactive {handle}");
            return;
        }
        if !descriptor.is_notification_config() {
            debug!(
                "ignoring write completion of descriptor {} on {handle}",
                descriptor.uuid()
            );
            return;
        }
        let result = if status.is_success() {
            Ok(())
        } else {
            warn!(
                "configuration of characteristic {} failed: {status}",
                descriptor.characteristic_uuid()
            );
            Err(Error::native(
                ErrorCode::BleCharacteristicConfiguring,
                NativeError::Status(status),
            ))
        };
        if !self.configure.unlock(result) {
            debug!("ignoring the late configuration answer on {handle}");
        }
    }

    fn on_characteristic_changed(
        &self,
        handle: ConnectionHandle,
        characteristic: &Characteristic,
        value: Vec<u8>,
    ) {
        if self.active_handle() != Some(handle) {
            debug!("ignoring notification from inactive {handle}");
            return;
        }
        self.notifications.deliver(characteristic, value);
    }

    /// Forgets every pending request without fulfilling it (and every late answer still
    /// expected), releases and removes every notification registration, and closes the
    /// active connection object.
    pub fn reset(&self) {
        self.connect.reset();
        self.disconnect.reset();
        self.discover_services.reset();
        self.configure.reset();
        self.notifications.clear();

        let handle = {
            let mut state = self.state.lock_blocking();
            state.link = LinkState::Disconnected;
            state.active.take()
        };
        if let Some(handle) = handle {
            debug!("closing {handle}");
            self.platform.close_connection(handle);
        }
    }

    /// Fulfils every waiting request except disconnection with
    /// [ErrorCode::BleNotConnected] and wakes up every notification reader.
    pub fn unlock(&self) {
        self.connect.cancel(Err(not_connected("connection cancelled")));
        self.configure.cancel(Err(not_connected("configuration cancelled")));
        self.discover_services
            .cancel(Err(not_connected("service discovery cancelled")));
        self.notifications.cancel_all();
    }

    /// Releases everything before the owning manager goes away.
    pub fn shutdown(&self) {
        self.unlock();
        let handle = {
            let mut state = self.state.lock_blocking();
            state.ask_disconnection = true;
            state.active
        };
        if let Some(handle) = handle {
            if self.platform.is_link_connected(handle) {
                if let Err(e) = self.platform.disconnect(handle) {
                    warn!("failed to disconnect {handle} on shutdown: {e}");
                }
            }
        }
        self.reset();
        let pending = self.state.lock_blocking().pending.take();
        if let Some(handle) = pending {
            self.platform.close_connection(handle);
        }
        self.callback.close();
    }
}
