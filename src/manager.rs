use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use async_lock::Mutex;
use futures_core::Stream;
use futures_timer::Delay;
use log::{debug, error, info, warn};

use super::async_util::{Excluder, ResultWaiter};
use super::callback::GattCallback;
use super::characteristic::Characteristic;
use super::config::ManagerConfig;
use super::descriptor::ENABLE_NOTIFICATION_VALUE;
use super::error::{Error, ErrorCode, NativeError};
use super::event_receiver;
use super::notification::NotificationData;
use super::platform::GattPlatform;
use super::service::Service;
use super::session::Session;
use super::types::{ConnectionHandle, DeviceId, LinkState, WriteType};
use super::util::{defer, OptionExt};
use super::Result;

/// Receives events that are not the answer to any request.
pub trait BleManagerListener: Send + Sync {
    /// The link was lost without [BleManager::disconnect] being called.
    ///
    /// This is called on the event thread: it must return quickly, and must not wait for
    /// a [BleManager] request, which would wait for the event thread in turn.
    fn on_unsolicited_disconnect(&self);
}

/// Manages the GATT connection to one peripheral at a time.
///
/// Requests (`connect`, `disconnect`, `discover_services`, `configure_notification`
/// and `reset`) are serialized: each one waits for the previous one to finish, then for
/// the platform to report its outcome. `write` and `read` are fire-and-forget and are
/// not serialized.
///
/// Blocking callers may drive the futures with `futures_lite::future::block_on`.
pub struct BleManager {
    session: Arc<Session>,
    config: ManagerConfig,
    request_lock: Mutex<()>,
    event_thread: Option<JoinHandle<()>>,
}

impl BleManager {
    /// Creates the manager and starts its event thread.
    pub fn new(platform: Arc<dyn GattPlatform>, config: ManagerConfig) -> Result<Self> {
        let (callback, receiver) = GattCallback::channel();
        let session = Arc::new(Session::new(platform, callback));
        let event_thread = event_receiver::spawn(session.clone(), receiver).map_err(|e| {
            Error::new(
                ErrorCode::System,
                None,
                format!("failed to spawn the event thread: {e}"),
            )
        })?;
        Ok(Self {
            session,
            config,
            request_lock: Mutex::new(()),
            event_thread: Some(event_thread),
        })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Sets the receiver of unsolicited disconnections, replacing the previous one.
    pub fn set_listener(&self, listener: Arc<dyn BleManagerListener>) {
        self.session.listener.lock_blocking().replace(listener);
    }

    pub fn clear_listener(&self) {
        let _ = self.session.listener.lock_blocking().take();
    }

    /// Checks if the link to the device is established.
    pub fn is_connected(&self) -> bool {
        let state = self.session.state.lock_blocking();
        state.active.is_some() && state.link == LinkState::Connected
    }

    pub fn link_state(&self) -> LinkState {
        self.session.state.lock_blocking().link
    }

    /// The device of the last `connect` call.
    pub fn device(&self) -> Option<DeviceId> {
        self.session.state.lock_blocking().device.clone()
    }

    /// Connects to `device`, disconnecting from the current device at first.
    ///
    /// Fails with [ErrorCode::BleNotConnected] if the platform refuses to connect or does
    /// not report the connection in time, or with [ErrorCode::BleConnection] if it
    /// reports a failure.
    pub async fn connect(&self, device: &DeviceId) -> Result<()> {
        info!("connecting to {device}");
        let _guard = self.request_lock.lock().await;

        if self.session.active_handle().is_some() {
            self.disconnect_locked().await;
        }
        debug!("resetting connection objects");
        self.session.reset();

        let waiter = self.session.connect.lock();
        let opened = {
            let mut state = self.session.state.lock_blocking();
            state.device = Some(device.clone());
            state.link = LinkState::Connecting;
            let opened = self
                .session
                .platform
                .open_connection(device, self.session.callback.clone());
            if let Ok(handle) = opened.as_ref() {
                state.pending = Some(*handle);
            } else {
                state.link = LinkState::Disconnected;
            }
            opened
        };
        let handle = match opened {
            Ok(handle) => handle,
            Err(e) => {
                error!("cannot open a connection to {device}: {e}");
                self.session.connect.clear();
                return Err(Error::native(ErrorCode::BleNotConnected, e));
            }
        };
        debug!("waiting for the connection of {handle}");

        let result = match waiter
            .wait_unlock(Some(self.config.connection_timeout))
            .await
        {
            Some(_) => {
                // the platform may report a burst of state changes; let them settle.
                Delay::new(self.config.settle_delay).await;
                self.session
                    .connect
                    .last_value()
                    .unwrap_or_else(|| Err(ErrorCode::BleNotConnected.into()))
            }
            None => {
                warn!("no connection callback for {handle} in time");
                Err(Error::new(
                    ErrorCode::BleNotConnected,
                    None,
                    "connection timed out",
                ))
            }
        };
        self.finish_connect(handle, result)
    }

    fn finish_connect(&self, handle: ConnectionHandle, result: Result<()>) -> Result<()> {
        let mut state = self.session.state.lock_blocking();
        let pending = state.pending.take();
        if result.is_ok() && state.active == Some(handle) {
            state.link = LinkState::Connected;
            drop(state);
            info!("connected with {handle}");
            return Ok(());
        }

        let active = state.active.take();
        state.link = LinkState::Disconnected;
        drop(state);
        self.session.connect.clear();

        for handle in active.into_iter().chain(pending.filter(|h| Some(*h) != active)) {
            debug!("closing {handle} after the failed connection");
            self.session.platform.close_connection(handle);
        }
        let result = match result {
            Ok(()) => Err(Error::new(
                ErrorCode::BleNotConnected,
                None,
                "connection lost right after it was established",
            )),
            Err(e) => Err(e),
        };
        info!("connection with {handle} failed: {:?}", result.as_ref().err());
        result
    }

    /// Disconnects from the current device; does nothing if not connected.
    ///
    /// If the platform does not confirm the disconnection in time, the session is torn
    /// down as if it did.
    pub async fn disconnect(&self) {
        let _guard = self.request_lock.lock().await;
        self.disconnect_locked().await;
    }

    async fn disconnect_locked(&self) {
        let Some(handle) = self.session.active_handle() else {
            debug!("disconnect: not connected");
            return;
        };
        info!("disconnecting {handle}");

        let waiter = self.session.disconnect.lock();
        {
            let mut state = self.session.state.lock_blocking();
            state.ask_disconnection = true;
            state.link = LinkState::Disconnecting;
        }
        let _asked = defer(|| {
            self.session.state.lock_blocking().ask_disconnection = false;
        });

        let platform = &self.session.platform;
        let requested = if platform.is_link_connected(handle) {
            match platform.disconnect(handle) {
                Ok(()) => true,
                Err(e) => {
                    error!("cannot request disconnection of {handle}: {e}");
                    false
                }
            }
        } else {
            debug!("link of {handle} is already down");
            false
        };

        let confirmed = requested
            && waiter
                .wait_unlock(Some(self.config.disconnection_timeout))
                .await
                .is_some();
        if !confirmed {
            warn!("disconnection of {handle} not confirmed, tearing it down manually");
            self.session.on_disconnected(handle);
        }
        self.session.disconnect.clear();
    }

    /// Discovers the services of the connected device.
    pub async fn discover_services(&self) -> Result<()> {
        let _guard = self.request_lock.lock().await;
        let handle = self.session.active_handle().ok_or_not_connected()?;

        let waiter = self.session.discover_services.lock();
        if self.session.active_handle() != Some(handle) {
            self.session.discover_services.clear();
            return Err(ErrorCode::BleNotConnected.into());
        }
        if let Err(e) = self.session.platform.discover_services(handle) {
            error!("cannot start service discovery on {handle}: {e}");
            self.session.discover_services.clear();
            return Err(Error::native(ErrorCode::Generic, e));
        }
        Self::wait_result(
            &self.session.discover_services,
            waiter,
            self.config.discovery_timeout,
            "service discovery",
        )
        .await
    }

    /// Services found by the last discovery.
    pub fn services(&self) -> Result<Vec<Service>> {
        let handle = self.session.active_handle().ok_or_not_connected()?;
        self.session
            .platform
            .services(handle)
            .map_err(|e| Error::native(ErrorCode::BleCharacteristicsDiscovering, e))
    }

    /// Enables notifications of `characteristic` on the device, by writing its Client
    /// Characteristic Configuration Descriptor.
    pub async fn configure_notification(&self, characteristic: &Characteristic) -> Result<()> {
        let _guard = self.request_lock.lock().await;
        let handle = self.session.active_handle().ok_or_not_connected()?;

        let waiter = self.session.configure.lock();
        let fail = |code: ErrorCode, e: Option<NativeError>, msg: String| -> Result<()> {
            self.session.configure.clear();
            warn!("{msg}");
            Err(match e {
                Some(e) => Error::native(code, e),
                None => Error::new(code, None, msg),
            })
        };
        if self.session.active_handle() != Some(handle) {
            return fail(ErrorCode::BleNotConnected, None, "disconnected".into());
        }

        let platform = &self.session.platform;
        if let Err(e) = platform.set_characteristic_notification(handle, characteristic, true) {
            return fail(
                ErrorCode::BleCharacteristicConfiguring,
                Some(e),
                format!("cannot enable notification of {}", characteristic.uuid()),
            );
        }
        let Some(descriptor) = characteristic.notification_descriptor() else {
            return fail(
                ErrorCode::BleCharacteristicConfiguring,
                None,
                format!(
                    "characteristic {} has no notification configuration descriptor",
                    characteristic.uuid()
                ),
            );
        };
        if let Err(e) = platform.write_descriptor(handle, &descriptor, &ENABLE_NOTIFICATION_VALUE) {
            return fail(
                ErrorCode::BleCharacteristicConfiguring,
                Some(e),
                format!("cannot write the descriptor of {}", characteristic.uuid()),
            );
        }
        Self::wait_result(
            &self.session.configure,
            waiter,
            self.config.configuration_timeout,
            "characteristic configuration",
        )
        .await
    }

    /// Waits for the answer of `waiter`. On timeout the lock is abandoned, so that the
    /// late answer is not taken for the answer of the next request.
    async fn wait_result(
        excluder: &Excluder<Result<()>>,
        waiter: ResultWaiter<Result<()>>,
        timeout: Option<Duration>,
        what: &str,
    ) -> Result<()> {
        waiter.wait_unlock(timeout).await.unwrap_or_else(|| {
            warn!("{what} timed out");
            excluder.abandon();
            Err(Error::new(
                ErrorCode::BleTimeout,
                None,
                format!("{what} timed out"),
            ))
        })
    }

    /// Writes `data` to `characteristic` without response.
    ///
    /// Returns `false` if not connected or if the platform refuses the write.
    pub fn write(&self, data: &[u8], characteristic: &Characteristic) -> bool {
        let Some(handle) = self.session.active_handle() else {
            return false;
        };
        match self.session.platform.write_characteristic(
            handle,
            characteristic,
            data,
            WriteType::WithoutResponse,
        ) {
            Ok(()) => true,
            Err(e) => {
                warn!("write to {} failed: {e}", characteristic.uuid());
                false
            }
        }
    }

    /// Requests a read of `characteristic`; the value is not delivered to the caller.
    pub fn read(&self, characteristic: &Characteristic) -> bool {
        let Some(handle) = self.session.active_handle() else {
            return false;
        };
        match self
            .session
            .platform
            .read_characteristic(handle, characteristic)
        {
            Ok(()) => true,
            Err(e) => {
                warn!("read of {} failed: {e}", characteristic.uuid());
                false
            }
        }
    }

    /// Queues notifications of `characteristics` under `key`, replacing any previous
    /// registration with that key.
    pub fn register_notification(&self, characteristics: Vec<Characteristic>, key: impl Into<String>) {
        self.session.notifications.register(characteristics, key);
    }

    /// Removes the registration of `key`; returns whether it existed.
    pub fn unregister_notification(&self, key: &str) -> bool {
        self.session.notifications.unregister(key)
    }

    /// Wakes up a reader of `key` without data; returns whether `key` is registered.
    pub fn cancel_notification(&self, key: &str) -> bool {
        self.session.notifications.cancel(key)
    }

    /// Waits for notifications of `key` (`None` waits forever) and returns up to
    /// `max_count` of the oldest ones.
    ///
    /// See [crate::NotificationRegistry::drain].
    pub async fn drain_notifications(
        &self,
        key: &str,
        max_count: usize,
        timeout: Option<Duration>,
    ) -> Result<Vec<NotificationData>> {
        self.session
            .notifications
            .drain(key, max_count, timeout)
            .await
    }

    /// Returns the notifications of `key` as a stream.
    ///
    /// See [crate::NotificationRegistry::notifications].
    pub fn notifications(
        &self,
        key: &str,
    ) -> Result<impl Stream<Item = NotificationData> + Send + Unpin + 'static> {
        self.session.notifications.notifications(key)
    }

    /// Forgets pending requests, removes every notification registration (waking up
    /// their readers) and closes the active connection object.
    pub async fn reset(&self) {
        let _guard = self.request_lock.lock().await;
        self.session.reset();
    }

    /// Makes every waiting request except `disconnect` return immediately, and wakes up
    /// every notification reader.
    ///
    /// Requests fulfilled this way fail with [ErrorCode::BleNotConnected].
    pub fn unlock(&self) {
        info!("unlocking every waiting request");
        self.session.unlock();
    }
}

impl Drop for BleManager {
    fn drop(&mut self) {
        self.session.shutdown();
        if let Some(th) = self.event_thread.take() {
            if th.thread().id() != std::thread::current().id() {
                let _ = th.join();
            }
        }
    }
}
