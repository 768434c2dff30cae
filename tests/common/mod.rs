#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arsal_ble::{
    BleManager, BleManagerListener, Characteristic, ConnectionHandle, Descriptor, DeviceId,
    GattCallback, GattPlatform, ManagerConfig, NativeError, ProfileState, Service, Uuid,
    WriteType, CLIENT_CHARACTERISTIC_CONFIGURATION,
};

pub const SERVICE: Uuid = Uuid::from_u128(0x9a66fb00_0800_9191_11e4_012d1540cb8e);
pub const NOTIFY_CHAR: Uuid = Uuid::from_u128(0x9a66fb0f_0800_9191_11e4_012d1540cb8e);
pub const WRITE_CHAR: Uuid = Uuid::from_u128(0x9a66fa0b_0800_9191_11e4_012d1540cb8e);

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn notify_char() -> Characteristic {
    Characteristic::new(SERVICE, NOTIFY_CHAR).with_descriptors([CLIENT_CHARACTERISTIC_CONFIGURATION])
}

pub fn write_char() -> Characteristic {
    Characteristic::new(SERVICE, WRITE_CHAR)
}

/// Short timings so that the failure paths do not slow the test suite down.
pub fn fast_config() -> ManagerConfig {
    ManagerConfig::default()
        .with_connection_timeout(Duration::from_millis(300))
        .with_disconnection_timeout(Duration::from_millis(300))
        .with_settle_delay(Duration::from_millis(20))
}

/// How the mock answers `open_connection`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectBehavior {
    Succeed,
    Silent,
    Fail(i32),
    Refuse,
}

struct MockState {
    next_handle: u64,
    callbacks: HashMap<ConnectionHandle, GattCallback>,
    open: Vec<ConnectionHandle>,
    connected: Vec<ConnectionHandle>,
    closed: Vec<ConnectionHandle>,
    connect: ConnectBehavior,
    answer_disconnect: bool,
    discovery_status: Option<i32>,
    descriptor_status: Option<i32>,
    notifications_enabled: Vec<Characteristic>,
    descriptor_writes: Vec<(Descriptor, Vec<u8>)>,
    writes: Vec<(Characteristic, Vec<u8>, WriteType)>,
    reads: Vec<Characteristic>,
    services: Vec<Service>,
    answer_delay: Duration,
}

/// Scripted platform stack: answers requests from its own threads after a short delay.
pub struct MockPlatform {
    state: Mutex<MockState>,
}

impl MockPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(MockState {
                next_handle: 1,
                callbacks: HashMap::new(),
                open: Vec::new(),
                connected: Vec::new(),
                closed: Vec::new(),
                connect: ConnectBehavior::Succeed,
                answer_disconnect: true,
                discovery_status: Some(0),
                descriptor_status: Some(0),
                notifications_enabled: Vec::new(),
                descriptor_writes: Vec::new(),
                writes: Vec::new(),
                reads: Vec::new(),
                services: vec![Service::new(SERVICE, true, [notify_char(), write_char()])],
                answer_delay: Duration::from_millis(10),
            }),
        })
    }

    pub fn manager(self: &Arc<Self>, config: ManagerConfig) -> BleManager {
        BleManager::new(self.clone(), config).unwrap()
    }

    pub fn set_connect(&self, behavior: ConnectBehavior) {
        self.state.lock().unwrap().connect = behavior;
    }

    pub fn set_answer_disconnect(&self, answer: bool) {
        self.state.lock().unwrap().answer_disconnect = answer;
    }

    pub fn set_discovery_status(&self, status: Option<i32>) {
        self.state.lock().unwrap().discovery_status = status;
    }

    pub fn set_descriptor_status(&self, status: Option<i32>) {
        self.state.lock().unwrap().descriptor_status = status;
    }

    /// Delay of the answers to the requests issued from now on.
    pub fn set_answer_delay(&self, delay: Duration) {
        self.state.lock().unwrap().answer_delay = delay;
    }

    pub fn last_handle(&self) -> ConnectionHandle {
        ConnectionHandle(self.state.lock().unwrap().next_handle - 1)
    }

    /// Connection objects opened and not closed yet.
    pub fn open_handles(&self) -> Vec<ConnectionHandle> {
        self.state.lock().unwrap().open.clone()
    }

    pub fn closed_handles(&self) -> Vec<ConnectionHandle> {
        self.state.lock().unwrap().closed.clone()
    }

    pub fn notifications_enabled(&self) -> Vec<Characteristic> {
        self.state.lock().unwrap().notifications_enabled.clone()
    }

    pub fn descriptor_writes(&self) -> Vec<(Descriptor, Vec<u8>)> {
        self.state.lock().unwrap().descriptor_writes.clone()
    }

    pub fn writes(&self) -> Vec<(Characteristic, Vec<u8>, WriteType)> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn reads(&self) -> Vec<Characteristic> {
        self.state.lock().unwrap().reads.clone()
    }

    fn callback(&self, handle: ConnectionHandle) -> GattCallback {
        self.state.lock().unwrap().callbacks[&handle].clone()
    }

    fn later(delay: Duration, f: impl FnOnce() + Send + 'static) {
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            f();
        });
    }

    /// The peripheral goes away without being asked to.
    pub fn drop_link(&self, handle: ConnectionHandle) {
        self.state.lock().unwrap().connected.retain(|h| *h != handle);
        let callback = self.callback(handle);
        callback.on_connection_state_change(handle, 8, ProfileState::Disconnected);
    }

    /// Reports a successful connection of `handle`, whatever was requested.
    pub fn report_connected(&self, handle: ConnectionHandle) {
        let callback = self.callback(handle);
        callback.on_connection_state_change(handle, 0, ProfileState::Connected);
    }

    pub fn notify(&self, handle: ConnectionHandle, characteristic: &Characteristic, value: &[u8]) {
        let callback = self.callback(handle);
        callback.on_characteristic_changed(handle, characteristic, value);
    }
}

impl GattPlatform for MockPlatform {
    fn open_connection(
        &self,
        _device: &DeviceId,
        callback: GattCallback,
    ) -> Result<ConnectionHandle, NativeError> {
        let mut state = self.state.lock().unwrap();
        if state.connect == ConnectBehavior::Refuse {
            return Err(NativeError::NullHandle);
        }
        let handle = ConnectionHandle(state.next_handle);
        state.next_handle += 1;
        state.callbacks.insert(handle, callback.clone());
        state.open.push(handle);
        match state.connect {
            ConnectBehavior::Succeed => {
                state.connected.push(handle);
                Self::later(state.answer_delay, move || {
                    callback.on_connection_state_change(handle, 0, ProfileState::Connected)
                });
            }
            ConnectBehavior::Fail(status) => {
                Self::later(state.answer_delay, move || {
                    callback.on_connection_state_change(handle, status, ProfileState::Disconnected)
                });
            }
            ConnectBehavior::Silent | ConnectBehavior::Refuse => (),
        }
        Ok(handle)
    }

    fn close_connection(&self, handle: ConnectionHandle) {
        let mut state = self.state.lock().unwrap();
        state.open.retain(|h| *h != handle);
        state.connected.retain(|h| *h != handle);
        state.closed.push(handle);
    }

    fn is_link_connected(&self, handle: ConnectionHandle) -> bool {
        self.state.lock().unwrap().connected.contains(&handle)
    }

    fn disconnect(&self, handle: ConnectionHandle) -> Result<(), NativeError> {
        let mut state = self.state.lock().unwrap();
        state.connected.retain(|h| *h != handle);
        if state.answer_disconnect {
            let callback = state.callbacks[&handle].clone();
            Self::later(state.answer_delay, move || {
                callback.on_connection_state_change(handle, 0, ProfileState::Disconnected)
            });
        }
        Ok(())
    }

    fn discover_services(&self, handle: ConnectionHandle) -> Result<(), NativeError> {
        let state = self.state.lock().unwrap();
        if let Some(status) = state.discovery_status {
            let callback = state.callbacks[&handle].clone();
            Self::later(state.answer_delay, move || {
                callback.on_services_discovered(handle, status)
            });
        }
        Ok(())
    }

    fn services(&self, _handle: ConnectionHandle) -> Result<Vec<Service>, NativeError> {
        Ok(self.state.lock().unwrap().services.clone())
    }

    fn set_characteristic_notification(
        &self,
        _handle: ConnectionHandle,
        characteristic: &Characteristic,
        enable: bool,
    ) -> Result<(), NativeError> {
        let mut state = self.state.lock().unwrap();
        if enable {
            state.notifications_enabled.push(characteristic.clone());
        } else {
            state.notifications_enabled.retain(|ch| ch != characteristic);
        }
        Ok(())
    }

    fn write_descriptor(
        &self,
        handle: ConnectionHandle,
        descriptor: &Descriptor,
        value: &[u8],
    ) -> Result<(), NativeError> {
        let mut state = self.state.lock().unwrap();
        state.descriptor_writes.push((descriptor.clone(), value.to_vec()));
        if let Some(status) = state.descriptor_status {
            let callback = state.callbacks[&handle].clone();
            let descriptor = descriptor.clone();
            Self::later(state.answer_delay, move || {
                callback.on_descriptor_write(handle, &descriptor, status)
            });
        }
        Ok(())
    }

    fn write_characteristic(
        &self,
        _handle: ConnectionHandle,
        characteristic: &Characteristic,
        value: &[u8],
        write_type: WriteType,
    ) -> Result<(), NativeError> {
        self.state
            .lock()
            .unwrap()
            .writes
            .push((characteristic.clone(), value.to_vec(), write_type));
        Ok(())
    }

    fn read_characteristic(
        &self,
        _handle: ConnectionHandle,
        characteristic: &Characteristic,
    ) -> Result<(), NativeError> {
        self.state.lock().unwrap().reads.push(characteristic.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct CountingListener {
    count: AtomicUsize,
}

impl CountingListener {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl BleManagerListener for CountingListener {
    fn on_unsolicited_disconnect(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}
