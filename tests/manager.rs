mod common;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use arsal_ble::{BleManager, DeviceId, ErrorCode, LinkState, ManagerConfig, WriteType};
use futures_lite::future::block_on;

use common::*;

fn device() -> DeviceId {
    DeviceId::new("A0:14:3D:00:00:01")
}

fn connected(mock: &Arc<MockPlatform>, config: ManagerConfig) -> BleManager {
    init_logger();
    let manager = mock.manager(config);
    block_on(manager.connect(&device())).unwrap();
    manager
}

#[test]
fn connect_then_disconnect() {
    let mock = MockPlatform::new();
    let manager = connected(&mock, fast_config());
    assert!(manager.is_connected());
    assert_eq!(manager.link_state(), LinkState::Connected);
    assert_eq!(manager.device(), Some(device()));

    let listener = Arc::new(CountingListener::default());
    manager.set_listener(listener.clone());
    let handle = mock.last_handle();
    block_on(manager.disconnect());
    assert!(!manager.is_connected());
    assert_eq!(manager.link_state(), LinkState::Disconnected);
    assert!(mock.closed_handles().contains(&handle));
    assert_eq!(listener.count(), 0);
}

#[test]
fn reconnect_keeps_one_connection_object() {
    let mock = MockPlatform::new();
    let manager = connected(&mock, fast_config());
    let first = mock.last_handle();

    block_on(manager.connect(&DeviceId::new("A0:14:3D:00:00:02"))).unwrap();
    let second = mock.last_handle();
    assert_ne!(first, second);
    assert!(mock.closed_handles().contains(&first));
    assert_eq!(mock.open_handles(), vec![second]);
    assert!(manager.is_connected());
}

#[test]
fn connect_times_out() {
    init_logger();
    let mock = MockPlatform::new();
    mock.set_connect(ConnectBehavior::Silent);
    let manager = mock.manager(fast_config());

    let start = Instant::now();
    let err = block_on(manager.connect(&device())).unwrap_err();
    let elapsed = start.elapsed();
    assert_eq!(err.code(), ErrorCode::BleNotConnected);
    assert!(elapsed >= Duration::from_millis(300));
    assert!(elapsed < Duration::from_secs(3));
    assert!(!manager.is_connected());
    assert!(mock.open_handles().is_empty());
}

#[test]
fn refused_connection_fails_immediately() {
    init_logger();
    let mock = MockPlatform::new();
    mock.set_connect(ConnectBehavior::Refuse);
    let manager = mock.manager(ManagerConfig::default());

    let start = Instant::now();
    let err = block_on(manager.connect(&device())).unwrap_err();
    assert_eq!(err.code(), ErrorCode::BleNotConnected);
    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(manager.link_state(), LinkState::Disconnected);
}

#[test]
fn failed_connection_reports_status() {
    init_logger();
    let mock = MockPlatform::new();
    mock.set_connect(ConnectBehavior::Fail(133));
    let manager = mock.manager(fast_config());

    let err = block_on(manager.connect(&device())).unwrap_err();
    assert_eq!(err.code(), ErrorCode::BleConnection);
    assert!(!manager.is_connected());
    assert!(mock.open_handles().is_empty());
}

#[test]
fn late_connection_of_stale_object_is_closed() {
    init_logger();
    let mock = MockPlatform::new();
    mock.set_connect(ConnectBehavior::Silent);
    let manager = mock.manager(fast_config());
    assert!(block_on(manager.connect(&device())).is_err());
    let stale = mock.last_handle();

    mock.report_connected(stale);
    thread::sleep(Duration::from_millis(100));
    assert!(!manager.is_connected());
    let closes = mock.closed_handles().iter().filter(|h| **h == stale).count();
    assert_eq!(closes, 2);
}

#[test]
fn discover_services_and_list_them() {
    let mock = MockPlatform::new();
    let manager = connected(&mock, fast_config());

    block_on(manager.discover_services()).unwrap();
    let services = manager.services().unwrap();
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].uuid(), SERVICE);
    assert_eq!(services[0].characteristics_with_uuid(NOTIFY_CHAR).len(), 1);
}

#[test]
fn failed_discovery_reports_status() {
    let mock = MockPlatform::new();
    mock.set_discovery_status(Some(129));
    let manager = connected(&mock, fast_config());

    let err = block_on(manager.discover_services()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::BleServicesDiscovering);
}

#[test]
fn requests_fail_when_not_connected() {
    init_logger();
    let mock = MockPlatform::new();
    let manager = mock.manager(fast_config());

    let err = block_on(manager.discover_services()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::BleNotConnected);
    let err = block_on(manager.configure_notification(&notify_char())).unwrap_err();
    assert_eq!(err.code(), ErrorCode::BleNotConnected);
    assert_eq!(manager.services().unwrap_err().code(), ErrorCode::BleNotConnected);
    assert!(!manager.write(&[1, 2], &write_char()));
    assert!(!manager.read(&write_char()));
    // nothing to do
    block_on(manager.disconnect());
}

#[test]
fn unsolicited_disconnection_aborts_discovery() {
    let mock = MockPlatform::new();
    mock.set_discovery_status(None);
    let manager = connected(&mock, fast_config());
    let listener = Arc::new(CountingListener::default());
    manager.set_listener(listener.clone());

    let handle = mock.last_handle();
    let peripheral = mock.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        peripheral.drop_link(handle);
    });

    let err = block_on(manager.discover_services()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::BleNotConnected);
    assert!(!manager.is_connected());
    assert!(mock.closed_handles().contains(&handle));
    // the listener runs on the event thread after the waiters are released
    thread::sleep(Duration::from_millis(50));
    assert_eq!(listener.count(), 1);
}

#[test]
fn unconfirmed_disconnection_is_torn_down() {
    let mock = MockPlatform::new();
    mock.set_answer_disconnect(false);
    let manager = connected(&mock, fast_config());
    let listener = Arc::new(CountingListener::default());
    manager.set_listener(listener.clone());
    let handle = mock.last_handle();

    let start = Instant::now();
    block_on(manager.disconnect());
    assert!(start.elapsed() >= Duration::from_millis(300));
    assert!(!manager.is_connected());
    assert!(mock.closed_handles().contains(&handle));
    assert_eq!(listener.count(), 0);
}

#[test]
fn configure_notification_writes_descriptor() {
    let mock = MockPlatform::new();
    let manager = connected(&mock, fast_config());

    block_on(manager.configure_notification(&notify_char())).unwrap();
    assert_eq!(mock.notifications_enabled(), vec![notify_char()]);
    let writes = mock.descriptor_writes();
    assert_eq!(writes.len(), 1);
    assert!(writes[0].0.is_notification_config());
    assert_eq!(writes[0].1, vec![1, 0]);
}

#[test]
fn configure_notification_failures() {
    let mock = MockPlatform::new();
    let manager = connected(&mock, fast_config());

    let err = block_on(manager.configure_notification(&write_char())).unwrap_err();
    assert_eq!(err.code(), ErrorCode::BleCharacteristicConfiguring);
    assert!(mock.descriptor_writes().is_empty());

    mock.set_descriptor_status(Some(257));
    let err = block_on(manager.configure_notification(&notify_char())).unwrap_err();
    assert_eq!(err.code(), ErrorCode::BleCharacteristicConfiguring);
    // the manager is still usable afterwards
    assert!(manager.is_connected());
}

#[test]
fn configuration_timeout_is_reported() {
    let mock = MockPlatform::new();
    mock.set_descriptor_status(None);
    let config = fast_config().with_configuration_timeout(Some(Duration::from_millis(100)));
    let manager = connected(&mock, config);

    let err = block_on(manager.configure_notification(&notify_char())).unwrap_err();
    assert_eq!(err.code(), ErrorCode::BleTimeout);
}

#[test]
fn late_discovery_answer_is_not_taken_for_the_next_one() {
    let mock = MockPlatform::new();
    let config = fast_config().with_discovery_timeout(Some(Duration::from_millis(200)));
    let manager = connected(&mock, config);

    mock.set_discovery_status(Some(129));
    mock.set_answer_delay(Duration::from_millis(300));
    let err = block_on(manager.discover_services()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::BleTimeout);

    // the failed answer of the first discovery arrives while the second one waits
    mock.set_discovery_status(Some(0));
    mock.set_answer_delay(Duration::from_millis(150));
    block_on(manager.discover_services()).unwrap();
}

#[test]
fn late_configuration_answer_is_dropped() {
    let mock = MockPlatform::new();
    let config = fast_config().with_configuration_timeout(Some(Duration::from_millis(100)));
    let manager = connected(&mock, config);

    mock.set_descriptor_status(Some(257));
    mock.set_answer_delay(Duration::from_millis(150));
    let err = block_on(manager.configure_notification(&notify_char())).unwrap_err();
    assert_eq!(err.code(), ErrorCode::BleTimeout);
    thread::sleep(Duration::from_millis(150));

    mock.set_descriptor_status(Some(0));
    mock.set_answer_delay(Duration::from_millis(10));
    block_on(manager.configure_notification(&notify_char())).unwrap();
}

#[test]
fn unlock_releases_blocked_configuration() {
    let mock = MockPlatform::new();
    mock.set_descriptor_status(None);
    let manager = Arc::new(connected(&mock, fast_config()));

    let unlocker = manager.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        unlocker.unlock();
    });
    let start = Instant::now();
    let err = block_on(manager.configure_notification(&notify_char())).unwrap_err();
    assert_eq!(err.code(), ErrorCode::BleNotConnected);
    assert!(start.elapsed() < Duration::from_secs(2));
    assert!(manager.is_connected());
}

#[test]
fn unsolicited_disconnection_aborts_configuration() {
    let mock = MockPlatform::new();
    mock.set_descriptor_status(None);
    let manager = connected(&mock, fast_config());
    let listener = Arc::new(CountingListener::default());
    manager.set_listener(listener.clone());

    let handle = mock.last_handle();
    let peripheral = mock.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        peripheral.drop_link(handle);
    });

    let err = block_on(manager.configure_notification(&notify_char())).unwrap_err();
    assert_eq!(err.code(), ErrorCode::BleNotConnected);
    assert!(!manager.is_connected());
    thread::sleep(Duration::from_millis(50));
    assert_eq!(listener.count(), 1);
}

#[test]
fn unlock_releases_blocked_requests() {
    let mock = MockPlatform::new();
    mock.set_discovery_status(None);
    let manager = Arc::new(connected(&mock, fast_config()));

    let unlocker = manager.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        unlocker.unlock();
    });
    let start = Instant::now();
    let err = block_on(manager.discover_services()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::BleNotConnected);
    assert!(start.elapsed() < Duration::from_secs(2));
    // the link itself is untouched
    assert!(manager.is_connected());
}

#[test]
fn unlock_releases_blocked_connect() {
    init_logger();
    let mock = MockPlatform::new();
    mock.set_connect(ConnectBehavior::Silent);
    let manager = Arc::new(mock.manager(ManagerConfig::default()));

    let unlocker = manager.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        unlocker.unlock();
    });
    let start = Instant::now();
    let err = block_on(manager.connect(&device())).unwrap_err();
    assert_eq!(err.code(), ErrorCode::BleNotConnected);
    assert!(start.elapsed() < Duration::from_secs(2));
    assert!(mock.open_handles().is_empty());
}

#[test]
fn write_and_read_go_to_the_platform() {
    let mock = MockPlatform::new();
    let manager = connected(&mock, fast_config());

    assert!(manager.write(&[0x04, 0x01], &write_char()));
    assert!(manager.read(&notify_char()));
    assert_eq!(
        mock.writes(),
        vec![(write_char(), vec![0x04, 0x01], WriteType::WithoutResponse)]
    );
    assert_eq!(mock.reads(), vec![notify_char()]);
}

#[test]
fn drop_closes_the_connection() {
    let mock = MockPlatform::new();
    let manager = connected(&mock, fast_config());
    let handle = mock.last_handle();
    drop(manager);
    assert!(mock.closed_handles().contains(&handle));
    assert!(mock.open_handles().is_empty());
}
