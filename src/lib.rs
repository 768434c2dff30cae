//! BLE GATT client connection manager.
//!
//! The host platform BLE stack reports the outcome of its requests through asynchronous
//! callbacks. [BleManager] turns them back into request/response calls: each request is
//! issued to the [GattPlatform], then waits until the platform reports the outcome to the
//! [GattCallback] (or a timeout elapses). Characteristic notifications are queued per
//! caller-chosen key and read back with [BleManager::drain_notifications].
//!
//! ```ignore
//! let manager = BleManager::new(platform, ManagerConfig::default())?;
//! block_on(manager.connect(&DeviceId::new("A0:14:3D:00:00:01")))?;
//! block_on(manager.discover_services())?;
//! ```

pub use callback::GattCallback;
pub use characteristic::Characteristic;
pub use config::ManagerConfig;
pub use descriptor::{
    Descriptor, CLIENT_CHARACTERISTIC_CONFIGURATION, DISABLE_NOTIFICATION_VALUE,
    ENABLE_NOTIFICATION_VALUE,
};
pub use error::{Error, ErrorCode, GattStatus, NativeError};
pub use manager::{BleManager, BleManagerListener};
pub use notification::{NotificationData, NotificationRegistry};
pub use platform::GattPlatform;
pub use service::Service;
pub use types::*;

/// Convenience alias for a result with [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

pub use uuid::Uuid;
pub mod error;
mod types;

mod async_util;
mod callback;
mod characteristic;
mod config;
mod descriptor;
mod event_receiver;
mod manager;
mod notification;
mod platform;
mod service;
mod session;
mod util;
