//! Contract consumed from the host platform BLE stack.

use super::callback::GattCallback;
use super::characteristic::Characteristic;
use super::descriptor::Descriptor;
use super::error::NativeError;
use super::service::Service;
use super::types::{ConnectionHandle, DeviceId, WriteType};

/// Non-blocking GATT client calls of the host platform (`BluetoothGatt` on Android).
///
/// Each request returns as soon as it is issued; its outcome, if any, is reported later
/// through the [GattCallback] passed to [GattPlatform::open_connection]. An `Err` means
/// the request could not be issued at all.
pub trait GattPlatform: Send + Sync {
    /// Opens a connection object for the device and starts connecting
    /// (`BluetoothDevice.connectGatt`). Connection state changes of the returned handle
    /// are reported to `callback`.
    fn open_connection(
        &self,
        device: &DeviceId,
        callback: GattCallback,
    ) -> Result<ConnectionHandle, NativeError>;

    /// Releases the connection object (`BluetoothGatt.close`). No more callbacks are
    /// expected for the handle afterwards.
    ///
    /// May be called more than once for the same handle; extra calls must be no-ops.
    fn close_connection(&self, handle: ConnectionHandle);

    /// Whether the platform currently considers the link of `handle` connected
    /// (`BluetoothManager.getConnectionState`).
    fn is_link_connected(&self, handle: ConnectionHandle) -> bool;

    /// Requests disconnection (`BluetoothGatt.disconnect`).
    fn disconnect(&self, handle: ConnectionHandle) -> Result<(), NativeError>;

    /// Starts service discovery (`BluetoothGatt.discoverServices`).
    fn discover_services(&self, handle: ConnectionHandle) -> Result<(), NativeError>;

    /// Services found by the last completed discovery (`BluetoothGatt.getServices`).
    fn services(&self, handle: ConnectionHandle) -> Result<Vec<Service>, NativeError>;

    /// Enables or disables local delivery of notifications for the characteristic
    /// (`BluetoothGatt.setCharacteristicNotification`).
    fn set_characteristic_notification(
        &self,
        handle: ConnectionHandle,
        characteristic: &Characteristic,
        enable: bool,
    ) -> Result<(), NativeError>;

    /// Starts a descriptor write (`BluetoothGatt.writeDescriptor`).
    fn write_descriptor(
        &self,
        handle: ConnectionHandle,
        descriptor: &Descriptor,
        value: &[u8],
    ) -> Result<(), NativeError>;

    /// Starts a characteristic write (`BluetoothGatt.writeCharacteristic`).
    fn write_characteristic(
        &self,
        handle: ConnectionHandle,
        characteristic: &Characteristic,
        value: &[u8],
        write_type: WriteType,
    ) -> Result<(), NativeError>;

    /// Starts a characteristic read (`BluetoothGatt.readCharacteristic`).
    fn read_characteristic(
        &self,
        handle: ConnectionHandle,
        characteristic: &Characteristic,
    ) -> Result<(), NativeError>;
}
