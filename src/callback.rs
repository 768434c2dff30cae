//! The handle through which the platform stack reports GATT events.

use async_channel::{Receiver, Sender};
use log::{trace, warn};

use super::characteristic::Characteristic;
use super::descriptor::Descriptor;
use super::error::GattStatus;
use super::types::{ConnectionHandle, ProfileState};

/// Event reported by the platform stack, queued for the manager's event thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum GattEvent {
    ConnectionStateChanged {
        handle: ConnectionHandle,
        status: GattStatus,
        new_state: ProfileState,
    },
    ServicesDiscovered {
        handle: ConnectionHandle,
        status: GattStatus,
    },
    DescriptorWritten {
        handle: ConnectionHandle,
        descriptor: Descriptor,
        status: GattStatus,
    },
    CharacteristicChanged {
        handle: ConnectionHandle,
        characteristic: Characteristic,
        value: Vec<u8>,
    },
}

/// Callback handle given to [crate::GattPlatform::open_connection].
///
/// The platform implementation calls these methods from whatever thread its stack
/// delivers events on (the `BluetoothGattCallback` binder thread on Android). Every
/// method only queues the event and returns immediately; the manager processes the
/// queue on its own thread. Calls made after the manager is dropped are ignored.
#[derive(Debug, Clone)]
pub struct GattCallback {
    sender: Sender<GattEvent>,
}

impl GattCallback {
    pub(crate) fn channel() -> (Self, Receiver<GattEvent>) {
        let (sender, receiver) = async_channel::unbounded();
        (Self { sender }, receiver)
    }

    /// `BluetoothGattCallback.onConnectionStateChange`.
    pub fn on_connection_state_change(
        &self,
        handle: ConnectionHandle,
        status: i32,
        new_state: ProfileState,
    ) {
        self.send(GattEvent::ConnectionStateChanged {
            handle,
            status: status.into(),
            new_state,
        });
    }

    /// `BluetoothGattCallback.onServicesDiscovered`.
    pub fn on_services_discovered(&self, handle: ConnectionHandle, status: i32) {
        self.send(GattEvent::ServicesDiscovered {
            handle,
            status: status.into(),
        });
    }

    /// `BluetoothGattCallback.onDescriptorWrite`.
    pub fn on_descriptor_write(&self, handle: ConnectionHandle, descriptor: &Descriptor, status: i32) {
        self.send(GattEvent::DescriptorWritten {
            handle,
            descriptor: descriptor.clone(),
            status: status.into(),
        });
    }

    /// `BluetoothGattCallback.onCharacteristicChanged`.
    ///
    /// `value` is copied, so the platform buffer may be reused as soon as this returns.
    pub fn on_characteristic_changed(
        &self,
        handle: ConnectionHandle,
        characteristic: &Characteristic,
        value: &[u8],
    ) {
        self.send(GattEvent::CharacteristicChanged {
            handle,
            characteristic: characteristic.clone(),
            value: value.to_vec(),
        });
    }

    /// Checks if the manager owning this callback is still alive.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    pub(crate) fn close(&self) {
        self.sender.close();
    }

    fn send(&self, event: GattEvent) {
        trace!("queueing {event:?}");
        if self.sender.try_send(event).is_err() && !self.sender.is_closed() {
            warn!("GATT event queue refused an event");
        }
    }
}
