use uuid::{uuid, Uuid};

/// Client Characteristic Configuration Descriptor, which enables notifications
/// or indications of its characteristic.
pub const CLIENT_CHARACTERISTIC_CONFIGURATION: Uuid =
    uuid!("00002902-0000-1000-8000-00805f9b34fb");

/// Value written to [CLIENT_CHARACTERISTIC_CONFIGURATION] to enable notifications.
pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];

/// Value written to [CLIENT_CHARACTERISTIC_CONFIGURATION] to disable notifications.
pub const DISABLE_NOTIFICATION_VALUE: [u8; 2] = [0x00, 0x00];

/// A Bluetooth GATT descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Descriptor {
    service_id: Uuid,
    char_id: Uuid,
    desc_id: Uuid,
}

impl Descriptor {
    pub fn new(service_id: Uuid, char_id: Uuid, desc_id: Uuid) -> Self {
        Self {
            service_id,
            char_id,
            desc_id,
        }
    }

    /// The [Uuid] identifying the type of this GATT descriptor.
    pub fn uuid(&self) -> Uuid {
        self.desc_id
    }

    /// The [Uuid] of the characteristic owning this descriptor.
    pub fn characteristic_uuid(&self) -> Uuid {
        self.char_id
    }

    /// The [Uuid] of the service owning the characteristic.
    pub fn service_uuid(&self) -> Uuid {
        self.service_id
    }

    /// Whether this is the descriptor controlling notifications of its characteristic.
    pub fn is_notification_config(&self) -> bool {
        self.desc_id == CLIENT_CHARACTERISTIC_CONFIGURATION
    }
}
