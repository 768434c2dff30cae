use uuid::Uuid;

use super::descriptor::{Descriptor, CLIENT_CHARACTERISTIC_CONFIGURATION};

/// A Bluetooth GATT characteristic, as discovered on the remote device.
///
/// Two characteristics are equal when they belong to the same service and have the
/// same type [Uuid]; the descriptor list does not take part in the identity.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Characteristic {
    service_id: Uuid,
    char_id: Uuid,
    desc_ids: Vec<Uuid>,
}

impl PartialEq for Characteristic {
    fn eq(&self, other: &Self) -> bool {
        self.service_id == other.service_id && self.char_id == other.char_id
    }
}

impl Eq for Characteristic {}

impl std::hash::Hash for Characteristic {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.service_id.hash(state);
        self.char_id.hash(state);
    }
}

impl Characteristic {
    pub fn new(service_id: Uuid, char_id: Uuid) -> Self {
        Self {
            service_id,
            char_id,
            desc_ids: Vec::new(),
        }
    }

    /// Attaches the descriptors reported by the platform for this characteristic.
    pub fn with_descriptors(mut self, desc_ids: impl IntoIterator<Item = Uuid>) -> Self {
        self.desc_ids = desc_ids.into_iter().collect();
        self
    }

    /// The [Uuid] identifying the type of this GATT characteristic.
    pub fn uuid(&self) -> Uuid {
        self.char_id
    }

    /// The [Uuid] of the service owning this characteristic.
    pub fn service_uuid(&self) -> Uuid {
        self.service_id
    }

    /// Get previously discovered descriptors.
    pub fn descriptors(&self) -> Vec<Descriptor> {
        self.desc_ids
            .iter()
            .map(|id| Descriptor::new(self.service_id, self.char_id, *id))
            .collect()
    }

    /// Returns the descriptor with the given [Uuid], if the characteristic has one.
    pub fn descriptor(&self, desc_id: Uuid) -> Option<Descriptor> {
        self.desc_ids
            .contains(&desc_id)
            .then(|| Descriptor::new(self.service_id, self.char_id, desc_id))
    }

    /// Returns the Client Characteristic Configuration Descriptor of this characteristic.
    pub fn notification_descriptor(&self) -> Option<Descriptor> {
        self.descriptor(CLIENT_CHARACTERISTIC_CONFIGURATION)
    }
}
