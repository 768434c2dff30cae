use uuid::Uuid;

use super::characteristic::Characteristic;

/// A Bluetooth GATT service.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Service {
    service_id: Uuid,
    is_primary: bool,
    chars: Vec<Characteristic>,
}

impl PartialEq for Service {
    fn eq(&self, other: &Self) -> bool {
        self.service_id == other.service_id
    }
}

impl Eq for Service {}

impl std::hash::Hash for Service {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.service_id.hash(state);
    }
}

impl Service {
    pub fn new(
        service_id: Uuid,
        is_primary: bool,
        chars: impl IntoIterator<Item = Characteristic>,
    ) -> Self {
        Self {
            service_id,
            is_primary,
            chars: chars.into_iter().collect(),
        }
    }

    /// The [Uuid] identifying the type of this GATT service.
    pub fn uuid(&self) -> Uuid {
        self.service_id
    }

    /// Whether this is a primary service of the device.
    pub fn is_primary(&self) -> bool {
        self.is_primary
    }

    /// Get previously discovered characteristics.
    pub fn characteristics(&self) -> &[Characteristic] {
        &self.chars
    }

    /// Returns the characteristic(s) with the given [Uuid].
    pub fn characteristics_with_uuid(&self, uuid: Uuid) -> Vec<Characteristic> {
        self.chars
            .iter()
            .filter(|ch| ch.uuid() == uuid)
            .cloned()
            .collect()
    }
}
