/// Identifies a remote BLE peripheral (on Android, its hardware address).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceId(pub(crate) String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Opaque token for a platform connection object (`BluetoothGatt` on Android).
///
/// Issued by [crate::GattPlatform::open_connection] and echoed back in every callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionHandle(pub u64);

impl std::fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Connection state of a GATT profile as reported by the platform.
///
/// See <https://developer.android.com/reference/android/bluetooth/BluetoothProfile#STATE_CONNECTED>.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl ProfileState {
    /// Converts the raw `BluetoothProfile.STATE_*` value.
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Disconnected),
            1 => Some(Self::Connecting),
            2 => Some(Self::Connected),
            3 => Some(Self::Disconnecting),
            _ => None,
        }
    }
}

/// Lifecycle of the managed link, driven by requests and platform events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LinkState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// Write type of a characteristic write request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteType {
    WithResponse,
    WithoutResponse,
}
