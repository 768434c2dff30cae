//! Defines error types.

use std::fmt::Debug;

use super::types::ConnectionHandle;

/// Flat error code space shared with the callers of this library.
///
/// Numeric values are stable; anything outside the known set maps to [ErrorCode::Unknown].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorCode {
    /// Dummy value for all unknown cases
    Unknown,
    /// No error
    Ok,
    /// Generic error
    Generic,
    /// Allocation error
    Alloc,
    /// System error
    System,
    /// Bad parameter error
    BadParameter,
    /// File error
    File,
    /// MD5 hash error
    Md5,
    /// BLE connection generic error
    BleConnection,
    /// BLE is not connected
    BleNotConnected,
    /// BLE disconnection error
    BleDisconnection,
    /// BLE network services discovering error
    BleServicesDiscovering,
    /// BLE network characteristics discovering error
    BleCharacteristicsDiscovering,
    /// BLE network characteristic configuring error
    BleCharacteristicConfiguring,
    /// BLE stack generic error
    BleStack,
    /// BLE timeout
    BleTimeout,
    /// BLE no data
    BleNoData,
}

impl ErrorCode {
    const KNOWN: [ErrorCode; 16] = [
        ErrorCode::Ok,
        ErrorCode::Generic,
        ErrorCode::Alloc,
        ErrorCode::System,
        ErrorCode::BadParameter,
        ErrorCode::File,
        ErrorCode::Md5,
        ErrorCode::BleConnection,
        ErrorCode::BleNotConnected,
        ErrorCode::BleDisconnection,
        ErrorCode::BleServicesDiscovering,
        ErrorCode::BleCharacteristicsDiscovering,
        ErrorCode::BleCharacteristicConfiguring,
        ErrorCode::BleStack,
        ErrorCode::BleTimeout,
        ErrorCode::BleNoData,
    ];

    /// Returns the numeric value of this code.
    pub const fn value(self) -> i32 {
        match self {
            Self::Unknown => i32::MIN,
            Self::Ok => 0,
            Self::Generic => -1000,
            Self::Alloc => -999,
            Self::System => -998,
            Self::BadParameter => -997,
            Self::File => -996,
            Self::Md5 => -2000,
            Self::BleConnection => -5000,
            Self::BleNotConnected => -4999,
            Self::BleDisconnection => -4998,
            Self::BleServicesDiscovering => -4997,
            Self::BleCharacteristicsDiscovering => -4996,
            Self::BleCharacteristicConfiguring => -4995,
            Self::BleStack => -4994,
            Self::BleTimeout => -4993,
            Self::BleNoData => -4992,
        }
    }

    /// Converts a numeric value back to the code; unmapped values give [ErrorCode::Unknown].
    pub fn from_value(value: i32) -> Self {
        Self::KNOWN
            .into_iter()
            .find(|code| code.value() == value)
            .unwrap_or(Self::Unknown)
    }

    /// Flattens the result of an operation into its code.
    pub fn from_result<T>(result: &Result<T, Error>) -> Self {
        match result {
            Ok(_) => Self::Ok,
            Err(e) => e.code(),
        }
    }

    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }

    /// Human readable description of the code.
    pub const fn message(self) -> &'static str {
        match self {
            Self::Unknown => "Dummy value for all unknown cases",
            Self::Ok => "No error",
            Self::Generic => "ARSAL Generic error",
            Self::Alloc => "ARSAL alloc error",
            Self::System => "ARSAL system error",
            Self::BadParameter => "ARSAL bad parameter error",
            Self::File => "ARSAL file error",
            Self::Md5 => "ARSAL md5 error",
            Self::BleConnection => "BLE connection generic error",
            Self::BleNotConnected => "BLE is not connected",
            Self::BleDisconnection => "BLE disconnection error",
            Self::BleServicesDiscovering => "BLE network services discovering error",
            Self::BleCharacteristicsDiscovering => "BLE network characteristics discovering error",
            Self::BleCharacteristicConfiguring => "BLE network characteristic configuring error",
            Self::BleStack => "BLE stack generic error",
            Self::BleTimeout => "BLE timeout",
            Self::BleNoData => "BLE no data",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

impl From<i32> for ErrorCode {
    fn from(value: i32) -> Self {
        Self::from_value(value)
    }
}

impl From<ErrorCode> for i32 {
    fn from(code: ErrorCode) -> Self {
        code.value()
    }
}

/// Status code passed by the platform stack to its GATT callbacks.
///
/// See <https://developer.android.com/reference/android/bluetooth/BluetoothGatt> and
/// `stack/include/gatt_api.h` of the Bluedroid stack for the raw values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GattStatus {
    Success,
    Failure,
    /// `GATT_INTERNAL_ERROR` (133), usually a failed connection attempt worth retrying.
    InternalError,
    /// `GATT_CONN_TIMEOUT` (8), raised when the link is lost (e.g. the peripheral is powered off).
    Interrupted,
    /// `GATT_CONN_FAIL_ESTABLISH` (62).
    ConnFailEstablish,
    Other(i32),
}

impl GattStatus {
    pub const SUCCESS: i32 = 0;
    pub const INTERRUPTED: i32 = 8;
    pub const CONN_FAIL_ESTABLISH: i32 = 62;
    pub const INTERNAL_ERROR: i32 = 133;
    pub const FAILURE: i32 = 257;

    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl From<i32> for GattStatus {
    fn from(raw: i32) -> Self {
        match raw {
            Self::SUCCESS => Self::Success,
            Self::FAILURE => Self::Failure,
            Self::INTERNAL_ERROR => Self::InternalError,
            Self::INTERRUPTED => Self::Interrupted,
            Self::CONN_FAIL_ESTABLISH => Self::ConnFailEstablish,
            _ => Self::Other(raw),
        }
    }
}

impl std::fmt::Display for GattStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => f.write_str("GATT_SUCCESS"),
            Self::Failure => f.write_str("GATT_FAILURE"),
            Self::InternalError => f.write_str("GATT_INTERNAL_ERROR (133)"),
            Self::Interrupted => f.write_str("GATT_CONN_TIMEOUT (8)"),
            Self::ConnFailEstablish => f.write_str("GATT_CONN_FAIL_ESTABLISH (62)"),
            Self::Other(code) => write!(f, "unknown GATT status {code}"),
        }
    }
}

/// Failure reported by the platform stack when a request could not be issued.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NativeError {
    /// The platform refused the request (the Android API returned `false`).
    CallRejected,
    /// The platform returned no connection object.
    NullHandle,
    /// The handle does not refer to an open connection on the platform side.
    InvalidHandle(ConnectionHandle),
    /// The platform reported a non-success status synchronously.
    Status(GattStatus),
    /// Any other platform specific failure.
    Platform(String),
}

impl std::error::Error for NativeError {}

impl std::fmt::Display for NativeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CallRejected => f.write_str("platform call unexpectedly returned false"),
            Self::NullHandle => f.write_str("platform call unexpectedly returned null"),
            Self::InvalidHandle(handle) => write!(f, "invalid connection handle {handle}"),
            Self::Status(st) => write!(f, "{st}"),
            Self::Platform(msg) => write!(f, "platform error: {msg}"),
        }
    }
}

/// The error type for BLE manager operations.
#[derive(Clone, Debug)]
pub struct Error {
    code: ErrorCode,
    source: Option<NativeError>,
    message: String,
}

impl Error {
    pub(crate) fn new<S: ToString>(code: ErrorCode, source: Option<NativeError>, message: S) -> Self {
        Error {
            code,
            source,
            message: message.to_string(),
        }
    }

    /// Returns the corresponding [`ErrorCode`] for this error.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Returns the message for this error.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Wraps a platform failure under the error code of the operation that issued it.
    pub(crate) fn native(code: ErrorCode, err: NativeError) -> Self {
        let msg = err.to_string();
        Error::new(code, Some(err), msg)
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}

impl Eq for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", &self.code)
        } else {
            write!(f, "{}: {}", &self.code, &self.message)
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|x| {
            let x: &(dyn std::error::Error + 'static) = x;
            x
        })
    }
}

impl From<ErrorCode> for Error {
    fn from(code: ErrorCode) -> Self {
        Error {
            code,
            source: None,
            message: String::new(),
        }
    }
}

impl From<NativeError> for Error {
    fn from(err: NativeError) -> Self {
        let code = match &err {
            NativeError::CallRejected | NativeError::Status(_) | NativeError::Platform(_) => {
                ErrorCode::BleStack
            }
            NativeError::NullHandle | NativeError::InvalidHandle(_) => ErrorCode::BleNotConnected,
        };
        Error::native(code, err)
    }
}
