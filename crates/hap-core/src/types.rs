//! HAP protocol enumerations and constants.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Suffix shared by every Apple-defined service and characteristic UUID.
pub const BASE_UUID: &str = "-0000-1000-8000-0026BB765291";

/// Accessory id of a standalone accessory and of the bridge itself.
pub const STANDALONE_AID: u64 = 1;

/// Default TCP port of the accessory server.
pub const DEFAULT_PORT: u16 = 51827;

pub const HAP_PROTOCOL_VERSION: &str = "01.01.00";
pub const HAP_PROTOCOL_SHORT_VERSION: &str = "1.1";

pub const DEFAULT_MANUFACTURER: &str = "HomeKit Bridge";
pub const DEFAULT_BRIDGE_MODEL: &str = "HAP Bridge";
pub const DEFAULT_DEVICE_MODEL: &str = "HAP Device";

/// Accessory category advertised in the `ci` TXT field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum AccessoryCategory {
    Other = 1,
    Bridge = 2,
    Fan = 3,
    GarageDoorOpener = 4,
    LightBulb = 5,
    DoorLock = 6,
    Outlet = 7,
    Switch = 8,
    Thermostat = 9,
    Sensor = 10,
    AlarmSystem = 11,
    Door = 12,
    Window = 13,
    WindowCovering = 14,
    ProgrammableSwitch = 15,
    RangeExtender = 16,
    Camera = 17,
    VideoDoorBell = 18,
    AirPurifier = 19,
    Heater = 20,
    AirConditioner = 21,
    Humidifier = 22,
    Dehumidifier = 23,
    Speaker = 26,
    Sprinkler = 28,
    Faucet = 29,
    ShowerHead = 30,
    Television = 31,
    TargetController = 32,
}

impl AccessoryCategory {
    pub fn value(&self) -> u8 {
        *self as u8
    }
}

impl Default for AccessoryCategory {
    fn default() -> Self {
        AccessoryCategory::Other
    }
}

/// Characteristic value formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Bool,
    Int,
    Float,
    String,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Data,
    Tlv8,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
            Self::Uint8 => "uint8",
            Self::Uint16 => "uint16",
            Self::Uint32 => "uint32",
            Self::Uint64 => "uint64",
            Self::Data => "data",
            Self::Tlv8 => "tlv8",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "bool" => Ok(Self::Bool),
            "int" => Ok(Self::Int),
            "float" => Ok(Self::Float),
            "string" => Ok(Self::String),
            "uint8" => Ok(Self::Uint8),
            "uint16" => Ok(Self::Uint16),
            "uint32" => Ok(Self::Uint32),
            "uint64" => Ok(Self::Uint64),
            "data" => Ok(Self::Data),
            "tlv8" => Ok(Self::Tlv8),
            other => Err(Error::invalid_argument(format!(
                "Unknown characteristic format: {}",
                other
            ))),
        }
    }

    /// Integer and float formats, the ones that carry numeric metadata.
    pub fn is_numeric(&self) -> bool {
        self.is_integer() || matches!(self, Self::Float)
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Self::Int | Self::Uint8 | Self::Uint16 | Self::Uint32 | Self::Uint64
        )
    }
}

/// Characteristic permission, serialized by its short wire name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    #[serde(rename = "pr")]
    Read,
    #[serde(rename = "pw")]
    Write,
    #[serde(rename = "ev")]
    Notify,
    #[serde(rename = "aa")]
    AdditionalAuthorization,
    #[serde(rename = "tw")]
    TimedWrite,
    #[serde(rename = "hd")]
    Hidden,
    #[serde(rename = "wr")]
    WriteResponse,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "pr",
            Self::Write => "pw",
            Self::Notify => "ev",
            Self::AdditionalAuthorization => "aa",
            Self::TimedWrite => "tw",
            Self::Hidden => "hd",
            Self::WriteResponse => "wr",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pr" => Ok(Self::Read),
            "pw" => Ok(Self::Write),
            "ev" => Ok(Self::Notify),
            "aa" => Ok(Self::AdditionalAuthorization),
            "tw" => Ok(Self::TimedWrite),
            "hd" => Ok(Self::Hidden),
            "wr" => Ok(Self::WriteResponse),
            other => Err(Error::invalid_argument(format!(
                "Unknown characteristic permission: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Celsius,
    Percentage,
    Arcdegrees,
    Lux,
    Seconds,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Celsius => "celsius",
            Self::Percentage => "percentage",
            Self::Arcdegrees => "arcdegrees",
            Self::Lux => "lux",
            Self::Seconds => "seconds",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "celsius" => Ok(Self::Celsius),
            "percentage" => Ok(Self::Percentage),
            "arcdegrees" => Ok(Self::Arcdegrees),
            "lux" => Ok(Self::Lux),
            "seconds" => Ok(Self::Seconds),
            other => Err(Error::invalid_argument(format!(
                "Unknown characteristic unit: {}",
                other
            ))),
        }
    }
}

/// HAP status codes returned inside JSON responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ServerStatus {
    Success = 0,
    InsufficientPrivileges = -70401,
    ServiceCommunicationFailure = -70402,
    ResourceBusy = -70403,
    ReadOnlyCharacteristic = -70404,
    WriteOnlyCharacteristic = -70405,
    NotificationNotSupported = -70406,
    OutOfResource = -70407,
    OperationTimedOut = -70408,
    ResourceDoesNotExist = -70409,
    InvalidValueInRequest = -70410,
    InsufficientAuthorization = -70411,
}

impl ServerStatus {
    pub fn code(&self) -> i32 {
        *self as i32
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Permission level of a paired controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ClientPermission {
    User = 0,
    Admin = 1,
}

impl ClientPermission {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::User),
            1 => Some(Self::Admin),
            _ => None,
        }
    }
}

/// Kind of external device property backing a characteristic.
///
/// Dynamic and variable properties are reported by the device, mapped
/// properties carry controller-side state that is pushed to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    Dynamic,
    Variable,
    Mapped,
}

impl PropertyType {
    /// Direction a value update travels in.
    pub fn update_direction(from_device: bool) -> Self {
        if from_device {
            Self::Dynamic
        } else {
            Self::Mapped
        }
    }

    /// True when this property receives updates of the given direction.
    ///
    /// Variable properties are device reported as well, so they follow the
    /// dynamic direction.
    pub fn accepts(&self, direction: PropertyType) -> bool {
        match self {
            Self::Dynamic | Self::Variable => direction != Self::Mapped,
            Self::Mapped => direction == Self::Mapped,
        }
    }
}

/// Accessory device id in MAC notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId(pub [u8; 6]);

impl DeviceId {
    /// Parse "AA:BB:CC:DD:EE:FF" or bare 12 hex characters.
    pub fn from_mac_string(s: &str) -> Result<Self> {
        let s = s.trim();

        let bytes: Vec<u8> = if s.contains(':') {
            s.split(':')
                .map(|part| {
                    u8::from_str_radix(part, 16).map_err(|_| {
                        Error::invalid_argument(format!("Invalid MAC address part: {}", part))
                    })
                })
                .collect::<Result<Vec<_>>>()?
        } else {
            if s.len() != 12 {
                return Err(Error::invalid_argument(format!(
                    "MAC address must be 12 hex characters, got {}",
                    s.len()
                )));
            }
            (0..6)
                .map(|i| {
                    let part = s.get(i * 2..i * 2 + 2).unwrap_or("");
                    u8::from_str_radix(part, 16).map_err(|_| {
                        Error::invalid_argument(format!("Invalid MAC address part: {}", part))
                    })
                })
                .collect::<Result<Vec<_>>>()?
        };

        if bytes.len() != 6 {
            return Err(Error::invalid_argument(format!(
                "MAC address must have 6 bytes, got {}",
                bytes.len()
            )));
        }

        let mut arr = [0u8; 6];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Colon-separated uppercase form used as the pairing identifier.
    pub fn to_mac_string(&self) -> String {
        format!(
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }

    /// Last three octets without separators, used in mDNS instance names.
    pub fn short(&self) -> String {
        format!("{:02X}{:02X}{:02X}", self.0[3], self.0[4], self.0[5])
    }
}
