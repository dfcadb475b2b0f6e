//! Attribute Registry
//!
//! The fixed table of the six remote attributes exposed by the TOWER firmware,
//! their GATT identifiers and how each single-byte value is encoded.
//!
//! Both the explicit-set and read-then-invert front-end flows go through this
//! table, so the identifiers only exist in one place.

use crate::domain::error::TowerError;
use std::fmt;
use std::str::FromStr;
use tracing::debug;
use uuid::Uuid;

/// Primary GATT service UUID of the attribute group.
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x4fafc201_1fb5_459e_8fcc_c5c9c331914b);

/// Byte-reversed form of [`SERVICE_UUID`].
///
/// Some firmware revisions register the 128-bit UUID in wire order, which
/// hosts then read back reversed.
pub const SERVICE_UUID_ALT: Uuid = Uuid::from_u128(0x4b9131c3_c9c5_cc8f_9e45_b51f01c2af4f);

pub const LIGHT_CHAR_UUID: Uuid = Uuid::from_u128(0xbeb5483e_36e1_4688_b7f5_ea07361b26a8);
pub const FAN_CHAR_UUID: Uuid = Uuid::from_u128(0x82563452_9477_4b78_953e_38ec6f43e592);
pub const FAN_MIN_CHAR_UUID: Uuid = Uuid::from_u128(0xc0b9a304_1234_4567_89ab_cdef01234567);
pub const FAN_MAX_CHAR_UUID: Uuid = Uuid::from_u128(0xc0b9a304_1234_4567_89ab_cdef01234568);
pub const LIGHT_ON_CHAR_UUID: Uuid = Uuid::from_u128(0xc0b9a304_1234_4567_89ab_cdef01234569);
pub const LIGHT_OFF_CHAR_UUID: Uuid = Uuid::from_u128(0xc0b9a304_1234_4567_89ab_cdef0123456a);

/// Candidate identifiers for the attribute group, in lookup order.
pub const GROUP_CANDIDATES: [Uuid; 2] = [SERVICE_UUID, SERVICE_UUID_ALT];

/// One of the six device-controlled values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    Light,
    Fan,
    FanMin,
    FanMax,
    LightOnHour,
    LightOffHour,
}

impl Attribute {
    /// Binding and bulk-read order.
    pub const ALL: [Attribute; 6] = [
        Attribute::Light,
        Attribute::Fan,
        Attribute::FanMin,
        Attribute::FanMax,
        Attribute::LightOnHour,
        Attribute::LightOffHour,
    ];

    /// Logical name used by the front-ends
    pub fn name(self) -> &'static str {
        self.descriptor().logical_name
    }

    pub fn descriptor(self) -> &'static AttributeDescriptor {
        &DESCRIPTORS[self.index()]
    }

    /// Position in [`Attribute::ALL`]
    pub fn index(self) -> usize {
        match self {
            Self::Light => 0,
            Self::Fan => 1,
            Self::FanMin => 2,
            Self::FanMax => 3,
            Self::LightOnHour => 4,
            Self::LightOffHour => 5,
        }
    }

    /// Reverse lookup from a characteristic UUID
    pub fn from_wire_id(id: Uuid) -> Option<Self> {
        DESCRIPTORS
            .iter()
            .find(|d| d.wire_id == id)
            .map(|d| d.attribute)
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Attribute {
    type Err = TowerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        resolve(s).map(|d| d.attribute)
    }
}

/// How a logical value maps onto its single wire byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// 0x00 = off, anything else = on
    BooleanByte,
    /// 0..=100
    PercentageByte,
    /// 0..=23
    HourByte,
}

impl ValueKind {
    /// Largest value accepted for this kind
    pub fn max(self) -> u8 {
        match self {
            Self::BooleanByte => 1,
            Self::PercentageByte => 100,
            Self::HourByte => 23,
        }
    }

    /// Clamp an arbitrary integer into the valid range for this kind.
    pub fn clamp(self, raw: i32) -> u8 {
        let clamped = raw.clamp(0, i32::from(self.max()));
        if clamped != raw {
            debug!("Clamped {:?} input {} to {}", self, raw, clamped);
        }
        clamped as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeDescriptor {
    pub attribute: Attribute,
    pub logical_name: &'static str,
    pub wire_id: Uuid,
    pub kind: ValueKind,
}

static DESCRIPTORS: [AttributeDescriptor; 6] = [
    AttributeDescriptor {
        attribute: Attribute::Light,
        logical_name: "light",
        wire_id: LIGHT_CHAR_UUID,
        kind: ValueKind::BooleanByte,
    },
    AttributeDescriptor {
        attribute: Attribute::Fan,
        logical_name: "fan",
        wire_id: FAN_CHAR_UUID,
        kind: ValueKind::PercentageByte,
    },
    AttributeDescriptor {
        attribute: Attribute::FanMin,
        logical_name: "fanMin",
        wire_id: FAN_MIN_CHAR_UUID,
        kind: ValueKind::PercentageByte,
    },
    AttributeDescriptor {
        attribute: Attribute::FanMax,
        logical_name: "fanMax",
        wire_id: FAN_MAX_CHAR_UUID,
        kind: ValueKind::PercentageByte,
    },
    AttributeDescriptor {
        attribute: Attribute::LightOnHour,
        logical_name: "lightOnHour",
        wire_id: LIGHT_ON_CHAR_UUID,
        kind: ValueKind::HourByte,
    },
    AttributeDescriptor {
        attribute: Attribute::LightOffHour,
        logical_name: "lightOffHour",
        wire_id: LIGHT_OFF_CHAR_UUID,
        kind: ValueKind::HourByte,
    },
];

/// Look up an attribute by its logical name (case-sensitive).
pub fn resolve(logical_name: &str) -> Result<&'static AttributeDescriptor, TowerError> {
    DESCRIPTORS
        .iter()
        .find(|d| d.logical_name == logical_name)
        .ok_or_else(|| TowerError::UnknownAttribute(logical_name.to_string()))
}

/// Clamp a fan percentage to `0..=100`
pub fn clamp_percent(raw: i32) -> u8 {
    ValueKind::PercentageByte.clamp(raw)
}

/// Clamp an hour of day to `0..=23`
pub fn clamp_hour(raw: i32) -> u8 {
    ValueKind::HourByte.clamp(raw)
}

pub fn encode_light(on: bool) -> u8 {
    u8::from(on)
}

/// Any nonzero stored byte counts as "on".
pub fn decode_light(raw: u8) -> bool {
    raw != 0
}
