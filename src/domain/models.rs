use chrono::{DateTime, Local};
use std::fmt;

/// Platform-assigned device identifier (address on Windows, opaque id elsewhere)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn from_address(address: u64) -> Self {
        Self(format!("{:012X}", address))
    }

    /// Parse back a 48-bit Bluetooth address, if this id holds one
    pub fn bluetooth_address(&self) -> Option<u64> {
        u64::from_str_radix(&self.0.replace(':', ""), 16).ok()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A device picked during discovery; only valid for one connection attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub id: DeviceId,
    pub name: Option<String>,
}

impl DeviceIdentity {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unnamed")
    }
}

/// One advertisement report as seen by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub id: DeviceId,
    /// Name remembered by the platform from earlier contact
    pub cached_name: Option<String>,
    /// Name carried in this advertisement payload
    pub advertised_name: Option<String>,
    pub rssi: Option<i16>,
}

impl Advertisement {
    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity {
            id: self.id.clone(),
            name: self
                .advertised_name
                .clone()
                .or_else(|| self.cached_name.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightState {
    pub on: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanState {
    pub speed: u8,
    pub min: u8,
    pub max: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub light_on_hour: u8,
    pub light_off_hour: u8,
}

/// Last known device state as mirrored on the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceStateSnapshot {
    pub connected: bool,
    pub device_name: Option<String>,
    pub light: LightState,
    pub fan: FanState,
    pub schedule: Schedule,
}

impl Default for DeviceStateSnapshot {
    fn default() -> Self {
        Self {
            connected: false,
            device_name: None,
            light: LightState { on: false },
            fan: FanState {
                speed: 50,
                min: 0,
                max: 100,
            },
            schedule: Schedule {
                light_on_hour: 18,
                light_off_hour: 14,
            },
        }
    }
}

/// Why a connection attempt ended in `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    ScanTimeout,
    ConnectionError,
    UnexpectedDrop,
    AttributeGroupNotFound,
    AttributeNotFound,
}

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    Scanning,
    Connecting,
    Stabilizing,
    ResolvingAttributes,
    Binding,
    Ready,
    Disconnecting,
    Failed(FailureKind),
}

impl LinkState {
    /// True while a connect or discovery attempt is between `Idle` and `Ready`
    pub fn is_attempt_in_progress(self) -> bool {
        matches!(
            self,
            Self::Scanning
                | Self::Connecting
                | Self::Stabilizing
                | Self::ResolvingAttributes
                | Self::Binding
        )
    }

    /// Failure reported when an attempt dies while in this state
    pub fn failure_kind(self) -> FailureKind {
        match self {
            Self::Scanning => FailureKind::ScanTimeout,
            Self::Stabilizing => FailureKind::UnexpectedDrop,
            Self::ResolvingAttributes => FailureKind::AttributeGroupNotFound,
            Self::Binding => FailureKind::AttributeNotFound,
            _ => FailureKind::ConnectionError,
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("Idle"),
            Self::Scanning => f.write_str("Scanning"),
            Self::Connecting => f.write_str("Connecting"),
            Self::Stabilizing => f.write_str("Stabilizing"),
            Self::ResolvingAttributes => f.write_str("Resolving attributes"),
            Self::Binding => f.write_str("Binding"),
            Self::Ready => f.write_str("Ready"),
            Self::Disconnecting => f.write_str("Disconnecting"),
            Self::Failed(kind) => write!(f, "Failed ({:?})", kind),
        }
    }
}

/// Events flowing from the connection core to the presentation
#[derive(Debug, Clone)]
pub enum AppEvent {
    LinkState(LinkState),
    Snapshot(DeviceStateSnapshot),
    DeviceFound(DeviceIdentity),
    Disconnected { unsolicited: bool },
    /// A mutation or read was rejected; controls should resync to the snapshot
    CommandFailed(String),
    LogMessage(StatusMessage),
}

/// Requests from the presentation to the connection core
#[derive(Debug, Clone)]
pub enum BluetoothCommand {
    Connect,
    DiscoverAll,
    ConnectTo(DeviceIdentity),
    Disconnect,
    ReadAll,
    SetLight(bool),
    ToggleLight,
    SetFanSpeed(i32),
    SetFanRange(i32, i32),
    SetSchedule(i32, i32),
}

#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub message: String,
    pub severity: MessageSeverity,
    /// Local wall-clock time the entry was created
    pub timestamp: DateTime<Local>,
}

impl StatusMessage {
    pub fn new(message: impl Into<String>, severity: MessageSeverity) -> Self {
        Self {
            message: message.into(),
            severity,
            timestamp: Local::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Info,
    Success,
    Warning,
    Error,
}
