use bitflags::bitflags;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use thiserror::Error;
use zvariant::OwnedObjectPath;

use crate::types::constants::nm_state;

/// Identifier of a remote object on the bus.
///
/// Wraps the object path of the remote object (for example a modem at
/// `/ril_0`). Handles are ordered by path so they can key a sorted
/// collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectHandle(OwnedObjectPath);

impl Ord for ObjectHandle {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl PartialOrd for ObjectHandle {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl ObjectHandle {
    /// Returns the object path as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns the underlying object path.
    pub fn path(&self) -> &OwnedObjectPath {
        &self.0
    }
}

impl From<OwnedObjectPath> for ObjectHandle {
    fn from(path: OwnedObjectPath) -> Self {
        Self(path)
    }
}

impl TryFrom<&str> for ObjectHandle {
    type Error = ConnectivityError;

    fn try_from(path: &str) -> Result<Self, Self::Error> {
        OwnedObjectPath::try_from(path)
            .map(Self)
            .map_err(|source| ConnectivityError::Decode {
                name: path.to_string(),
                source,
            })
    }
}

impl Display for ObjectHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Overall networking status published by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkingStatus {
    /// No usable connection.
    #[default]
    Offline,
    /// A connection is being established.
    Connecting,
    /// Connected with a usable route.
    Online,
}

impl NetworkingStatus {
    /// Maps a NetworkManager `NMState` code to a networking status.
    ///
    /// Unknown and unrecognized codes fail closed to `Offline`.
    pub fn from_nm_state(code: u32) -> Self {
        match code {
            nm_state::CONNECTED_GLOBAL | nm_state::CONNECTED_SITE => Self::Online,
            nm_state::CONNECTING => Self::Connecting,
            nm_state::ASLEEP
            | nm_state::DISCONNECTED
            | nm_state::DISCONNECTING
            | nm_state::CONNECTED_LOCAL => Self::Offline,
            nm_state::UNKNOWN => {
                log::warn!("Networking state is unknown, treating as offline");
                Self::Offline
            }
            v => {
                log::warn!("Unrecognized networking state {v}, treating as offline");
                Self::Offline
            }
        }
    }

    /// Wire representation (`"offline"`, `"connecting"`, `"online"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Connecting => "connecting",
            Self::Online => "online",
        }
    }
}

impl Display for NetworkingStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

bitflags! {
    /// Characteristics of the current primary link.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Characteristics: u32 {
        const HAS_MONTHLY_DATA_LIMITS = 0x1;
        const IS_BANDWIDTH_LIMITED = 0x2;
        const IS_VOLUME_LIMITED = 0x4;
    }
}

/// A limitation of the current connection, derived from [`Characteristics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Limitation {
    /// The link is bandwidth limited (for example a metered cellular link).
    Bandwidth,
}

impl Limitation {
    /// Derives the set of limitations from link characteristics.
    pub fn from_characteristics(characteristics: Characteristics) -> BTreeSet<Limitation> {
        let mut limitations = BTreeSet::new();
        if characteristics.contains(Characteristics::IS_BANDWIDTH_LIMITED) {
            limitations.insert(Limitation::Bandwidth);
        }
        limitations
    }

    /// Wire representation of the limitation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bandwidth => "bandwidth",
        }
    }
}

impl Display for Limitation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Hotspot settings and state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HotspotState {
    /// Whether the hotspot is currently active.
    pub enabled: bool,
    /// Raw SSID bytes.
    pub ssid: Vec<u8>,
    /// WPA passphrase. Only ever published on the restricted object.
    pub password: String,
    /// Wi-Fi mode of the hotspot (`"ap"` or `"adhoc"`).
    pub mode: String,
    /// Whether a hotspot connection profile exists.
    pub stored: bool,
}

/// The derived state published by the service.
///
/// Updated as a unit by the status aggregator each time the underlying
/// source reports a change.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AggregatedState {
    pub status: NetworkingStatus,
    pub limitations: BTreeSet<Limitation>,
    pub flight_mode: bool,
    pub wifi_enabled: bool,
    pub hotspot: HotspotState,
    pub unstoppable_operation: bool,
}

impl AggregatedState {
    /// Limitations as the list of strings published on the bus.
    pub fn limitation_names(&self) -> Vec<String> {
        self.limitations
            .iter()
            .map(|l| l.as_str().to_string())
            .collect()
    }
}

/// oFono network registration status of a modem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStatus {
    Unregistered,
    Registered,
    Searching,
    Denied,
    Unknown,
    Roaming,
}

impl From<&str> for RegistrationStatus {
    fn from(value: &str) -> Self {
        match value {
            "unregistered" => Self::Unregistered,
            "registered" => Self::Registered,
            "searching" => Self::Searching,
            "denied" => Self::Denied,
            "roaming" => Self::Roaming,
            _ => Self::Unknown,
        }
    }
}

impl Display for RegistrationStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unregistered => write!(f, "unregistered"),
            Self::Registered => write!(f, "registered"),
            Self::Searching => write!(f, "searching"),
            Self::Denied => write!(f, "denied"),
            Self::Unknown => write!(f, "unknown"),
            Self::Roaming => write!(f, "roaming"),
        }
    }
}

/// A request to unlock SIM cards, forwarded to external unlock handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnlockRequest {
    /// Unlock a single modem.
    Modem(ObjectHandle),
    /// Unlock every modem that needs it.
    AllModems,
}

/// Errors that can occur while mirroring or publishing connectivity state.
///
/// Construction-time failures (enumeration, registration) are fatal to the
/// component being built. Property decode failures are normally absorbed by
/// [`PropertyBag::get`](crate::PropertyBag::get) and only surface through
/// [`PropertyBag::try_get`](crate::PropertyBag::try_get).
#[derive(Debug, Error)]
pub enum ConnectivityError {
    /// A D-Bus communication error occurred.
    #[error("D-Bus error: {0}")]
    Dbus(#[from] zbus::Error),

    /// A D-Bus operation failed with context about what was attempted.
    #[error("{context}: {source}")]
    DbusOperation {
        context: String,
        #[source]
        source: zbus::Error,
    },

    /// A remote call did not complete in time.
    #[error("{context}: timed out after {timeout:?}")]
    Timeout { context: String, timeout: Duration },

    /// A property is not present in the fetched property set.
    #[error("property {0} is missing")]
    MissingProperty(String),

    /// A value is present but has an unexpected shape.
    #[error("failed to decode {name}: {source}")]
    Decode {
        name: String,
        #[source]
        source: zvariant::Error,
    },

    /// Registering an object or name on the bus failed.
    #[error("unable to register {what} on D-Bus: {source}")]
    Registration {
        what: String,
        #[source]
        source: zbus::Error,
    },

    /// No Wi-Fi device is available to host the hotspot.
    #[error("no Wi-Fi device found")]
    NoWifiDevice,

    /// The requested hotspot settings are not acceptable.
    #[error("invalid hotspot settings: {0}")]
    InvalidHotspotSettings(String),

    /// Another operation of the same kind is still running.
    #[error("{0} already in progress")]
    InProgress(&'static str),
}
