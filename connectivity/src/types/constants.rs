//! Constants for the D-Bus names, paths and numeric codes this crate speaks.
//!
//! These correspond to the values used by NetworkManager and the
//! published `com.ubuntu.connectivity1` service.

/// Names of the published connectivity service.
///
/// Interface names are fixed because `#[zbus::interface]` needs them at
/// compile time. Bus name and object paths are only defaults and can be
/// overridden through [`ServiceConfig`](crate::ServiceConfig).
pub mod service {
    pub const DBUS_NAME: &str = "com.ubuntu.connectivity1";
    pub const SERVICE_PATH: &str = "/com/ubuntu/connectivity1/NetworkingStatus";
    pub const SERVICE_INTERFACE: &str = "com.ubuntu.connectivity1.NetworkingStatus";
    pub const PRIVATE_PATH: &str = "/com/ubuntu/connectivity1/Private";
    pub const PRIVATE_INTERFACE: &str = "com.ubuntu.connectivity1.Private";
    pub const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";
    pub const PROPERTIES_CHANGED: &str = "PropertiesChanged";
}

/// NetworkManager global state (`NMState`) constants.
pub mod nm_state {
    pub const UNKNOWN: u32 = 0;
    pub const ASLEEP: u32 = 10;
    pub const DISCONNECTED: u32 = 20;
    pub const DISCONNECTING: u32 = 30;
    pub const CONNECTING: u32 = 40;
    pub const CONNECTED_LOCAL: u32 = 50;
    pub const CONNECTED_SITE: u32 = 60;
    pub const CONNECTED_GLOBAL: u32 = 70;
}

/// NetworkManager metered (`NMMetered`) constants.
pub mod metered {
    pub const YES: u32 = 1;
    pub const GUESS_YES: u32 = 3;
}

/// NetworkManager device type constants.
pub mod device_type {
    pub const WIFI: u32 = 2;
}

/// Hotspot defaults and limits.
pub mod hotspot {
    pub const DEFAULT_SSID: &str = "Ubuntu";
    pub const DEFAULT_MODE: &str = "ap";
    pub const CONNECTION_ID: &str = "Hotspot";
    pub const SSID_MAX: usize = 32;
    pub const PASSWORD_LENGTH: usize = 16;
    pub const PASSWORD_MIN: usize = 8;
    pub const PASSWORD_MAX: usize = 63;
    pub const MODES: [&str; 2] = ["ap", "adhoc"];
}

/// Timeout constants for remote calls.
pub mod timeouts {
    use std::time::Duration;

    /// Upper bound for a single synchronous remote call (1 second).
    ///
    /// Used for modem enumeration and property fetches, which block
    /// construction of the synchronizer.
    const CALL_TIMEOUT_SECS: u64 = 1;

    /// Returns the default remote call timeout.
    pub fn call_timeout() -> Duration {
        Duration::from_secs(CALL_TIMEOUT_SECS)
    }
}
