//! Service configuration.

use std::time::Duration;

use crate::types::constants::{service, timeouts};

/// Identifiers and limits used by [`ConnectivityService`](crate::ConnectivityService).
///
/// Interface names are fixed; the bus name and object paths can be changed,
/// which is mostly useful for running a second instance on a session bus.
///
/// # Example
///
/// ```rust
/// use connectivity::ServiceConfig;
/// use std::time::Duration;
///
/// let config = ServiceConfig::default()
///     .with_bus_name("com.example.connectivity1")
///     .with_call_timeout(Duration::from_millis(500));
/// assert_eq!(config.bus_name, "com.example.connectivity1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Well-known bus name requested once both objects are exported.
    pub bus_name: String,
    /// Object path of the public `NetworkingStatus` object.
    pub public_path: String,
    /// Object path of the restricted `Private` object.
    pub private_path: String,
    /// Upper bound for a single remote call.
    pub call_timeout: Duration,
}

impl Default for ServiceConfig {
    /// Defaults:
    /// - `bus_name`: `com.ubuntu.connectivity1`
    /// - `public_path`: `/com/ubuntu/connectivity1/NetworkingStatus`
    /// - `private_path`: `/com/ubuntu/connectivity1/Private`
    /// - `call_timeout`: 1 second
    fn default() -> Self {
        Self {
            bus_name: service::DBUS_NAME.to_string(),
            public_path: service::SERVICE_PATH.to_string(),
            private_path: service::PRIVATE_PATH.to_string(),
            call_timeout: timeouts::call_timeout(),
        }
    }
}

impl ServiceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bus_name(mut self, name: impl Into<String>) -> Self {
        self.bus_name = name.into();
        self
    }

    pub fn with_public_path(mut self, path: impl Into<String>) -> Self {
        self.public_path = path.into();
        self
    }

    pub fn with_private_path(mut self, path: impl Into<String>) -> Self {
        self.private_path = path.into();
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }
}
