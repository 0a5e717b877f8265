//! The public `com.ubuntu.connectivity1.NetworkingStatus` object.

use zbus::interface;

use crate::core::aggregator::{SharedState, read_state};

/// Read-only view of the aggregated state exported on the bus.
///
/// Getters read the shared state at call time. Change notifications are
/// emitted by the notification bridge, not by this object.
pub struct NetworkingStatusObject {
    state: SharedState,
}

impl NetworkingStatusObject {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }
}

#[interface(name = "com.ubuntu.connectivity1.NetworkingStatus")]
impl NetworkingStatusObject {
    /// `"offline"`, `"connecting"` or `"online"`.
    #[zbus(property)]
    fn status(&self) -> String {
        read_state(&self.state).status.as_str().to_string()
    }

    #[zbus(property)]
    fn limitations(&self) -> Vec<String> {
        read_state(&self.state).limitation_names()
    }

    #[zbus(property)]
    fn wifi_enabled(&self) -> bool {
        read_state(&self.state).wifi_enabled
    }

    #[zbus(property)]
    fn flight_mode(&self) -> bool {
        read_state(&self.state).flight_mode
    }

    #[zbus(property)]
    fn unstoppable_operation_happening(&self) -> bool {
        read_state(&self.state).unstoppable_operation
    }

    #[zbus(property)]
    fn hotspot_enabled(&self) -> bool {
        read_state(&self.state).hotspot.enabled
    }

    #[zbus(property)]
    fn hotspot_ssid(&self) -> Vec<u8> {
        read_state(&self.state).hotspot.ssid.clone()
    }

    #[zbus(property)]
    fn hotspot_mode(&self) -> String {
        read_state(&self.state).hotspot.mode.clone()
    }

    #[zbus(property)]
    fn hotspot_stored(&self) -> bool {
        read_state(&self.state).hotspot.stored
    }
}
