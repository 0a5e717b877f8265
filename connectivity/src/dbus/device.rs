//! NetworkManager Device proxy.

use zbus::{Result, proxy};

/// Proxy for NetworkManager device interface.
///
/// Only the device type is needed, to pick a Wi-Fi device for the hotspot.
#[proxy(
    interface = "org.freedesktop.NetworkManager.Device",
    default_service = "org.freedesktop.NetworkManager"
)]
pub trait NMDevice {
    /// Device type as a numeric code (2 = Wi-Fi).
    #[zbus(property)]
    fn device_type(&self) -> Result<u32>;
}
