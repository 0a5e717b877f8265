//! oFono proxies.

use std::collections::HashMap;
use zbus::{Result, proxy};
use zvariant::{OwnedObjectPath, OwnedValue};

/// Proxy for the oFono manager object.
///
/// Enumerates modems and announces hot-plugged ones.
///
/// # Signals
///
/// `ModemAdded` carries the modem path and its initial properties,
/// `ModemRemoved` only the path. Use `receive_modem_added()` and
/// `receive_modem_removed()` to get signal streams.
#[proxy(
    interface = "org.ofono.Manager",
    default_service = "org.ofono",
    default_path = "/"
)]
pub trait OfonoManager {
    /// Returns every modem with its current properties.
    fn get_modems(&self) -> Result<Vec<(OwnedObjectPath, HashMap<String, OwnedValue>)>>;

    /// Signal emitted when a modem appears.
    #[zbus(signal)]
    fn modem_added(&self, path: OwnedObjectPath, properties: HashMap<String, OwnedValue>);

    /// Signal emitted when a modem disappears.
    #[zbus(signal)]
    fn modem_removed(&self, path: OwnedObjectPath);
}

/// Proxy for the network registration interface of a single modem.
///
/// Build it with the modem path:
///
/// ```ignore
/// let reg = NetworkRegistrationProxy::builder(conn).path(modem_path)?.build().await?;
/// let props = reg.get_properties().await?;
/// ```
#[proxy(
    interface = "org.ofono.NetworkRegistration",
    default_service = "org.ofono"
)]
pub trait NetworkRegistration {
    /// Returns all registration properties (Status, Technology, Strength, ...).
    fn get_properties(&self) -> Result<HashMap<String, OwnedValue>>;
}
