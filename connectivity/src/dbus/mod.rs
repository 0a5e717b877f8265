//! D-Bus definitions.
//!
//! Client proxies for oFono and NetworkManager, and the two objects the
//! service exports: the public `NetworkingStatus` object and the restricted
//! `Private` object.

mod device;
mod main_nm;
mod networking_status;
mod ofono;
mod private;
mod settings;

pub(crate) use device::NMDeviceProxy;
pub(crate) use main_nm::NMProxy;
pub(crate) use ofono::{NetworkRegistrationProxy, OfonoManagerProxy};
pub(crate) use settings::{NMSettingsConnectionProxy, NMSettingsProxy};

pub use networking_status::NetworkingStatusObject;
pub use private::PrivateObject;
