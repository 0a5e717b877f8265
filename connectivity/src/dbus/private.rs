//! The restricted `com.ubuntu.connectivity1.Private` object.
//!
//! Exposes the mutating operations and the hotspot password. Access control
//! is left to the bus policy.

use std::sync::Arc;
use zbus::object_server::SignalEmitter;
use zbus::{fdo, interface};

use crate::api::models::ObjectHandle;
use crate::core::control::ControlFacade;

pub struct PrivateObject {
    control: Arc<ControlFacade>,
}

impl PrivateObject {
    pub fn new(control: Arc<ControlFacade>) -> Self {
        Self { control }
    }
}

#[interface(name = "com.ubuntu.connectivity1.Private")]
impl PrivateObject {
    async fn set_flight_mode(&self, enabled: bool) {
        self.control.set_flight_mode(enabled).await
    }

    async fn set_wifi_enabled(&self, enabled: bool) {
        self.control.set_wifi_enabled(enabled).await
    }

    async fn set_hotspot_enabled(&self, enabled: bool) {
        self.control.set_hotspot_enabled(enabled).await
    }

    async fn set_hotspot_ssid(&self, ssid: Vec<u8>) {
        self.control.set_hotspot_ssid(ssid).await
    }

    async fn set_hotspot_password(&self, password: String) {
        self.control.set_hotspot_password(password).await
    }

    async fn set_hotspot_mode(&self, mode: String) {
        self.control.set_hotspot_mode(mode).await
    }

    /// Asks the unlock handler to unlock the modem at object path `modem`.
    async fn unlock_modem(&self, modem: String) -> fdo::Result<()> {
        let handle = ObjectHandle::try_from(modem.as_str())
            .map_err(|e| fdo::Error::InvalidArgs(e.to_string()))?;
        self.control.unlock_modem(handle);
        Ok(())
    }

    async fn unlock_all_modems(&self) {
        self.control.unlock_all_modems()
    }

    #[zbus(property)]
    fn hotspot_password(&self) -> String {
        self.control.hotspot_password()
    }

    /// Emitted when an asynchronous operation fails.
    #[zbus(signal)]
    pub async fn report_error(emitter: &SignalEmitter<'_>, message: &str) -> zbus::Result<()>;
}
