//! Hotspot settings: validation, defaults and the NetworkManager settings
//! dictionary of the hotspot connection profile.

use std::collections::HashMap;
use uuid::Uuid;
use zvariant::Value;

use crate::Result;
use crate::api::models::{ConnectivityError, HotspotState};
use crate::types::constants::hotspot;

/// A NetworkManager connection settings dictionary.
pub type ConnectionSettings = HashMap<&'static str, HashMap<&'static str, Value<'static>>>;

/// Initial hotspot state: default SSID and mode, a fresh random password.
pub(crate) fn default_hotspot() -> HotspotState {
    HotspotState {
        enabled: false,
        ssid: hotspot::DEFAULT_SSID.as_bytes().to_vec(),
        password: generate_password(),
        mode: hotspot::DEFAULT_MODE.to_string(),
        stored: false,
    }
}

/// Random password taken from the hex digits of a v4 UUID.
pub(crate) fn generate_password() -> String {
    let mut password = Uuid::new_v4().simple().to_string();
    password.truncate(hotspot::PASSWORD_LENGTH);
    password
}

pub(crate) fn validate_ssid(ssid: &[u8]) -> Result<()> {
    if ssid.is_empty() || ssid.len() > hotspot::SSID_MAX {
        return Err(ConnectivityError::InvalidHotspotSettings(format!(
            "SSID must be 1 to {} bytes, got {}",
            hotspot::SSID_MAX,
            ssid.len()
        )));
    }
    Ok(())
}

pub(crate) fn validate_password(password: &str) -> Result<()> {
    let len = password.chars().count();
    if !(hotspot::PASSWORD_MIN..=hotspot::PASSWORD_MAX).contains(&len) {
        return Err(ConnectivityError::InvalidHotspotSettings(format!(
            "password must be {} to {} characters, got {len}",
            hotspot::PASSWORD_MIN,
            hotspot::PASSWORD_MAX
        )));
    }
    Ok(())
}

pub(crate) fn validate_mode(mode: &str) -> Result<()> {
    if !hotspot::MODES.contains(&mode) {
        return Err(ConnectivityError::InvalidHotspotSettings(format!(
            "unsupported mode {mode:?}, expected one of {:?}",
            hotspot::MODES
        )));
    }
    Ok(())
}

/// Builds the settings dictionary of a shared Wi-Fi hotspot connection.
///
/// ```ignore
/// let settings = HotspotBuilder::new(b"Ubuntu")
///     .mode("ap")
///     .wpa_psk("0123456789abcdef")
///     .build();
/// ```
pub(crate) struct HotspotBuilder {
    settings: ConnectionSettings,
}

impl HotspotBuilder {
    pub(crate) fn new(ssid: &[u8]) -> Self {
        let mut settings = HashMap::new();

        let mut connection = HashMap::new();
        connection.insert("type", Value::from("802-11-wireless"));
        connection.insert("id", Value::from(hotspot::CONNECTION_ID));
        connection.insert("uuid", Value::from(Uuid::new_v4().to_string()));
        connection.insert("autoconnect", Value::from(false));
        settings.insert("connection", connection);

        let mut wireless = HashMap::new();
        wireless.insert("ssid", Value::from(ssid.to_vec()));
        wireless.insert("mode", Value::from(hotspot::DEFAULT_MODE));
        settings.insert("802-11-wireless", wireless);

        let mut ipv4 = HashMap::new();
        ipv4.insert("method", Value::from("shared"));
        settings.insert("ipv4", ipv4);

        let mut ipv6 = HashMap::new();
        ipv6.insert("method", Value::from("ignore"));
        settings.insert("ipv6", ipv6);

        Self { settings }
    }

    /// Keeps the UUID of an existing profile. NetworkManager refuses
    /// updates that change it.
    pub(crate) fn uuid(mut self, uuid: &str) -> Self {
        if let Some(connection) = self.settings.get_mut("connection") {
            connection.insert("uuid", Value::from(uuid.to_string()));
        }
        self
    }

    /// Sets the Wi-Fi mode (`ap` or `adhoc`).
    pub(crate) fn mode(mut self, mode: &str) -> Self {
        if let Some(wireless) = self.settings.get_mut("802-11-wireless") {
            wireless.insert("mode", Value::from(mode.to_string()));
        }
        self
    }

    /// Protects the hotspot with WPA-PSK.
    pub(crate) fn wpa_psk(mut self, password: &str) -> Self {
        if let Some(wireless) = self.settings.get_mut("802-11-wireless") {
            wireless.insert("security", Value::from("802-11-wireless-security"));
        }

        let mut security = HashMap::new();
        security.insert("key-mgmt", Value::from("wpa-psk"));
        security.insert("psk", Value::from(password.to_string()));
        self.settings.insert("802-11-wireless-security", security);
        self
    }

    pub(crate) fn build(self) -> ConnectionSettings {
        self.settings
    }
}

/// Settings for the hotspot described by `state`.
///
/// `uuid` is the UUID of the saved profile being updated; a new profile
/// gets a fresh one.
pub(crate) fn hotspot_settings(state: &HotspotState, uuid: Option<&str>) -> ConnectionSettings {
    let builder = HotspotBuilder::new(&state.ssid)
        .mode(&state.mode)
        .wpa_psk(&state.password);
    match uuid {
        Some(uuid) => builder.uuid(uuid).build(),
        None => builder.build(),
    }
}
