//! [`ConnectivitySource`] backed by NetworkManager.
//!
//! Networking status, metering and the Wi-Fi switch are read from
//! NetworkManager on every snapshot. Flight mode and the hotspot settings
//! are held in memory: flight mode is applied by switching the Wi-Fi and
//! WWAN radios, the hotspot by activating a single saved shared Wi-Fi
//! profile.
//!
//! All remote calls go through [`NetworkManagerBus`], implemented by
//! [`DbusNetworkManager`] on a D-Bus connection.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use zbus::Connection;
use zvariant::{OwnedObjectPath, OwnedValue};

use crate::Result;
use crate::api::models::{Characteristics, ConnectivityError, HotspotState};
use crate::core::aggregator::{ConnectivitySource, SourceEvent, SourceState};
use crate::core::hotspot::{
    ConnectionSettings, default_hotspot, hotspot_settings, validate_mode, validate_password,
    validate_ssid,
};
use crate::dbus::{NMDeviceProxy, NMProxy, NMSettingsConnectionProxy, NMSettingsProxy};
use crate::try_log;
use crate::types::constants::hotspot::CONNECTION_ID;
use crate::types::constants::{device_type, metered};
use crate::util::utils::{broadcast_stream, with_timeout};

/// Capacity of the local event broadcast channel.
const EVENT_CAPACITY: usize = 32;

/// A saved NetworkManager connection profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedConnection {
    pub path: OwnedObjectPath,
    pub uuid: String,
}

/// The NetworkManager primitives the source needs.
///
/// Implemented by [`DbusNetworkManager`], and by fakes in tests.
#[async_trait]
pub trait NetworkManagerBus: Send + Sync {
    /// Global `NMState` code.
    async fn state(&self) -> Result<u32>;

    /// `NMMetered` code of the primary connection.
    async fn metered(&self) -> Result<u32>;

    async fn wireless_enabled(&self) -> Result<bool>;

    async fn set_wireless_enabled(&self, enabled: bool) -> Result<()>;

    async fn set_wwan_enabled(&self, enabled: bool) -> Result<()>;

    /// The first Wi-Fi device, if there is one.
    async fn wifi_device(&self) -> Result<Option<OwnedObjectPath>>;

    /// Saved profiles whose connection id is `id`.
    async fn saved_connections(&self, id: &str) -> Result<Vec<SavedConnection>>;

    /// Creates a profile and activates it on `device`.
    ///
    /// Returns the profile path and the active connection path.
    async fn add_and_activate_connection(
        &self,
        settings: ConnectionSettings,
        device: &OwnedObjectPath,
    ) -> Result<(OwnedObjectPath, OwnedObjectPath)>;

    /// Activates a saved profile on `device`, returning the active connection.
    async fn activate_connection(
        &self,
        connection: &OwnedObjectPath,
        device: &OwnedObjectPath,
    ) -> Result<OwnedObjectPath>;

    async fn update_connection(
        &self,
        connection: &OwnedObjectPath,
        settings: ConnectionSettings,
    ) -> Result<()>;

    async fn delete_connection(&self, connection: &OwnedObjectPath) -> Result<()>;

    async fn deactivate_connection(&self, active: &OwnedObjectPath) -> Result<()>;

    /// Yields once for every change of State, Metered or WirelessEnabled.
    async fn property_changes(&self) -> Result<BoxStream<'static, ()>>;
}

/// [`NetworkManagerBus`] on a D-Bus connection.
///
/// The NetworkManager and settings proxies are built once and reused by
/// every call.
pub struct DbusNetworkManager {
    conn: Connection,
    nm: NMProxy<'static>,
    settings: NMSettingsProxy<'static>,
    timeout: Duration,
}

impl DbusNetworkManager {
    pub async fn new(conn: &Connection, timeout: Duration) -> Result<Self> {
        Ok(Self {
            conn: conn.clone(),
            nm: NMProxy::new(conn).await?,
            settings: NMSettingsProxy::new(conn).await?,
            timeout,
        })
    }
}

/// Reads a string entry of a settings section.
fn setting_str(section: &HashMap<String, OwnedValue>, key: &str) -> Option<String> {
    let value = try_log!(section.get(key)?.try_clone(), "Failed to copy setting value");
    String::try_from(value).ok()
}

fn root_object() -> Result<OwnedObjectPath> {
    OwnedObjectPath::try_from("/").map_err(|source| ConnectivityError::Decode {
        name: "specific object".into(),
        source,
    })
}

#[async_trait]
impl NetworkManagerBus for DbusNetworkManager {
    async fn state(&self) -> Result<u32> {
        with_timeout("read State", self.timeout, self.nm.state()).await
    }

    async fn metered(&self) -> Result<u32> {
        with_timeout("read Metered", self.timeout, self.nm.metered()).await
    }

    async fn wireless_enabled(&self) -> Result<bool> {
        with_timeout(
            "read WirelessEnabled",
            self.timeout,
            self.nm.wireless_enabled(),
        )
        .await
    }

    async fn set_wireless_enabled(&self, enabled: bool) -> Result<()> {
        with_timeout(
            "set WirelessEnabled",
            self.timeout,
            self.nm.set_wireless_enabled(enabled),
        )
        .await
    }

    async fn set_wwan_enabled(&self, enabled: bool) -> Result<()> {
        with_timeout(
            "set WwanEnabled",
            self.timeout,
            self.nm.set_wwan_enabled(enabled),
        )
        .await
    }

    async fn wifi_device(&self) -> Result<Option<OwnedObjectPath>> {
        let devices = with_timeout("GetDevices", self.timeout, self.nm.get_devices()).await?;

        for path in devices {
            let device = NMDeviceProxy::builder(&self.conn)
                .path(path.clone())?
                .build()
                .await?;

            match device.device_type().await {
                Ok(device_type::WIFI) => return Ok(Some(path)),
                Ok(_) => {}
                Err(e) => debug!("Skipping device {}: {e}", path.as_str()),
            }
        }
        Ok(None)
    }

    async fn saved_connections(&self, id: &str) -> Result<Vec<SavedConnection>> {
        let paths = with_timeout(
            "ListConnections",
            self.timeout,
            self.settings.list_connections(),
        )
        .await?;

        let mut found = Vec::new();
        for path in paths {
            let profile = NMSettingsConnectionProxy::builder(&self.conn)
                .path(path.clone())?
                .build()
                .await?;
            let context = format!("GetSettings on {}", path.as_str());
            let settings = match with_timeout(&context, self.timeout, profile.get_settings()).await {
                Ok(settings) => settings,
                Err(e) => {
                    debug!("Skipping profile {}: {e}", path.as_str());
                    continue;
                }
            };

            let Some(connection) = settings.get("connection") else {
                continue;
            };
            if setting_str(connection, "id").as_deref() != Some(id) {
                continue;
            }
            match setting_str(connection, "uuid") {
                Some(uuid) => found.push(SavedConnection { path, uuid }),
                None => warn!("Profile {} has no UUID", path.as_str()),
            }
        }
        Ok(found)
    }

    async fn add_and_activate_connection(
        &self,
        settings: ConnectionSettings,
        device: &OwnedObjectPath,
    ) -> Result<(OwnedObjectPath, OwnedObjectPath)> {
        with_timeout(
            "AddAndActivateConnection",
            self.timeout,
            self.nm
                .add_and_activate_connection(settings, device.clone(), root_object()?),
        )
        .await
    }

    async fn activate_connection(
        &self,
        connection: &OwnedObjectPath,
        device: &OwnedObjectPath,
    ) -> Result<OwnedObjectPath> {
        with_timeout(
            "ActivateConnection",
            self.timeout,
            self.nm
                .activate_connection(connection.clone(), device.clone(), root_object()?),
        )
        .await
    }

    async fn update_connection(
        &self,
        connection: &OwnedObjectPath,
        settings: ConnectionSettings,
    ) -> Result<()> {
        let profile = NMSettingsConnectionProxy::builder(&self.conn)
            .path(connection.clone())?
            .build()
            .await?;
        let context = format!("Update on {}", connection.as_str());
        with_timeout(&context, self.timeout, profile.update(settings)).await
    }

    async fn delete_connection(&self, connection: &OwnedObjectPath) -> Result<()> {
        let profile = NMSettingsConnectionProxy::builder(&self.conn)
            .path(connection.clone())?
            .build()
            .await?;
        let context = format!("Delete on {}", connection.as_str());
        with_timeout(&context, self.timeout, profile.delete()).await
    }

    async fn deactivate_connection(&self, active: &OwnedObjectPath) -> Result<()> {
        with_timeout(
            "DeactivateConnection",
            self.timeout,
            self.nm.deactivate_connection(active.clone()),
        )
        .await
    }

    async fn property_changes(&self) -> Result<BoxStream<'static, ()>> {
        let state = self.nm.receive_state_changed().await;
        let metered = self.nm.receive_metered_changed().await;
        let wireless = self.nm.receive_wireless_enabled_changed().await;

        let streams: Vec<BoxStream<'static, ()>> = vec![
            state.map(|_| ()).boxed(),
            metered.map(|_| ()).boxed(),
            wireless.map(|_| ()).boxed(),
        ];
        Ok(stream::select_all(streams).boxed())
    }
}

#[derive(Debug)]
struct LocalState {
    flight_mode: bool,
    /// Wi-Fi switch state before flight mode was entered.
    wifi_before_flight: bool,
    unstoppable_operation: bool,
    hotspot: HotspotState,
    active_hotspot: Option<OwnedObjectPath>,
}

/// Connectivity source talking to NetworkManager.
pub struct NetworkManagerSource {
    bus: Arc<dyn NetworkManagerBus>,
    local: Mutex<LocalState>,
    /// Held for the whole of a hotspot start, stop or restart.
    hotspot_op: tokio::sync::Mutex<()>,
    events: broadcast::Sender<SourceEvent>,
}

fn is_metered(code: u32) -> bool {
    matches!(code, metered::YES | metered::GUESS_YES)
}

fn log_rollback(what: &str, result: Result<()>) {
    match result {
        Ok(()) => debug!("Restored {what}"),
        Err(e) => warn!("Failed to restore {what}: {e}"),
    }
}

impl NetworkManagerSource {
    /// Creates a source on top of `bus`.
    ///
    /// A saved hotspot profile, if any, marks the hotspot as stored.
    pub async fn new(bus: Arc<dyn NetworkManagerBus>) -> Result<Self> {
        let mut hotspot = default_hotspot();
        hotspot.stored = !bus.saved_connections(CONNECTION_ID).await?.is_empty();

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            bus,
            local: Mutex::new(LocalState {
                flight_mode: false,
                wifi_before_flight: true,
                unstoppable_operation: false,
                hotspot,
                active_hotspot: None,
            }),
            hotspot_op: tokio::sync::Mutex::new(()),
            events,
        })
    }

    /// Connects to NetworkManager on `conn`.
    pub async fn connect(conn: &Connection, timeout: Duration) -> Result<Self> {
        let bus = DbusNetworkManager::new(conn, timeout).await?;
        Self::new(Arc::new(bus)).await
    }

    fn lock(&self) -> MutexGuard<'_, LocalState> {
        self.local.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        let _ = self.events.send(SourceEvent::Changed);
    }

    /// Reports a failure to listeners and passes the result through.
    fn reported<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            warn!("{e}");
            let _ = self.events.send(SourceEvent::Error(e.to_string()));
        }
        result
    }

    /// Switches both radios. A failure on the second radio puts the first
    /// one back.
    async fn apply_flight_mode(&self, enabled: bool) -> Result<()> {
        if enabled {
            let wifi = self.bus.wireless_enabled().await?;
            self.bus.set_wireless_enabled(false).await?;
            if let Err(e) = self.bus.set_wwan_enabled(false).await {
                log_rollback("WirelessEnabled", self.bus.set_wireless_enabled(wifi).await);
                return Err(e);
            }
            self.lock().wifi_before_flight = wifi;
        } else {
            let wifi = self.lock().wifi_before_flight;
            self.bus.set_wwan_enabled(true).await?;
            if let Err(e) = self.bus.set_wireless_enabled(wifi).await {
                log_rollback("WwanEnabled", self.bus.set_wwan_enabled(false).await);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Brings the saved hotspot profile up to date and activates it,
    /// creating the profile on first use.
    async fn activate_profile(
        &self,
        hotspot: &HotspotState,
        device: &OwnedObjectPath,
    ) -> Result<OwnedObjectPath> {
        let mut saved = self
            .bus
            .saved_connections(CONNECTION_ID)
            .await?
            .into_iter();

        let Some(profile) = saved.next() else {
            let (profile, active) = self
                .bus
                .add_and_activate_connection(hotspot_settings(hotspot, None), device)
                .await?;
            debug!("Created hotspot profile {}", profile.as_str());
            return Ok(active);
        };

        // Only one hotspot profile is kept
        for duplicate in saved {
            match self.bus.delete_connection(&duplicate.path).await {
                Ok(()) => debug!("Deleted duplicate profile {}", duplicate.path.as_str()),
                Err(e) => warn!(
                    "Failed to delete duplicate profile {}: {e}",
                    duplicate.path.as_str()
                ),
            }
        }

        self.bus
            .update_connection(&profile.path, hotspot_settings(hotspot, Some(&profile.uuid)))
            .await?;
        self.bus.activate_connection(&profile.path, device).await
    }

    async fn start_hotspot(&self) -> Result<()> {
        let (hotspot, running) = {
            let local = self.lock();
            (local.hotspot.clone(), local.active_hotspot.is_some())
        };
        if running {
            debug!("Hotspot already active");
            return Ok(());
        }

        let device = self
            .bus
            .wifi_device()
            .await?
            .ok_or(ConnectivityError::NoWifiDevice)?;
        let active = self.activate_profile(&hotspot, &device).await?;

        info!("Hotspot activated: {}", active.as_str());
        let mut local = self.lock();
        local.hotspot.enabled = true;
        local.hotspot.stored = true;
        local.active_hotspot = Some(active);
        Ok(())
    }

    async fn stop_hotspot(&self) -> Result<()> {
        let active = self.lock().active_hotspot.clone();

        if let Some(active) = active {
            self.bus.deactivate_connection(&active).await?;
            info!("Hotspot deactivated");
        }

        let mut local = self.lock();
        local.active_hotspot = None;
        local.hotspot.enabled = false;
        Ok(())
    }

    /// Applies a settings change, restarting the hotspot if it is running.
    async fn update_hotspot<F>(&self, update: F) -> Result<()>
    where
        F: FnOnce(&mut HotspotState),
    {
        let _op = self.hotspot_op.lock().await;

        let enabled = {
            let mut local = self.lock();
            update(&mut local.hotspot);
            local.hotspot.enabled
        };
        self.notify();

        if enabled {
            debug!("Restarting hotspot with new settings");
            self.stop_hotspot().await?;
            self.start_hotspot().await?;
            self.notify();
        }
        Ok(())
    }
}

#[async_trait]
impl ConnectivitySource for NetworkManagerSource {
    async fn snapshot(&self) -> Result<SourceState> {
        let status_code = self.bus.state().await?;
        let metered_code = self.bus.metered().await?;
        let wifi_enabled = self.bus.wireless_enabled().await?;

        let characteristics = if is_metered(metered_code) {
            Characteristics::IS_BANDWIDTH_LIMITED
        } else {
            Characteristics::empty()
        };

        let local = self.lock();
        Ok(SourceState {
            status_code,
            characteristics,
            flight_mode: local.flight_mode,
            wifi_enabled,
            unstoppable_operation: local.unstoppable_operation,
            hotspot: local.hotspot.clone(),
        })
    }

    async fn events(&self) -> Result<BoxStream<'static, SourceEvent>> {
        let changes = self.bus.property_changes().await?;
        debug!("Subscribed to NetworkManager property changes");

        let streams: Vec<BoxStream<'static, SourceEvent>> = vec![
            changes.map(|()| SourceEvent::Changed).boxed(),
            broadcast_stream(self.events.subscribe()),
        ];
        Ok(stream::select_all(streams).boxed())
    }

    async fn set_flight_mode(&self, enabled: bool) -> Result<()> {
        let busy = {
            let mut local = self.lock();
            if local.unstoppable_operation {
                true
            } else if local.flight_mode == enabled {
                return Ok(());
            } else {
                local.unstoppable_operation = true;
                false
            }
        };
        if busy {
            return self.reported(Err(ConnectivityError::InProgress("flight mode switch")));
        }
        self.notify();

        let result = self.apply_flight_mode(enabled).await;

        {
            let mut local = self.lock();
            local.unstoppable_operation = false;
            if result.is_ok() {
                local.flight_mode = enabled;
            }
        }
        self.notify();

        if result.is_ok() {
            info!("Flight mode {}", if enabled { "enabled" } else { "disabled" });
        }
        self.reported(result)
    }

    async fn set_wifi_enabled(&self, enabled: bool) -> Result<()> {
        let result = self.bus.set_wireless_enabled(enabled).await;
        self.notify();
        self.reported(result)
    }

    async fn set_hotspot_enabled(&self, enabled: bool) -> Result<()> {
        let result = {
            let _op = self.hotspot_op.lock().await;
            if enabled {
                self.start_hotspot().await
            } else {
                self.stop_hotspot().await
            }
        };
        self.notify();
        self.reported(result)
    }

    async fn set_hotspot_ssid(&self, ssid: Vec<u8>) -> Result<()> {
        let result = match validate_ssid(&ssid) {
            Ok(()) => self.update_hotspot(|hotspot| hotspot.ssid = ssid).await,
            Err(e) => Err(e),
        };
        self.reported(result)
    }

    async fn set_hotspot_password(&self, password: String) -> Result<()> {
        let result = match validate_password(&password) {
            Ok(()) => {
                self.update_hotspot(|hotspot| hotspot.password = password)
                    .await
            }
            Err(e) => Err(e),
        };
        self.reported(result)
    }

    async fn set_hotspot_mode(&self, mode: String) -> Result<()> {
        let result = match validate_mode(&mode) {
            Ok(()) => self.update_hotspot(|hotspot| hotspot.mode = mode).await,
            Err(e) => Err(e),
        };
        self.reported(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::constants::nm_state;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Notify;
    use zvariant::Value;

    fn path(p: &str) -> OwnedObjectPath {
        OwnedObjectPath::try_from(p).unwrap()
    }

    fn rejected(context: &str) -> ConnectivityError {
        ConnectivityError::DbusOperation {
            context: context.into(),
            source: zbus::Error::Failure("rejected".into()),
        }
    }

    #[derive(Default)]
    struct Radios {
        wireless: bool,
        wwan: bool,
    }

    /// In-memory NetworkManager recording every profile and activation.
    #[derive(Default)]
    struct FakeNm {
        radios: Mutex<Radios>,
        profiles: Mutex<Vec<SavedConnection>>,
        updates: Mutex<Vec<(OwnedObjectPath, ConnectionSettings)>>,
        deleted: Mutex<Vec<OwnedObjectPath>>,
        activated: Mutex<Vec<OwnedObjectPath>>,
        deactivated: Mutex<Vec<OwnedObjectPath>>,
        created: AtomicUsize,
        fail_wwan: AtomicBool,
        fail_deactivate: AtomicBool,
        /// Parks the next Wi-Fi switch until `release` is notified.
        hold_wireless: AtomicBool,
        entered: Notify,
        release: Notify,
    }

    impl FakeNm {
        fn next_active(&self) -> OwnedObjectPath {
            let mut activated = self.activated.lock().unwrap();
            let active = path(&format!(
                "/org/freedesktop/NetworkManager/ActiveConnection/{}",
                activated.len() + 1
            ));
            activated.push(active.clone());
            active
        }
    }

    #[async_trait]
    impl NetworkManagerBus for FakeNm {
        async fn state(&self) -> Result<u32> {
            Ok(nm_state::CONNECTED_GLOBAL)
        }

        async fn metered(&self) -> Result<u32> {
            Ok(metered::GUESS_YES)
        }

        async fn wireless_enabled(&self) -> Result<bool> {
            Ok(self.radios.lock().unwrap().wireless)
        }

        async fn set_wireless_enabled(&self, enabled: bool) -> Result<()> {
            if self.hold_wireless.swap(false, Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            self.radios.lock().unwrap().wireless = enabled;
            Ok(())
        }

        async fn set_wwan_enabled(&self, enabled: bool) -> Result<()> {
            if self.fail_wwan.load(Ordering::SeqCst) {
                return Err(rejected("set WwanEnabled"));
            }
            self.radios.lock().unwrap().wwan = enabled;
            Ok(())
        }

        async fn wifi_device(&self) -> Result<Option<OwnedObjectPath>> {
            Ok(Some(path("/org/freedesktop/NetworkManager/Devices/3")))
        }

        async fn saved_connections(&self, id: &str) -> Result<Vec<SavedConnection>> {
            assert_eq!(id, "Hotspot");
            Ok(self.profiles.lock().unwrap().clone())
        }

        async fn add_and_activate_connection(
            &self,
            settings: ConnectionSettings,
            _device: &OwnedObjectPath,
        ) -> Result<(OwnedObjectPath, OwnedObjectPath)> {
            let uuid = match &settings["connection"]["uuid"] {
                Value::Str(uuid) => uuid.to_string(),
                other => panic!("unexpected uuid value: {other:?}"),
            };
            let profile = {
                let mut profiles = self.profiles.lock().unwrap();
                let profile = path(&format!(
                    "/org/freedesktop/NetworkManager/Settings/{}",
                    profiles.len() + 1
                ));
                profiles.push(SavedConnection {
                    path: profile.clone(),
                    uuid,
                });
                profile
            };
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok((profile, self.next_active()))
        }

        async fn activate_connection(
            &self,
            connection: &OwnedObjectPath,
            _device: &OwnedObjectPath,
        ) -> Result<OwnedObjectPath> {
            assert!(
                self.profiles
                    .lock()
                    .unwrap()
                    .iter()
                    .any(|profile| &profile.path == connection)
            );
            Ok(self.next_active())
        }

        async fn update_connection(
            &self,
            connection: &OwnedObjectPath,
            settings: ConnectionSettings,
        ) -> Result<()> {
            self.updates
                .lock()
                .unwrap()
                .push((connection.clone(), settings));
            Ok(())
        }

        async fn delete_connection(&self, connection: &OwnedObjectPath) -> Result<()> {
            self.profiles
                .lock()
                .unwrap()
                .retain(|profile| &profile.path != connection);
            self.deleted.lock().unwrap().push(connection.clone());
            Ok(())
        }

        async fn deactivate_connection(&self, active: &OwnedObjectPath) -> Result<()> {
            if self.fail_deactivate.load(Ordering::SeqCst) {
                return Err(rejected("DeactivateConnection"));
            }
            self.deactivated.lock().unwrap().push(active.clone());
            Ok(())
        }

        async fn property_changes(&self) -> Result<BoxStream<'static, ()>> {
            Ok(stream::pending::<()>().boxed())
        }
    }

    fn fake() -> Arc<FakeNm> {
        let nm = FakeNm::default();
        *nm.radios.lock().unwrap() = Radios {
            wireless: true,
            wwan: true,
        };
        Arc::new(nm)
    }

    async fn source(nm: &Arc<FakeNm>) -> Arc<NetworkManagerSource> {
        Arc::new(NetworkManagerSource::new(nm.clone()).await.unwrap())
    }

    #[test]
    fn metered_codes() {
        assert!(is_metered(metered::YES));
        assert!(is_metered(metered::GUESS_YES));
        assert!(!is_metered(0));
        assert!(!is_metered(2));
        assert!(!is_metered(4));
    }

    #[test]
    fn setting_str_reads_strings_only() {
        let mut section = HashMap::new();
        section.insert("id".to_string(), Value::from("Hotspot").try_into().unwrap());
        section.insert("autoconnect".to_string(), OwnedValue::from(false));

        assert_eq!(setting_str(&section, "id").as_deref(), Some("Hotspot"));
        assert_eq!(setting_str(&section, "autoconnect"), None);
        assert_eq!(setting_str(&section, "uuid"), None);
    }

    #[tokio::test]
    async fn snapshot_reads_network_manager() {
        let nm = fake();
        let source = source(&nm).await;

        let state = source.snapshot().await.unwrap();
        assert_eq!(state.status_code, nm_state::CONNECTED_GLOBAL);
        assert_eq!(state.characteristics, Characteristics::IS_BANDWIDTH_LIMITED);
        assert!(state.wifi_enabled);
        assert!(!state.flight_mode);
        assert!(!state.hotspot.stored);
    }

    #[tokio::test]
    async fn flight_mode_switch_is_unstoppable() {
        let nm = fake();
        nm.hold_wireless.store(true, Ordering::SeqCst);
        let source = source(&nm).await;

        let switch = tokio::spawn({
            let source = source.clone();
            async move { source.set_flight_mode(true).await }
        });
        nm.entered.notified().await;

        assert!(source.snapshot().await.unwrap().unstoppable_operation);
        assert!(matches!(
            source.set_flight_mode(false).await,
            Err(ConnectivityError::InProgress(_))
        ));

        nm.release.notify_one();
        switch.await.unwrap().unwrap();

        let state = source.snapshot().await.unwrap();
        assert!(!state.unstoppable_operation);
        assert!(state.flight_mode);
        assert!(!state.wifi_enabled);
        assert!(!nm.radios.lock().unwrap().wwan);
    }

    #[tokio::test]
    async fn leaving_flight_mode_restores_wifi() {
        let nm = fake();
        let source = source(&nm).await;

        source.set_flight_mode(true).await.unwrap();
        assert!(!nm.radios.lock().unwrap().wireless);

        source.set_flight_mode(false).await.unwrap();
        let radios = nm.radios.lock().unwrap();
        assert!(radios.wireless);
        assert!(radios.wwan);
    }

    #[tokio::test]
    async fn wifi_switched_off_before_flight_mode_stays_off() {
        let nm = fake();
        nm.radios.lock().unwrap().wireless = false;
        let source = source(&nm).await;

        source.set_flight_mode(true).await.unwrap();
        source.set_flight_mode(false).await.unwrap();

        let radios = nm.radios.lock().unwrap();
        assert!(!radios.wireless);
        assert!(radios.wwan);
    }

    #[tokio::test]
    async fn failed_wwan_switch_puts_wifi_back() {
        let nm = fake();
        nm.fail_wwan.store(true, Ordering::SeqCst);
        let source = source(&nm).await;

        let err = source.set_flight_mode(true).await.unwrap_err();
        assert!(matches!(err, ConnectivityError::DbusOperation { .. }));

        assert!(nm.radios.lock().unwrap().wireless);
        let state = source.snapshot().await.unwrap();
        assert!(!state.flight_mode);
        assert!(!state.unstoppable_operation);
    }

    #[tokio::test]
    async fn invalid_setting_emits_error_event() {
        let nm = fake();
        let source = source(&nm).await;
        let mut events = source.events().await.unwrap();

        assert!(source.set_hotspot_password("short".into()).await.is_err());

        match events.next().await {
            Some(SourceEvent::Error(message)) => assert!(message.contains("password")),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(nm.updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn enabling_running_hotspot_is_noop() {
        let nm = fake();
        let source = source(&nm).await;

        source.set_hotspot_enabled(true).await.unwrap();
        source.set_hotspot_enabled(true).await.unwrap();

        assert_eq!(nm.created.load(Ordering::SeqCst), 1);
        assert_eq!(nm.activated.lock().unwrap().len(), 1);
        assert_eq!(nm.profiles.lock().unwrap().len(), 1);

        let state = source.snapshot().await.unwrap();
        assert!(state.hotspot.enabled);
        assert!(state.hotspot.stored);
    }

    #[tokio::test]
    async fn setting_change_restarts_running_hotspot() {
        let nm = fake();
        let source = source(&nm).await;

        source.set_hotspot_enabled(true).await.unwrap();
        source.set_hotspot_ssid(b"Cafe".to_vec()).await.unwrap();
        assert!(source.snapshot().await.unwrap().hotspot.enabled);

        let activated = nm.activated.lock().unwrap().clone();
        assert_eq!(activated.len(), 2);
        assert_eq!(*nm.deactivated.lock().unwrap(), vec![activated[0].clone()]);

        let profiles = nm.profiles.lock().unwrap().clone();
        assert_eq!(profiles.len(), 1);
        assert_eq!(nm.created.load(Ordering::SeqCst), 1);

        let updates = nm.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        let (profile, settings) = &updates[0];
        assert_eq!(profile, &profiles[0].path);
        assert_eq!(
            settings["802-11-wireless"]["ssid"],
            Value::from(b"Cafe".to_vec())
        );
        assert_eq!(
            settings["connection"]["uuid"],
            Value::from(profiles[0].uuid.clone())
        );
    }

    #[tokio::test]
    async fn setting_change_on_stopped_hotspot_only_updates_state() {
        let nm = fake();
        let source = source(&nm).await;

        source.set_hotspot_mode("adhoc".into()).await.unwrap();

        assert!(nm.activated.lock().unwrap().is_empty());
        let state = source.snapshot().await.unwrap();
        assert_eq!(state.hotspot.mode, "adhoc");
        assert!(!state.hotspot.enabled);
    }

    #[tokio::test]
    async fn saved_profile_is_reused_and_duplicates_deleted() {
        let nm = fake();
        nm.profiles.lock().unwrap().extend([
            SavedConnection {
                path: path("/org/freedesktop/NetworkManager/Settings/7"),
                uuid: "uuid-7".into(),
            },
            SavedConnection {
                path: path("/org/freedesktop/NetworkManager/Settings/8"),
                uuid: "uuid-8".into(),
            },
        ]);
        let source = source(&nm).await;
        assert!(source.snapshot().await.unwrap().hotspot.stored);

        source.set_hotspot_enabled(true).await.unwrap();

        assert_eq!(nm.created.load(Ordering::SeqCst), 0);
        assert_eq!(
            *nm.deleted.lock().unwrap(),
            vec![path("/org/freedesktop/NetworkManager/Settings/8")]
        );
        let updates = nm.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(
            updates[0].0,
            path("/org/freedesktop/NetworkManager/Settings/7")
        );
        assert_eq!(updates[0].1["connection"]["uuid"], Value::from("uuid-7"));
    }

    #[tokio::test]
    async fn failed_deactivate_keeps_active_connection() {
        let nm = fake();
        let source = source(&nm).await;
        source.set_hotspot_enabled(true).await.unwrap();

        nm.fail_deactivate.store(true, Ordering::SeqCst);
        assert!(source.set_hotspot_enabled(false).await.is_err());
        assert!(source.snapshot().await.unwrap().hotspot.enabled);

        nm.fail_deactivate.store(false, Ordering::SeqCst);
        source.set_hotspot_enabled(false).await.unwrap();

        assert_eq!(
            *nm.deactivated.lock().unwrap(),
            *nm.activated.lock().unwrap()
        );
        assert!(!source.snapshot().await.unwrap().hotspot.enabled);
    }
}
