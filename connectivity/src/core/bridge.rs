//! Outbound `PropertiesChanged` notifications.
//!
//! Every published property belongs to exactly one bus object. Public
//! properties are [`PublicProperty`] values and can only reach
//! [`NotificationSink::publish_public`]; the hotspot password is a
//! [`PrivateProperty`] and can only reach
//! [`NotificationSink::publish_private`]. Notifications are built inside this
//! module, so a secret can't end up on the public object by accident.

use async_trait::async_trait;
use log::debug;
use std::collections::BTreeMap;
use std::sync::Arc;
use zbus::Connection;
use zbus::names::BusName;
use zbus::object_server::SignalEmitter;
use zvariant::{OwnedObjectPath, Value};

use crate::Result;
use crate::api::models::{AggregatedState, ConnectivityError};
use crate::core::aggregator::{Changes, SharedState, read_state};
use crate::dbus::PrivateObject;
use crate::types::constants::service;

/// Property published on the public `NetworkingStatus` object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PublicProperty {
    Status,
    Limitations,
    WifiEnabled,
    FlightMode,
    UnstoppableOperationHappening,
    HotspotEnabled,
    HotspotSsid,
    HotspotMode,
    HotspotStored,
}

impl PublicProperty {
    /// Property name on the bus.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Status => "Status",
            Self::Limitations => "Limitations",
            Self::WifiEnabled => "WifiEnabled",
            Self::FlightMode => "FlightMode",
            Self::UnstoppableOperationHappening => "UnstoppableOperationHappening",
            Self::HotspotEnabled => "HotspotEnabled",
            Self::HotspotSsid => "HotspotSsid",
            Self::HotspotMode => "HotspotMode",
            Self::HotspotStored => "HotspotStored",
        }
    }

    fn value(&self, state: &AggregatedState) -> Value<'static> {
        match self {
            Self::Status => Value::from(state.status.as_str()),
            Self::Limitations => Value::from(state.limitation_names()),
            Self::WifiEnabled => Value::from(state.wifi_enabled),
            Self::FlightMode => Value::from(state.flight_mode),
            Self::UnstoppableOperationHappening => Value::from(state.unstoppable_operation),
            Self::HotspotEnabled => Value::from(state.hotspot.enabled),
            Self::HotspotSsid => Value::from(state.hotspot.ssid.clone()),
            Self::HotspotMode => Value::from(state.hotspot.mode.clone()),
            Self::HotspotStored => Value::from(state.hotspot.stored),
        }
    }
}

/// Property published on the restricted `Private` object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrivateProperty {
    HotspotPassword,
}

impl PrivateProperty {
    pub fn name(&self) -> &'static str {
        match self {
            Self::HotspotPassword => "HotspotPassword",
        }
    }

    fn value(&self, state: &AggregatedState) -> Value<'static> {
        match self {
            Self::HotspotPassword => Value::from(state.hotspot.password.clone()),
        }
    }
}

/// Body of an `org.freedesktop.DBus.Properties.PropertiesChanged` signal.
///
/// `invalidated` is always empty: every changed value is sent inline.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertiesChanged {
    interface: &'static str,
    changed: BTreeMap<String, Value<'static>>,
    invalidated: Vec<String>,
}

impl PropertiesChanged {
    fn new(interface: &'static str, changed: BTreeMap<String, Value<'static>>) -> Self {
        Self {
            interface,
            changed,
            invalidated: Vec::new(),
        }
    }

    pub fn interface(&self) -> &str {
        self.interface
    }

    pub fn changed(&self) -> &BTreeMap<String, Value<'static>> {
        &self.changed
    }

    pub fn invalidated(&self) -> &[String] {
        &self.invalidated
    }
}

/// Notification for the public object. Only built by [`NotificationBridge`].
#[derive(Debug, Clone, PartialEq)]
pub struct PublicNotification(PropertiesChanged);

impl PublicNotification {
    pub fn body(&self) -> &PropertiesChanged {
        &self.0
    }
}

/// Notification for the restricted object. Only built by [`NotificationBridge`].
#[derive(Debug, Clone, PartialEq)]
pub struct PrivateNotification(PropertiesChanged);

impl PrivateNotification {
    pub fn body(&self) -> &PropertiesChanged {
        &self.0
    }
}

/// Destination of property change notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish_public(&self, notification: PublicNotification) -> Result<()>;
    async fn publish_private(&self, notification: PrivateNotification) -> Result<()>;

    /// Emits `ReportError` on the restricted object.
    async fn report_error(&self, message: &str) -> Result<()>;
}

/// [`NotificationSink`] that emits `PropertiesChanged` signals on D-Bus.
#[derive(Debug, Clone)]
pub struct DbusSink {
    conn: Connection,
    public_path: OwnedObjectPath,
    private_path: OwnedObjectPath,
}

impl DbusSink {
    pub fn new(
        conn: &Connection,
        public_path: OwnedObjectPath,
        private_path: OwnedObjectPath,
    ) -> Self {
        Self {
            conn: conn.clone(),
            public_path,
            private_path,
        }
    }

    async fn emit(&self, path: &OwnedObjectPath, body: &PropertiesChanged) -> Result<()> {
        self.conn
            .emit_signal(
                None::<BusName<'_>>,
                path.as_str(),
                service::PROPERTIES_INTERFACE,
                service::PROPERTIES_CHANGED,
                &(body.interface, &body.changed, &body.invalidated),
            )
            .await
            .map_err(|source| ConnectivityError::DbusOperation {
                context: format!("failed to emit PropertiesChanged on {}", path.as_str()),
                source,
            })
    }
}

#[async_trait]
impl NotificationSink for DbusSink {
    async fn publish_public(&self, notification: PublicNotification) -> Result<()> {
        self.emit(&self.public_path, notification.body()).await
    }

    async fn publish_private(&self, notification: PrivateNotification) -> Result<()> {
        self.emit(&self.private_path, notification.body()).await
    }

    async fn report_error(&self, message: &str) -> Result<()> {
        let emitter = SignalEmitter::new(&self.conn, self.private_path.as_str())?;
        PrivateObject::report_error(&emitter, message)
            .await
            .map_err(|source| ConnectivityError::DbusOperation {
                context: "failed to emit ReportError".into(),
                source,
            })
    }
}

/// Turns aggregate changes into notifications.
pub struct NotificationBridge {
    state: SharedState,
    sink: Arc<dyn NotificationSink>,
}

impl NotificationBridge {
    pub fn new(state: SharedState, sink: Arc<dyn NotificationSink>) -> Self {
        Self { state, sink }
    }

    /// Publishes the current values of `properties` on the public object.
    ///
    /// Values are read when the notification is built, not when the change
    /// was detected.
    pub async fn notify_public(&self, properties: &[PublicProperty]) -> Result<()> {
        if properties.is_empty() {
            return Ok(());
        }

        let changed = {
            let state = read_state(&self.state);
            properties
                .iter()
                .map(|p| (p.name().to_string(), p.value(&state)))
                .collect()
        };

        debug!("Publishing {} public property change(s)", properties.len());
        self.sink
            .publish_public(PublicNotification(PropertiesChanged::new(
                service::SERVICE_INTERFACE,
                changed,
            )))
            .await
    }

    /// Publishes the current values of `properties` on the restricted object.
    pub async fn notify_private(&self, properties: &[PrivateProperty]) -> Result<()> {
        if properties.is_empty() {
            return Ok(());
        }

        let changed = {
            let state = read_state(&self.state);
            properties
                .iter()
                .map(|p| (p.name().to_string(), p.value(&state)))
                .collect()
        };

        debug!("Publishing {} private property change(s)", properties.len());
        self.sink
            .publish_private(PrivateNotification(PropertiesChanged::new(
                service::PRIVATE_INTERFACE,
                changed,
            )))
            .await
    }

    /// Sends the notifications for one recomputation.
    ///
    /// Both targets are attempted; the first error is returned.
    pub async fn dispatch(&self, changes: &Changes) -> Result<()> {
        let public = self.notify_public(&changes.public).await;
        let private = self.notify_private(&changes.private).await;
        public.and(private)
    }

    /// Forwards an asynchronous failure to the restricted object.
    pub async fn report_error(&self, message: &str) -> Result<()> {
        self.sink.report_error(message).await
    }
}
