//! Mirrors cellular and network connectivity state from oFono and
//! NetworkManager and republishes it on D-Bus as
//! `com.ubuntu.connectivity1`.
//!
//! The crate is organized as a small pipeline:
//!
//! - [`ModemManager`] tracks the modems oFono knows about, kept current by
//!   `ModemAdded` / `ModemRemoved` signals.
//! - [`StatusAggregator`] derives an [`AggregatedState`] from a
//!   [`ConnectivitySource`] such as [`NetworkManagerSource`].
//! - [`NotificationBridge`] turns each change into a minimal
//!   `PropertiesChanged` signal on the public or the restricted object.
//! - [`ControlFacade`] forwards privileged requests (flight mode, Wi-Fi,
//!   hotspot, SIM unlock) received on the restricted object.
//!
//! [`ConnectivityService`] wires all of this to a bus connection.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use connectivity::{ConnectivityService, ModemManager, NetworkManagerSource, OfonoBus, ServiceConfig};
//!
//! # async fn example() -> connectivity::Result<()> {
//! let conn = zbus::Connection::system().await?;
//! let config = ServiceConfig::default();
//!
//! let modems = ModemManager::new(Arc::new(OfonoBus::new(&conn, config.call_timeout))).await?;
//! let source = Arc::new(NetworkManagerSource::connect(&conn, config.call_timeout).await?);
//!
//! let service = ConnectivityService::start(&conn, source, Some(Arc::new(modems)), config).await?;
//! println!("{}", service.state().status);
//! # Ok(())
//! # }
//! ```
//!
//! # Logging
//!
//! This crate uses the [`log`](https://docs.rs/log) facade. Install a logger
//! such as `env_logger` to see its output.

// Internal implementation modules
mod core;
mod dbus;
mod types;
mod util;

// Public API modules
pub mod api;

// Re-exported public API
pub use api::config::ServiceConfig;
pub use api::models::{
    AggregatedState, Characteristics, ConnectivityError, HotspotState, Limitation,
    NetworkingStatus, ObjectHandle, RegistrationStatus, UnlockRequest,
};
pub use api::service::ConnectivityService;
pub use crate::core::aggregator::{
    Changes, ConnectivitySource, SharedState, SourceEvent, SourceState, StatusAggregator,
};
pub use crate::core::bridge::{
    DbusSink, NotificationBridge, NotificationSink, PrivateNotification, PrivateProperty,
    PropertiesChanged, PublicNotification, PublicProperty,
};
pub use crate::core::control::ControlFacade;
pub use crate::core::modems::{
    Modem, ModemBus, ModemChange, ModemEvent, ModemManager, NetworkRegistration, OfonoBus,
    registration,
};
pub use crate::core::hotspot::ConnectionSettings;
pub use crate::core::network_manager::{
    DbusNetworkManager, NetworkManagerBus, NetworkManagerSource, SavedConnection,
};
pub use crate::core::proxy::{Property, PropertyBag, Subscription, subscribe};
pub use crate::dbus::{NetworkingStatusObject, PrivateObject};

/// A specialized `Result` type for connectivity operations.
pub type Result<T> = std::result::Result<T, ConnectivityError>;
