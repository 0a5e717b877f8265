//! Service entry point: wires the source, aggregator, bridge and bus objects
//! together.

use futures::stream::{self, BoxStream, StreamExt};
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::broadcast;
use zbus::Connection;
use zvariant::OwnedObjectPath;

use crate::Result;
use crate::api::config::ServiceConfig;
use crate::api::models::{AggregatedState, ConnectivityError, UnlockRequest};
use crate::core::aggregator::{ConnectivitySource, SourceEvent, StatusAggregator};
use crate::core::bridge::{DbusSink, NotificationBridge, NotificationSink};
use crate::core::control::ControlFacade;
use crate::core::modems::ModemManager;
use crate::core::proxy::{Subscription, subscribe};
use crate::dbus::{NetworkingStatusObject, PrivateObject};
use crate::util::utils::broadcast_stream;

fn object_path(path: &str) -> Result<OwnedObjectPath> {
    OwnedObjectPath::try_from(path).map_err(|source| ConnectivityError::Decode {
        name: path.to_string(),
        source,
    })
}

fn registration_error(what: String) -> impl FnOnce(zbus::Error) -> ConnectivityError {
    move |source| ConnectivityError::Registration { what, source }
}

/// Merges the source events with a recompute trigger for every modem added
/// or removed.
pub(crate) fn dispatcher_events(
    source: BoxStream<'static, SourceEvent>,
    modems: Option<&ModemManager>,
) -> BoxStream<'static, SourceEvent> {
    let Some(modems) = modems else {
        return source;
    };

    let changes = broadcast_stream(modems.changes()).map(|change| {
        debug!("Modem membership changed: {change:?}");
        SourceEvent::Changed
    });
    stream::select(source, changes).boxed()
}

/// Handles one source event: recompute, publish, and report failures.
pub(crate) async fn handle_source_event(
    aggregator: &StatusAggregator,
    bridge: &NotificationBridge,
    event: SourceEvent,
) {
    if let SourceEvent::Error(message) = &event {
        if let Err(e) = bridge.report_error(message).await {
            warn!("Failed to report error {message:?}: {e}");
        }
    }

    match aggregator.recompute().await {
        Ok(changes) if changes.is_empty() => debug!("No published property changed"),
        Ok(changes) => {
            if let Err(e) = bridge.dispatch(&changes).await {
                error!("Failed to publish property changes: {e}");
            }
        }
        Err(e) => error!("Failed to recompute connectivity state: {e}"),
    }
}

/// The running connectivity service.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use connectivity::{ConnectivityService, NetworkManagerSource, ServiceConfig};
///
/// # async fn example() -> connectivity::Result<()> {
/// let conn = zbus::Connection::system().await?;
/// let config = ServiceConfig::default();
/// let source = Arc::new(NetworkManagerSource::connect(&conn, config.call_timeout).await?);
/// let service = ConnectivityService::start(&conn, source, None, config).await?;
///
/// println!("status: {}", service.state().status);
/// service.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub struct ConnectivityService {
    conn: Connection,
    config: ServiceConfig,
    aggregator: Arc<StatusAggregator>,
    control: Arc<ControlFacade>,
    modems: Option<Arc<ModemManager>>,
    _dispatcher: Subscription,
}

impl ConnectivityService {
    /// Exports both objects, requests the bus name and starts dispatching
    /// source events. Modem additions and removals also trigger a
    /// recomputation.
    ///
    /// The public object is registered before the restricted one, and the
    /// name is only requested once both exist. Any registration failure is
    /// returned as [`ConnectivityError::Registration`].
    pub async fn start(
        conn: &Connection,
        source: Arc<dyn ConnectivitySource>,
        modems: Option<Arc<ModemManager>>,
        config: ServiceConfig,
    ) -> Result<Self> {
        let public_path = object_path(&config.public_path)?;
        let private_path = object_path(&config.private_path)?;

        // Subscribe before the first read so no change is lost
        let events = dispatcher_events(source.events().await?, modems.as_deref());

        let aggregator = Arc::new(StatusAggregator::new(source.clone()));
        aggregator.recompute().await?;
        let control = Arc::new(ControlFacade::new(source, aggregator.state()));

        let server = conn.object_server();
        let added = server
            .at(
                public_path.as_str(),
                NetworkingStatusObject::new(aggregator.state()),
            )
            .await
            .map_err(registration_error(format!("object {}", public_path.as_str())))?;
        if !added {
            return Err(ConnectivityError::Registration {
                what: format!("object {}", public_path.as_str()),
                source: zbus::Error::Failure("interface already registered".into()),
            });
        }

        let added = server
            .at(private_path.as_str(), PrivateObject::new(control.clone()))
            .await
            .map_err(registration_error(format!(
                "object {}",
                private_path.as_str()
            )))?;
        if !added {
            return Err(ConnectivityError::Registration {
                what: format!("object {}", private_path.as_str()),
                source: zbus::Error::Failure("interface already registered".into()),
            });
        }

        conn.request_name(config.bus_name.as_str())
            .await
            .map_err(registration_error(format!("name {}", config.bus_name)))?;
        info!("Registered {} on D-Bus", config.bus_name);

        let sink: Arc<dyn NotificationSink> =
            Arc::new(DbusSink::new(conn, public_path, private_path));
        let bridge = Arc::new(NotificationBridge::new(aggregator.state(), sink));

        let dispatcher = subscribe(events, {
            let aggregator = aggregator.clone();
            move |event| {
                let aggregator = aggregator.clone();
                let bridge = bridge.clone();
                async move { handle_source_event(&aggregator, &bridge, event).await }
            }
        });

        Ok(Self {
            conn: conn.clone(),
            config,
            aggregator,
            control,
            modems,
            _dispatcher: dispatcher,
        })
    }

    /// Copy of the currently published state.
    pub fn state(&self) -> AggregatedState {
        self.aggregator.current()
    }

    /// Unlock requests received on the restricted object.
    pub fn unlock_requests(&self) -> broadcast::Receiver<UnlockRequest> {
        self.control.unlock_requests()
    }

    /// The modem tracker, if the service was started with one.
    pub fn modems(&self) -> Option<&Arc<ModemManager>> {
        self.modems.as_ref()
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Releases the bus name. The dispatcher stops when `self` is dropped.
    pub async fn shutdown(self) -> Result<()> {
        let released = self
            .conn
            .release_name(self.config.bus_name.as_str())
            .await
            .map_err(|source| ConnectivityError::DbusOperation {
                context: format!("failed to release {}", self.config.bus_name),
                source,
            })?;
        if released {
            info!("Released {}", self.config.bus_name);
        } else {
            debug!("{} was not owned", self.config.bus_name);
        }
        Ok(())
    }
}
