//! Modem discovery and tracking.
//!
//! [`ModemManager`] keeps a keyed collection of the modems oFono knows
//! about. It is populated by one enumeration call at construction and then
//! kept current by the `ModemAdded` / `ModemRemoved` signals.
//!
//! Hot-plug events arrive asynchronously and unordered relative to readers,
//! so every structural change and every traversal goes through a single
//! mutex. Membership churn is rare compared to reads, which keeps the
//! contention low.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use log::{debug, info, warn};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use zbus::Connection;
use zvariant::OwnedValue;

use crate::Result;
use crate::api::models::{ObjectHandle, RegistrationStatus};
use crate::core::proxy::{Property, PropertyBag, Subscription, subscribe};
use crate::dbus::{NetworkRegistrationProxy, OfonoManagerProxy};
use crate::util::utils::with_timeout;

/// Capacity of the modem change broadcast channel.
const CHANGE_CAPACITY: usize = 32;

/// Typed properties of `org.ofono.NetworkRegistration`.
pub mod registration {
    use crate::core::proxy::Property;

    macro_rules! registration_property {
        ($(#[$meta:meta])* $name:ident, $value:ty) => {
            $(#[$meta])*
            #[derive(Debug, Clone, Copy)]
            pub struct $name;

            impl Property for $name {
                const NAME: &'static str = stringify!($name);
                type Value = $value;
            }
        };
    }

    registration_property!(
        /// Registration status (`registered`, `roaming`, `searching`, ...).
        Status,
        String
    );
    registration_property!(
        /// Registration mode (`auto`, `auto-only`, `manual`).
        Mode,
        String
    );
    registration_property!(LocationAreaCode, u16);
    registration_property!(CellId, u32);
    registration_property!(MobileCountryCode, String);
    registration_property!(MobileNetworkCode, String);
    registration_property!(
        /// Access technology (`gsm`, `edge`, `umts`, `hspa`, `lte`).
        Technology,
        String
    );
    registration_property!(
        /// Signal strength in percent.
        Strength,
        u8
    );
    registration_property!(
        /// Operator name.
        Name,
        String
    );
}

/// Snapshot of the network registration of one modem.
#[derive(Debug, Default)]
pub struct NetworkRegistration {
    properties: PropertyBag,
}

impl NetworkRegistration {
    pub fn from_properties(properties: PropertyBag) -> Self {
        Self { properties }
    }

    pub fn properties(&self) -> &PropertyBag {
        &self.properties
    }

    /// Reads a typed property, falling back to the type's default.
    pub fn get<P: Property>(&self) -> P::Value {
        self.properties.get(P::NAME, P::Value::default())
    }

    /// Reads a typed property, falling back to `default`.
    pub fn get_or<P: Property>(&self, default: P::Value) -> P::Value {
        self.properties.get(P::NAME, default)
    }

    pub fn status(&self) -> RegistrationStatus {
        RegistrationStatus::from(self.get::<registration::Status>().as_str())
    }
}

/// A modem tracked by the [`ModemManager`].
#[derive(Debug)]
pub struct Modem {
    handle: ObjectHandle,
    network_registration: NetworkRegistration,
    hints: HashMap<String, String>,
    /// Set when the modem is inserted into a [`ModemManager`].
    generation: u64,
}

impl Modem {
    pub fn new(
        handle: ObjectHandle,
        properties: PropertyBag,
        hints: HashMap<String, String>,
    ) -> Self {
        Self {
            handle,
            network_registration: NetworkRegistration::from_properties(properties),
            hints,
            generation: 0,
        }
    }

    pub fn handle(&self) -> &ObjectHandle {
        &self.handle
    }

    pub fn network_registration(&self) -> &NetworkRegistration {
        &self.network_registration
    }

    /// String-valued properties announced by oFono for this modem.
    pub fn hints(&self) -> &HashMap<String, String> {
        &self.hints
    }
}

/// Membership event delivered by the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModemEvent {
    Added {
        handle: ObjectHandle,
        hints: HashMap<String, String>,
    },
    Removed(ObjectHandle),
}

/// Membership change applied to a [`ModemManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModemChange {
    Added(ObjectHandle),
    Removed(ObjectHandle),
}

/// The bus primitives the modem manager needs.
///
/// Implemented by [`OfonoBus`] on top of a D-Bus connection, and by fakes in
/// tests.
#[async_trait]
pub trait ModemBus: Send + Sync {
    /// Lists all current modems with their string-valued properties.
    async fn get_modems(&self) -> Result<Vec<(ObjectHandle, HashMap<String, String>)>>;

    /// Fetches the network registration properties of one modem.
    async fn get_properties(&self, modem: &ObjectHandle) -> Result<PropertyBag>;

    /// Subscribes to modem added/removed events.
    async fn modem_events(&self) -> Result<BoxStream<'static, ModemEvent>>;
}

/// [`ModemBus`] backed by oFono on a D-Bus connection.
///
/// The connection is shared and outlives every modem; modems never own it.
#[derive(Debug, Clone)]
pub struct OfonoBus {
    conn: Connection,
    timeout: Duration,
}

impl OfonoBus {
    pub fn new(conn: &Connection, timeout: Duration) -> Self {
        Self {
            conn: conn.clone(),
            timeout,
        }
    }
}

/// Keeps the string-valued entries of a signal property map.
fn string_hints(properties: &HashMap<String, OwnedValue>) -> HashMap<String, String> {
    properties
        .iter()
        .filter_map(|(name, value)| {
            let value = value.try_clone().ok()?;
            String::try_from(value).ok().map(|s| (name.clone(), s))
        })
        .collect()
}

#[async_trait]
impl ModemBus for OfonoBus {
    async fn get_modems(&self) -> Result<Vec<(ObjectHandle, HashMap<String, String>)>> {
        let manager = OfonoManagerProxy::new(&self.conn).await?;
        let modems = with_timeout("GetModems", self.timeout, manager.get_modems()).await?;
        Ok(modems
            .into_iter()
            .map(|(path, properties)| (ObjectHandle::from(path), string_hints(&properties)))
            .collect())
    }

    async fn get_properties(&self, modem: &ObjectHandle) -> Result<PropertyBag> {
        let registration = NetworkRegistrationProxy::builder(&self.conn)
            .path(modem.path().clone())?
            .build()
            .await?;
        let context = format!("GetProperties on {modem}");
        let properties =
            with_timeout(&context, self.timeout, registration.get_properties()).await?;
        Ok(PropertyBag::new(properties))
    }

    async fn modem_events(&self) -> Result<BoxStream<'static, ModemEvent>> {
        let manager = OfonoManagerProxy::new(&self.conn).await?;

        let added = manager
            .receive_modem_added()
            .await?
            .filter_map(|signal| async move {
                match signal.args() {
                    Ok(args) => Some(ModemEvent::Added {
                        handle: ObjectHandle::from(args.path.clone()),
                        hints: string_hints(&args.properties),
                    }),
                    Err(e) => {
                        warn!("Failed to parse ModemAdded signal args: {e}");
                        None
                    }
                }
            });

        let removed = manager
            .receive_modem_removed()
            .await?
            .filter_map(|signal| async move {
                match signal.args() {
                    Ok(args) => Some(ModemEvent::Removed(ObjectHandle::from(args.path.clone()))),
                    Err(e) => {
                        warn!("Failed to parse ModemRemoved signal args: {e}");
                        None
                    }
                }
            });

        debug!("Subscribed to oFono ModemAdded/ModemRemoved signals");
        Ok(futures::stream::select(added, removed).boxed())
    }
}

#[derive(Default)]
struct ModemMap {
    entries: BTreeMap<ObjectHandle, Modem>,
    /// Bumped on every insert.
    generation: u64,
}

impl ModemMap {
    /// Inserts or replaces a modem. Returns whether an entry was replaced.
    fn insert(&mut self, mut modem: Modem) -> bool {
        self.generation += 1;
        modem.generation = self.generation;
        self.entries.insert(modem.handle.clone(), modem).is_some()
    }
}

fn lock(modems: &Mutex<ModemMap>) -> MutexGuard<'_, ModemMap> {
    modems.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Live collection of modems.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use connectivity::{ModemManager, OfonoBus};
///
/// let conn = zbus::Connection::system().await?;
/// let bus = Arc::new(OfonoBus::new(&conn, std::time::Duration::from_secs(1)));
/// let modems = ModemManager::new(bus).await?;
/// modems.for_each(|modem| println!("{}: {}", modem.handle(), modem.network_registration().status()));
/// ```
pub struct ModemManager {
    bus: Arc<dyn ModemBus>,
    modems: Arc<Mutex<ModemMap>>,
    changes: broadcast::Sender<ModemChange>,
    _subscription: Subscription,
}

impl ModemManager {
    /// Enumerates the current modems and starts tracking hot-plug events.
    ///
    /// Each remote call is bounded by the bus timeout, so construction may
    /// take a while. Any enumeration or property fetch failure is returned.
    pub async fn new(bus: Arc<dyn ModemBus>) -> Result<Self> {
        // Subscribe to signals FIRST so nothing is missed during enumeration
        let events = bus.modem_events().await?;

        let mut modems = ModemMap::default();
        for (handle, hints) in bus.get_modems().await? {
            let properties = bus.get_properties(&handle).await?;
            debug!("Enumerated modem {handle}");
            modems.insert(Modem::new(handle, properties, hints));
        }
        info!("Tracking {} modem(s)", modems.entries.len());

        let modems = Arc::new(Mutex::new(modems));
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);

        let subscription = subscribe(events, {
            let bus = bus.clone();
            let modems = modems.clone();
            let changes = changes.clone();
            move |event| {
                let bus = bus.clone();
                let modems = modems.clone();
                let changes = changes.clone();
                async move { apply_event(bus.as_ref(), &modems, &changes, event).await }
            }
        });

        Ok(Self {
            bus,
            modems,
            changes,
            _subscription: subscription,
        })
    }

    /// Visits every modem while holding the collection lock.
    ///
    /// The visitor must not call back into this manager. Changes that
    /// depend on the traversal should be collected and applied after
    /// `for_each` returns.
    pub fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(&Modem),
    {
        let modems = lock(&self.modems);
        for modem in modems.entries.values() {
            visitor(modem);
        }
    }

    /// Returns the handles of all current modems.
    pub fn handles(&self) -> Vec<ObjectHandle> {
        lock(&self.modems).entries.keys().cloned().collect()
    }

    pub fn contains(&self, handle: &ObjectHandle) -> bool {
        lock(&self.modems).entries.contains_key(handle)
    }

    pub fn len(&self) -> usize {
        lock(&self.modems).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.modems).entries.is_empty()
    }

    /// Re-fetches the network registration of one modem.
    ///
    /// Returns `Ok(false)` if the modem is not tracked, or was removed or
    /// re-added while the fetch was in flight. The entry is only updated
    /// if it is still the one the fetch started for.
    pub async fn refresh(&self, handle: &ObjectHandle) -> Result<bool> {
        let generation = lock(&self.modems)
            .entries
            .get(handle)
            .map(|modem| modem.generation);
        let Some(generation) = generation else {
            return Ok(false);
        };

        let properties = self.bus.get_properties(handle).await?;

        let mut modems = lock(&self.modems);
        match modems.entries.get_mut(handle) {
            Some(modem) if modem.generation == generation => {
                modem.network_registration = NetworkRegistration::from_properties(properties);
                Ok(true)
            }
            Some(_) => {
                debug!("Discarding stale registration of {handle}, modem was re-added");
                Ok(false)
            }
            None => Ok(false),
        }
    }

    /// Subscribes to applied membership changes.
    ///
    /// Changes are sent after the collection lock has been released.
    pub fn changes(&self) -> broadcast::Receiver<ModemChange> {
        self.changes.subscribe()
    }
}

async fn apply_event(
    bus: &dyn ModemBus,
    modems: &Mutex<ModemMap>,
    changes: &broadcast::Sender<ModemChange>,
    event: ModemEvent,
) {
    match event {
        ModemEvent::Added { handle, hints } => {
            let properties = match bus.get_properties(&handle).await {
                Ok(properties) => properties,
                Err(e) => {
                    warn!("Failed to fetch network registration for {handle}: {e}");
                    PropertyBag::default()
                }
            };

            let replaced = lock(modems).insert(Modem::new(handle.clone(), properties, hints));

            if replaced {
                debug!("Replaced existing modem {handle}");
            } else {
                info!("Modem added: {handle}");
            }
            let _ = changes.send(ModemChange::Added(handle));
        }
        ModemEvent::Removed(handle) => {
            let removed = lock(modems).entries.remove(&handle).is_some();
            if removed {
                info!("Modem removed: {handle}");
                let _ = changes.send(ModemChange::Removed(handle));
            } else {
                debug!("Ignoring removal of unknown modem {handle}");
            }
        }
    }
}
