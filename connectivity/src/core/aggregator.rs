//! Derivation of the published connectivity state.
//!
//! The [`StatusAggregator`] reads a [`SourceState`] from its
//! [`ConnectivitySource`], maps it onto an [`AggregatedState`] and reports
//! which fields actually changed. The aggregate is replaced under a single
//! write lock, so readers never observe a half-updated state.

use async_trait::async_trait;
use futures::stream::BoxStream;
use log::debug;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use crate::Result;
use crate::api::models::{
    AggregatedState, Characteristics, HotspotState, Limitation, NetworkingStatus,
};
use crate::core::bridge::{PrivateProperty, PublicProperty};

/// Aggregated state shared between the aggregator, the bridge and the bus
/// objects.
pub type SharedState = Arc<RwLock<AggregatedState>>;

/// Acquires a read guard, recovering from a poisoned lock.
pub(crate) fn read_state(state: &RwLock<AggregatedState>) -> RwLockReadGuard<'_, AggregatedState> {
    state.read().unwrap_or_else(PoisonError::into_inner)
}

/// Raw state reported by a connectivity source.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceState {
    /// NetworkManager `NMState` code.
    pub status_code: u32,
    pub characteristics: Characteristics,
    pub flight_mode: bool,
    pub wifi_enabled: bool,
    pub unstoppable_operation: bool,
    pub hotspot: HotspotState,
}

/// Notification from a connectivity source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    /// Some part of the source state may have changed.
    Changed,
    /// An asynchronous operation failed. Carries a human readable message.
    Error(String),
}

/// The system that knows the actual connectivity state.
///
/// Setters return once the request has been accepted. Failures that happen
/// afterwards are reported through [`SourceEvent::Error`].
#[async_trait]
pub trait ConnectivitySource: Send + Sync {
    /// Reads the current state.
    async fn snapshot(&self) -> Result<SourceState>;

    /// Subscribes to change notifications.
    async fn events(&self) -> Result<BoxStream<'static, SourceEvent>>;

    async fn set_flight_mode(&self, enabled: bool) -> Result<()>;
    async fn set_wifi_enabled(&self, enabled: bool) -> Result<()>;
    async fn set_hotspot_enabled(&self, enabled: bool) -> Result<()>;
    async fn set_hotspot_ssid(&self, ssid: Vec<u8>) -> Result<()>;
    async fn set_hotspot_password(&self, password: String) -> Result<()>;
    async fn set_hotspot_mode(&self, mode: String) -> Result<()>;
}

/// Fields changed by one recomputation, split by publication target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changes {
    pub public: Vec<PublicProperty>,
    pub private: Vec<PrivateProperty>,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        self.public.is_empty() && self.private.is_empty()
    }
}

/// Computes the fields that differ between two aggregates.
fn diff(old: &AggregatedState, new: &AggregatedState) -> Changes {
    let mut changes = Changes::default();

    if old.status != new.status {
        changes.public.push(PublicProperty::Status);
    }
    if old.limitations != new.limitations {
        changes.public.push(PublicProperty::Limitations);
    }
    if old.wifi_enabled != new.wifi_enabled {
        changes.public.push(PublicProperty::WifiEnabled);
    }
    if old.flight_mode != new.flight_mode {
        changes.public.push(PublicProperty::FlightMode);
    }
    if old.unstoppable_operation != new.unstoppable_operation {
        changes
            .public
            .push(PublicProperty::UnstoppableOperationHappening);
    }
    if old.hotspot.enabled != new.hotspot.enabled {
        changes.public.push(PublicProperty::HotspotEnabled);
    }
    if old.hotspot.ssid != new.hotspot.ssid {
        changes.public.push(PublicProperty::HotspotSsid);
    }
    if old.hotspot.mode != new.hotspot.mode {
        changes.public.push(PublicProperty::HotspotMode);
    }
    if old.hotspot.stored != new.hotspot.stored {
        changes.public.push(PublicProperty::HotspotStored);
    }
    if old.hotspot.password != new.hotspot.password {
        changes.private.push(PrivateProperty::HotspotPassword);
    }

    changes
}

/// Derives [`AggregatedState`] from a [`ConnectivitySource`].
pub struct StatusAggregator {
    source: Arc<dyn ConnectivitySource>,
    state: SharedState,
}

impl StatusAggregator {
    pub fn new(source: Arc<dyn ConnectivitySource>) -> Self {
        Self {
            source,
            state: SharedState::default(),
        }
    }

    /// Handle to the shared aggregate, for readers.
    pub fn state(&self) -> SharedState {
        self.state.clone()
    }

    /// Copy of the current aggregate.
    pub fn current(&self) -> AggregatedState {
        read_state(&self.state).clone()
    }

    pub fn source(&self) -> Arc<dyn ConnectivitySource> {
        self.source.clone()
    }

    /// Re-reads the source and updates the aggregate.
    ///
    /// Returns the fields whose value changed. Calling it again without a
    /// source change returns no changes.
    pub async fn recompute(&self) -> Result<Changes> {
        let snapshot = self.source.snapshot().await?;

        let next = AggregatedState {
            status: NetworkingStatus::from_nm_state(snapshot.status_code),
            limitations: Limitation::from_characteristics(snapshot.characteristics),
            flight_mode: snapshot.flight_mode,
            wifi_enabled: snapshot.wifi_enabled,
            hotspot: snapshot.hotspot,
            unstoppable_operation: snapshot.unstoppable_operation,
        };

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let changes = diff(&state, &next);
        if !changes.is_empty() {
            debug!("Aggregate changed: {changes:?}");
            *state = next;
        }
        Ok(changes)
    }
}
