//! Core internal logic: mirroring remote objects, deriving the published
//! state and turning it into notifications.

pub(crate) mod aggregator;
pub(crate) mod bridge;
pub(crate) mod control;
pub(crate) mod hotspot;
pub(crate) mod modems;
pub(crate) mod network_manager;
pub(crate) mod proxy;
