//! Type definitions and constants.
//!
//! This module contains bus names, NetworkManager codes and timeouts.

pub(crate) mod constants;
