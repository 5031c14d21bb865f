//! Push-based stream composition
//!
//! This module provides the `Stream` type, its constructors and the
//! operator set. A stream is a lazy description; subscribing instantiates
//! per-subscription operator state and wires emitters downstream-to-
//! upstream, so independent subscriptions never share state.

pub mod bridge;
pub mod combine;
pub mod constructors;
pub mod core;
pub mod rate;
pub mod transform;

pub use self::core::{Emitter, Stream};
