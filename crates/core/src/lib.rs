//! Core social logic for geofeed.
//!
//! Everything a screen derives from raw rows lives here: relationship
//! states, the per-session friend graph, feed pages with reaction and
//! comment aggregates, threaded comment layout and the card stack viewer.
//! The remote store is reached only through the traits in
//! [`services::store`].

pub mod services;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use services::*;
