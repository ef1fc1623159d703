//! Native client for the realtime CRM feed.
//!
//! Three concerns, one module each:
//! - [`socket`] — connection lifecycle with automatic reconnect
//! - [`cursors`] — collaborative cursor presence over the shared funnel view
//! - [`invalidation`] — mapping inbound events to query-cache invalidations

pub mod cursors;
pub mod invalidation;
pub mod socket;
