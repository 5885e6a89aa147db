//! Core types, relay protocol, and service wiring for the bindays lookup engine.

/// Relay client configuration.
pub mod config;
/// Error taxonomy shared by the resolution machine and every collector.
pub mod error;
/// Domain models and relay protocol envelopes.
pub mod model;
/// Date inference, bin matching, and bin-day normalization.
pub mod normalize;
/// Registry mapping authority identifiers to collectors.
pub mod plugin;
/// Traits describing the collector state machines.
pub mod ports;
/// GOV.UK postcode to authority resolution.
pub mod resolution;
/// Scraping helpers for hidden fields, cookies, and form bodies.
pub mod scrape;
/// High-level service facade used by relay clients.
pub mod service;

pub use config::*;
pub use error::*;
pub use model::*;
pub use plugin::*;
pub use ports::*;
pub use service::*;
