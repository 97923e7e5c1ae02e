//! Listing Push - push-notification dispatch for new real-estate listings
//!
//! When a listing is created, the dispatcher works out which users want to hear
//! about it, sends alerts to their Android devices through the batched gateway
//! and to their Apple devices through the per-device gateway, and prunes device
//! tokens the gateways report as dead.

pub mod config;
pub mod core;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use core::{matches, DispatchOptions, Dispatcher};
pub use models::{DispatchSummary, ListingCreatedEvent, NotificationPreference, DeviceRegistration};
