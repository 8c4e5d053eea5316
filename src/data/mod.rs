//! Data layer module
//!
//! Handles all data persistence:
//! - Store boundary (paths, batches, `DocumentStore` trait)
//! - SQLite implementation of the store
//! - Live subscriptions over store changes

mod database;
mod models;
mod store;
mod subscription;

pub use database::{DEFAULT_CHANGE_CAPACITY, Database};
pub use models::*;
pub use store::*;
pub use subscription::{LiveFeed, LiveQuery, Snapshot, Subscription, SubscriptionHandle};
