//! Blockwise Subscriptions
//!
//! Filter lists, their on-disk cache, background refresh and the
//! [`Manager`] that answers block / allow / hide queries across all of
//! them.
//!
//! # Modules
//!
//! - `subscription`: One list and its load / refresh state machine
//! - `manager`: Aggregated queries, editing and the event loop
//! - `cache`: Cache file format and limited EasyList truncation
//! - `fetch`: Download abstraction and the HTTP implementation
//! - `scheduler`: Deferred task queue
//! - `events`: Change notifications
//! - `disabled`: Disabled-filter registry
//! - `config`: JSON engine configuration
//! - `catalog`: Well-known lists

pub mod cache;
pub mod catalog;
pub mod config;
pub mod disabled;
pub mod error;
pub mod events;
pub mod fetch;
pub mod manager;
pub mod scheduler;
pub mod subscription;

pub use catalog::{known_subscriptions, KnownSubscription, EASYLIST_URL};
pub use config::{EngineConfig, SubscriptionConfig};
pub use disabled::DisabledRules;
pub use error::{ConfigError, FetchError, SubscriptionError};
pub use events::EngineEvent;
pub use fetch::{Fetcher, HttpFetcher};
pub use manager::{Manager, Verdict};
pub use subscription::{
    Capabilities, LoadOutcome, Subscription, SubscriptionId, SubscriptionKind, SubscriptionState, TRUSTED_RULES,
};
