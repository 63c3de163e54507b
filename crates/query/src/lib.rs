//! Keyed data-fetch cache.
//!
//! `QueryCache` holds the deterministic bookkeeping (freshness, observers,
//! garbage collection); `QueryClient` adds async fetching with request
//! deduplication on top of it.

pub mod cache;
pub mod client;
pub mod key;
pub mod options;
pub mod state;

pub use cache::*;
pub use client::*;
pub use key::*;
pub use options::*;
pub use state::*;
