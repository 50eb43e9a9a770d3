//! Feed acquisition: cache, fallback fetching, polling and the
//! consumer-facing service.

pub mod cache;
pub mod client;
pub mod scheduler;
pub mod service;

pub use cache::{
    CacheEntry, CachePayload, CacheStore, DataCache, FileStore, MemoryStore, PersistedRecord,
};
pub use client::{EventCache, FeedClient};
pub use scheduler::{PollEvent, PollingScheduler};
pub use service::{FeedSnapshot, NearbyOptions, SeismicService};
