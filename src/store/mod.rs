//! Subscription store
//!
//! Durable mapping from [`RecipientKey`] to the topics that recipient wants,
//! plus the upstream snapshot: the topics the live hub connection is believed
//! to be subscribed to. Components receive the store as an explicit
//! `Arc<dyn SubscriptionStore>` handle.

pub mod key;
pub mod persistence;
pub mod topic_store;

use std::collections::BTreeMap;

pub use key::{KeyError, RecipientKey, KEY_SEPARATOR};
pub use persistence::{
    JsonFilePersistence, MemoryPersistence, Persistence, PersistenceError, PersistenceResult,
    StoreData, TopicRecord,
};
pub use topic_store::{TopicStore, UPSTREAM_KEY};

/// Atomic topic-interest operations
///
/// Every method is a single read-modify-write unit. Topic lists are returned
/// sorted and deduplicated.
///
/// Methods are synchronous and may block the calling thread while waiting
/// for the file lock, bounded by the configured lock timeout. A lock that
/// cannot be taken in time fails with `LockTimeout`.
pub trait SubscriptionStore: Send + Sync {
    /// Topics of `key`, creating an empty record on first access
    fn get_topics(&self, key: &RecipientKey) -> PersistenceResult<Vec<String>>;

    fn set_topics(&self, key: &RecipientKey, topics: &[String]) -> PersistenceResult<Vec<String>>;

    /// Set union
    fn add_topics(&self, key: &RecipientKey, topics: &[String]) -> PersistenceResult<Vec<String>>;

    /// Set difference
    fn remove_topics(
        &self,
        key: &RecipientKey,
        topics: &[String],
    ) -> PersistenceResult<Vec<String>>;

    fn clear_topics(&self, key: &RecipientKey) -> PersistenceResult<Vec<String>>;

    /// Union of every recipient's topics, excluding the upstream snapshot
    fn all_topics(&self) -> PersistenceResult<Vec<String>>;

    /// Every recipient with its topics, excluding the upstream snapshot
    fn key_topics_map(&self) -> PersistenceResult<BTreeMap<RecipientKey, Vec<String>>>;

    fn upstream_snapshot(&self) -> PersistenceResult<Vec<String>>;

    fn set_upstream_snapshot(&self, topics: &[String]) -> PersistenceResult<()>;
}

/// Split a comma-separated topic argument, trimming whitespace and dropping
/// empty entries
pub fn parse_topic_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|topic| !topic.is_empty())
        .map(str::to_string)
        .collect()
}
