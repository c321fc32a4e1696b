//! [`SubscriptionStore`] over any [`Persistence`]

use super::key::RecipientKey;
use super::persistence::{Persistence, PersistenceResult, StoreData, TopicRecord};
use super::SubscriptionStore;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// Reserved key holding the upstream snapshot.
///
/// It has no separator, so it can never collide with a [`RecipientKey`].
pub const UPSTREAM_KEY: &str = "__hub_upstream__";

/// Subscription store backed by a persistence collaborator
///
/// # Examples
/// ```
/// use hub2::store::{MemoryPersistence, RecipientKey, SubscriptionStore, TopicStore};
///
/// let store = TopicStore::new(MemoryPersistence::new());
/// let key = RecipientKey::direct("42", "alice").unwrap();
/// let topics = store.add_topics(&key, &["news".into(), "art".into()]).unwrap();
/// assert_eq!(topics, vec!["art", "news"]);
/// ```
#[derive(Debug)]
pub struct TopicStore<P> {
    persistence: P,
}

fn normalized(topics: impl IntoIterator<Item = String>) -> Vec<String> {
    topics
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

impl<P: Persistence> TopicStore<P> {
    pub fn new(persistence: P) -> Self {
        Self { persistence }
    }

    pub fn persistence(&self) -> &P {
        &self.persistence
    }

    /// Apply `update` to one key's topic set and return the sorted result
    fn update_record(
        &self,
        key: &str,
        update: impl FnOnce(BTreeSet<String>) -> BTreeSet<String>,
    ) -> PersistenceResult<Vec<String>> {
        self.persistence.transact(|data| {
            let record = data.entry(key.to_string()).or_default();
            let current = std::mem::take(&mut record.topics).into_iter().collect();
            record.topics = update(current).into_iter().collect();
            record.topics.clone()
        })
    }

    fn recipient_records(data: &StoreData) -> impl Iterator<Item = (&String, &TopicRecord)> {
        data.iter().filter(|(key, _)| key.as_str() != UPSTREAM_KEY)
    }
}

impl<P: Persistence> SubscriptionStore for TopicStore<P> {
    fn get_topics(&self, key: &RecipientKey) -> PersistenceResult<Vec<String>> {
        self.update_record(&key.to_string(), |topics| topics)
    }

    fn set_topics(&self, key: &RecipientKey, topics: &[String]) -> PersistenceResult<Vec<String>> {
        let replacement: BTreeSet<String> = topics.iter().cloned().collect();
        self.update_record(&key.to_string(), |_| replacement)
    }

    fn add_topics(&self, key: &RecipientKey, topics: &[String]) -> PersistenceResult<Vec<String>> {
        self.update_record(&key.to_string(), |mut current| {
            current.extend(topics.iter().cloned());
            current
        })
    }

    fn remove_topics(
        &self,
        key: &RecipientKey,
        topics: &[String],
    ) -> PersistenceResult<Vec<String>> {
        self.update_record(&key.to_string(), |mut current| {
            for topic in topics {
                current.remove(topic);
            }
            current
        })
    }

    fn clear_topics(&self, key: &RecipientKey) -> PersistenceResult<Vec<String>> {
        self.update_record(&key.to_string(), |_| BTreeSet::new())
    }

    fn all_topics(&self) -> PersistenceResult<Vec<String>> {
        self.persistence.transact(|data| {
            normalized(
                Self::recipient_records(data)
                    .flat_map(|(_, record)| record.topics.iter().cloned()),
            )
        })
    }

    fn key_topics_map(&self) -> PersistenceResult<BTreeMap<RecipientKey, Vec<String>>> {
        self.persistence.transact(|data| {
            let mut map = BTreeMap::new();
            for (raw_key, record) in Self::recipient_records(data) {
                match raw_key.parse::<RecipientKey>() {
                    Ok(key) => {
                        map.insert(key, normalized(record.topics.iter().cloned()));
                    }
                    Err(e) => warn!(key = %raw_key, error = %e, "Skipping unparseable store key"),
                }
            }
            map
        })
    }

    fn upstream_snapshot(&self) -> PersistenceResult<Vec<String>> {
        self.persistence.transact(|data| {
            data.get(UPSTREAM_KEY)
                .map(|record| normalized(record.topics.iter().cloned()))
                .unwrap_or_default()
        })
    }

    fn set_upstream_snapshot(&self, topics: &[String]) -> PersistenceResult<()> {
        let topics = normalized(topics.iter().cloned());
        self.persistence.transact(|data| {
            data.entry(UPSTREAM_KEY.to_string()).or_default().topics = topics;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryPersistence;

    fn topics(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    fn store() -> TopicStore<MemoryPersistence> {
        TopicStore::new(MemoryPersistence::new())
    }

    #[test]
    fn test_get_initializes_empty_record() {
        let store = store();
        let key = RecipientKey::direct("1", "a").unwrap();
        assert!(store.get_topics(&key).unwrap().is_empty());
        assert_eq!(store.key_topics_map().unwrap().len(), 1);
    }

    #[test]
    fn test_set_add_remove_clear() {
        let store = store();
        let key = RecipientKey::direct("1", "a").unwrap();

        assert_eq!(
            store.set_topics(&key, &topics(&["b", "a", "b"])).unwrap(),
            topics(&["a", "b"])
        );
        assert_eq!(
            store.add_topics(&key, &topics(&["c", "a"])).unwrap(),
            topics(&["a", "b", "c"])
        );
        assert_eq!(
            store.remove_topics(&key, &topics(&["b", "zzz"])).unwrap(),
            topics(&["a", "c"])
        );
        assert!(store.clear_topics(&key).unwrap().is_empty());
        // Cleared records stay around
        assert!(store.key_topics_map().unwrap().contains_key(&key));
    }

    #[test]
    fn test_upstream_snapshot_is_excluded_from_recipients() {
        let store = store();
        let key = RecipientKey::direct("1", "a").unwrap();
        store.add_topics(&key, &topics(&["news"])).unwrap();
        store
            .set_upstream_snapshot(&topics(&["old", "news"]))
            .unwrap();

        assert_eq!(store.all_topics().unwrap(), topics(&["news"]));
        assert_eq!(store.key_topics_map().unwrap().len(), 1);
        assert_eq!(store.upstream_snapshot().unwrap(), topics(&["news", "old"]));
    }

    #[test]
    fn test_unparseable_keys_are_skipped() {
        let mut data = StoreData::new();
        data.insert(
            "legacy-chat-id".to_string(),
            TopicRecord {
                topics: topics(&["x"]),
            },
        );
        let store = TopicStore::new(MemoryPersistence::with_data(data));
        assert!(store.key_topics_map().unwrap().is_empty());
        // Still counted as interest so the hub keeps delivering it
        assert_eq!(store.all_topics().unwrap(), topics(&["x"]));
    }
}
