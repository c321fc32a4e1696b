//! Test helpers and utilities for integration tests

use hub2::dispatch::Dispatcher;
use hub2::store::{MemoryPersistence, RecipientKey, SubscriptionStore, TopicStore};
use hub2::testing::MockSink;
use serde_json::{json, Value};
use std::sync::Arc;

#[allow(dead_code)]
pub fn topics(list: &[&str]) -> Vec<String> {
    list.iter().map(|t| t.to_string()).collect()
}

/// Fresh in-memory store
#[allow(dead_code)]
pub fn memory_store() -> Arc<dyn SubscriptionStore> {
    Arc::new(TopicStore::new(MemoryPersistence::new()))
}

/// Direct chat key (originator == destination)
#[allow(dead_code)]
pub fn direct_key(id: &str, name: &str) -> RecipientKey {
    RecipientKey::direct(id, name).unwrap()
}

/// Group chat key
#[allow(dead_code)]
pub fn group_key(originator: &str, name: &str, chat: &str) -> RecipientKey {
    RecipientKey::new(originator, name, chat).unwrap()
}

#[allow(dead_code)]
pub fn dispatcher_for(store: Arc<dyn SubscriptionStore>) -> (Dispatcher, Arc<MockSink>) {
    let sink = Arc::new(MockSink::new());
    (Dispatcher::new(store, sink.clone()), sink)
}

/// Raw inbound publish notification
#[allow(dead_code)]
pub fn message_frame(topic: &str, message: Value) -> String {
    json!({ "type": "MESSAGE", "topic": topic, "message": message }).to_string()
}

#[allow(dead_code)]
pub fn text_frame(topic: &str, kind: &str, data: &str) -> String {
    message_frame(topic, json!({ "type": kind, "data": data }))
}
