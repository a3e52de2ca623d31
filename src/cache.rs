//! Research cache
//!
//! Time-windowed dedup of research topics. A topic is not re-researched while
//! `now - last_computed_at < window`; feature topics and behavior-pattern
//! topics carry different windows.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::{behavior_cache_window, feature_cache_window};
use crate::database::{Database, queries};

/// Window class of a research topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicClass {
    /// Capability-level topics (default 1 hour)
    Feature,
    /// Observed-behavior topics (default 30 minutes)
    BehaviorPattern,
}

/// Storage behind the cache: `get` answers (timestamp, found), `put` upserts
pub trait CacheStore: Send + Sync {
    fn get(&self, topic: &str) -> Result<Option<DateTime<Utc>>>;
    fn put(&self, topic: &str, data: Option<&serde_json::Value>, at: DateTime<Utc>) -> Result<()>;
}

/// Process-local cache store used by test mode and tests
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<String, (DateTime<Utc>, Option<serde_json::Value>)>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, topic: &str) -> Result<Option<DateTime<Utc>>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("Research cache lock poisoned"))?;
        Ok(entries.get(topic).map(|(at, _)| *at))
    }

    fn put(&self, topic: &str, data: Option<&serde_json::Value>, at: DateTime<Utc>) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("Research cache lock poisoned"))?;
        let entry = entries.entry(topic.to_string()).or_insert((at, None));
        entry.0 = at;
        if let Some(data) = data {
            entry.1 = Some(data.clone());
        }
        Ok(())
    }
}

/// SQLite-backed cache store sharing the research database
pub struct SqliteCacheStore {
    db: Database,
}

impl SqliteCacheStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl CacheStore for SqliteCacheStore {
    fn get(&self, topic: &str) -> Result<Option<DateTime<Utc>>> {
        let conn = self.db.lock()?;
        Ok(queries::get_cache_entry(&conn, topic)?.map(|entry| entry.last_computed_at))
    }

    fn put(&self, topic: &str, data: Option<&serde_json::Value>, at: DateTime<Utc>) -> Result<()> {
        let conn = self.db.lock()?;
        queries::put_cache_entry(&conn, topic, data, &at)
    }
}

/// Cache state for one topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResearchCacheEntry {
    pub topic: String,
    pub last_computed_at: DateTime<Utc>,
    pub window_seconds: u64,
}

impl ResearchCacheEntry {
    /// True while the entry still suppresses re-research
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.last_computed_at);
        age.num_seconds() < self.window_seconds as i64
    }
}

/// Time-windowed research dedup
#[derive(Clone)]
pub struct ResearchCache {
    store: Arc<dyn CacheStore>,
    feature_window: Duration,
    behavior_window: Duration,
}

impl ResearchCache {
    /// Cache with windows taken from the environment
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self::with_windows(store, feature_cache_window(), behavior_cache_window())
    }

    pub fn with_windows(
        store: Arc<dyn CacheStore>,
        feature_window: Duration,
        behavior_window: Duration,
    ) -> Self {
        Self {
            store,
            feature_window,
            behavior_window,
        }
    }

    /// In-memory cache with default windows
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCacheStore::new()))
    }

    pub fn window_for(&self, class: TopicClass) -> Duration {
        match class {
            TopicClass::Feature => self.feature_window,
            TopicClass::BehaviorPattern => self.behavior_window,
        }
    }

    /// Feature-class check against the current time
    pub fn should_research(&self, topic: &str) -> Result<bool> {
        self.should_research_at(topic, TopicClass::Feature, Utc::now())
    }

    /// Class-aware check against the current time
    pub fn should_research_class(&self, topic: &str, class: TopicClass) -> Result<bool> {
        self.should_research_at(topic, class, Utc::now())
    }

    /// True if the topic was never recorded or its window has elapsed at `now`
    pub fn should_research_at(
        &self,
        topic: &str,
        class: TopicClass,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        Ok(match self.entry(topic, class)? {
            Some(entry) => !entry.is_live_at(now),
            None => true,
        })
    }

    /// Record a topic as researched now
    pub fn record(&self, topic: &str, data: Option<&serde_json::Value>) -> Result<()> {
        self.record_at(topic, data, Utc::now())
    }

    pub fn record_at(
        &self,
        topic: &str,
        data: Option<&serde_json::Value>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.store.put(topic, data, at)
    }

    /// Current cache state of a topic under the given class window
    pub fn entry(&self, topic: &str, class: TopicClass) -> Result<Option<ResearchCacheEntry>> {
        Ok(self.store.get(topic)?.map(|last_computed_at| ResearchCacheEntry {
            topic: topic.to_string(),
            last_computed_at,
            window_seconds: self.window_for(class).as_secs(),
        }))
    }
}
