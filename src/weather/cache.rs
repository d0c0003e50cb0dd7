//! Two-level read-through forecast cache: a bounded in-memory LRU in front
//! of an optional shared layer (a Redis client implements the trait outside
//! this crate). Entries are replaced, never edited in place.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::weather::WeatherObservation;

/// Optional process-external cache layer.
pub trait SharedForecastCache: Send + Sync {
    fn get(&self, key: &str) -> impl Future<Output = Option<WeatherObservation>> + Send;
    fn set(
        &self,
        key: &str,
        value: WeatherObservation,
        ttl: Duration,
    ) -> impl Future<Output = ()> + Send;
}

/// The default: no second level.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSharedCache;

impl SharedForecastCache for NoSharedCache {
    async fn get(&self, _key: &str) -> Option<WeatherObservation> {
        None
    }

    async fn set(&self, _key: &str, _value: WeatherObservation, _ttl: Duration) {}
}

struct Entry {
    observation: WeatherObservation,
    expires: Instant,
}

pub struct ForecastCache<C = NoSharedCache> {
    memory: Mutex<LruCache<String, Entry>>,
    shared: C,
    ttl: Duration,
}

impl ForecastCache<NoSharedCache> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self::with_shared(capacity, ttl, NoSharedCache)
    }
}

impl<C: SharedForecastCache> ForecastCache<C> {
    pub fn with_shared(capacity: usize, ttl: Duration, shared: C) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            memory: Mutex::new(LruCache::new(capacity)),
            shared,
            ttl,
        }
    }

    pub async fn get(&self, key: &str) -> Option<WeatherObservation> {
        {
            let mut memory = self.memory.lock().expect("forecast cache poisoned");
            if let Some(entry) = memory.get(key) {
                if entry.expires > Instant::now() {
                    return Some(entry.observation);
                }
                memory.pop(key);
            }
        }
        if let Some(observation) = self.shared.get(key).await {
            self.store_in_memory(key, observation);
            return Some(observation);
        }
        None
    }

    pub async fn set(&self, key: &str, observation: WeatherObservation) {
        self.store_in_memory(key, observation);
        self.shared.set(key, observation, self.ttl).await;
    }

    fn store_in_memory(&self, key: &str, observation: WeatherObservation) {
        let mut memory = self.memory.lock().expect("forecast cache poisoned");
        memory.put(
            key.to_string(),
            Entry { observation, expires: Instant::now() + self.ttl },
        );
    }

    pub fn clear(&self) {
        self.memory.lock().expect("forecast cache poisoned").clear();
    }
}
