//! Time-aware weather fetching: points are grouped by
//! their ETA rounded up to the next interval, each group becomes one
//! batched upstream request for that future time, and a two-level cache
//! intercepts repeats. Transient upstream errors are retried with backoff.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::config::ceil_to_interval;
use crate::error::RouteError;
use crate::sources::WeatherSource;
use crate::weather::cache::{ForecastCache, NoSharedCache, SharedForecastCache};
use crate::weather::rate_limit::RateLimiter;
use crate::weather::{TimeAwareWeatherPoint, WeatherObservation};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeatherStats {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub api_calls: u64,
    pub batches_processed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeatherServiceConfig {
    pub time_round_minutes: i64,
    pub coord_grid_size_deg: f64,
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
    pub max_calls_per_minute: usize,
    pub transient_retries: usize,
}

impl Default for WeatherServiceConfig {
    fn default() -> Self {
        Self {
            time_round_minutes: 15,
            coord_grid_size_deg: 0.01,
            cache_capacity: 4096,
            cache_ttl: Duration::from_secs(3600),
            max_calls_per_minute: 500,
            transient_retries: 2,
        }
    }
}

pub struct TimeAwareWeatherService<S, C = NoSharedCache> {
    source: S,
    cache: ForecastCache<C>,
    limiter: RateLimiter,
    config: WeatherServiceConfig,
    stats: Mutex<WeatherStats>,
}

impl<S: WeatherSource> TimeAwareWeatherService<S> {
    pub fn new(source: S, config: WeatherServiceConfig) -> Self {
        Self::with_shared_cache(source, config, NoSharedCache)
    }
}

impl<S: WeatherSource, C: SharedForecastCache> TimeAwareWeatherService<S, C> {
    pub fn with_shared_cache(source: S, config: WeatherServiceConfig, shared: C) -> Self {
        Self {
            source,
            cache: ForecastCache::with_shared(config.cache_capacity, config.cache_ttl, shared),
            limiter: RateLimiter::new(config.max_calls_per_minute, Duration::from_secs(60)),
            config,
            stats: Mutex::new(WeatherStats::default()),
        }
    }

    /// Fetch observations for all points, batched per rounded ETA. Returns
    /// a map from point index to observation; a point whose fetch failed
    /// individually gets the default table with `is_default` set. A fully
    /// failed batch is an error the ETA loop decides on.
    pub async fn fetch_for_points(
        &self,
        points: &[TimeAwareWeatherPoint],
    ) -> Result<HashMap<u32, WeatherObservation>, RouteError> {
        if points.is_empty() {
            return Ok(HashMap::new());
        }
        {
            let mut stats = self.stats.lock().expect("weather stats poisoned");
            stats.total_requests += points.len() as u64;
        }

        // Deterministic batch order: group by rounded ETA, earliest first.
        let mut groups: BTreeMap<DateTime<Utc>, Vec<&TimeAwareWeatherPoint>> = BTreeMap::new();
        for point in points {
            let rounded = ceil_to_interval(point.eta, self.config.time_round_minutes);
            groups.entry(rounded).or_default().push(point);
        }

        let mut results = HashMap::with_capacity(points.len());
        for (target_time, group) in groups {
            let batch = self.fetch_batch(&group, target_time).await?;
            results.extend(batch);
        }
        Ok(results)
    }

    async fn fetch_batch(
        &self,
        points: &[&TimeAwareWeatherPoint],
        target_time: DateTime<Utc>,
    ) -> Result<HashMap<u32, WeatherObservation>, RouteError> {
        {
            let mut stats = self.stats.lock().expect("weather stats poisoned");
            stats.batches_processed += 1;
        }

        let mut results = HashMap::new();
        let mut to_fetch: Vec<&TimeAwareWeatherPoint> = Vec::new();
        for &point in points {
            let key = point.cache_key(
                self.config.coord_grid_size_deg,
                self.config.time_round_minutes,
            );
            if let Some(cached) = self.cache.get(&key).await {
                let mut stats = self.stats.lock().expect("weather stats poisoned");
                stats.cache_hits += 1;
                results.insert(point.idx, cached);
            } else {
                to_fetch.push(point);
            }
        }

        if to_fetch.is_empty() {
            return Ok(results);
        }
        debug!(
            "weather batch at {target_time}: {} cached, {} to fetch",
            results.len(),
            to_fetch.len()
        );

        let coords: Vec<(f64, f64)> = to_fetch.iter().map(|p| (p.lat, p.lon)).collect();
        self.limiter.acquire().await;
        {
            let mut stats = self.stats.lock().expect("weather stats poisoned");
            stats.api_calls += to_fetch.len() as u64;
        }
        let fetched = self.fetch_with_retry(&coords, target_time).await?;

        for (i, point) in to_fetch.iter().enumerate() {
            let observation = fetched.get(i).copied().unwrap_or_else(|| {
                warn!("no observation for sample {} at {target_time}, using defaults", point.idx);
                WeatherObservation::default_observation()
            });
            let key = point.cache_key(
                self.config.coord_grid_size_deg,
                self.config.time_round_minutes,
            );
            self.cache.set(&key, observation).await;
            results.insert(point.idx, observation);
        }
        Ok(results)
    }

    async fn fetch_with_retry(
        &self,
        coords: &[(f64, f64)],
        target_time: DateTime<Utc>,
    ) -> Result<Vec<WeatherObservation>, RouteError> {
        let mut backoff = Duration::from_millis(250);
        let mut attempt = 0;
        loop {
            match self.source.fetch_batch_at_time(coords, target_time).await {
                Ok(observations) => return Ok(observations),
                Err(err) if err.is_retriable() && attempt < self.config.transient_retries => {
                    warn!("transient weather error ({err}), retrying in {backoff:?}");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(err) if err.is_retriable() => {
                    return Err(RouteError::WeatherFetchFailed(format!(
                        "retries exhausted: {err}"
                    )));
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub fn stats(&self) -> WeatherStats {
        *self.stats.lock().expect("weather stats poisoned")
    }

    pub fn reset_stats(&self) {
        *self.stats.lock().expect("weather stats poisoned") = WeatherStats::default();
    }

    /// Drop the in-memory cache level (tests use this to force api calls).
    pub fn purge_cache(&self) {
        self.cache.clear();
    }
}
