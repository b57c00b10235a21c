//! ModelCache implementation with single-flight loading, LRU eviction and idle expiry.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use vecta_abstraction::{Embedding, EmbeddingEngine, EmbeddingProvider, ProviderError};

use super::config::{CacheConfig, CacheConfigError};
use super::error::CacheError;
use super::pool::WorkerPool;
use super::types::{CacheEntry, CacheSnapshot, CacheStats, ModelInfo, RemovalReason};

/// Input used for the smoke-test inference during validation.
pub const VALIDATION_SAMPLE: &str = "test";

/// How many removed models `model_info` keeps answering for.
const REMOVED_HISTORY_LIMIT: usize = 256;

type LoadOutcome = Result<Arc<dyn EmbeddingEngine>, CacheError>;
type LoadSlot = Option<LoadOutcome>;

/// Mutable cache structure. Only ever touched under `Inner::state`.
#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    /// Recency order: stamp -> model id, least recently used first.
    recency: BTreeMap<u64, String>,
    next_stamp: u64,
    /// Loads in flight, keyed by model id.
    loading: HashMap<String, watch::Receiver<LoadSlot>>,
    removed: HashMap<String, ModelInfo>,
    removed_order: VecDeque<String>,
    stats: CacheStats,
}

impl CacheState {
    fn stamp(&mut self) -> u64 {
        self.next_stamp += 1;
        self.next_stamp
    }

    /// Mark `model_id` most recently used and return its engine.
    fn touch(&mut self, model_id: &str) -> Option<Arc<dyn EmbeddingEngine>> {
        let stamp = self.stamp();
        let entry = self.entries.get_mut(model_id)?;
        self.recency.remove(&entry.stamp);
        entry.stamp = stamp;
        entry.last_used = Instant::now();
        self.recency.insert(stamp, model_id.to_string());
        Some(Arc::clone(&entry.engine))
    }

    /// Evict least recently used entries until one more fits under `max_cached`.
    fn evict_to_fit(&mut self, max_cached: usize) -> Vec<(String, CacheEntry)> {
        let mut evicted = Vec::new();
        while self.entries.len() >= max_cached {
            let Some((_, model_id)) = self.recency.pop_first() else {
                break;
            };
            if let Some(entry) = self.entries.remove(&model_id) {
                self.retire(&model_id, &entry, RemovalReason::Lru);
                evicted.push((model_id, entry));
            }
        }
        evicted
    }

    /// Insert at the most recently used position, evicting as needed.
    ///
    /// Returns every entry that left the map so the caller can drop them
    /// after releasing the lock.
    fn insert(
        &mut self,
        model_id: &str,
        mut entry: CacheEntry,
        max_cached: usize,
    ) -> Vec<(String, CacheEntry)> {
        let mut displaced = Vec::new();
        if let Some(previous) = self.entries.remove(model_id) {
            self.recency.remove(&previous.stamp);
            displaced.push((model_id.to_string(), previous));
        }
        let evicted = self.evict_to_fit(max_cached);

        entry.stamp = self.stamp();
        self.recency.insert(entry.stamp, model_id.to_string());
        self.entries.insert(model_id.to_string(), entry);
        self.forget(model_id);
        self.stats.cache_size = self.entries.len();

        log_removals(&evicted, RemovalReason::Lru);
        displaced.extend(evicted);
        displaced
    }

    fn remove(&mut self, model_id: &str, reason: RemovalReason) -> Option<CacheEntry> {
        let entry = self.entries.remove(model_id)?;
        self.recency.remove(&entry.stamp);
        self.retire(model_id, &entry, reason);
        Some(entry)
    }

    fn expired(&self, now: Instant, ttl: Duration) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.idle_for(now) > ttl)
            .map(|(model_id, _)| model_id.clone())
            .collect()
    }

    fn retire(&mut self, model_id: &str, entry: &CacheEntry, reason: RemovalReason) {
        self.stats.record_removal(reason);
        self.stats.cache_size = self.entries.len();

        let info = ModelInfo::removed(model_id, entry, reason);
        if self.removed.insert(model_id.to_string(), info).is_none() {
            self.removed_order.push_back(model_id.to_string());
        }
        while self.removed_order.len() > REMOVED_HISTORY_LIMIT {
            if let Some(oldest) = self.removed_order.pop_front() {
                self.removed.remove(&oldest);
            }
        }
    }

    fn forget(&mut self, model_id: &str) {
        if self.removed.remove(model_id).is_some() {
            self.removed_order.retain(|id| id != model_id);
        }
    }

    fn cached_ids(&self) -> Vec<String> {
        self.recency.values().cloned().collect()
    }
}

/// What a lookup decided while holding the lock.
enum Lookup {
    Hit(Arc<dyn EmbeddingEngine>),
    Join(watch::Receiver<LoadSlot>),
    Load { publisher: watch::Sender<LoadSlot>, pending: watch::Receiver<LoadSlot> },
}

/// State shared between the cache handle, its load tasks and the sweep task.
struct Inner {
    config: CacheConfig,
    provider: Arc<dyn EmbeddingProvider>,
    state: Mutex<CacheState>,
    pool: WorkerPool,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, CacheState> {
        // Every mutation leaves the maps consistent before anything can panic.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lookup(&self, model_id: &str) -> Lookup {
        let (lookup, evicted) = {
            let mut state = self.lock();

            if let Some(engine) = state.touch(model_id) {
                state.stats.total_hits += 1;
                debug!(model = %model_id, "Using cached model");
                return Lookup::Hit(engine);
            }

            let in_flight = state
                .loading
                .get(model_id)
                .filter(|pending| pending.has_changed().is_ok())
                .cloned();
            if let Some(pending) = in_flight {
                state.stats.coalesced_loads += 1;
                debug!(model = %model_id, "Joining in-flight model load");
                return Lookup::Join(pending);
            }

            state.stats.total_misses += 1;
            let evicted = state.evict_to_fit(self.config.max_cached);
            let (publisher, pending) = watch::channel(None);
            state.loading.insert(model_id.to_string(), pending.clone());
            (Lookup::Load { publisher, pending }, evicted)
        };

        log_removals(&evicted, RemovalReason::Lru);
        lookup
    }

    /// Construct `model_id` on the worker pool and admit it into the cache.
    async fn load(&self, model_id: &str) -> LoadOutcome {
        info!(model = %model_id, provider = self.provider.name(), "Loading model");
        let started = Instant::now();

        let provider = Arc::clone(&self.provider);
        let id = model_id.to_string();
        let constructed = self
            .pool
            .run(move || provider.construct(&id))
            .await
            .and_then(|result| result.map_err(CacheError::from));
        let load_duration = started.elapsed();

        // The in-flight marker goes away under the same lock that admits the engine.
        let (outcome, displaced) = {
            let mut state = self.lock();
            state.loading.remove(model_id);
            let admitted = match constructed {
                Ok(_) if self.pool.is_closed() => Err(CacheError::PoolClosed),
                Ok(engine) => {
                    let entry = CacheEntry::new(Arc::clone(&engine), load_duration);
                    Ok((engine, state.insert(model_id, entry, self.config.max_cached)))
                }
                Err(err) => Err(err),
            };
            match admitted {
                Ok((engine, displaced)) => (Ok(engine), displaced),
                Err(err) => {
                    state.stats.load_failures += 1;
                    (Err(err), Vec::new())
                }
            }
        };
        drop(displaced);

        match &outcome {
            Ok(_) => info!(
                model = %model_id,
                load_ms = load_duration.as_millis(),
                "Model loaded successfully"
            ),
            Err(err) => error!(model = %model_id, error = %err, "Failed to load model"),
        }
        outcome
    }

    /// Insert a freshly constructed engine, respecting capacity.
    fn admit(&self, model_id: &str, entry: CacheEntry) -> Result<(), CacheError> {
        let displaced = {
            let mut state = self.lock();
            if self.pool.is_closed() {
                return Err(CacheError::PoolClosed);
            }
            state.insert(model_id, entry, self.config.max_cached)
        };
        drop(displaced);
        Ok(())
    }

    fn sweep_expired(&self) -> Vec<String> {
        let ttl = self.config.ttl();
        let removed: Vec<(String, CacheEntry)> = {
            let mut state = self.lock();
            let expired = state.expired(Instant::now(), ttl);
            expired
                .into_iter()
                .filter_map(|model_id| {
                    let entry = state.remove(&model_id, RemovalReason::TtlExpired)?;
                    Some((model_id, entry))
                })
                .collect()
        };

        log_removals(&removed, RemovalReason::TtlExpired);
        removed.into_iter().map(|(model_id, _)| model_id).collect()
    }
}

fn log_removals(removed: &[(String, CacheEntry)], reason: RemovalReason) {
    for (model_id, entry) in removed {
        match reason {
            RemovalReason::Lru => info!(
                model = %model_id,
                reason = %reason,
                "Evicted model to maintain cache size limit"
            ),
            RemovalReason::TtlExpired => info!(
                model = %model_id,
                reason = %reason,
                idle_secs = entry.idle_for(Instant::now()).as_secs(),
                "Auto-offloaded model due to inactivity"
            ),
            RemovalReason::Unloaded => info!(model = %model_id, "Unloaded model"),
        }
    }
}

struct SweepHandle {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

async fn sweep_loop(inner: Arc<Inner>, shutdown: oneshot::Receiver<()>) {
    let period = inner.config.sweep_interval();
    run_sweeps(period, shutdown, move || inner.sweep_expired()).await;
}

/// Run `pass` every `period` until `shutdown` fires. A panicking pass is
/// logged and the next tick runs as usual.
async fn run_sweeps<F>(period: Duration, mut shutdown: oneshot::Receiver<()>, mut pass: F)
where
    F: FnMut() -> Vec<String>,
{
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                let outcome = std::panic::catch_unwind(AssertUnwindSafe(&mut pass));
                match outcome {
                    Ok(removed) if !removed.is_empty() => {
                        debug!(removed = removed.len(), "Sweep pass complete");
                    }
                    Ok(_) => {}
                    Err(panic) => error!(error = panic_message(&*panic), "Error in sweep loop"),
                }
            }
        }
    }
    debug!("Sweep loop exited");
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// A bounded, time-aware cache of embedding engines.
///
/// Engines are constructed lazily on first use (or eagerly via
/// [`ModelCache::warm_up`]), kept in recency order, evicted least recently
/// used first when capacity is reached, and offloaded by a background sweep
/// once idle for longer than the configured TTL.
///
/// All blocking provider calls run on a bounded worker pool. The structural
/// lock is never held across an await.
pub struct ModelCache {
    inner: Arc<Inner>,
    sweep: Mutex<Option<SweepHandle>>,
}

impl std::fmt::Debug for ModelCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelCache")
            .field("config", &self.inner.config)
            .field("provider", &self.inner.provider.name())
            .field("pool", &self.inner.pool)
            .finish_non_exhaustive()
    }
}

impl ModelCache {
    /// Create an empty cache backed by `provider`.
    ///
    /// The sweep does not run until [`ModelCache::start`] is called.
    ///
    /// # Errors
    /// Returns `CacheConfigError` if the configuration is invalid.
    pub fn new(
        config: CacheConfig,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, CacheConfigError> {
        config.validate()?;

        let pool = WorkerPool::new(config.worker_count);
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                provider,
                state: Mutex::new(CacheState::default()),
                pool,
            }),
            sweep: Mutex::new(None),
        })
    }

    /// Start the background idle sweep.
    ///
    /// Does nothing if the sweep is already running or the cache was stopped.
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime.
    pub fn start(&self) {
        let mut sweep = self.sweep.lock().unwrap_or_else(PoisonError::into_inner);
        if sweep.is_some() {
            return;
        }
        if self.inner.pool.is_closed() {
            warn!("Model cache was stopped; not restarting sweep task");
            return;
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(sweep_loop(Arc::clone(&self.inner), shutdown_rx));
        *sweep = Some(SweepHandle { shutdown_tx, task });

        info!(
            ttl_secs = self.inner.config.ttl_secs,
            interval_secs = self.inner.config.sweep_interval_secs,
            "Model cache sweep task started"
        );
    }

    /// Returns `true` while the sweep task is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.sweep
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.task.is_finished())
    }

    /// Stop the sweep, drain the worker pool and release every engine.
    ///
    /// Waits for the sweep task to exit before draining the pool, and for
    /// in-flight blocking calls (timed-out ones included) before returning.
    /// Calling this more than once is harmless.
    pub async fn stop(&self) {
        let handle = self.sweep.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(SweepHandle { shutdown_tx, task }) = handle {
            if shutdown_tx.send(()).is_err() {
                warn!("Sweep task already exited before shutdown signal");
            }
            match task.await {
                Ok(()) => info!("Model cache sweep task stopped"),
                Err(e) => warn!(error = %e, "Sweep task ended abnormally"),
            }
        }

        if self.inner.pool.is_closed() {
            return;
        }
        self.inner.pool.shutdown().await;

        let released: Vec<CacheEntry> = {
            let mut state = self.inner.lock();
            state.recency.clear();
            state.stats.cache_size = 0;
            state.entries.drain().map(|(_, entry)| entry).collect()
        };
        info!(released = released.len(), "Worker pool shutdown complete");
    }

    /// Get an engine for `model_id`, loading it if absent.
    ///
    /// Concurrent calls for the same uncached id share a single construction.
    ///
    /// # Errors
    /// Returns the provider's construction error, or `CacheError::PoolClosed`
    /// after [`ModelCache::stop`].
    pub async fn get_or_load(
        &self,
        model_id: &str,
    ) -> Result<Arc<dyn EmbeddingEngine>, CacheError> {
        let mut pending = match self.inner.lookup(model_id) {
            Lookup::Hit(engine) => return Ok(engine),
            Lookup::Join(pending) => pending,
            Lookup::Load { publisher, pending } => {
                let inner = Arc::clone(&self.inner);
                let id = model_id.to_string();
                // A detached task, so a cancelled caller never strands other waiters.
                tokio::spawn(async move {
                    let outcome = inner.load(&id).await;
                    let _ = publisher.send(Some(outcome));
                });
                pending
            }
        };

        match pending.wait_for(Option::is_some).await {
            Ok(slot) => slot
                .clone()
                .unwrap_or_else(|| Err(CacheError::LoadAbandoned(model_id.to_string()))),
            Err(_) => Err(CacheError::LoadAbandoned(model_id.to_string())),
        }
    }

    /// Embed a single text.
    ///
    /// `timeout` bounds the inference call only, not the model load. On
    /// expiry the blocking call keeps running in the background.
    ///
    /// # Errors
    /// Returns construction, inference or `CacheError::Timeout` failures.
    pub async fn embed(
        &self,
        model_id: &str,
        text: &str,
        timeout: Option<Duration>,
    ) -> Result<Embedding, CacheError> {
        let engine = self.get_or_load(model_id).await?;
        let mut vectors = self.infer(engine, vec![text.to_string()], timeout).await?;
        vectors.pop().ok_or_else(|| CacheError::ShapeMismatch {
            model_id: model_id.to_string(),
            expected: 1,
            actual: 0,
        })
    }

    /// Embed many texts in one inference call, preserving input order.
    ///
    /// An empty `texts` returns immediately without touching the provider.
    ///
    /// # Errors
    /// Returns construction, inference or `CacheError::Timeout` failures.
    pub async fn embed_batch(
        &self,
        model_id: &str,
        texts: &[String],
        timeout: Option<Duration>,
    ) -> Result<Vec<Embedding>, CacheError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let engine = self.get_or_load(model_id).await?;
        self.infer(engine, texts.to_vec(), timeout).await
    }

    async fn infer(
        &self,
        engine: Arc<dyn EmbeddingEngine>,
        texts: Vec<String>,
        timeout: Option<Duration>,
    ) -> Result<Vec<Embedding>, CacheError> {
        let expected = texts.len();
        let model_id = engine.model_id().to_string();
        let timed_out = |limit: Duration| {
            error!(
                model = %model_id,
                timeout_ms = limit.as_millis(),
                batch_size = expected,
                "Embedding timeout"
            );
            CacheError::Timeout(limit)
        };

        if timeout.is_some_and(|limit| limit.is_zero()) {
            return Err(timed_out(Duration::ZERO));
        }

        let started = Instant::now();
        let call = self.inner.pool.run(move || engine.embed(&texts));

        let result = match timeout {
            // The timer only fires at millisecond granularity, so a call that
            // returns first is still checked against the deadline.
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(_) if started.elapsed() > limit => return Err(timed_out(limit)),
                Ok(result) => result,
                Err(_) => return Err(timed_out(limit)),
            },
            None => call.await,
        };

        let vectors = result??;
        if vectors.len() != expected {
            return Err(CacheError::ShapeMismatch { model_id, expected, actual: vectors.len() });
        }
        Ok(vectors)
    }

    /// Check that `model_id` can be constructed and run one inference.
    ///
    /// Validation never goes through an existing cache entry. With
    /// `cache_on_success` the validated engine is inserted as if it had been
    /// loaded by [`ModelCache::get_or_load`]; otherwise it is dropped.
    pub async fn validate(&self, model_id: &str, cache_on_success: bool) -> bool {
        info!(model = %model_id, "Validating model");
        let started = Instant::now();

        let provider = Arc::clone(&self.inner.provider);
        let id = model_id.to_string();
        let checked = self
            .inner
            .pool
            .run(move || -> Result<Arc<dyn EmbeddingEngine>, ProviderError> {
                let engine = provider.construct(&id)?;
                let sample = engine.embed(&[VALIDATION_SAMPLE.to_string()])?;
                if sample.len() != 1 || sample[0].is_empty() {
                    return Err(ProviderError::inference(&id, "smoke test returned no embedding"));
                }
                Ok(engine)
            })
            .await
            .and_then(|result| result.map_err(CacheError::from));
        let load_duration = started.elapsed();

        let admitted = checked.and_then(|engine| {
            if cache_on_success {
                self.inner.admit(model_id, CacheEntry::new(engine, load_duration))
            } else {
                Ok(())
            }
        });

        match admitted {
            Ok(()) => {
                info!(
                    model = %model_id,
                    load_ms = load_duration.as_millis(),
                    cached = cache_on_success,
                    "Model validated successfully"
                );
                true
            }
            Err(err) => {
                error!(model = %model_id, error = %err, "Model validation failed");
                false
            }
        }
    }

    /// Validate and cache each id in turn.
    ///
    /// Runs sequentially so eviction order follows the input order.
    pub async fn warm_up(&self, model_ids: &[String]) -> BTreeMap<String, bool> {
        let mut results = BTreeMap::new();
        for model_id in model_ids {
            let valid = self.validate(model_id, true).await;
            results.insert(model_id.clone(), valid);
        }
        results
    }

    /// Remove a model from the cache.
    ///
    /// # Returns
    /// `true` if the model was cached.
    pub fn unload(&self, model_id: &str) -> bool {
        let removed = self.inner.lock().remove(model_id, RemovalReason::Unloaded);
        match removed {
            Some(entry) => {
                log_removals(&[(model_id.to_string(), entry)], RemovalReason::Unloaded);
                true
            }
            None => false,
        }
    }

    /// Run one idle sweep now, returning the offloaded ids.
    pub fn sweep_expired(&self) -> Vec<String> {
        self.inner.sweep_expired()
    }

    /// Point-in-time view of the cache.
    #[must_use]
    pub fn cache_snapshot(&self) -> CacheSnapshot {
        let state = self.inner.lock();
        CacheSnapshot {
            cached_models: state.cached_ids(),
            num_cached: state.entries.len(),
            max_cached: self.inner.config.max_cached,
            ttl_secs: self.inner.config.ttl_secs,
            sweep_interval_secs: self.inner.config.sweep_interval_secs,
            stats: CacheStats { cache_size: state.entries.len(), ..state.stats.clone() },
        }
    }

    /// Metadata for `model_id`.
    ///
    /// Returns `None` if the model was never cached (or has aged out of the
    /// removal history). A removed model reports `is_cached == false`.
    #[must_use]
    pub fn model_info(&self, model_id: &str) -> Option<ModelInfo> {
        let state = self.inner.lock();
        state
            .entries
            .get(model_id)
            .map(|entry| ModelInfo::cached(model_id, entry))
            .or_else(|| state.removed.get(model_id).cloned())
    }

    /// Returns `true` if an engine for `model_id` is currently cached.
    #[must_use]
    pub fn contains(&self, model_id: &str) -> bool {
        self.inner.lock().entries.contains_key(model_id)
    }

    /// Number of cached engines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Returns `true` if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the cache configuration.
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }
}

impl Drop for ModelCache {
    fn drop(&mut self) {
        let handle = self.sweep.get_mut().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            warn!("ModelCache dropped while running - signalling sweep task");
            let _ = handle.shutdown_tx.send(());
        }
        self.inner.pool.close_now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache_with(max_cached: usize, ttl_secs: u64) -> (ModelCache, Arc<MockProvider>) {
        let provider = Arc::new(MockProvider::new());
        let config = CacheConfig { max_cached, ttl_secs, sweep_interval_secs: 3600, worker_count: 2 };
        let cache = ModelCache::new(config, provider.clone()).unwrap();
        (cache, provider)
    }

    fn backdate(cache: &ModelCache, model_id: &str, by: Duration) {
        let mut state = cache.inner.lock();
        let entry = state.entries.get_mut(model_id).unwrap();
        entry.last_used = Instant::now().checked_sub(by).unwrap();
    }

    #[tokio::test]
    async fn test_cache_hit_returns_same_instance() {
        let (cache, provider) = cache_with(2, 3600);

        let first = cache.get_or_load("model-a").await.unwrap();
        let second = cache.get_or_load("model-a").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(provider.construct_calls(), 1);

        let stats = cache.cache_snapshot().stats;
        assert_eq!(stats.total_hits, 1);
        assert_eq!(stats.total_misses, 1);
    }

    #[tokio::test]
    async fn test_lru_eviction_order() {
        let (cache, _) = cache_with(2, 3600);

        cache.get_or_load("a").await.unwrap();
        cache.get_or_load("b").await.unwrap();
        cache.get_or_load("c").await.unwrap();
        assert_eq!(cache.cache_snapshot().cached_models, vec!["b", "c"]);

        // B is now least recently used.
        cache.get_or_load("a").await.unwrap();
        assert_eq!(cache.cache_snapshot().cached_models, vec!["c", "a"]);
        assert_eq!(cache.cache_snapshot().stats.lru_evictions, 2);
    }

    #[tokio::test]
    async fn test_touch_protects_from_eviction() {
        let (cache, _) = cache_with(2, 3600);

        cache.get_or_load("a").await.unwrap();
        cache.get_or_load("b").await.unwrap();
        cache.get_or_load("a").await.unwrap();
        cache.get_or_load("c").await.unwrap();

        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
    }

    #[tokio::test]
    async fn test_ttl_sweep_removes_only_idle_entries() {
        let (cache, _) = cache_with(4, 10);

        cache.get_or_load("stale").await.unwrap();
        cache.get_or_load("fresh").await.unwrap();
        backdate(&cache, "stale", Duration::from_secs(11));

        let removed = cache.sweep_expired();

        assert_eq!(removed, vec!["stale".to_string()]);
        assert!(!cache.contains("stale"));
        assert!(cache.contains("fresh"));
        assert_eq!(cache.cache_snapshot().stats.ttl_evictions, 1);

        let info = cache.model_info("stale").unwrap();
        assert!(!info.is_cached);
        assert_eq!(info.removed_reason, Some(RemovalReason::TtlExpired));
    }

    #[tokio::test]
    async fn test_lookup_refreshes_last_used() {
        let (cache, _) = cache_with(2, 10);

        cache.get_or_load("m").await.unwrap();
        backdate(&cache, "m", Duration::from_secs(11));
        cache.get_or_load("m").await.unwrap();

        assert!(cache.sweep_expired().is_empty());
        assert!(cache.contains("m"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweep_runs_on_interval() {
        let provider = Arc::new(MockProvider::new());
        let config = CacheConfig { max_cached: 2, ttl_secs: 10, sweep_interval_secs: 5, worker_count: 1 };
        let cache = ModelCache::new(config, provider).unwrap();
        cache.start();
        assert!(cache.is_running());

        cache.get_or_load("m").await.unwrap();
        backdate(&cache, "m", Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(!cache.contains("m"));

        cache.stop().await;
        assert!(!cache.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_sweep_pass_keeps_loop_running() {
        let passes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&passes);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_sweeps(Duration::from_secs(5), shutdown_rx, move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("sweep pass failed");
            }
            Vec::new()
        }));

        tokio::time::sleep(Duration::from_secs(16)).await;
        assert_eq!(passes.load(Ordering::SeqCst), 3);
        assert!(!task.is_finished());

        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweep_survives_poisoned_state() {
        let provider = Arc::new(MockProvider::new());
        let config = CacheConfig { max_cached: 2, ttl_secs: 10, sweep_interval_secs: 5, worker_count: 1 };
        let cache = ModelCache::new(config, provider).unwrap();
        cache.start();
        cache.get_or_load("m").await.unwrap();

        let inner = Arc::clone(&cache.inner);
        let poisoner = std::thread::spawn(move || {
            let _state = inner.state.lock().unwrap();
            panic!("poisoned while holding state");
        });
        assert!(poisoner.join().is_err());
        assert!(cache.inner.state.is_poisoned());

        backdate(&cache, "m", Duration::from_secs(30));
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(!cache.contains("m"));
        assert!(cache.is_running());

        cache.stop().await;
    }

    #[tokio::test]
    async fn test_failed_load_leaves_no_trace() {
        let (cache, _) = cache_with(2, 3600);
        cache.get_or_load("good").await.unwrap();

        let err = cache.get_or_load("invalid/model").await.unwrap_err();
        assert!(err.is_construction());

        assert_eq!(cache.cache_snapshot().cached_models, vec!["good"]);
        assert!(cache.model_info("invalid/model").is_none());
        assert!(cache.inner.lock().loading.is_empty());
        assert_eq!(cache.cache_snapshot().stats.load_failures, 1);
    }

    #[tokio::test]
    async fn test_failed_load_when_full_still_evicts_first() {
        let (cache, _) = cache_with(1, 3600);
        cache.get_or_load("good").await.unwrap();

        assert!(cache.get_or_load("invalid/model").await.is_err());

        // Capacity is enforced before construction starts.
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_insert_replaces_existing_entry() {
        let (cache, provider) = cache_with(2, 3600);
        let first = cache.get_or_load("m").await.unwrap();

        assert!(cache.validate("m", true).await);
        let second = cache.get_or_load("m").await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
        assert_eq!(provider.construct_calls(), 2);
        assert_eq!(cache.cache_snapshot().stats.lru_evictions, 0);
    }

    #[tokio::test]
    async fn test_stop_releases_entries_and_rejects_loads() {
        let (cache, _) = cache_with(2, 3600);
        cache.start();
        cache.get_or_load("m").await.unwrap();

        cache.stop().await;
        cache.stop().await;

        assert!(cache.is_empty());
        assert_eq!(cache.get_or_load("m").await.unwrap_err(), CacheError::PoolClosed);

        // A stopped cache does not restart.
        cache.start();
        assert!(!cache.is_running());
    }

    #[test]
    fn test_removed_history_is_bounded() {
        let (cache, _) = cache_with(1, 3600);
        let engine = MockProvider::new().construct("seed").unwrap();
        {
            let mut state = cache.inner.lock();
            for i in 0..=REMOVED_HISTORY_LIMIT + 1 {
                let id = format!("m{i}");
                state.insert(&id, CacheEntry::new(Arc::clone(&engine), Duration::ZERO), 1);
            }
            assert_eq!(state.removed.len(), REMOVED_HISTORY_LIMIT);
            assert_eq!(state.removed_order.len(), REMOVED_HISTORY_LIMIT);
        }
        assert!(cache.model_info("m0").is_none());
        assert!(cache.model_info(&format!("m{REMOVED_HISTORY_LIMIT}")).is_some());
    }

    #[test]
    fn test_panic_message_extraction() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("static str");
        assert_eq!(panic_message(&*boxed), "static str");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*boxed), "owned");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(&*boxed), "unknown panic");
    }
}
