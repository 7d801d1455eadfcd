//! Cached act/observe on top of a [`Resolver`].
//!
//! A hit replays the stored element reference without inference. A miss asks
//! the resolver to observe, stores the result, then acts. With self-heal on,
//! a failed act falls back to exactly one direct `act(instruction)` and a
//! cached observation whose elements are no longer visible is re-observed.
//! Cache entries are never invalidated by a failure.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reprise_common::{RepriseError, Result};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::key::{derive_page_key, DEFAULT_KEY_TEXT_LEN};
use crate::page::{PageContext, Resolver};
use crate::record::{select_candidate, ActRequest, ActionRecord, CacheEntry};
use crate::store::CacheStore;

const LOGGED_KEY_CHARS: usize = 50;

#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Bound on each per-element visibility check during observe self-heal.
    pub visibility_timeout: Duration,
    /// Characters of page text that feed derived keys.
    pub key_text_len: usize,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_secs(2),
            key_text_len: DEFAULT_KEY_TEXT_LEN,
        }
    }
}

/// Options for [`CachedExecutor::act_with_advanced_cache`].
#[derive(Debug, Clone, Default)]
pub struct AdvancedOptions {
    pub self_heal: bool,
    /// Used verbatim instead of a derived key.
    pub custom_key: Option<String>,
}

/// Counters accumulated over the executor's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExecutorStats {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub observe_calls: u64,
    pub act_calls: u64,
    pub self_heals: u64,
    pub stale_observations: u64,
    pub cache_write_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    observe_calls: AtomicU64,
    act_calls: AtomicU64,
    self_heals: AtomicU64,
    stale_observations: AtomicU64,
    cache_write_failures: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

pub struct CachedExecutor {
    store: Arc<dyn CacheStore>,
    options: ExecutorOptions,
    counters: Counters,
}

impl CachedExecutor {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self::with_options(store, ExecutorOptions::default())
    }

    pub fn with_options(store: Arc<dyn CacheStore>, options: ExecutorOptions) -> Self {
        Self {
            store,
            options,
            counters: Counters::default(),
        }
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    pub fn stats(&self) -> ExecutorStats {
        let c = &self.counters;
        ExecutorStats {
            cache_hits: c.cache_hits.load(Ordering::Relaxed),
            cache_misses: c.cache_misses.load(Ordering::Relaxed),
            observe_calls: c.observe_calls.load(Ordering::Relaxed),
            act_calls: c.act_calls.load(Ordering::Relaxed),
            self_heals: c.self_heals.load(Ordering::Relaxed),
            stale_observations: c.stale_observations.load(Ordering::Relaxed),
            cache_write_failures: c.cache_write_failures.load(Ordering::Relaxed),
        }
    }

    /// Act on `instruction`, replaying the element cached under `key` when present.
    ///
    /// On a miss the first observed candidate is cached before acting. With
    /// `self_heal`, any failure to resolve or execute triggers one direct
    /// `act(instruction)`; its error is what the caller sees.
    pub async fn act_with_cache<P>(
        &self,
        page: &P,
        key: &str,
        instruction: &str,
        self_heal: bool,
    ) -> Result<()>
    where
        P: Resolver + ?Sized,
    {
        let err = match self.act_cached_or_fresh(page, key, instruction).await {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };

        if !self_heal {
            error!(key = short_key(key), %instruction, error = %err, "cache.act.failed");
            return Err(err);
        }

        warn!(key = short_key(key), %instruction, error = %err, "cache.act.self_heal");
        bump(&self.counters.self_heals);
        bump(&self.counters.act_calls);
        page.act(ActRequest::Instruction(instruction))
            .await
            .inspect_err(|e| error!(%instruction, error = %e, "cache.act.self_heal_failed"))
    }

    async fn act_cached_or_fresh<P>(&self, page: &P, key: &str, instruction: &str) -> Result<()>
    where
        P: Resolver + ?Sized,
    {
        let cached = self.store.get(key).await.and_then(CacheEntry::into_first);
        let record = match cached {
            Some(record) => {
                bump(&self.counters.cache_hits);
                info!(key = short_key(key), %instruction, selector = %record.selector, "cache.act.hit");
                record
            }
            None => {
                bump(&self.counters.cache_misses);
                info!(key = short_key(key), %instruction, "cache.act.miss");
                let candidates = self.observe_fresh(page, instruction).await?;
                let record = select_candidate(candidates)
                    .ok_or_else(|| RepriseError::NoCandidates(instruction.to_string()))?;
                self.store_entry(key, CacheEntry::Single(record.clone())).await;
                record
            }
        };

        bump(&self.counters.act_calls);
        page.act(ActRequest::Record(&record)).await
    }

    /// Observe `instruction`, returning the records cached under `key` when present.
    ///
    /// With `self_heal`, every cached record must become visible within
    /// [`ExecutorOptions::visibility_timeout`]; otherwise the whole batch is
    /// discarded and re-observed.
    pub async fn observe_with_cache<P>(
        &self,
        page: &P,
        key: &str,
        instruction: &str,
        self_heal: bool,
    ) -> Result<Vec<ActionRecord>>
    where
        P: Resolver + PageContext + ?Sized,
    {
        match self.store.get(key).await {
            Some(CacheEntry::Many(cached)) => {
                if !self_heal || self.all_visible(page, &cached).await {
                    bump(&self.counters.cache_hits);
                    info!(key = short_key(key), %instruction, records = cached.len(), "cache.observe.hit");
                    return Ok(cached);
                }
                bump(&self.counters.stale_observations);
                warn!(key = short_key(key), %instruction, "cache.observe.stale");
            }
            _ => {
                bump(&self.counters.cache_misses);
                info!(key = short_key(key), %instruction, "cache.observe.miss");
            }
        }

        let results = self
            .observe_fresh(page, instruction)
            .await
            .inspect_err(|e| error!(%instruction, error = %e, "cache.observe.failed"))?;
        if results.is_empty() {
            debug!(key = short_key(key), "cache.observe.empty");
        }
        self.store_entry(key, CacheEntry::Many(results.clone())).await;
        Ok(results)
    }

    /// [`Self::act_with_cache`] keyed by `custom_key` or by the page-derived key.
    pub async fn act_with_advanced_cache<P>(
        &self,
        page: &P,
        instruction: &str,
        options: AdvancedOptions,
    ) -> Result<()>
    where
        P: Resolver + PageContext + ?Sized,
    {
        let key = match options.custom_key {
            Some(key) => key,
            None => derive_page_key(page, instruction, self.options.key_text_len).await?,
        };
        self.act_with_cache(page, &key, instruction, options.self_heal)
            .await
    }

    async fn observe_fresh<P>(&self, page: &P, instruction: &str) -> Result<Vec<ActionRecord>>
    where
        P: Resolver + ?Sized,
    {
        bump(&self.counters.observe_calls);
        let candidates = page.observe(instruction).await?;
        debug!(%instruction, candidates = candidates.len(), "cache.observe.resolved");
        Ok(candidates)
    }

    async fn all_visible<P>(&self, page: &P, records: &[ActionRecord]) -> bool
    where
        P: PageContext + ?Sized,
    {
        let bound = self.options.visibility_timeout;
        for record in records {
            let check = tokio::time::timeout(bound, page.wait_for_visible(&record.selector, bound));
            match check.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    debug!(selector = %record.selector, error = %err, "cache.observe.not_visible");
                    return false;
                }
                Err(_) => {
                    debug!(selector = %record.selector, "cache.observe.visibility_timeout");
                    return false;
                }
            }
        }
        true
    }

    async fn store_entry(&self, key: &str, entry: CacheEntry) {
        match self.store.put(key, entry).await {
            Ok(()) => info!(key = short_key(key), "cache.stored"),
            Err(err) => {
                bump(&self.counters.cache_write_failures);
                warn!(key = short_key(key), error = %err, "cache.store_failed");
            }
        }
    }
}

fn short_key(key: &str) -> &str {
    match key.char_indices().nth(LOGGED_KEY_CHARS) {
        Some((idx, _)) => &key[..idx],
        None => key,
    }
}
