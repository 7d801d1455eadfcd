use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reprise_cache::{
    derive_key, ActRequest, ActionRecord, AdvancedOptions, CacheEntry, CacheError, CacheStore,
    CachedExecutor, ExecutorOptions, JsonFileCache, MemoryCache, PageContext, Resolver,
};
use reprise_common::{RepriseError, Result};

const SELECT_TOKEN: &str = "Click on \"Select token\"";

#[derive(Debug, Clone, PartialEq)]
enum Acted {
    Record(ActionRecord),
    Instruction(String),
}

/// Page double with scripted observations and recorded calls.
#[derive(Default)]
struct ScriptedPage {
    observations: Mutex<VecDeque<Vec<ActionRecord>>>,
    observe_fails: bool,
    observed: Mutex<Vec<String>>,
    acts: Mutex<Vec<Acted>>,
    broken_selectors: HashSet<String>,
    instruction_acts_fail: bool,
    visible: HashSet<String>,
    hang_on_visibility: bool,
    url: String,
    title: String,
    text: Mutex<String>,
}

impl ScriptedPage {
    fn observing(batches: Vec<Vec<ActionRecord>>) -> Self {
        Self {
            observations: Mutex::new(batches.into()),
            url: "https://app.uniswap.org/swap".into(),
            title: "Uniswap Interface".into(),
            text: Mutex::new("Swap Limit Send Buy Sell 0 ETH".into()),
            ..Self::default()
        }
    }

    fn observe_count(&self) -> usize {
        self.observed.lock().unwrap().len()
    }

    fn acts(&self) -> Vec<Acted> {
        self.acts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Resolver for ScriptedPage {
    async fn observe(&self, instruction: &str) -> Result<Vec<ActionRecord>> {
        self.observed.lock().unwrap().push(instruction.to_string());
        if self.observe_fails {
            return Err(RepriseError::Resolve("model unavailable".into()));
        }
        self.observations
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| RepriseError::Resolve("no scripted observation left".into()))
    }

    async fn act(&self, request: ActRequest<'_>) -> Result<()> {
        match request {
            ActRequest::Record(record) => {
                self.acts.lock().unwrap().push(Acted::Record(record.clone()));
                if self.broken_selectors.contains(&record.selector) {
                    return Err(RepriseError::Resolve(format!("{} not found", record.selector)));
                }
            }
            ActRequest::Instruction(instruction) => {
                self.acts
                    .lock()
                    .unwrap()
                    .push(Acted::Instruction(instruction.to_string()));
                if self.instruction_acts_fail {
                    return Err(RepriseError::Resolve("no element matches".into()));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PageContext for ScriptedPage {
    async fn url(&self) -> Result<String> {
        Ok(self.url.clone())
    }

    async fn title(&self) -> Result<String> {
        Ok(self.title.clone())
    }

    async fn visible_text(&self) -> Result<String> {
        Ok(self.text.lock().unwrap().clone())
    }

    async fn wait_for_visible(&self, selector: &str, _timeout: Duration) -> Result<()> {
        if self.hang_on_visibility {
            std::future::pending::<()>().await;
        }
        if self.visible.contains(selector) {
            Ok(())
        } else {
            Err(RepriseError::Timeout)
        }
    }
}

/// Store whose writes always fail.
struct ReadOnlyStore;

#[async_trait]
impl CacheStore for ReadOnlyStore {
    async fn get(&self, _key: &str) -> Option<CacheEntry> {
        None
    }

    async fn put(&self, _key: &str, _entry: CacheEntry) -> std::result::Result<(), CacheError> {
        Err(CacheError::Io {
            path: "/read-only/cache.json".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
        })
    }
}

fn record(selector: &str) -> ActionRecord {
    ActionRecord::new(selector)
}

#[tokio::test]
async fn end_to_end_swap_step_populates_file_and_acts_on_record() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("cache.json");
    let executor = CachedExecutor::new(Arc::new(JsonFileCache::new(&path)));
    let page = ScriptedPage::observing(vec![vec![record("#tok-btn")]]);

    executor
        .act_with_cache(&page, "select-token", SELECT_TOKEN, false)
        .await?;

    let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert_eq!(
        written,
        serde_json::json!({"select-token": {"selector": "#tok-btn"}})
    );
    assert_eq!(page.observed.lock().unwrap().as_slice(), [SELECT_TOKEN]);
    assert_eq!(page.acts(), vec![Acted::Record(record("#tok-btn"))]);
    Ok(())
}

#[tokio::test]
async fn second_act_with_same_key_is_served_from_cache() -> Result<()> {
    let executor = CachedExecutor::new(Arc::new(MemoryCache::new()));
    let page = ScriptedPage::observing(vec![vec![record("#tok-btn"), record("#other")]]);

    executor.act_with_cache(&page, "select-token", SELECT_TOKEN, true).await?;
    executor.act_with_cache(&page, "select-token", SELECT_TOKEN, true).await?;

    assert_eq!(page.observe_count(), 1);
    assert_eq!(
        page.acts(),
        vec![Acted::Record(record("#tok-btn")), Acted::Record(record("#tok-btn"))]
    );
    let stats = executor.stats();
    assert_eq!((stats.cache_hits, stats.cache_misses), (1, 1));
    assert_eq!(stats.act_calls, 2);
    Ok(())
}

#[tokio::test]
async fn act_replays_first_record_of_a_cached_observation() -> Result<()> {
    let store = Arc::new(MemoryCache::new());
    store
        .put("rate", CacheEntry::Many(vec![record("#rate"), record("#rate-alt")]))
        .await
        .unwrap();
    let executor = CachedExecutor::new(store);
    let page = ScriptedPage::observing(Vec::new());

    executor.act_with_cache(&page, "rate", "Click the rate", false).await?;

    assert_eq!(page.observe_count(), 0);
    assert_eq!(page.acts(), vec![Acted::Record(record("#rate"))]);
    Ok(())
}

#[tokio::test]
async fn stale_record_self_heals_with_one_direct_act() -> Result<()> {
    let store = Arc::new(MemoryCache::new());
    store
        .put("select-usdc", CacheEntry::Single(record("#old-usdc")))
        .await
        .unwrap();
    let executor = CachedExecutor::new(store.clone());
    let page = ScriptedPage {
        broken_selectors: HashSet::from(["#old-usdc".to_string()]),
        ..ScriptedPage::observing(Vec::new())
    };

    executor
        .act_with_cache(&page, "select-usdc", "Click on \"USDC\"", true)
        .await?;

    assert_eq!(
        page.acts(),
        vec![
            Acted::Record(record("#old-usdc")),
            Acted::Instruction("Click on \"USDC\"".into()),
        ]
    );
    // the entry stays for future attempts
    assert_eq!(
        store.get("select-usdc").await,
        Some(CacheEntry::Single(record("#old-usdc")))
    );
    assert_eq!(executor.stats().self_heals, 1);
    Ok(())
}

#[tokio::test]
async fn failed_self_heal_propagates_after_exactly_one_retry() {
    let store = Arc::new(MemoryCache::new());
    store
        .put("select-usdc", CacheEntry::Single(record("#old-usdc")))
        .await
        .unwrap();
    let executor = CachedExecutor::new(store);
    let page = ScriptedPage {
        broken_selectors: HashSet::from(["#old-usdc".to_string()]),
        instruction_acts_fail: true,
        ..ScriptedPage::observing(Vec::new())
    };

    let err = executor
        .act_with_cache(&page, "select-usdc", "Click on \"USDC\"", true)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("no element matches"), "{err}");
    let instruction_acts = page
        .acts()
        .into_iter()
        .filter(|a| matches!(a, Acted::Instruction(_)))
        .count();
    assert_eq!(instruction_acts, 1);
}

#[tokio::test]
async fn act_failure_without_self_heal_propagates() {
    let executor = CachedExecutor::new(Arc::new(MemoryCache::new()));
    let page = ScriptedPage {
        broken_selectors: HashSet::from(["#tok-btn".to_string()]),
        ..ScriptedPage::observing(vec![vec![record("#tok-btn")]])
    };

    let err = executor
        .act_with_cache(&page, "select-token", SELECT_TOKEN, false)
        .await
        .unwrap_err();

    assert!(matches!(err, RepriseError::Resolve(_)));
    assert_eq!(page.acts(), vec![Acted::Record(record("#tok-btn"))]);
}

#[tokio::test]
async fn failed_resolution_on_miss_also_self_heals() -> Result<()> {
    let executor = CachedExecutor::new(Arc::new(MemoryCache::new()));
    let page = ScriptedPage {
        observe_fails: true,
        ..ScriptedPage::observing(Vec::new())
    };

    executor
        .act_with_cache(&page, "enter-1-eth", "Enter \"0.1\" ETH", true)
        .await?;

    assert_eq!(page.acts(), vec![Acted::Instruction("Enter \"0.1\" ETH".into())]);
    Ok(())
}

#[tokio::test]
async fn empty_candidates_report_no_candidates_without_caching_an_act_entry() {
    let store = Arc::new(MemoryCache::new());
    let executor = CachedExecutor::new(store.clone());
    let page = ScriptedPage::observing(vec![Vec::new()]);

    let err = executor
        .act_with_cache(&page, "select-token", SELECT_TOKEN, false)
        .await
        .unwrap_err();

    assert!(matches!(err, RepriseError::NoCandidates(_)));
    assert_eq!(store.len().await, 0);
    assert!(page.acts().is_empty());
}

#[tokio::test]
async fn cache_write_failure_does_not_block_the_action() -> Result<()> {
    let executor = CachedExecutor::new(Arc::new(ReadOnlyStore));
    let page = ScriptedPage::observing(vec![vec![record("#tok-btn")]]);

    executor
        .act_with_cache(&page, "select-token", SELECT_TOKEN, false)
        .await?;

    assert_eq!(page.acts(), vec![Acted::Record(record("#tok-btn"))]);
    assert_eq!(executor.stats().cache_write_failures, 1);
    Ok(())
}

#[tokio::test]
async fn corrupt_store_falls_back_to_fresh_observation() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("cache.json");
    std::fs::write(&path, "]]not json[[")?;
    let executor = CachedExecutor::new(Arc::new(JsonFileCache::new(&path)));
    let page = ScriptedPage::observing(vec![vec![record("#tok-btn")]]);

    executor
        .act_with_cache(&page, "select-token", SELECT_TOKEN, false)
        .await?;

    assert_eq!(page.observe_count(), 1);
    Ok(())
}

#[tokio::test]
async fn observe_hit_without_self_heal_skips_resolver() -> Result<()> {
    let store = Arc::new(MemoryCache::new());
    let cached = vec![record("#rate")];
    store
        .put("exchange-rate-display", CacheEntry::Many(cached.clone()))
        .await
        .unwrap();
    let executor = CachedExecutor::new(store);
    let page = ScriptedPage::observing(Vec::new());

    let got = executor
        .observe_with_cache(&page, "exchange-rate-display", "Exchange rate", false)
        .await?;

    assert_eq!(got, cached);
    assert_eq!(page.observe_count(), 0);
    Ok(())
}

#[tokio::test]
async fn observe_miss_caches_the_whole_batch() -> Result<()> {
    let store = Arc::new(MemoryCache::new());
    let executor = CachedExecutor::new(store.clone());
    let batch = vec![record("#rate"), record("#rate-inverse")];
    let page = ScriptedPage::observing(vec![batch.clone()]);

    let first = executor
        .observe_with_cache(&page, "exchange-rate-display", "Exchange rate", true)
        .await?;
    let cached = store.get("exchange-rate-display").await;

    assert_eq!(first, batch);
    assert_eq!(cached, Some(CacheEntry::Many(batch)));
    Ok(())
}

#[tokio::test]
async fn empty_observation_is_cached_and_replayed() -> Result<()> {
    let store = Arc::new(MemoryCache::new());
    let executor = CachedExecutor::new(store.clone());
    let page = ScriptedPage::observing(vec![Vec::new()]);

    let first = executor
        .observe_with_cache(&page, "rate", "Exchange rate", false)
        .await?;
    let second = executor
        .observe_with_cache(&page, "rate", "Exchange rate", false)
        .await?;

    assert!(first.is_empty() && second.is_empty());
    assert_eq!(store.get("rate").await, Some(CacheEntry::Many(Vec::new())));
    assert_eq!(page.observe_count(), 1);
    assert_eq!(executor.stats().cache_hits, 1);
    Ok(())
}

#[tokio::test]
async fn act_on_cached_empty_observation_resolves_afresh() -> Result<()> {
    let store = Arc::new(MemoryCache::new());
    store.put("rate", CacheEntry::Many(Vec::new())).await.unwrap();
    let executor = CachedExecutor::new(store.clone());
    let page = ScriptedPage::observing(vec![vec![record("#rate")]]);

    executor.act_with_cache(&page, "rate", "Click the rate", true).await?;

    assert_eq!(page.observe_count(), 1);
    assert_eq!(page.acts(), vec![Acted::Record(record("#rate"))]);
    assert_eq!(store.get("rate").await, Some(CacheEntry::Single(record("#rate"))));
    let stats = executor.stats();
    assert_eq!((stats.cache_hits, stats.cache_misses, stats.self_heals), (0, 1, 0));
    Ok(())
}

#[tokio::test]
async fn observe_self_heal_keeps_fully_visible_batch() -> Result<()> {
    let store = Arc::new(MemoryCache::new());
    let cached = vec![record("#rate"), record("#rate-inverse")];
    store
        .put("exchange-rate-display", CacheEntry::Many(cached.clone()))
        .await
        .unwrap();
    let executor = CachedExecutor::new(store);
    let page = ScriptedPage {
        visible: HashSet::from(["#rate".to_string(), "#rate-inverse".to_string()]),
        ..ScriptedPage::observing(Vec::new())
    };

    let got = executor
        .observe_with_cache(&page, "exchange-rate-display", "Exchange rate", true)
        .await?;

    assert_eq!(got, cached);
    assert_eq!(page.observe_count(), 0);
    Ok(())
}

#[tokio::test]
async fn observe_self_heal_discards_partially_visible_batch() -> Result<()> {
    let store = Arc::new(MemoryCache::new());
    store
        .put(
            "exchange-rate-display",
            CacheEntry::Many(vec![record("#rate"), record("#gone")]),
        )
        .await
        .unwrap();
    let executor = CachedExecutor::new(store.clone());
    let fresh = vec![record("#rate-v2")];
    let page = ScriptedPage {
        visible: HashSet::from(["#rate".to_string()]),
        ..ScriptedPage::observing(vec![fresh.clone()])
    };

    let got = executor
        .observe_with_cache(&page, "exchange-rate-display", "Exchange rate", true)
        .await?;

    assert_eq!(got, fresh);
    assert_eq!(page.observe_count(), 1);
    assert_eq!(
        store.get("exchange-rate-display").await,
        Some(CacheEntry::Many(fresh))
    );
    assert_eq!(executor.stats().stale_observations, 1);
    Ok(())
}

#[tokio::test]
async fn visibility_check_is_bounded_even_if_the_page_never_answers() -> Result<()> {
    let store = Arc::new(MemoryCache::new());
    store
        .put("rate", CacheEntry::Many(vec![record("#rate")]))
        .await
        .unwrap();
    let executor = CachedExecutor::with_options(
        store,
        ExecutorOptions {
            visibility_timeout: Duration::from_millis(50),
            ..ExecutorOptions::default()
        },
    );
    let page = ScriptedPage {
        hang_on_visibility: true,
        ..ScriptedPage::observing(vec![vec![record("#rate-v2")]])
    };

    let got = tokio::time::timeout(
        Duration::from_secs(5),
        executor.observe_with_cache(&page, "rate", "Exchange rate", true),
    )
    .await
    .expect("observe should not hang")?;

    assert_eq!(got, vec![record("#rate-v2")]);
    Ok(())
}

#[tokio::test]
async fn observe_errors_propagate() {
    let executor = CachedExecutor::new(Arc::new(MemoryCache::new()));
    let page = ScriptedPage {
        observe_fails: true,
        ..ScriptedPage::observing(Vec::new())
    };

    let err = executor
        .observe_with_cache(&page, "rate", "Exchange rate", true)
        .await
        .unwrap_err();

    assert!(matches!(err, RepriseError::Resolve(_)));
}

#[tokio::test]
async fn advanced_cache_prefers_custom_key() -> Result<()> {
    let store = Arc::new(MemoryCache::new());
    let executor = CachedExecutor::new(store.clone());
    let page = ScriptedPage::observing(vec![vec![record("#amount")]]);

    executor
        .act_with_advanced_cache(
            &page,
            "Enter \"0.1\" ETH",
            AdvancedOptions {
                self_heal: false,
                custom_key: Some("swap-page-1718000000000".into()),
            },
        )
        .await?;

    let keys: Vec<String> = store.snapshot().await.into_keys().collect();
    assert_eq!(keys, vec!["swap-page-1718000000000".to_string()]);
    Ok(())
}

#[tokio::test]
async fn advanced_cache_derives_key_from_page_shape() -> Result<()> {
    let store = Arc::new(MemoryCache::new());
    let executor = CachedExecutor::new(store.clone());
    let page = ScriptedPage::observing(vec![vec![record("#amount")], vec![record("#amount-2")]]);
    let instruction = "Enter \"0.1\" ETH";

    executor
        .act_with_advanced_cache(&page, instruction, AdvancedOptions::default())
        .await?;
    executor
        .act_with_advanced_cache(&page, instruction, AdvancedOptions::default())
        .await?;
    assert_eq!(page.observe_count(), 1);

    let expected = derive_key(
        "https://app.uniswap.org/swap",
        "Uniswap Interface",
        "Swap Limit Send Buy Sell 0 ETH",
        instruction,
        500,
    );
    assert!(store.get(&expected).await.is_some());

    // a different page body is a different key
    *page.text.lock().unwrap() = "Token list: ETH USDC DAI".into();
    executor
        .act_with_advanced_cache(&page, instruction, AdvancedOptions::default())
        .await?;
    assert_eq!(page.observe_count(), 2);
    assert_eq!(store.len().await, 2);
    Ok(())
}
