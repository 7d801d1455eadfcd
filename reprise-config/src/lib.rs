//! Loader for `reprise.yaml` with environment overlays.
//!
//! Sources are merged in order: the YAML file (optional or required), inline
//! YAML snippets, then `REPRISE__`-prefixed environment variables using `__`
//! as the nesting separator (`REPRISE__BROWSER__HEADLESS=true`). String values
//! may reference other variables as `${VAR}`; those are expanded after merging.
//! Every section falls back to defaults, so an empty document is valid.
use config::{Config, ConfigError, Environment, File};
use reprise_common::LlmConfig;
use reprise_common::observability::{LogConfig, LogFormat};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepriseConfig {
    pub browser: BrowserSettings,
    pub cache: CacheSettings,
    pub llm: LlmConfig,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub webdriver_url: String,
    pub headless: bool,
    /// Origin the automation flows start from.
    pub base_url: String,
    pub viewport: Viewport,
    pub dom_settle_ms: u64,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".into(),
            headless: false,
            base_url: "https://app.uniswap.org".into(),
            viewport: Viewport::default(),
            dom_settle_ms: 500,
        }
    }
}

impl BrowserSettings {
    pub fn dom_settle(&self) -> Duration {
        Duration::from_millis(self.dom_settle_ms)
    }

    /// Join `path` onto [`Self::base_url`] without doubling the slash.
    pub fn page_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 768,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// JSON file holding cached element references.
    pub path: PathBuf,
    /// Bound on each visibility check when validating a cached observation.
    pub visibility_timeout_ms: u64,
    /// Characters of visible page text that feed derived cache keys.
    pub key_text_len: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("cache.json"),
            visibility_timeout_ms: 2000,
            key_text_len: 500,
        }
    }
}

impl CacheSettings {
    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_millis(self.visibility_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Directory for the rolling log file; `REPRISE_LOG_DIR` or the user data dir otherwise.
    pub dir: Option<PathBuf>,
    pub format: LogFormat,
    pub stderr: bool,
    /// Filter used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            dir: None,
            format: LogFormat::Text,
            stderr: true,
            filter: "info".into(),
        }
    }
}

impl LoggingSettings {
    pub fn to_log_config(&self, app_name: &str) -> LogConfig {
        LogConfig {
            app_name: app_name.to_string(),
            log_dir: self.dir.clone(),
            emit_stderr: self.stderr,
            format: self.format,
            default_filter: self.filter.clone(),
        }
    }
}

impl RepriseConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.browser.viewport.width == 0 || self.browser.viewport.height == 0 {
            return Err(ConfigError::Message(
                "browser.viewport must be non-zero".into(),
            ));
        }
        if self.cache.key_text_len == 0 {
            return Err(ConfigError::Message(
                "cache.key_text_len must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Builder hides the `config` crate wiring (YAML + env overrides).
pub struct RepriseConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
    env: Environment,
}

impl Default for RepriseConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl RepriseConfigLoader {
    /// Defaults for every section, overridable by files and `REPRISE__` variables.
    ///
    /// ```
    /// use reprise_config::RepriseConfigLoader;
    ///
    /// let config = RepriseConfigLoader::new()
    ///     .with_yaml_str("browser:\n  headless: true")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert!(config.browser.headless);
    /// assert_eq!(config.browser.webdriver_url, "http://localhost:9515");
    /// assert_eq!(config.cache.key_text_len, 500);
    /// ```
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
            env: Environment::with_prefix("REPRISE")
                .separator("__")
                .try_parsing(true),
        }
    }

    /// Attach a required YAML/JSON file; the `config` crate infers format by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Attach a file that may be absent, for environment-only deployments.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Allow tests/CLI to merge inline YAML snippets.
    ///
    /// ```
    /// use reprise_common::LlmConfig;
    /// use reprise_config::RepriseConfigLoader;
    ///
    /// let cfg = RepriseConfigLoader::new()
    ///     .with_yaml_str(
    ///         r#"
    /// llm:
    ///   provider: openai
    ///   model: gpt-4o-mini
    ///   api_key: example
    /// cache:
    ///   path: /tmp/reprise-cache.json
    /// "#,
    ///     )
    ///     .load()
    ///     .unwrap();
    ///
    /// assert!(matches!(cfg.llm, LlmConfig::OpenAi { ref model, .. } if model == "gpt-4o-mini"));
    /// assert_eq!(cfg.cache.path.to_str(), Some("/tmp/reprise-cache.json"));
    /// ```
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Merge all sources, expand `${VAR}` placeholders and deserialize.
    ///
    /// ```
    /// use reprise_common::LlmConfig;
    /// use reprise_config::RepriseConfigLoader;
    ///
    /// unsafe { std::env::set_var("REPRISE_DOC_OPENAI_KEY", "injected-from-env"); }
    ///
    /// let config = RepriseConfigLoader::new()
    ///     .with_yaml_str(r#"
    /// llm:
    ///   provider: openai
    ///   model: gpt-4o
    ///   api_key: "${REPRISE_DOC_OPENAI_KEY}"
    /// "#)
    ///     .load()
    ///     .expect("valid configuration");
    ///
    /// match config.llm {
    ///     LlmConfig::OpenAi { api_key, base_url, .. } => {
    ///         assert_eq!(api_key, "injected-from-env");
    ///         assert!(base_url.is_none());
    ///     }
    ///     other => panic!("expected OpenAI configuration, got {other:?}"),
    /// }
    ///
    /// unsafe { std::env::remove_var("REPRISE_DOC_OPENAI_KEY"); }
    /// ```
    pub fn load(self) -> Result<RepriseConfig, ConfigError> {
        // Environment last so it overrides every file source.
        let cfg = self.builder.add_source(self.env).build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let typed: RepriseConfig =
            serde_json::from_value(v).map_err(|e| ConfigError::Message(e.to_string()))?;
        typed.validate()?;
        Ok(typed)
    }
}
