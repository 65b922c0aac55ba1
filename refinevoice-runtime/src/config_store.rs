use crate::defaults::{default_app_config, default_stage_specs};
use crate::fs_util::write_json_atomic;
use anyhow::Context;
use refinevoice_core::{AppConfig, DEFAULT_TEMPERATURE};
use std::path::{Path, PathBuf};

pub const ENV_MODEL: &str = "AUTOGEN_MODEL";
pub const ENV_TEMPERATURE: &str = "AUTOGEN_TEMPERATURE";
pub const ENV_OPTIMIZATION: &str = "ENABLE_TEXT_OPTIMIZATION";
pub const ENV_BASE_URL: &str = "OPENAI_BASE_URL";

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> anyhow::Result<AppConfig> {
        let bytes = std::fs::read(&self.path)
            .with_context(|| format!("read config: {}", self.path.display()))?;
        let mut cfg: AppConfig = serde_json::from_slice(&bytes).context("decode config JSON")?;
        if cfg.stages.is_empty() {
            log::info!("Config: no stages in {}, using defaults", self.path.display());
            cfg.stages = default_stage_specs();
        }
        Ok(cfg)
    }

    /// Loads the file, or returns the default configuration if it does not exist.
    pub fn load_or_default(&self) -> anyhow::Result<AppConfig> {
        if !self.path.exists() {
            log::info!(
                "Config: {} not found, using defaults",
                self.path.display()
            );
            return Ok(default_app_config());
        }
        self.load()
    }

    pub fn save(&self, cfg: &AppConfig) -> anyhow::Result<()> {
        write_json_atomic(&self.path, cfg)
    }
}

/// Deployment overrides read from the process environment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvOverrides {
    pub model: Option<String>,
    pub temperature: Option<String>,
    pub optimization: Option<String>,
    pub base_url: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            model: get(ENV_MODEL),
            temperature: get(ENV_TEMPERATURE),
            optimization: get(ENV_OPTIMIZATION),
            base_url: get(ENV_BASE_URL),
        }
    }

    pub fn apply(&self, cfg: &mut AppConfig) {
        if let Some(model) = &self.model {
            cfg.options.model_name = model.trim().to_string();
        }
        if let Some(raw) = &self.temperature {
            cfg.options.temperature = parse_temperature(raw);
        }
        if let Some(raw) = &self.optimization {
            cfg.options.optimization_enabled = raw.trim().eq_ignore_ascii_case("true");
        }
        if let Some(url) = &self.base_url {
            cfg.llm.base_url = url.trim().to_string();
        }
    }
}

/// Tolerates values like `AUTOGEN_TEMPERATURE=0.3` pasted whole into the
/// variable; anything unusable falls back to the default.
pub fn parse_temperature(raw: &str) -> f32 {
    let value = raw.rsplit('=').next().unwrap_or(raw).trim();
    match value.parse::<f32>() {
        Ok(t) if (0.0..=2.0).contains(&t) => t,
        Ok(t) => {
            log::warn!("Config: temperature {t} out of range, using {DEFAULT_TEMPERATURE}");
            DEFAULT_TEMPERATURE
        }
        Err(_) => {
            log::warn!("Config: invalid temperature {raw:?}, using {DEFAULT_TEMPERATURE}");
            DEFAULT_TEMPERATURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refinevoice_core::{DeterministicRule, PipelineMode, StageSpec};
    use std::collections::HashMap;

    #[test]
    fn round_trips_config() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::at_path(dir.path().join("nested").join("config.json"));

        let mut cfg = default_app_config();
        cfg.options.mode = PipelineMode::Collaboration;
        cfg.options.model_name = "gpt-4o-mini".into();
        cfg.stages
            .push(StageSpec::deterministic("punct", DeterministicRule::TerminalPunctuation));

        store.save(&cfg).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::at_path(dir.path().join("absent.json"));
        let cfg = store.load_or_default().unwrap();
        assert_eq!(cfg, default_app_config());
        assert!(store.load().is_err());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"options":{"min_input_length":5}}"#).unwrap();

        let cfg = ConfigStore::at_path(&path).load().unwrap();
        assert_eq!(cfg.options.min_input_length, 5);
        assert_eq!(cfg.options.per_stage_timeout_ms, 15_000);
        assert_eq!(cfg.stages, default_stage_specs());
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_MODEL, " gpt-4o-mini "),
            (ENV_TEMPERATURE, "AUTOGEN_TEMPERATURE=0.3"),
            (ENV_OPTIMIZATION, "FALSE"),
            (ENV_BASE_URL, "http://localhost:8080/v1"),
        ]);
        let overrides = EnvOverrides::from_lookup(|k| env.get(k).map(|v| v.to_string()));

        let mut cfg = default_app_config();
        overrides.apply(&mut cfg);
        assert_eq!(cfg.options.model_name, "gpt-4o-mini");
        assert!((cfg.options.temperature - 0.3).abs() < 1e-6);
        assert!(!cfg.options.optimization_enabled);
        assert_eq!(cfg.llm.base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn empty_env_leaves_config_untouched() {
        let overrides = EnvOverrides::from_lookup(|_| Some("  ".into()));
        let mut cfg = default_app_config();
        overrides.apply(&mut cfg);
        assert_eq!(cfg, default_app_config());
    }

    #[test]
    fn temperature_parsing_is_tolerant() {
        assert_eq!(parse_temperature("1.2"), 1.2);
        assert_eq!(parse_temperature(" 0 "), 0.0);
        assert_eq!(parse_temperature("x=y=0.5"), 0.5);
        assert_eq!(parse_temperature("hot"), DEFAULT_TEMPERATURE);
        assert_eq!(parse_temperature("3.5"), DEFAULT_TEMPERATURE);
        assert_eq!(parse_temperature("-1"), DEFAULT_TEMPERATURE);
    }
}
