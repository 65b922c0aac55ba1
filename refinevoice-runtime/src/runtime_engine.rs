use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use refinevoice_core::{AppConfig, Capabilities, FallbackConverter, LlmMessage};
use refinevoice_engine::traits::{LlmProvider, ModelSettings};
use refinevoice_engine::{PipelineOrchestrator, PipelineRunner};
use refinevoice_providers::runtime::HttpClient;
use tokio_util::sync::CancellationToken;

use crate::config_store::{ConfigStore, EnvOverrides};
use crate::llm::OpenAiCompatibleLlmProvider;

pub const ENV_API_KEY: &str = "OPENAI_API_KEY";

pub fn llm_api_key_from_env() -> Option<String> {
    std::env::var(ENV_API_KEY)
        .ok()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
}

pub fn capabilities_for(cfg: &AppConfig, api_key: Option<&str>) -> Capabilities {
    Capabilities::new(
        api_key.is_some_and(|k| !k.trim().is_empty()),
        cfg.options.optimization_enabled,
    )
}

/// Stand-in used when no API key is configured; the stage plan never routes
/// to it, but the orchestrator always holds a provider.
#[derive(Debug, Clone, Copy)]
struct UnavailableLlm;

#[async_trait::async_trait]
impl LlmProvider for UnavailableLlm {
    async fn complete(
        &self,
        _settings: &ModelSettings,
        _messages: &[LlmMessage],
        _cancel: &CancellationToken,
    ) -> anyhow::Result<String> {
        Err(anyhow::anyhow!("no LLM API key configured"))
    }
}

/// Builds a runnable pipeline from config; the API key comes from the caller
/// so it never has to live in the config file.
pub fn build_runner_from_config(
    cfg: &AppConfig,
    api_key: Option<String>,
) -> anyhow::Result<PipelineRunner> {
    cfg.validate().context("invalid configuration")?;

    let caps = capabilities_for(cfg, api_key.as_deref());
    if !caps.llm_available {
        log::warn!("Runtime: {ENV_API_KEY} not set, AI stages disabled");
    }

    let llm: Arc<dyn LlmProvider> = match api_key {
        Some(key) if caps.llm_available => Arc::new(OpenAiCompatibleLlmProvider::new(
            HttpClient::new()?,
            cfg.llm.base_url.clone(),
            key,
        )),
        _ => Arc::new(UnavailableLlm),
    };

    let converter = match &cfg.conversion_table {
        Some(table) => FallbackConverter::new(table.clone()).context("conversion table")?,
        None => FallbackConverter::builtin(),
    };

    let orchestrator =
        PipelineOrchestrator::new(&cfg.stages, cfg.options.clone(), caps, llm, converter);
    Ok(PipelineRunner::new(Arc::new(orchestrator)))
}

/// Loads config (file or defaults), applies environment overrides and reads
/// the API key from the environment.
pub fn load_runner(config_path: &Path) -> anyhow::Result<(AppConfig, PipelineRunner)> {
    let mut cfg = ConfigStore::at_path(config_path).load_or_default()?;
    EnvOverrides::from_env().apply(&mut cfg);
    let runner = build_runner_from_config(&cfg, llm_api_key_from_env())?;
    Ok((cfg, runner))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::default_app_config;
    use refinevoice_core::{FallbackReason, Transcript};

    #[test]
    fn missing_key_selects_deterministic_plan() {
        let cfg = default_app_config();
        let runner = build_runner_from_config(&cfg, None).unwrap();
        assert!(!runner.orchestrator().ai_enabled());

        let run = runner.run_blocking(Transcript::speech("嗯，这个软件的网络设置有问题"));
        assert_eq!(run.final_text, "這個軟體的網路設定有問題。");
        assert_eq!(run.fallback_reason, Some(FallbackReason::OptimizationDisabled));
    }

    #[test]
    fn key_and_enabled_option_select_ai_plan() {
        let cfg = default_app_config();
        let runner = build_runner_from_config(&cfg, Some("sk-test".into())).unwrap();
        assert!(runner.orchestrator().ai_enabled());
        assert_eq!(
            runner.orchestrator().stage_ids(),
            vec![
                "transcript_filter",
                "content_optimizer",
                "traditional_chinese_converter"
            ]
        );
    }

    #[test]
    fn disabled_optimization_wins_over_key() {
        let mut cfg = default_app_config();
        cfg.options.optimization_enabled = false;
        assert!(!capabilities_for(&cfg, Some("sk")).ai_enabled());
        assert!(!capabilities_for(&default_app_config(), Some("  ")).llm_available);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut cfg = default_app_config();
        cfg.options.temperature = 3.0;
        assert!(build_runner_from_config(&cfg, None).is_err());
    }
}
