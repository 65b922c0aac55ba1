use crate::fallback::ConversionTable;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_COMPLETION_MARKER: &str = "TERMINATE";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_STAGE_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_COLLABORATION_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MIN_INPUT_LENGTH: usize = 3;
pub const DEFAULT_COLLABORATION_MAX_MESSAGES: usize = 6;
pub const DEFAULT_BRIDGE_TIMEOUT_MS: u64 = 45_000;
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("temperature {0} is outside 0.0..=2.0")]
    TemperatureOutOfRange(f32),
    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),
    #[error("no stages configured")]
    NoStages,
    #[error("stage id must not be empty")]
    EmptyStageId,
    #[error("duplicate stage id: {0}")]
    DuplicateStageId(String),
    #[error("ai_delegate stage {0} has no instruction")]
    MissingInstruction(String),
    #[error("invalid conversion table: {0}")]
    ConversionTable(String),
}

/// Local rules a deterministic stage can apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeterministicRule {
    TranscriptFilter,
    ScriptConversion,
    TerminalPunctuation,
    CollapseWhitespace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    AiDelegate,
    Deterministic(DeterministicRule),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSpec {
    pub id: String,
    pub kind: StageKind,

    // System prompt; only meaningful for ai_delegate stages.
    #[serde(default)]
    pub instruction: String,

    #[serde(default)]
    pub completion_marker: Option<String>,

    #[serde(default = "default_stage_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_stage_timeout_ms() -> u64 {
    DEFAULT_STAGE_TIMEOUT_MS
}

impl StageSpec {
    pub fn ai_delegate(id: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: StageKind::AiDelegate,
            instruction: instruction.into(),
            completion_marker: Some(DEFAULT_COMPLETION_MARKER.into()),
            timeout_ms: DEFAULT_STAGE_TIMEOUT_MS,
        }
    }

    pub fn deterministic(id: impl Into<String>, rule: DeterministicRule) -> Self {
        Self {
            id: id.into(),
            kind: StageKind::Deterministic(rule),
            instruction: String::new(),
            completion_marker: None,
            timeout_ms: DEFAULT_STAGE_TIMEOUT_MS,
        }
    }

    pub fn with_marker(mut self, marker: Option<&str>) -> Self {
        self.completion_marker = marker.map(str::to_string);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn is_ai_delegate(&self) -> bool {
        self.kind == StageKind::AiDelegate
    }

    pub fn marker(&self) -> Option<&str> {
        self.completion_marker
            .as_deref()
            .filter(|m| !m.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineMode {
    // Each ai_delegate stage is called on its own, in order.
    #[default]
    Sequential,
    // All ai_delegate stages share one round-robin conversation.
    Collaboration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    pub model_name: String,
    pub temperature: f32,
    pub per_stage_timeout_ms: u64,
    pub collaboration_timeout_ms: u64,
    pub min_input_length: usize,
    pub min_output_length: usize,
    pub optimization_enabled: bool,
    pub mode: PipelineMode,
    pub collaboration_max_messages: usize,
    pub bridge_timeout_ms: u64,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_MODEL.into(),
            temperature: DEFAULT_TEMPERATURE,
            per_stage_timeout_ms: DEFAULT_STAGE_TIMEOUT_MS,
            collaboration_timeout_ms: DEFAULT_COLLABORATION_TIMEOUT_MS,
            min_input_length: DEFAULT_MIN_INPUT_LENGTH,
            min_output_length: 1,
            optimization_enabled: true,
            mode: PipelineMode::Sequential,
            collaboration_max_messages: DEFAULT_COLLABORATION_MAX_MESSAGES,
            bridge_timeout_ms: DEFAULT_BRIDGE_TIMEOUT_MS,
        }
    }
}

impl PipelineOptions {
    pub fn per_stage_timeout(&self) -> Duration {
        Duration::from_millis(self.per_stage_timeout_ms)
    }

    pub fn collaboration_timeout(&self) -> Duration {
        Duration::from_millis(self.collaboration_timeout_ms)
    }

    pub fn bridge_timeout(&self) -> Duration {
        Duration::from_millis(self.bridge_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::TemperatureOutOfRange(self.temperature));
        }
        if self.per_stage_timeout_ms == 0 {
            return Err(ConfigError::ZeroValue("per_stage_timeout_ms"));
        }
        if self.collaboration_timeout_ms == 0 {
            return Err(ConfigError::ZeroValue("collaboration_timeout_ms"));
        }
        if self.bridge_timeout_ms == 0 {
            return Err(ConfigError::ZeroValue("bridge_timeout_ms"));
        }
        if self.min_output_length == 0 {
            return Err(ConfigError::ZeroValue("min_output_length"));
        }
        if self.collaboration_max_messages == 0 {
            return Err(ConfigError::ZeroValue("collaboration_max_messages"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmEndpoint {
    pub base_url: String,
}

impl Default for LlmEndpoint {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LLM_BASE_URL.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub options: PipelineOptions,
    #[serde(default)]
    pub stages: Vec<StageSpec>,
    #[serde(default)]
    pub llm: LlmEndpoint,

    // Replaces the builtin fallback table when present.
    #[serde(default)]
    pub conversion_table: Option<ConversionTable>,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.options.validate()?;
        validate_stages(&self.stages)?;
        if let Some(table) = &self.conversion_table {
            table.validate()?;
        }
        Ok(())
    }

    /// Every completion marker any stage may emit.
    pub fn completion_markers(&self) -> Vec<String> {
        completion_markers(&self.stages)
    }
}

pub fn validate_stages(stages: &[StageSpec]) -> Result<(), ConfigError> {
    if stages.is_empty() {
        return Err(ConfigError::NoStages);
    }

    let mut seen = HashSet::new();
    for stage in stages {
        if stage.id.trim().is_empty() {
            return Err(ConfigError::EmptyStageId);
        }
        if !seen.insert(stage.id.as_str()) {
            return Err(ConfigError::DuplicateStageId(stage.id.clone()));
        }
        if stage.timeout_ms == 0 {
            return Err(ConfigError::ZeroValue("timeout_ms"));
        }
        if stage.is_ai_delegate() && stage.instruction.trim().is_empty() {
            return Err(ConfigError::MissingInstruction(stage.id.clone()));
        }
    }
    Ok(())
}

pub fn completion_markers(stages: &[StageSpec]) -> Vec<String> {
    let mut out: Vec<String> = vec![];
    for marker in stages.iter().filter_map(StageSpec::marker) {
        if !out.iter().any(|m| m == marker) {
            out.push(marker.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn specs() -> Vec<StageSpec> {
        vec![
            StageSpec::deterministic("filter", DeterministicRule::TranscriptFilter),
            StageSpec::ai_delegate("optimizer", "Fix the text."),
            StageSpec::ai_delegate("converter", "Convert the text.").with_marker(Some("DONE")),
        ]
    }

    #[test]
    fn default_options_are_valid() {
        assert_eq!(PipelineOptions::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_temperature_out_of_range() {
        let opts = PipelineOptions {
            temperature: 2.5,
            ..Default::default()
        };
        assert_eq!(
            opts.validate(),
            Err(ConfigError::TemperatureOutOfRange(2.5))
        );
    }

    #[test]
    fn rejects_duplicate_and_empty_stages() {
        let mut stages = specs();
        stages.push(StageSpec::ai_delegate("optimizer", "again"));
        assert_eq!(
            validate_stages(&stages),
            Err(ConfigError::DuplicateStageId("optimizer".into()))
        );

        let stages = vec![StageSpec::ai_delegate("x", "  ")];
        assert_eq!(
            validate_stages(&stages),
            Err(ConfigError::MissingInstruction("x".into()))
        );

        assert_eq!(validate_stages(&[]), Err(ConfigError::NoStages));
    }

    #[test]
    fn collects_unique_markers() {
        assert_eq!(completion_markers(&specs()), vec!["TERMINATE", "DONE"]);
    }

    #[test]
    fn stage_kind_uses_snake_case_json() {
        let json = serde_json::to_string(&specs()).unwrap();
        assert!(json.contains("\"ai_delegate\""));
        assert!(json.contains("{\"deterministic\":\"transcript_filter\"}"));

        let parsed: Vec<StageSpec> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, specs());
    }

    #[test]
    fn partial_config_fills_defaults() {
        let cfg: AppConfig =
            serde_json::from_str(r#"{"options":{"temperature":0.2}}"#).unwrap();
        assert_eq!(cfg.options.temperature, 0.2);
        assert_eq!(cfg.options.min_input_length, DEFAULT_MIN_INPUT_LENGTH);
        assert_eq!(cfg.llm.base_url, DEFAULT_LLM_BASE_URL);
        assert!(cfg.stages.is_empty());
    }
}
