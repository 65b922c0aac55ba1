use async_trait::async_trait;
use refinevoice_core::{LlmMessage, PipelineOptions, PipelineRun, StageOutcome};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    pub model: String,
    pub temperature: f32,
}

impl ModelSettings {
    pub fn from_options(options: &PipelineOptions) -> Self {
        Self {
            model: options.model_name.clone(),
            temperature: options.temperature,
        }
    }
}

/// Remote chat model shared by every run in the process.
///
/// Implementations should stop work promptly once `cancel` fires; the caller
/// has already given up on the result by then.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(
        &self,
        settings: &ModelSettings,
        messages: &[LlmMessage],
        cancel: &CancellationToken,
    ) -> anyhow::Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub handle: String,
    pub bytes: Vec<u8>,
    pub encoding_hint: Option<String>,
}

pub trait AudioSource: Send + Sync {
    fn fetch(&self, message_id: &str) -> anyhow::Result<AudioClip>;
    fn cleanup(&self, handle: &str) -> anyhow::Result<()>;
}

pub trait Transcriber: Send + Sync {
    fn transcribe(
        &self,
        audio_bytes: &[u8],
        language_code: &str,
        encoding_hint: Option<&str>,
    ) -> anyhow::Result<String>;
}

pub trait MessagingSink: Send + Sync {
    fn reply(&self, token: &str, text: &str) -> anyhow::Result<()>;
    fn push(&self, recipient_id: &str, text: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Audio,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub ts_unix_ms: i64,
    pub user_id: String,
    pub kind: InteractionKind,
    pub original: String,
    pub refined: String,
    pub used_fallback: bool,
    pub outcomes: Vec<StageOutcome>,
}

impl InteractionRecord {
    pub fn from_run(
        ts_unix_ms: i64,
        user_id: impl Into<String>,
        kind: InteractionKind,
        run: &PipelineRun,
    ) -> Self {
        Self {
            ts_unix_ms,
            user_id: user_id.into(),
            kind,
            original: run.input.text().to_string(),
            refined: run.final_text.clone(),
            used_fallback: run.used_fallback,
            outcomes: run.outcomes.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    pub audio_count: u64,
    pub text_count: u64,
    pub first_use_ms: Option<i64>,
    pub last_use_ms: Option<i64>,
}

impl UserStats {
    pub fn total(&self) -> u64 {
        self.audio_count + self.text_count
    }
}

pub trait InteractionLog: Send + Sync {
    fn record(&self, record: InteractionRecord) -> anyhow::Result<()>;
    fn stats(&self, user_id: &str) -> anyhow::Result<UserStats>;
}
