use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptSource {
    Speech,
    User,
}

/// The text a run starts from. Fields are private so a transcript cannot be
/// edited once a run owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    text: String,
    source: TranscriptSource,
}

impl Transcript {
    pub fn new(text: impl Into<String>, source: TranscriptSource) -> Self {
        Self {
            text: text.into(),
            source,
        }
    }

    pub fn speech(text: impl Into<String>) -> Self {
        Self::new(text, TranscriptSource::Speech)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(text, TranscriptSource::User)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn source(&self) -> TranscriptSource {
        self.source
    }
}

/// One message in a multi-party exchange with a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub source: String,
    pub content: String,
}

impl ConversationTurn {
    pub fn new(source: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    ProviderError,
    EmptyResult,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::ProviderError => "provider_error",
            FailureKind::EmptyResult => "empty_result",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOutcome {
    pub stage_id: String,
    pub text: String,
    pub succeeded: bool,
    pub failure_kind: Option<FailureKind>,
    pub elapsed_ms: u64,
}

impl StageOutcome {
    pub fn success(stage_id: impl Into<String>, text: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            stage_id: stage_id.into(),
            text: text.into(),
            succeeded: true,
            failure_kind: None,
            elapsed_ms,
        }
    }

    pub fn failure(stage_id: impl Into<String>, kind: FailureKind, elapsed_ms: u64) -> Self {
        Self {
            stage_id: stage_id.into(),
            text: String::new(),
            succeeded: false,
            failure_kind: Some(kind),
            elapsed_ms,
        }
    }
}

/// Why a run ended on the deterministic path instead of the model output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    InputTooShort,
    OptimizationDisabled,
    StageFailed,
    EmptyFinalText,
    BridgeTimeout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub run_id: RunId,
    pub input: Transcript,
    pub outcomes: Vec<StageOutcome>,
    pub final_text: String,
    pub used_fallback: bool,
    pub fallback_reason: Option<FallbackReason>,
}

impl PipelineRun {
    pub fn start(input: Transcript) -> Self {
        Self {
            run_id: RunId::new(),
            input,
            outcomes: vec![],
            final_text: String::new(),
            used_fallback: false,
            fallback_reason: None,
        }
    }

    pub fn record(&mut self, outcome: StageOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn finish(mut self, final_text: String) -> Self {
        self.final_text = final_text;
        self
    }

    pub fn finish_with_fallback(mut self, reason: FallbackReason, final_text: String) -> Self {
        self.final_text = final_text;
        self.used_fallback = true;
        self.fallback_reason = Some(reason);
        self
    }

    pub fn failed_stage(&self) -> Option<&StageOutcome> {
        self.outcomes.iter().find(|o| !o.succeeded)
    }

    /// One-line description for logs and interaction records.
    pub fn summary(&self) -> String {
        let stages = self
            .outcomes
            .iter()
            .map(|o| match o.failure_kind {
                None => format!("{}:ok", o.stage_id),
                Some(kind) => format!("{}:{}", o.stage_id, kind.as_str()),
            })
            .collect::<Vec<_>>()
            .join(",");

        format!(
            "run={} stages=[{}] fallback={} reason={:?} chars={}",
            self.run_id,
            stages,
            self.used_fallback,
            self.fallback_reason,
            self.final_text.chars().count()
        )
    }
}
