use crate::guard::{GuardError, StageTimeoutGuard};
use crate::traits::{LlmProvider, ModelSettings};
use refinevoice_core::{
    ConversationTurn, DeterministicRule, FailureKind, FallbackConverter, PlannedStage,
    ResultExtractor, StageKind, StageSpec, TeamSpec, USER_SOURCE, char_len, collapse_whitespace,
    conversation_messages, ensure_terminal_punctuation, filter_enhancement_output,
    filter_transcription_output, wrap_transcript,
};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum StageFailure {
    #[error("stage {stage_id} timed out: {source}")]
    Timeout {
        stage_id: String,
        #[source]
        source: GuardError,
    },

    #[error("stage {stage_id} failed: {source}")]
    Provider {
        stage_id: String,
        #[source]
        source: GuardError,
    },

    #[error("stage {stage_id} produced no usable text")]
    EmptyResult { stage_id: String },
}

impl StageFailure {
    fn from_guard(stage_id: &str, err: GuardError) -> Self {
        let stage_id = stage_id.to_string();
        match err.failure_kind() {
            FailureKind::Timeout => StageFailure::Timeout {
                stage_id,
                source: err,
            },
            _ => StageFailure::Provider {
                stage_id,
                source: err,
            },
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            StageFailure::Timeout { .. } => FailureKind::Timeout,
            StageFailure::Provider { .. } => FailureKind::ProviderError,
            StageFailure::EmptyResult { .. } => FailureKind::EmptyResult,
        }
    }
}

/// Shared, read-only collaborators a stage needs for one run.
pub struct StageContext<'a> {
    pub llm: &'a dyn LlmProvider,
    pub settings: &'a ModelSettings,
    pub guard: &'a StageTimeoutGuard,
    pub extractor: &'a ResultExtractor,
    pub converter: &'a FallbackConverter,
    /// Upper bound applied to every single-stage deadline.
    pub max_stage_timeout: Duration,
    pub min_input_length: usize,
    pub min_output_length: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Deterministic { id: String, rule: DeterministicRule },
    AiDelegate(StageSpec),
    Collaboration(TeamSpec),
}

impl Stage {
    pub fn from_planned(planned: PlannedStage) -> Self {
        match planned {
            PlannedStage::Single(spec) => match spec.kind {
                StageKind::Deterministic(rule) => Stage::Deterministic { id: spec.id, rule },
                StageKind::AiDelegate => Stage::AiDelegate(spec),
            },
            PlannedStage::Team(team) => Stage::Collaboration(team),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Stage::Deterministic { id, .. } => id,
            Stage::AiDelegate(spec) => &spec.id,
            Stage::Collaboration(team) => &team.id,
        }
    }

    /// Runs the stage and reduces its output to the text handed downstream.
    ///
    /// Model-backed stages refuse upstream text that is blank or shorter than
    /// the minimum input length.
    pub async fn run(&self, text: &str, ctx: &StageContext<'_>) -> Result<String, StageFailure> {
        let turns = match self {
            Stage::Deterministic { rule, .. } => return Ok(apply_rule(*rule, text, ctx.converter)),
            Stage::AiDelegate(spec) => {
                self.require_upstream(text, ctx)?;
                invoke_delegate(spec, text, ctx).await?
            }
            Stage::Collaboration(team) => {
                self.require_upstream(text, ctx)?;
                invoke_team(team, text, ctx).await?
            }
        };
        let (expected, marker) = self.expected_author();

        ctx.extractor
            .extract(&turns, expected, marker)
            .filter(|out| char_len(out) >= ctx.min_output_length)
            .ok_or_else(|| StageFailure::EmptyResult {
                stage_id: self.id().to_string(),
            })
    }

    fn require_upstream(&self, text: &str, ctx: &StageContext<'_>) -> Result<(), StageFailure> {
        let chars = char_len(text.trim());
        if chars > 0 && chars >= ctx.min_input_length {
            return Ok(());
        }

        log::info!(
            "Pipeline: stage {} got {chars} upstream chars (< {}), not calling the model",
            self.id(),
            ctx.min_input_length.max(1)
        );
        Err(StageFailure::EmptyResult {
            stage_id: self.id().to_string(),
        })
    }

    fn expected_author(&self) -> (&str, Option<&str>) {
        match self {
            Stage::Deterministic { id, .. } => (id, None),
            Stage::AiDelegate(spec) => (&spec.id, spec.marker()),
            Stage::Collaboration(team) => match team.members.last() {
                Some(last) => (&last.id, last.marker()),
                None => (&team.id, None),
            },
        }
    }
}

pub fn apply_rule(rule: DeterministicRule, text: &str, converter: &FallbackConverter) -> String {
    match rule {
        DeterministicRule::TranscriptFilter => filter_transcription_output(text),
        DeterministicRule::ScriptConversion => converter.convert(text),
        DeterministicRule::TerminalPunctuation => ensure_terminal_punctuation(text),
        DeterministicRule::CollapseWhitespace => collapse_whitespace(text),
    }
}

fn opening_turns(text: &str) -> Vec<ConversationTurn> {
    vec![ConversationTurn::new(USER_SOURCE, wrap_transcript(text))]
}

async fn invoke_delegate(
    spec: &StageSpec,
    text: &str,
    ctx: &StageContext<'_>,
) -> Result<Vec<ConversationTurn>, StageFailure> {
    let mut turns = opening_turns(text);
    let deadline = spec.timeout().min(ctx.max_stage_timeout);
    let messages = conversation_messages(spec, &turns);
    let reply = ctx
        .guard
        .guard(deadline, |cancel| async move {
            ctx.llm.complete(ctx.settings, &messages, &cancel).await
        })
        .await
        .map_err(|e| StageFailure::from_guard(&spec.id, e))?;

    turns.push(ConversationTurn::new(
        spec.id.clone(),
        filter_enhancement_output(&reply),
    ));
    Ok(turns)
}

/// Runs the team conversation under one deadline; the result starts with the
/// initiating turn.
async fn invoke_team(
    team: &TeamSpec,
    text: &str,
    ctx: &StageContext<'_>,
) -> Result<Vec<ConversationTurn>, StageFailure> {
    let deadline = Duration::from_millis(team.timeout_ms);
    ctx.guard
        .guard(deadline, |cancel| run_team(team, opening_turns(text), ctx, cancel))
        .await
        .map_err(|e| StageFailure::from_guard(&team.id, e))
}

async fn run_team(
    team: &TeamSpec,
    mut turns: Vec<ConversationTurn>,
    ctx: &StageContext<'_>,
    cancel: CancellationToken,
) -> anyhow::Result<Vec<ConversationTurn>> {
    let Some(last) = team.members.last() else {
        return Err(anyhow::anyhow!("collaboration team {} has no members", team.id));
    };

    'rounds: loop {
        for member in &team.members {
            if turns.len() >= team.max_messages {
                log::debug!(
                    "Pipeline: team {} reached {} messages",
                    team.id,
                    turns.len()
                );
                break 'rounds;
            }
            if cancel.is_cancelled() {
                return Err(anyhow::anyhow!("collaboration cancelled"));
            }

            let messages = conversation_messages(member, &turns);
            let reply = ctx.llm.complete(ctx.settings, &messages, &cancel).await?;
            let reply = filter_enhancement_output(&reply);
            let done = member.id == last.id && last.marker().is_some_and(|m| reply.contains(m));
            turns.push(ConversationTurn::new(member.id.clone(), reply));

            if done {
                break 'rounds;
            }
        }
    }

    Ok(turns)
}
