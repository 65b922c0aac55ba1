use crate::config::{DeterministicRule, PipelineMode, PipelineOptions, StageKind, StageSpec};
use serde::{Deserialize, Serialize};

pub const COLLABORATION_STAGE_ID: &str = "collaboration";
pub const FALLBACK_STAGE_ID: &str = "script_conversion";

/// What the process can do, decided once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub llm_available: bool,
    pub optimization_enabled: bool,
}

impl Capabilities {
    pub fn new(llm_available: bool, optimization_enabled: bool) -> Self {
        Self {
            llm_available,
            optimization_enabled,
        }
    }

    pub fn ai_enabled(&self) -> bool {
        self.llm_available && self.optimization_enabled
    }
}

/// A round-robin group of ai_delegate specs sharing one conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamSpec {
    pub id: String,
    pub members: Vec<StageSpec>,
    pub timeout_ms: u64,
    pub max_messages: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedStage {
    Single(StageSpec),
    Team(TeamSpec),
}

impl PlannedStage {
    pub fn id(&self) -> &str {
        match self {
            PlannedStage::Single(spec) => &spec.id,
            PlannedStage::Team(team) => &team.id,
        }
    }

    pub fn uses_model(&self) -> bool {
        match self {
            PlannedStage::Single(spec) => spec.is_ai_delegate(),
            PlannedStage::Team(_) => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    pub stages: Vec<PlannedStage>,
    pub ai_enabled: bool,
}

impl StagePlan {
    pub fn ids(&self) -> Vec<&str> {
        self.stages.iter().map(PlannedStage::id).collect()
    }
}

/// Chooses between the model-backed stage list and the all-deterministic one.
pub fn select_stage_plan(
    specs: &[StageSpec],
    options: &PipelineOptions,
    caps: Capabilities,
) -> StagePlan {
    if !caps.ai_enabled() || !specs.iter().any(StageSpec::is_ai_delegate) {
        return deterministic_plan(specs);
    }

    let stages = match options.mode {
        PipelineMode::Sequential => specs.iter().cloned().map(PlannedStage::Single).collect(),
        PipelineMode::Collaboration => collaboration_stages(specs, options),
    };

    StagePlan {
        stages,
        ai_enabled: true,
    }
}

fn deterministic_plan(specs: &[StageSpec]) -> StagePlan {
    let mut stages: Vec<PlannedStage> = specs
        .iter()
        .filter(|s| !s.is_ai_delegate())
        .cloned()
        .map(PlannedStage::Single)
        .collect();

    let converts = specs
        .iter()
        .any(|s| s.kind == StageKind::Deterministic(DeterministicRule::ScriptConversion));
    if !converts {
        stages.push(PlannedStage::Single(StageSpec::deterministic(
            FALLBACK_STAGE_ID,
            DeterministicRule::ScriptConversion,
        )));
    }

    StagePlan {
        stages,
        ai_enabled: false,
    }
}

fn collaboration_stages(specs: &[StageSpec], options: &PipelineOptions) -> Vec<PlannedStage> {
    let members: Vec<StageSpec> = specs.iter().filter(|s| s.is_ai_delegate()).cloned().collect();
    let mut team = Some(TeamSpec {
        id: COLLABORATION_STAGE_ID.into(),
        members,
        timeout_ms: options.collaboration_timeout_ms,
        max_messages: options.collaboration_max_messages,
    });

    let mut out = vec![];
    for spec in specs {
        if spec.is_ai_delegate() {
            // The team takes the slot of the first ai_delegate spec.
            if let Some(team) = team.take() {
                out.push(PlannedStage::Team(team));
            }
        } else {
            out.push(PlannedStage::Single(spec.clone()));
        }
    }
    out
}
