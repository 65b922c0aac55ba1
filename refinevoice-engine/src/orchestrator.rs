use crate::guard::StageTimeoutGuard;
use crate::stage::{Stage, StageContext};
use crate::traits::{LlmProvider, ModelSettings};
use refinevoice_core::{
    Capabilities, FallbackConverter, FallbackReason, PipelineOptions, PipelineRun,
    ResultExtractor, StageOutcome, StageSpec, Transcript, char_len, collapse_whitespace,
    completion_markers, ensure_terminal_punctuation, select_stage_plan, strip_tokens,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

pub(crate) fn ms(d: Duration) -> u64 {
    d.as_millis().try_into().unwrap_or(u64::MAX)
}

/// Runs the configured stages in order and degrades to the fallback converter
/// whenever a stage cannot produce usable text.
///
/// The orchestrator holds only read-only state; one instance serves any
/// number of concurrent runs.
pub struct PipelineOrchestrator {
    stages: Vec<Stage>,
    ai_enabled: bool,
    options: PipelineOptions,
    settings: ModelSettings,
    llm: Arc<dyn LlmProvider>,
    extractor: ResultExtractor,
    converter: FallbackConverter,
    markers: Vec<String>,
}

impl PipelineOrchestrator {
    pub fn new(
        specs: &[StageSpec],
        options: PipelineOptions,
        caps: Capabilities,
        llm: Arc<dyn LlmProvider>,
        converter: FallbackConverter,
    ) -> Self {
        let plan = select_stage_plan(specs, &options, caps);
        let markers = completion_markers(specs);

        log::info!(
            "Pipeline: plan {:?} (ai_enabled={})",
            plan.ids(),
            plan.ai_enabled
        );

        Self {
            ai_enabled: plan.ai_enabled,
            stages: plan.stages.into_iter().map(Stage::from_planned).collect(),
            settings: ModelSettings::from_options(&options),
            options,
            llm,
            extractor: ResultExtractor::new(markers.clone()),
            converter: converter.with_stripped_tokens(markers.clone()),
            markers,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn ai_enabled(&self) -> bool {
        self.ai_enabled
    }

    pub fn stage_ids(&self) -> Vec<&str> {
        self.stages.iter().map(Stage::id).collect()
    }

    pub fn converter(&self) -> &FallbackConverter {
        &self.converter
    }

    /// A finished run that skipped every stage.
    pub fn fallback_run(&self, transcript: Transcript, reason: FallbackReason) -> PipelineRun {
        let text = self.converter.convert(transcript.text());
        PipelineRun::start(transcript).finish_with_fallback(reason, text)
    }

    pub async fn run(&self, transcript: Transcript) -> PipelineRun {
        self.run_with_cancel(transcript, CancellationToken::new())
            .await
    }

    /// Like `run`, but in-flight model calls are abandoned once `cancel`
    /// fires; the run then completes through the fallback path.
    pub async fn run_with_cancel(
        &self,
        transcript: Transcript,
        cancel: CancellationToken,
    ) -> PipelineRun {
        let input = transcript.text().to_string();
        let input_chars = char_len(input.trim());

        if input_chars < self.options.min_input_length {
            log::info!(
                "Pipeline: input has {input_chars} chars (< {}), using fallback",
                self.options.min_input_length
            );
            return self.fallback_run(transcript, FallbackReason::InputTooShort);
        }

        let mut run = PipelineRun::start(transcript);
        log::info!(
            "Pipeline: run {} starting ({} chars, {} stages)",
            run.run_id,
            input_chars,
            self.stages.len()
        );

        let guard = StageTimeoutGuard::with_parent(cancel);
        let ctx = StageContext {
            llm: self.llm.as_ref(),
            settings: &self.settings,
            guard: &guard,
            extractor: &self.extractor,
            converter: &self.converter,
            max_stage_timeout: self.options.per_stage_timeout(),
            min_input_length: self.options.min_input_length,
            min_output_length: self.options.min_output_length,
        };

        let mut current = input.clone();
        for stage in &self.stages {
            let t0 = Instant::now();
            match stage.run(&current, &ctx).await {
                Ok(text) => {
                    let elapsed_ms = ms(t0.elapsed());
                    log::info!("Pipeline: stage {} ok in {elapsed_ms}ms", stage.id());
                    run.record(StageOutcome::success(stage.id(), text.clone(), elapsed_ms));
                    current = text;
                }
                Err(failure) => {
                    let elapsed_ms = ms(t0.elapsed());
                    log::warn!("Pipeline: {failure} after {elapsed_ms}ms, using fallback");
                    run.record(StageOutcome::failure(stage.id(), failure.kind(), elapsed_ms));
                    let text = self.converter.convert(&input);
                    return run.finish_with_fallback(FallbackReason::StageFailed, text);
                }
            }
        }

        let Some(final_text) = self.finalize(&current) else {
            log::warn!("Pipeline: run {} produced empty text, using fallback", run.run_id);
            let text = self.converter.convert(&input);
            return run.finish_with_fallback(FallbackReason::EmptyFinalText, text);
        };

        let run = if self.ai_enabled {
            run.finish(final_text)
        } else {
            run.finish_with_fallback(FallbackReason::OptimizationDisabled, final_text)
        };
        log::info!("Pipeline: {}", run.summary());
        run
    }

    fn finalize(&self, text: &str) -> Option<String> {
        let (stripped, removed) = strip_tokens(text, &self.markers);
        let text = if removed {
            collapse_whitespace(&stripped)
        } else {
            stripped.trim().to_string()
        };

        if text.is_empty() || char_len(&text) < self.options.min_output_length {
            return None;
        }
        Some(ensure_terminal_punctuation(&text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use refinevoice_core::{DeterministicRule, FailureKind, LlmMessage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Echo {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmProvider for Echo {
        async fn complete(
            &self,
            _settings: &ModelSettings,
            messages: &[LlmMessage],
            _cancel: &CancellationToken,
        ) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let body = messages
                .last()
                .map(|m| m.content.replace("<TRANSCRIPT>", "").replace("</TRANSCRIPT>", ""))
                .unwrap_or_default();
            Ok(format!("{} TERMINATE", body.trim()))
        }
    }

    fn echo() -> Arc<Echo> {
        Arc::new(Echo {
            calls: AtomicUsize::new(0),
        })
    }

    fn specs() -> Vec<StageSpec> {
        vec![
            StageSpec::deterministic("filter", DeterministicRule::TranscriptFilter),
            StageSpec::ai_delegate("optimizer", "Fix."),
        ]
    }

    #[tokio::test]
    async fn successful_run_strips_markers_and_terminates() {
        let llm = echo();
        let orch = PipelineOrchestrator::new(
            &specs(),
            PipelineOptions::default(),
            Capabilities::new(true, true),
            llm.clone(),
            FallbackConverter::builtin(),
        );

        let run = orch.run(Transcript::speech("um hello there world")).await;
        assert!(!run.used_fallback);
        assert_eq!(run.final_text, "hello there world.");
        assert_eq!(run.outcomes.len(), 2);
        assert!(run.outcomes.iter().all(|o| o.succeeded));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn short_input_never_reaches_the_model() {
        let llm = echo();
        let orch = PipelineOrchestrator::new(
            &specs(),
            PipelineOptions::default(),
            Capabilities::new(true, true),
            llm.clone(),
            FallbackConverter::builtin(),
        );

        for input in ["", "  ", "好", "ok"] {
            let run = orch.run(Transcript::user(input)).await;
            assert!(run.used_fallback);
            assert_eq!(run.fallback_reason, Some(FallbackReason::InputTooShort));
            assert_eq!(run.final_text, orch.converter().convert(input));
            assert!(!run.final_text.is_empty());
        }
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn disabled_optimization_still_normalizes() {
        let llm = echo();
        let orch = PipelineOrchestrator::new(
            &specs(),
            PipelineOptions::default(),
            Capabilities::new(true, false),
            llm.clone(),
            FallbackConverter::builtin(),
        );

        let run = orch.run(Transcript::speech("这个软件的网络设置有问题")).await;
        assert_eq!(run.final_text, "這個軟體的網路設定有問題。");
        assert!(run.used_fallback);
        assert_eq!(run.fallback_reason, Some(FallbackReason::OptimizationDisabled));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_extraction_falls_back_to_original_input() {
        struct MarkerOnly;

        #[async_trait]
        impl LlmProvider for MarkerOnly {
            async fn complete(
                &self,
                _: &ModelSettings,
                _: &[LlmMessage],
                _: &CancellationToken,
            ) -> anyhow::Result<String> {
                Ok("TERMINATE".into())
            }
        }

        let orch = PipelineOrchestrator::new(
            &specs(),
            PipelineOptions::default(),
            Capabilities::new(true, true),
            Arc::new(MarkerOnly),
            FallbackConverter::builtin(),
        );

        let run = orch.run(Transcript::speech("网络设置 TERMINATE")).await;
        assert!(run.used_fallback);
        assert_eq!(run.fallback_reason, Some(FallbackReason::StageFailed));
        assert_eq!(
            run.failed_stage().and_then(|o| o.failure_kind),
            Some(FailureKind::EmptyResult)
        );
        assert_eq!(run.final_text, "網路設定。");
        assert!(!run.final_text.contains("TERMINATE"));
    }

    #[tokio::test]
    async fn cancelled_run_completes_through_fallback() {
        let llm = echo();
        let orch = PipelineOrchestrator::new(
            &specs(),
            PipelineOptions::default(),
            Capabilities::new(true, true),
            llm.clone(),
            FallbackConverter::builtin(),
        );

        let cancel = CancellationToken::new();
        cancel.cancel();
        let run = orch
            .run_with_cancel(Transcript::speech("设置一下网络"), cancel)
            .await;

        assert!(run.used_fallback);
        assert_eq!(run.outcomes.last().and_then(|o| o.failure_kind), Some(FailureKind::Timeout));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn filtered_away_upstream_falls_back_without_calling_the_model() {
        let llm = echo();
        let orch = PipelineOrchestrator::new(
            &specs(),
            PipelineOptions::default(),
            Capabilities::new(true, true),
            llm.clone(),
            FallbackConverter::builtin(),
        );

        let run = orch.run(Transcript::speech("[music] (uh)")).await;
        assert!(run.used_fallback);
        assert_eq!(run.fallback_reason, Some(FallbackReason::StageFailed));
        assert_eq!(run.outcomes.len(), 2);
        assert_eq!(
            run.failed_stage().map(|o| (o.stage_id.as_str(), o.failure_kind)),
            Some(("optimizer", Some(FailureKind::EmptyResult)))
        );
        assert_eq!(run.final_text, orch.converter().convert("[music] (uh)"));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn final_text_is_never_empty_marked_or_wrapped() {
        // Replies with the wrapped prompt exactly as it was sent.
        struct Parrot;

        #[async_trait]
        impl LlmProvider for Parrot {
            async fn complete(
                &self,
                _: &ModelSettings,
                messages: &[LlmMessage],
                _: &CancellationToken,
            ) -> anyhow::Result<String> {
                Ok(messages.last().map(|m| m.content.clone()).unwrap_or_default())
            }
        }

        let inputs = [
            "",
            "TERMINATE",
            "TERMINATE。",
            "网络设置 TERMINATE 有问题",
            "请检查网络 TERMINATE. 谢谢",
            "[music] (uh)",
            "(uh) TERMINATE [noise]",
        ];
        let providers: [Arc<dyn LlmProvider>; 2] = [echo(), Arc::new(Parrot)];

        for llm in providers {
            let orch = PipelineOrchestrator::new(
                &specs(),
                PipelineOptions::default(),
                Capabilities::new(true, true),
                llm,
                FallbackConverter::builtin(),
            );

            for input in inputs {
                let run = orch.run(Transcript::speech(input)).await;
                let out = &run.final_text;
                assert!(!out.trim().is_empty(), "{input:?}");
                assert!(!out.contains("TERMINATE"), "{input:?} -> {out:?}");
                assert!(!out.contains("TRANSCRIPT"), "{input:?} -> {out:?}");
            }
        }
    }

    #[tokio::test]
    async fn marker_inside_input_is_stripped_on_success() {
        let orch = PipelineOrchestrator::new(
            &specs(),
            PipelineOptions::default(),
            Capabilities::new(true, true),
            echo(),
            FallbackConverter::builtin(),
        );

        let run = orch.run(Transcript::speech("hello TERMINATE. world")).await;
        assert!(!run.used_fallback);
        assert_eq!(run.final_text, "hello world.");
    }
}
