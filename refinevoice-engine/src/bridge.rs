use crate::orchestrator::PipelineOrchestrator;
use refinevoice_core::{FallbackReason, PipelineRun, Transcript};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;
use tokio::runtime::{Builder, Handle};
use tokio_util::sync::CancellationToken;

/// Drives pipeline runs from synchronous callers.
///
/// If the calling thread is already inside a tokio runtime, the run is handed
/// to a dedicated thread with its own current-thread runtime and the caller
/// blocks on the result for at most the bridge timeout. Otherwise a
/// current-thread runtime is built and the run is driven inline.
#[derive(Clone)]
pub struct PipelineRunner {
    orchestrator: Arc<PipelineOrchestrator>,
    wait: Duration,
}

impl PipelineRunner {
    pub fn new(orchestrator: Arc<PipelineOrchestrator>) -> Self {
        let wait = orchestrator.options().bridge_timeout();
        Self { orchestrator, wait }
    }

    pub fn with_timeout(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    pub fn orchestrator(&self) -> &Arc<PipelineOrchestrator> {
        &self.orchestrator
    }

    pub fn run_blocking(&self, transcript: Transcript) -> PipelineRun {
        match Handle::try_current() {
            Ok(_) => {
                log::debug!("Pipeline: runtime active, handing run to worker thread");
                self.run_isolated(transcript)
            }
            Err(_) => self.run_inline(transcript),
        }
    }

    fn run_inline(&self, transcript: Transcript) -> PipelineRun {
        let rt = match Builder::new_current_thread().enable_all().build() {
            Ok(rt) => rt,
            Err(e) => {
                log::error!("Pipeline: failed to build runtime: {e}");
                return self.timed_out(transcript);
            }
        };

        let orchestrator = Arc::clone(&self.orchestrator);
        let input = transcript.clone();
        let wait = self.wait;
        let outcome = rt.block_on(async move {
            tokio::time::timeout(wait, orchestrator.run(input)).await
        });

        match outcome {
            Ok(run) => run,
            Err(_) => {
                log::warn!("Pipeline: inline run exceeded {}ms", wait.as_millis());
                self.timed_out(transcript)
            }
        }
    }

    fn run_isolated(&self, transcript: Transcript) -> PipelineRun {
        let (tx, rx) = mpsc::channel();
        let orchestrator = Arc::clone(&self.orchestrator);
        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();
        let input = transcript.clone();

        let spawned = std::thread::Builder::new()
            .name("refinevoice-run".into())
            .spawn(move || {
                let rt = match Builder::new_current_thread().enable_all().build() {
                    Ok(rt) => rt,
                    Err(e) => {
                        log::error!("Pipeline: worker failed to build runtime: {e}");
                        return;
                    }
                };
                let run = rt.block_on(orchestrator.run_with_cancel(input, worker_cancel));
                // The caller may have stopped waiting.
                let _ = tx.send(run);
            });

        if let Err(e) = spawned {
            log::error!("Pipeline: failed to spawn worker thread: {e}");
            return self.timed_out(transcript);
        }

        match rx.recv_timeout(self.wait) {
            Ok(run) => run,
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "Pipeline: worker exceeded {}ms, cancelling",
                    self.wait.as_millis()
                );
                cancel.cancel();
                self.timed_out(transcript)
            }
            Err(RecvTimeoutError::Disconnected) => self.timed_out(transcript),
        }
    }

    fn timed_out(&self, transcript: Transcript) -> PipelineRun {
        self.orchestrator
            .fallback_run(transcript, FallbackReason::BridgeTimeout)
    }
}
