use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use refinevoice_core::{PipelineRun, Transcript};
use refinevoice_engine::PipelineRunner;
use refinevoice_engine::traits::{
    AudioClip, AudioSource, InteractionKind, InteractionLog, InteractionRecord, MessagingSink,
    Transcriber,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::messages::{self, TextCommand};

pub const DEFAULT_LANGUAGE_CODE: &str = "zh-TW";

/// Failures before the pipeline; the user gets a retry prompt instead of a run.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("audio download failed: {0:#}")]
    AudioDownload(anyhow::Error),

    #[error("transcription failed: {0:#}")]
    Transcription(anyhow::Error),

    #[error("transcription was empty")]
    EmptyTranscript,
}

impl ServiceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ServiceError::AudioDownload(_) => "語音檔案下載失敗",
            ServiceError::Transcription(_) | ServiceError::EmptyTranscript => {
                "語音處理失敗，請重試"
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioEvent {
    pub reply_token: String,
    pub user_id: String,
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEvent {
    pub reply_token: String,
    pub user_id: String,
    pub text: String,
}

/// Synchronous message handlers behind the webhook transport.
#[derive(Clone)]
pub struct VoiceBotService {
    runner: PipelineRunner,
    audio: Arc<dyn AudioSource>,
    transcriber: Arc<dyn Transcriber>,
    sink: Arc<dyn MessagingSink>,
    interactions: Arc<dyn InteractionLog>,
    language_code: String,
}

impl VoiceBotService {
    pub fn new(
        runner: PipelineRunner,
        audio: Arc<dyn AudioSource>,
        transcriber: Arc<dyn Transcriber>,
        sink: Arc<dyn MessagingSink>,
        interactions: Arc<dyn InteractionLog>,
    ) -> Self {
        Self {
            runner,
            audio,
            transcriber,
            sink,
            interactions,
            language_code: DEFAULT_LANGUAGE_CODE.into(),
        }
    }

    pub fn with_language_code(mut self, code: impl Into<String>) -> Self {
        self.language_code = code.into();
        self
    }

    /// Downloads, transcribes and refines one voice message, then pushes the
    /// result (or a retry prompt) to the sender.
    pub fn handle_audio(&self, event: &AudioEvent) -> Result<PipelineRun, ServiceError> {
        log::info!("Bot: audio message {} from {}", event.message_id, event.user_id);
        self.send_reply(&event.reply_token, messages::PROCESSING);

        let text = match self.transcribe_message(&event.message_id) {
            Ok(text) => text,
            Err(e) => {
                log::warn!("Bot: {e}");
                self.send_push(&event.user_id, &messages::retry_prompt(e.user_message()));
                return Err(e);
            }
        };

        let run = self.runner.run_blocking(Transcript::speech(text));
        log::info!("Bot: {}", run.summary());
        self.record(&event.user_id, InteractionKind::Audio, &run);

        self.send_push(
            &event.user_id,
            &messages::audio_result(run.input.text(), &run.final_text),
        );
        Ok(run)
    }

    /// Answers a text message: help, usage statistics, or a refined version
    /// of the text. Returns the reply that was sent.
    pub fn handle_text(&self, event: &TextEvent) -> String {
        let reply = match messages::parse_text_command(&event.text) {
            TextCommand::Help => messages::HELP.to_string(),
            TextCommand::Status => match self.interactions.stats(&event.user_id) {
                Ok(stats) => messages::status(&stats),
                Err(e) => {
                    log::warn!("Bot: failed to load stats for {}: {e:#}", event.user_id);
                    messages::NO_RECORDS.to_string()
                }
            },
            TextCommand::Refine(text) => {
                let run = self.runner.run_blocking(Transcript::user(text));
                log::info!("Bot: {}", run.summary());
                self.record(&event.user_id, InteractionKind::Text, &run);
                messages::text_result(&run.final_text)
            }
        };

        self.send_reply(&event.reply_token, &reply);
        reply
    }

    fn transcribe_message(&self, message_id: &str) -> Result<String, ServiceError> {
        let clip = self
            .audio
            .fetch(message_id)
            .map_err(ServiceError::AudioDownload)?;

        let result = self.transcribe_clip(&clip);

        if let Err(e) = self.audio.cleanup(&clip.handle) {
            log::warn!("Bot: failed to clean up audio {}: {e:#}", clip.handle);
        }

        result
    }

    fn transcribe_clip(&self, clip: &AudioClip) -> Result<String, ServiceError> {
        let text = self
            .transcriber
            .transcribe(
                &clip.bytes,
                &self.language_code,
                clip.encoding_hint.as_deref(),
            )
            .map_err(ServiceError::Transcription)?;

        let text = text.trim();
        if text.is_empty() {
            return Err(ServiceError::EmptyTranscript);
        }
        Ok(text.to_string())
    }

    fn record(&self, user_id: &str, kind: InteractionKind, run: &PipelineRun) {
        let record = InteractionRecord::from_run(now_unix_ms(), user_id, kind, run);
        if let Err(e) = self.interactions.record(record) {
            log::warn!("Bot: failed to record interaction: {e:#}");
        }
    }

    fn send_reply(&self, token: &str, text: &str) {
        if let Err(e) = self.sink.reply(token, text) {
            log::error!("Bot: reply failed: {e:#}");
        }
    }

    fn send_push(&self, user_id: &str, text: &str) {
        if let Err(e) = self.sink.push(user_id, text) {
            log::error!("Bot: push to {user_id} failed: {e:#}");
        }
    }
}

fn now_unix_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(i64::MAX)
}
