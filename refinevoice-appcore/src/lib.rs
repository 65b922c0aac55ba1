pub mod messages;
pub mod service;

pub use service::{AudioEvent, ServiceError, TextEvent, VoiceBotService};
