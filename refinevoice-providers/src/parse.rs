use anyhow::{Context, anyhow};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorResponse {
    error: OpenAiErrorBody,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorBody {
    message: String,
}

pub fn parse_openai_chat_completion(body: &[u8]) -> anyhow::Result<String> {
    let resp: OpenAiChatResponse = serde_json::from_slice(body).context("decode chat JSON")?;
    let content = resp
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| anyhow!("no content in chat completion response"))?;
    Ok(content)
}

/// Best-effort summary of a non-2xx body: the `error.message` field when the
/// server sent one, otherwise a truncated copy of the raw text.
pub fn describe_error_body(body: &[u8]) -> String {
    if let Ok(resp) = serde_json::from_slice::<OpenAiErrorResponse>(body) {
        return resp.error.message;
    }
    String::from_utf8_lossy(body).chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_openai_chat_content() {
        let body = br#"{"choices":[{"message":{"content":"hi"}}]}"#;
        assert_eq!(parse_openai_chat_completion(body).unwrap(), "hi");
    }

    #[test]
    fn openai_missing_content_errors() {
        let body = br#"{"choices":[{"message":{}}]}"#;
        assert!(parse_openai_chat_completion(body).is_err());
        assert!(parse_openai_chat_completion(br#"{"choices":[]}"#).is_err());
    }

    #[test]
    fn error_body_prefers_message_field() {
        let body = br#"{"error":{"message":"invalid api key","type":"auth"}}"#;
        assert_eq!(describe_error_body(body), "invalid api key");
        assert_eq!(describe_error_body(b"bad gateway"), "bad gateway");
    }
}
