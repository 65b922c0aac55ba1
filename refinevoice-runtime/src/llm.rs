use refinevoice_core::LlmMessage;
use refinevoice_engine::traits::{LlmProvider, ModelSettings};
use refinevoice_providers::openai_compatible::{
    OpenAiCompatibleChatConfig, build_chat_completions_request,
};
use refinevoice_providers::parse::{describe_error_body, parse_openai_chat_completion};
use refinevoice_providers::runtime::HttpClient;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct OpenAiCompatibleLlmProvider {
    client: HttpClient,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for OpenAiCompatibleLlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleLlmProvider")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl OpenAiCompatibleLlmProvider {
    pub fn new(client: HttpClient, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatibleLlmProvider {
    async fn complete(
        &self,
        settings: &ModelSettings,
        messages: &[LlmMessage],
        cancel: &CancellationToken,
    ) -> anyhow::Result<String> {
        let cfg = OpenAiCompatibleChatConfig {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            model: settings.model.clone(),
            temperature: settings.temperature,
        };
        let req = build_chat_completions_request(&cfg, messages);

        let resp = tokio::select! {
            resp = self.client.execute(&req) => resp?,
            _ = cancel.cancelled() => {
                return Err(anyhow::anyhow!("chat completion cancelled"));
            }
        };

        if !resp.is_success() {
            return Err(anyhow::anyhow!(
                "OpenAI-compatible request failed: status={} error={}",
                resp.status,
                describe_error_body(&resp.body)
            ));
        }

        parse_openai_chat_completion(&resp.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings() -> ModelSettings {
        ModelSettings {
            model: "gpt-4o".into(),
            temperature: 0.7,
        }
    }

    #[tokio::test]
    async fn sends_bearer_key_and_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_string_contains("\"model\":\"gpt-4o\""))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{"choices":[{"message":{"content":"好的 TERMINATE"}}]}"#,
                "application/json",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let llm = OpenAiCompatibleLlmProvider::new(
            HttpClient::new().unwrap(),
            format!("{}/v1/", server.uri()),
            "sk-test",
        );
        let out = llm
            .complete(&settings(), &[LlmMessage::user("hi")], &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, "好的 TERMINATE");
    }

    #[tokio::test]
    async fn error_status_carries_server_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429)
                    .set_body_string(r#"{"error":{"message":"rate limited"}}"#),
            )
            .mount(&server)
            .await;

        let llm = OpenAiCompatibleLlmProvider::new(HttpClient::new().unwrap(), server.uri(), "k");
        let err = llm
            .complete(&settings(), &[LlmMessage::user("hi")], &CancellationToken::new())
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("429"));
        assert!(msg.contains("rate limited"));
    }

    #[tokio::test]
    async fn cancellation_abandons_the_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(10)),
            )
            .mount(&server)
            .await;

        let llm = OpenAiCompatibleLlmProvider::new(HttpClient::new().unwrap(), server.uri(), "k");
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = llm
            .complete(&settings(), &[LlmMessage::user("hi")], &cancel)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cancelled"));
    }

    #[test]
    fn debug_hides_api_key() {
        let llm = OpenAiCompatibleLlmProvider::new(
            HttpClient::new().unwrap(),
            "https://api.example.com/v1",
            "sk-secret",
        );
        assert!(!format!("{llm:?}").contains("sk-secret"));
    }
}
