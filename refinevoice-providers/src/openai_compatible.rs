use crate::request::HttpRequest;
use refinevoice_core::LlmMessage;
use serde_json::json;

#[derive(Clone, PartialEq)]
pub struct OpenAiCompatibleChatConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
}

impl std::fmt::Debug for OpenAiCompatibleChatConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleChatConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .finish()
    }
}

pub fn build_chat_completions_request(
    cfg: &OpenAiCompatibleChatConfig,
    messages: &[LlmMessage],
) -> HttpRequest {
    let url = join_url(&cfg.base_url, "/chat/completions");

    let payload = json!({
        "model": cfg.model,
        "messages": messages.iter().map(|m| json!({"role": m.role, "content": m.content})).collect::<Vec<_>>(),
        "temperature": cfg.temperature,
    });

    HttpRequest::post_json(url, payload.to_string()).bearer_auth(&cfg.api_key)
}

pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{}/{}", base, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Body;

    fn cfg() -> OpenAiCompatibleChatConfig {
        OpenAiCompatibleChatConfig {
            base_url: "https://api.example.com/v1".into(),
            api_key: "k".into(),
            model: "gpt-4o-mini".into(),
            temperature: 0.7,
        }
    }

    #[test]
    fn join_url_handles_trailing_slash() {
        assert_eq!(
            join_url("https://api.example.com/", "/chat/completions"),
            "https://api.example.com/chat/completions"
        );
        assert_eq!(
            join_url("https://api.example.com", "chat/completions"),
            "https://api.example.com/chat/completions"
        );
    }

    #[test]
    fn builds_authorized_json_request() {
        let req = build_chat_completions_request(
            &cfg(),
            &[LlmMessage::system("be brief"), LlmMessage::user("hi")],
        );

        assert_eq!(req.method, "POST");
        assert_eq!(req.url, "https://api.example.com/v1/chat/completions");
        assert_eq!(req.header("authorization"), Some("Bearer k"));
        let Body::Json(s) = req.body else {
            panic!("expected json");
        };
        let v: serde_json::Value = serde_json::from_str(&s).unwrap();
        assert_eq!(v["model"], "gpt-4o-mini");
        assert_eq!(v["messages"][0]["role"], "system");
        assert_eq!(v["messages"][1]["content"], "hi");
        assert!((v["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn config_debug_hides_api_key() {
        let mut c = cfg();
        c.api_key = "sk-secret".into();
        assert!(!format!("{c:?}").contains("sk-secret"));
    }
}
