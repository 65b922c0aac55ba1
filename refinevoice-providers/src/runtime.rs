use crate::request::{Body, HttpRequest};
use anyhow::{Context, anyhow};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Process-wide HTTP client.
///
/// Pipeline runs may execute on short-lived runtimes (see the blocking
/// runner), so pooled connections must not outlive the runtime that opened
/// them; idle pooling is disabled.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
}

impl HttpClient {
    pub fn new() -> anyhow::Result<Self> {
        let inner = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(0)
            .build()
            .context("build http client")?;
        Ok(Self { inner })
    }

    pub async fn execute(&self, req: &HttpRequest) -> anyhow::Result<HttpResponse> {
        let mut headers = HeaderMap::new();
        for (k, v) in &req.headers {
            let name = HeaderName::from_bytes(k.as_bytes())
                .with_context(|| format!("invalid header name: {k}"))?;
            let value = HeaderValue::from_str(v)
                .with_context(|| format!("invalid header value for {k}"))?;
            headers.insert(name, value);
        }

        let builder = match req.method.as_str() {
            "GET" => self.inner.get(&req.url),
            "POST" => self.inner.post(&req.url),
            "PUT" => self.inner.put(&req.url),
            "DELETE" => self.inner.delete(&req.url),
            other => return Err(anyhow!("unsupported method: {other}")),
        }
        .headers(headers);

        let builder = match &req.body {
            Body::Empty => builder,
            Body::Json(s) => builder.body(s.clone()),
        };

        log::debug!("http: {} {}", req.method, req.url);
        let resp = builder.send().await.context("http request failed")?;
        let status = resp.status().as_u16();
        let body = resp
            .bytes()
            .await
            .context("failed reading response body")?
            .to_vec();

        Ok(HttpResponse { status, body })
    }
}
