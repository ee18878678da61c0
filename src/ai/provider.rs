//! OpenAI-compatible provider client: `/embeddings` and `/chat/completions`
//! as two black-box RPCs with bearer auth and a bounded retry loop. 401 is
//! permanent and aborts the calling phase.

use crate::core::errors::AiError;
use serde_json::json;
use std::time::Duration;
use tracing::warn;

/// Exactly three attempts per call: the first immediately, then retries
/// after these delays. A 429 with `Retry-After` overrides the delay before
/// its retry.
const RETRY_DELAYS: [Duration; 2] = [Duration::from_secs(1), Duration::from_secs(2)];

pub struct AiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    chat_model: String,
    embed_model: String,
    embed_dimensions: usize,
}

impl AiProvider {
    pub fn new(
        client: reqwest::Client,
        base_url: String,
        api_key: String,
        chat_model: String,
        embed_model: String,
        embed_dimensions: usize,
    ) -> Self {
        Self {
            client,
            base_url,
            api_key,
            chat_model,
            embed_model,
            embed_dimensions,
        }
    }

    async fn post(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, AiError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AiError::Transient(e.to_string()))?;

        let status = response.status().as_u16();
        if status == 401 {
            return Err(AiError::Auth);
        }
        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return Err(AiError::RateLimited { retry_after });
        }
        if !(200..300).contains(&status) {
            return Err(AiError::Transient(format!("HTTP {status} from {path}")));
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| AiError::Malformed(e.to_string()))
    }

    async fn post_with_retry(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, AiError> {
        let mut last_err = AiError::Transient("no attempt made".into());

        for attempt in 0..=RETRY_DELAYS.len() {
            if attempt > 0 {
                // Server-stated Retry-After wins over the backoff schedule.
                let delay = match &last_err {
                    AiError::RateLimited {
                        retry_after: Some(secs),
                    } => Duration::from_secs(*secs),
                    _ => RETRY_DELAYS[attempt - 1],
                };
                tokio::time::sleep(delay).await;
            }

            match self.post(path, &body).await {
                Ok(value) => return Ok(value),
                Err(AiError::Auth) => return Err(AiError::Auth),
                Err(e) => {
                    warn!(
                        "provider call {} failed (attempt {}/{}): {}",
                        path,
                        attempt + 1,
                        RETRY_DELAYS.len() + 1,
                        e
                    );
                    last_err = e;
                }
            }
        }

        Err(last_err)
    }

    /// Embed a batch of texts; one vector per input, in order.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AiError> {
        let body = json!({
            "model": self.embed_model,
            "input": texts,
            "dimensions": self.embed_dimensions,
        });
        let response = self.post_with_retry("/embeddings", body).await?;

        let data = response
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| AiError::Malformed("missing data array".into()))?;

        let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());
        for (pos, item) in data.iter().enumerate() {
            let index = item
                .get("index")
                .and_then(|i| i.as_u64())
                .map(|i| i as usize)
                .unwrap_or(pos);
            let vector = item
                .get("embedding")
                .and_then(|e| e.as_array())
                .ok_or_else(|| AiError::Malformed("missing embedding".into()))?
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect();
            indexed.push((index, vector));
        }
        indexed.sort_by_key(|(i, _)| *i);

        if indexed.len() != texts.len() {
            return Err(AiError::Malformed(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                indexed.len()
            )));
        }
        Ok(indexed.into_iter().map(|(_, v)| v).collect())
    }

    /// One chat completion; returns the assistant message text.
    pub async fn chat(&self, prompt: &str) -> Result<String, AiError> {
        let body = json!({
            "model": self.chat_model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": 0.2,
        });
        let response = self.post_with_retry("/chat/completions", body).await?;

        response
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(|s| s.trim().to_string())
            .ok_or_else(|| AiError::Malformed("missing choices[0].message.content".into()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Test support — a one-socket HTTP responder for provider/phase tests
// ─────────────────────────────────────────────────────────────────────────────


#[cfg(test)]
mod tests {
    use super::test_support::{spawn_http_mock, MockResponse};
    use super::*;
    use std::sync::atomic::Ordering;
    use std::time::Instant;

    fn provider_for(base: String) -> AiProvider {
        AiProvider::new(
            reqwest::Client::new(),
            base,
            "test-key".into(),
            "gpt-test".into(),
            "embed-test".into(),
            4,
        )
    }

    fn chat_ok(content: &str) -> MockResponse {
        MockResponse::json(
            200,
            &serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": content}}]
            })
            .to_string(),
        )
    }

    #[tokio::test]
    async fn auth_failure_short_circuits_without_retry() {
        let (base, hits) = spawn_http_mock(vec![MockResponse::json(401, "{}")]).await;
        let err = provider_for(base).chat("hello").await.unwrap_err();
        assert!(matches!(err, AiError::Auth));
        assert_eq!(hits.load(Ordering::SeqCst), 1, "401 must not be retried");
    }

    #[tokio::test]
    async fn transient_failures_stop_after_exactly_three_attempts() {
        let (base, hits) = spawn_http_mock(vec![MockResponse::json(500, "{}")]).await;
        let started = Instant::now();
        let err = provider_for(base).chat("hello").await.unwrap_err();
        assert!(matches!(err, AiError::Transient(_)));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        // 1 s + 2 s of scheduled backoff between the three attempts.
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn retry_after_is_honored_before_the_next_attempt() {
        let (base, hits) = spawn_http_mock(vec![
            MockResponse::json(429, "{}").with_header("retry-after", "1"),
            chat_ok("pong"),
        ])
        .await;
        let started = Instant::now();
        let reply = provider_for(base).chat("ping").await.unwrap();
        assert_eq!(reply, "pong");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn embed_orders_vectors_by_index() {
        let body = serde_json::json!({
            "data": [
                {"index": 1, "embedding": [0.2, 0.2]},
                {"index": 0, "embedding": [0.1, 0.1]}
            ]
        })
        .to_string();
        let (base, _hits) = spawn_http_mock(vec![MockResponse::json(200, &body)]).await;
        let vectors = provider_for(base)
            .embed(&["a".into(), "b".into()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![0.1, 0.1], vec![0.2, 0.2]]);
    }

    #[tokio::test]
    async fn short_embedding_response_is_malformed() {
        let body = r#"{"data": [{"index": 0, "embedding": [0.1]}]}"#;
        let (base, _hits) = spawn_http_mock(vec![MockResponse::json(200, body)]).await;
        let err = provider_for(base)
            .embed(&["a".into(), "b".into()])
            .await
            .unwrap_err();
        assert!(matches!(err, AiError::Malformed(_)));
    }
}
