// src/providers/openai.rs
// OpenAI-compatible HTTP client for /embeddings and /chat/completions

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{Embedding, EmbeddingProvider, GenerationProvider, ProviderError};

const GENERATION_TEMPERATURE: f32 = 0.1;

pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatContent,
}

#[derive(Deserialize)]
struct ChatContent {
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Connection(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
        })
    }

    async fn post_json<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, ProviderError> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<R>()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for OpenAiClient {
    async fn embed(&self, text: &str, model: &str) -> Result<Embedding, ProviderError> {
        debug!(model = %model, text_len = text.len(), "Requesting embedding");
        let resp: EmbedResponse = self
            .post_json("embeddings", &EmbedRequest { model, input: text })
            .await?;

        resp.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ProviderError::InvalidResponse("empty embedding data".to_string()))
    }
}

#[async_trait::async_trait]
impl GenerationProvider for OpenAiClient {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        model: &str,
    ) -> Result<String, ProviderError> {
        debug!(model = %model, prompt_len = user_prompt.len(), "Requesting completion");
        let req = ChatRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature: GENERATION_TEMPERATURE,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let resp: ChatResponse = self.post_json("chat/completions", &req).await?;
        resp.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::InvalidResponse("no completion choices".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client =
            OpenAiClient::new("https://api.openai.com/v1/", "sk-test", Duration::from_secs(5))
                .unwrap();
        assert_eq!(client.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn test_chat_request_shape() {
        let req = ChatRequest {
            model: "gpt-4-turbo-preview",
            messages: vec![ChatMessage {
                role: "user",
                content: "hi",
            }],
            temperature: GENERATION_TEMPERATURE,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["response_format"]["type"], "json_object");
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn test_embed_response_parsing() {
        let body = r#"{"data":[{"embedding":[0.5,-0.25],"index":0}],"model":"m"}"#;
        let resp: EmbedResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.data[0].embedding, vec![0.5, -0.25]);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_connection_error() {
        let client =
            OpenAiClient::new("http://127.0.0.1:1", "sk-test", Duration::from_secs(2)).unwrap();
        match client.embed("text", "model").await {
            Err(ProviderError::Connection(_)) => {}
            other => panic!("expected connection error, got {:?}", other),
        }
    }

    #[test]
    fn test_error_display() {
        let err = ProviderError::Status {
            status: 429,
            body: "quota".to_string(),
        };
        assert!(err.to_string().contains("429"));
    }
}
