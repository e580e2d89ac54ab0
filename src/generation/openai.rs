//! OpenAI 호환 Chat Completions 클라이언트 (Groq 기본)
//!
//! ref: https://console.groq.com/docs/openai

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::LanguageModel;
use crate::config::Config;
use crate::error::RagError;

/// Chat 모델 클라이언트
///
/// 요청 타임아웃은 두지 않습니다. 온도는 0으로 고정입니다.
#[derive(Debug, Clone)]
pub struct OpenAiChat {
    api_key: String,
    endpoint: String,
    model: String,
    temperature: f32,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl OpenAiChat {
    pub fn new(api_key: impl Into<String>, base_url: &str, model: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key: api_key.into(),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.into(),
            temperature: 0.0,
            client,
        })
    }

    /// 설정에서 생성 (API 키 필수)
    pub fn from_config(config: &Config) -> crate::error::Result<Self> {
        let api_key = config.api_key().ok_or_else(|| {
            RagError::Configuration(
                "GROQ_API_KEY is not set. Export it before asking questions.".to_string(),
            )
        })?;

        Ok(Self::new(api_key, &config.base_url, config.llm_model.clone())?)
    }
}

#[async_trait]
impl LanguageModel for OpenAiChat {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
        };

        tracing::debug!("Calling {} ({} prompt chars)", self.model, prompt.len());

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send chat request")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read chat response body")?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ApiError>(&body) {
                anyhow::bail!("Chat API error ({}): {}", status, error.error.message);
            }
            anyhow::bail!("Chat API error ({}): {}", status, body);
        }

        parse_chat_response(&body)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

fn parse_chat_response(body: &str) -> Result<String> {
    let response: ChatResponse =
        serde_json::from_str(body).context("Failed to parse chat response")?;

    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| anyhow::anyhow!("Chat API returned no message choices"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_response() {
        let body = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"EDL uses evidence."}}]}"#;
        assert_eq!(parse_chat_response(body).unwrap(), "EDL uses evidence.");
    }

    #[test]
    fn test_parse_chat_response_keeps_whitespace() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"\n- first\n- second\n"}}]}"#;
        assert_eq!(parse_chat_response(body).unwrap(), "\n- first\n- second\n");
    }

    #[test]
    fn test_parse_chat_response_without_choices() {
        assert!(parse_chat_response(r#"{"choices":[]}"#).is_err());
        assert!(parse_chat_response("not json").is_err());
    }

    #[test]
    fn test_from_config_requires_key() {
        let config = Config::default();
        assert!(matches!(
            OpenAiChat::from_config(&config),
            Err(RagError::Configuration(_))
        ));

        let config = Config {
            api_key: Some("gsk_test".to_string()),
            ..Config::default()
        };
        let chat = OpenAiChat::from_config(&config).unwrap();
        assert_eq!(chat.name(), "llama-3.1-8b-instant");
        assert_eq!(chat.endpoint, "https://api.groq.com/openai/v1/chat/completions");
    }
}
