//! LLM 모듈 - Groq API를 통한 텍스트 생성
//!
//! 질문 분류와 답변 생성에 사용하는 채팅 프로바이더입니다.
//! Groq는 OpenAI 호환 chat/completions API를 제공합니다.
//! source: https://console.groq.com/docs/api-reference

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GuideError;

/// Groq chat completions 엔드포인트
const GROQ_CHAT_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

/// 기본 모델
pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

/// 호출당 타임아웃 (생성 백엔드는 턴에서 유일한 장기 지연 지점)
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// Types
// ============================================================================

/// 채팅 메시지 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// 채팅 메시지
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// 생성 옵션
#[derive(Debug, Clone, Copy)]
pub struct ChatOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ChatOptions {
    /// 분류용 옵션 (낮은 온도, 짧은 출력)
    pub fn for_classification() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 100,
        }
    }

    /// 답변 생성용 옵션
    pub fn for_answering() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 2000,
        }
    }
}

// ============================================================================
// ChatProvider Trait
// ============================================================================

/// 채팅 생성 프로바이더 트레이트
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// 단일 completions 호출
    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: ChatOptions,
    ) -> Result<String, GuideError>;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Groq Chat
// ============================================================================

/// Groq 채팅 구현체
#[derive(Debug)]
pub struct GroqChat {
    api_key: String,
    client: reqwest::Client,
    model: String,
}

/// Groq API 요청 본문
#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

/// Groq API 응답
#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

impl GroqChat {
    /// 새 Groq 채팅 인스턴스 생성
    pub fn new(api_key: String) -> Result<Self, GuideError> {
        Self::with_model(api_key, DEFAULT_MODEL.to_string())
    }

    /// 모델을 지정하여 생성
    pub fn with_model(api_key: String, model: String) -> Result<Self, GuideError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GuideError::GenerationFailure(format!("HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            client,
            model,
        })
    }

    /// 환경변수 GROQ_API_KEY에서 생성
    pub fn from_env() -> Result<Self, GuideError> {
        let api_key = get_api_key().ok_or_else(|| {
            GuideError::GenerationFailure(
                "GROQ_API_KEY not set. Set: export GROQ_API_KEY=your-key".to_string(),
            )
        })?;
        Self::new(api_key)
    }
}

#[async_trait]
impl ChatProvider for GroqChat {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: ChatOptions,
    ) -> Result<String, GuideError> {
        let request = CompletionRequest {
            model: &self.model,
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stream: false,
        };

        let response = self
            .client
            .post(GROQ_CHAT_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GuideError::GenerationTimeout
                } else {
                    GuideError::GenerationFailure(format!("request failed: {}", e))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GuideError::GenerationFailure(format!("response body: {}", e)))?;

        if !status.is_success() {
            return Err(GuideError::GenerationFailure(format!(
                "Groq API error ({}): {}",
                status, body
            )));
        }

        let completion: CompletionResponse = serde_json::from_str(&body)
            .map_err(|e| GuideError::GenerationFailure(format!("parse response: {}", e)))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        if content.is_empty() {
            return Err(GuideError::GenerationFailure(
                "empty completion".to_string(),
            ));
        }

        Ok(content)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// API Key Management
// ============================================================================

/// GROQ_API_KEY 환경변수에서 API 키 로드
pub fn get_api_key() -> Option<String> {
    std::env::var("GROQ_API_KEY")
        .ok()
        .filter(|key| !key.is_empty())
}

/// API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    get_api_key().is_some()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_role_serialization() {
        let msg = ChatMessage::system("instrução");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"role\":\"system\""));

        let msg = ChatMessage::assistant("resposta");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"role\":\"assistant\""));
    }

    #[test]
    fn test_chat_options_presets() {
        let classify = ChatOptions::for_classification();
        assert!(classify.temperature < 0.2);
        assert_eq!(classify.max_tokens, 100);

        let answer = ChatOptions::for_answering();
        assert_eq!(answer.max_tokens, 2000);
    }

    #[test]
    fn test_completion_response_parse() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"trilhas"}}]}"#;
        let parsed: CompletionResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content, "trilhas");
    }
}
