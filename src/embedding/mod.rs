//! 임베딩 모듈 - 텍스트 벡터화
//!
//! 패시지와 쿼리를 시맨틱 검색용 벡터로 변환합니다.
//! OpenAI 호환 /v1/embeddings 엔드포인트(Ollama, LM Studio 등)를 사용하며
//! 기본 모델은 all-minilm (384차원)입니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = HttpEmbedding::from_env()?;
//! let embedding = embedder.embed("trilha da cascatinha").await?;
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// 기본 임베딩 차원 (all-MiniLM-L6-v2)
pub const DEFAULT_DIMENSION: usize = 384;

/// 기본 엔드포인트 (Ollama 로컬 서버)
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434/v1";

/// 기본 임베딩 모델
pub const DEFAULT_MODEL: &str = "all-minilm";

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// HTTP Embedding (OpenAI-compatible)
// ============================================================================

/// OpenAI 호환 임베딩 구현체
#[derive(Debug)]
pub struct HttpEmbedding {
    base_url: String,
    model: String,
    client: reqwest::Client,
    dimension: usize,
}

/// /v1/embeddings 요청 본문
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

/// /v1/embeddings 응답
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Debug, Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
}

impl HttpEmbedding {
    /// 새 임베딩 인스턴스 생성
    pub fn new(base_url: String, model: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            client,
            dimension: DEFAULT_DIMENSION,
        })
    }

    /// 환경변수에서 생성
    ///
    /// EMBEDDINGS_BASE_URL / EMBEDDINGS_MODEL이 없으면 로컬 기본값을 사용합니다.
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("EMBEDDINGS_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model =
            std::env::var("EMBEDDINGS_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Self::new(base_url, model)
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        // 빈 텍스트 처리
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        let url = format!("{}/embeddings", self.base_url);
        let request = EmbedRequest {
            model: &self.model,
            input: vec![text],
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to send embedding request")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read embedding response body")?;

        if !status.is_success() {
            anyhow::bail!("Embedding API error ({}): {}", status, body);
        }

        let parsed: EmbedResponse =
            serde_json::from_str(&body).context("Failed to parse embedding response")?;

        let embedding = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))?;

        if embedding.len() != self.dimension {
            anyhow::bail!(
                "Unexpected embedding dimension: got {}, expected {}",
                embedding.len(),
                self.dimension
            );
        }

        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash() {
        let embedder =
            HttpEmbedding::new("http://localhost:11434/v1/".to_string(), "m".to_string()).unwrap();
        assert_eq!(embedder.base_url, "http://localhost:11434/v1");
    }

    #[test]
    fn test_embed_response_parse() {
        let body = r#"{"data":[{"embedding":[0.1,0.2,0.3],"index":0}],"model":"all-minilm"}"#;
        let parsed: EmbedResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.data[0].embedding.len(), 3);
    }

    #[tokio::test]
    async fn test_embed_empty_text_returns_zero_vector() {
        let embedder =
            HttpEmbedding::new("http://localhost:1".to_string(), "m".to_string()).unwrap();
        // 빈 텍스트는 네트워크 호출 없이 0 벡터를 반환
        let result = embedder.embed("   ").await.unwrap();
        assert_eq!(result.len(), DEFAULT_DIMENSION);
        assert!(result.iter().all(|v| *v == 0.0));
    }
}
