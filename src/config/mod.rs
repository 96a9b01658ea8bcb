//! Configuration - 환경 변수 및 데이터 디렉토리
//!
//! 모든 설정은 환경 변수에서 읽습니다. 기능 가용성(capability)은
//! 구동 시점에 한 번 판정되어 파이프라인에 주입됩니다.

use std::path::PathBuf;

use crate::embedding;

/// 데이터 디렉토리 (로컬 데이터 폴더의 .tijuca-guia)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tijuca-guia")
}

// ============================================================================
// AppConfig
// ============================================================================

/// 애플리케이션 설정
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// 데이터 디렉토리
    pub data_dir: PathBuf,
    /// Groq API 키 (분류/생성)
    pub groq_api_key: Option<String>,
    /// weatherapi.com API 키
    pub weather_api_key: Option<String>,
    /// 임베딩 서버 주소
    pub embeddings_base_url: String,
    /// 임베딩 모델명
    pub embeddings_model: String,
}

impl AppConfig {
    /// 환경 변수에서 설정 로드
    pub fn from_env() -> Self {
        Self {
            data_dir: std::env::var("TIJUCA_GUIA_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| get_data_dir()),
            groq_api_key: std::env::var("GROQ_API_KEY").ok(),
            weather_api_key: std::env::var("WEATHER_API_KEY").ok(),
            embeddings_base_url: std::env::var("EMBEDDINGS_BASE_URL")
                .unwrap_or_else(|_| embedding::DEFAULT_BASE_URL.to_string()),
            embeddings_model: std::env::var("EMBEDDINGS_MODEL")
                .unwrap_or_else(|_| embedding::DEFAULT_MODEL.to_string()),
        }
    }

    /// 가용 기능 판정
    pub fn capabilities(&self) -> CapabilitySet {
        CapabilitySet {
            weather: self.weather_api_key.is_some(),
            generation: self.groq_api_key.is_some(),
        }
    }
}

// ============================================================================
// Capabilities
// ============================================================================

/// 구동 시점에 판정된 기능 가용성
///
/// trilhas/geral 도메인은 항상 활성이며, 지식베이스가 비어 있을 때의
/// 저하(degraded) 응답은 파이프라인이 턴 시점에 처리합니다.
#[derive(Debug, Clone, Copy)]
pub struct CapabilitySet {
    /// 날씨 조회 가능 여부 (WEATHER_API_KEY)
    pub weather: bool,
    /// LLM 생성 가능 여부 (GROQ_API_KEY)
    pub generation: bool,
}

impl CapabilitySet {
    pub fn all() -> Self {
        Self {
            weather: true,
            generation: true,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_dir_suffix() {
        let dir = get_data_dir();
        assert!(dir.ends_with(".tijuca-guia"));
    }

    #[test]
    fn test_capabilities_follow_keys() {
        let config = AppConfig {
            data_dir: PathBuf::from("/tmp"),
            groq_api_key: Some("k".to_string()),
            weather_api_key: None,
            embeddings_base_url: embedding::DEFAULT_BASE_URL.to_string(),
            embeddings_model: embedding::DEFAULT_MODEL.to_string(),
        };

        let caps = config.capabilities();
        assert!(caps.generation);
        assert!(!caps.weather);
    }
}
