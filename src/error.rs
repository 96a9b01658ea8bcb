//! 에러 타입 정의
//!
//! 코어 파이프라인의 에러 분류입니다. 모든 에러는 파이프라인 경계에서
//! 사용자에게 안전한 포르투갈어 메시지로 변환됩니다.

use thiserror::Error;

/// 가이드 코어 에러 분류
#[derive(Debug, Error)]
pub enum GuideError {
    /// 패시지/이미지 컬렉션이 없거나 비어 있음
    #[error("collection '{collection}' unavailable: {reason}")]
    StoreUnavailable { collection: String, reason: String },

    /// 분류 호출 실패 (로컬에서 'geral' 폴백으로 복구됨)
    #[error("classification failed: {0}")]
    ClassificationFailure(String),

    /// 응답 생성 실패
    #[error("generation failed: {0}")]
    GenerationFailure(String),

    /// 응답 생성 타임아웃 (재시도 가능)
    #[error("generation timed out")]
    GenerationTimeout,

    /// 이미지 페이로드를 유효한 픽셀 지오메트리로 복원할 수 없음
    #[error("image {id} cannot be rendered (payload of {len} values)")]
    UnrenderableImage { id: String, len: usize },
}

impl GuideError {
    /// StoreUnavailable 에러 생성 헬퍼
    pub fn store_unavailable(collection: &str, reason: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            collection: collection.to_string(),
            reason: reason.into(),
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
    fn test_store_unavailable_display() {
        let err = GuideError::store_unavailable("passagens", "empty collection");
        let msg = err.to_string();
        assert!(msg.contains("passagens"));
        assert!(msg.contains("empty collection"));
    }

    #[test]
    fn test_unrenderable_display() {
        let err = GuideError::UnrenderableImage {
            id: "abc".to_string(),
            len: 7,
        };
        assert!(err.to_string().contains("abc"));
    }
}
