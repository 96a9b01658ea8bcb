//! Vector Store - 패시지 벡터 검색 트레이트
//!
//! LanceDB ANN (Approximate Nearest Neighbor) 검색을 사용합니다.

use anyhow::Result;
use async_trait::async_trait;

/// 벡터 임베딩 차원 (all-MiniLM-L6-v2 기본값)
pub const EMBEDDING_DIMENSION: i32 = 384;

// ============================================================================
// Types
// ============================================================================

/// 벡터 엔트리 (저장용)
#[derive(Debug, Clone)]
pub struct VectorEntry {
    /// 패시지 ID (passages.id)
    pub passage_id: String,
    /// 원본 파일명
    pub source_file: String,
    /// 패시지 순번 (1-based, 인용 표기용)
    pub part_index: i32,
    /// 패시지 텍스트
    pub text: String,
    /// 임베딩 벡터
    pub embedding: Vec<f32>,
}

/// 벡터 검색 결과
#[derive(Debug, Clone)]
pub struct VectorHit {
    /// 패시지 ID
    pub passage_id: String,
    /// 원본 파일명
    pub source_file: String,
    /// 패시지 순번
    pub part_index: i32,
    /// 패시지 텍스트
    pub text: String,
    /// 유사도 스코어 (0.0 ~ 1.0)
    pub similarity: f32,
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// VectorStore 트레이트 (async)
///
/// 패시지 벡터 저장소의 공통 인터페이스입니다.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 벡터 배치 삽입
    async fn insert_batch(&self, entries: &[VectorEntry]) -> Result<usize>;

    /// 유사도 순 벡터 검색
    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<VectorHit>>;

    /// 벡터 개수 조회
    async fn count(&self) -> Result<usize>;

    /// 컬렉션 전체 삭제 (재수집 전 초기화)
    async fn clear(&self) -> Result<()>;
}
