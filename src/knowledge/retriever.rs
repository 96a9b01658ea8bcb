//! Passage Retriever - 시맨틱 패시지 검색
//!
//! SQLite 패시지 저장소 + LanceDB 벡터 인덱스를 묶어
//! 쿼리 임베딩 기반 최근접 검색을 제공합니다.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use uuid::Uuid;

use crate::embedding::EmbeddingProvider;
use crate::error::GuideError;

use super::chunker::{default_chunker, Chunker};
use super::lance::LanceVectorStore;
use super::store::{Passage, PassageStore, StoreStats};
use super::vector::{VectorEntry, VectorStore};

/// 패시지 컬렉션 이름 (에러 메시지 표기용)
const COLLECTION_NAME: &str = "passages";

// ============================================================================
// Types
// ============================================================================

/// 검색된 패시지
#[derive(Debug, Clone)]
pub struct RetrievedPassage {
    /// 패시지 ID
    pub passage_id: String,
    /// 원본 파일명
    pub source_file: String,
    /// 파일 내 순번 (인용 표기용)
    pub part_index: i32,
    /// 패시지 텍스트
    pub text: String,
    /// 유사도 스코어 (높을수록 유사)
    pub similarity: f32,
}

/// 수집 결과
#[derive(Debug, Clone)]
pub struct IndexOutcome {
    pub source_file: String,
    pub passage_count: usize,
}

// ============================================================================
// PassageRetriever
// ============================================================================

/// 패시지 검색기
///
/// 수집 시에는 청킹 + 임베딩 + 이중 저장을, 서비스 시에는
/// 쿼리 임베딩 기반 최근접 검색을 담당합니다.
pub struct PassageRetriever {
    store: PassageStore,
    vector: LanceVectorStore,
    embedder: Arc<dyn EmbeddingProvider>,
    chunker: Box<dyn Chunker>,
}

impl PassageRetriever {
    /// 지정된 데이터 디렉토리로 생성
    pub async fn with_data_dir(
        data_dir: &Path,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        if !data_dir.exists() {
            std::fs::create_dir_all(data_dir).context("Failed to create data directory")?;
        }

        let db_path = data_dir.join("passages.db");
        let store = PassageStore::open(&db_path).context("Failed to open passage store")?;

        let lance_path = data_dir.join("passages.lance");
        let vector = LanceVectorStore::open(&lance_path)
            .await
            .context("Failed to open vector store")?;

        Ok(Self {
            store,
            vector,
            embedder,
            chunker: default_chunker(),
        })
    }

    /// 문서 텍스트 수집 (청킹 + 임베딩 + 저장)
    ///
    /// # Arguments
    /// * `source_file` - 원본 파일명 (인용에 사용)
    /// * `text` - 문서 전체 텍스트
    pub async fn index_text(&self, source_file: &str, text: &str) -> Result<IndexOutcome> {
        let chunks = self.chunker.chunk(text);
        if chunks.is_empty() {
            tracing::warn!("No chunks generated for document: {}", source_file);
            return Ok(IndexOutcome {
                source_file: source_file.to_string(),
                passage_count: 0,
            });
        }

        let total_parts = chunks.len() as i32;
        let char_length = text.chars().count();
        let now = Utc::now();

        let mut passages = Vec::with_capacity(chunks.len());
        let mut entries = Vec::with_capacity(chunks.len());

        for (i, chunk) in chunks.iter().enumerate() {
            let embedding = self
                .embedder
                .embed(chunk)
                .await
                .context("Failed to embed chunk")?;

            let id = Uuid::new_v4().to_string();
            let part_index = i as i32 + 1;

            passages.push(Passage {
                id: id.clone(),
                text: chunk.clone(),
                source_file: source_file.to_string(),
                part_index,
                total_parts,
                char_length,
                ingested_at: now,
            });

            entries.push(VectorEntry {
                passage_id: id,
                source_file: source_file.to_string(),
                part_index,
                text: chunk.clone(),
                embedding,
            });
        }

        self.store
            .insert_batch(&passages)
            .context("Failed to store passages")?;
        self.vector
            .insert_batch(&entries)
            .await
            .context("Failed to insert vectors")?;

        tracing::info!(
            "Indexed document: {} ({} passages)",
            source_file,
            passages.len()
        );

        Ok(IndexOutcome {
            source_file: source_file.to_string(),
            passage_count: passages.len(),
        })
    }

    /// 상위 k개 패시지 검색 (유사도 내림차순)
    ///
    /// 컬렉션이 없거나 비어 있으면 StoreUnavailable을 반환합니다.
    /// 호출자는 이를 "근거 없음"으로 처리해야 하며 크래시해서는 안 됩니다.
    pub async fn retrieve_top_k(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedPassage>, GuideError> {
        let vector_count = self
            .vector
            .count()
            .await
            .map_err(|e| GuideError::store_unavailable(COLLECTION_NAME, e.to_string()))?;

        if vector_count == 0 {
            return Err(GuideError::store_unavailable(
                COLLECTION_NAME,
                "collection is empty; run ingestion first",
            ));
        }

        let query_embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| GuideError::store_unavailable(COLLECTION_NAME, e.to_string()))?;

        let hits = self
            .vector
            .search(&query_embedding, k)
            .await
            .map_err(|e| GuideError::store_unavailable(COLLECTION_NAME, e.to_string()))?;

        Ok(hits
            .into_iter()
            .map(|hit| RetrievedPassage {
                passage_id: hit.passage_id,
                source_file: hit.source_file,
                part_index: hit.part_index,
                text: hit.text,
                similarity: hit.similarity,
            })
            .collect())
    }

    /// 재수집 전 전체 초기화
    pub async fn purge(&self) -> Result<()> {
        self.vector.clear().await?;
        self.store.purge()?;
        Ok(())
    }

    /// 저장소 통계
    pub async fn stats(&self) -> Result<RetrieverStats> {
        let store_stats = self.store.stats()?;
        let vector_count = self.vector.count().await?;

        Ok(RetrieverStats {
            store: store_stats,
            vector_count,
        })
    }

    /// 내부 스토어 접근
    pub fn store(&self) -> &PassageStore {
        &self.store
    }
}

/// 검색기 통계
#[derive(Debug, Clone)]
pub struct RetrieverStats {
    pub store: StoreStats,
    pub vector_count: usize,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// 결정적 스텁 임베더 (네트워크 없음)
    struct StubEmbedding;

    #[async_trait]
    impl EmbeddingProvider for StubEmbedding {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            // 텍스트 길이 기반 고정 벡터
            let seed = text.chars().count() as f32;
            let mut v = vec![0.0; self.dimension()];
            v[0] = seed / 1000.0;
            v[1] = 1.0;
            Ok(v)
        }

        fn dimension(&self) -> usize {
            super::super::vector::EMBEDDING_DIMENSION as usize
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    async fn test_retriever(dir: &TempDir) -> PassageRetriever {
        PassageRetriever::with_data_dir(dir.path(), Arc::new(StubEmbedding))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_retrieve_from_empty_store_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let retriever = test_retriever(&dir).await;

        let result = retriever.retrieve_top_k("fauna do parque", 5).await;
        assert!(matches!(
            result,
            Err(GuideError::StoreUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_index_and_retrieve() {
        let dir = TempDir::new().unwrap();
        let retriever = test_retriever(&dir).await;

        let outcome = retriever
            .index_text(
                "PlanoManejo.pdf",
                "O Parque Nacional da Tijuca abriga diversas trilhas e cachoeiras.",
            )
            .await
            .unwrap();
        assert_eq!(outcome.passage_count, 1);

        let results = retriever.retrieve_top_k("trilhas", 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source_file, "PlanoManejo.pdf");
        assert_eq!(results[0].part_index, 1);
    }

    #[tokio::test]
    async fn test_purge_resets_collection() {
        let dir = TempDir::new().unwrap();
        let retriever = test_retriever(&dir).await;

        retriever
            .index_text("PlanoManejo.pdf", "texto de teste para o parque")
            .await
            .unwrap();
        retriever.purge().await.unwrap();

        let stats = retriever.stats().await.unwrap();
        assert_eq!(stats.store.passage_count, 0);
        assert_eq!(stats.vector_count, 0);

        let result = retriever.retrieve_top_k("teste", 3).await;
        assert!(matches!(result, Err(GuideError::StoreUnavailable { .. })));
    }
}
