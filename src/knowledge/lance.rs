//! LanceDB Vector Store - 패시지 벡터 검색
//!
//! ANN (Approximate Nearest Neighbor) 검색으로 대용량 벡터에서도 빠른 검색을 지원합니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};

use super::vector::{VectorEntry, VectorHit, VectorStore, EMBEDDING_DIMENSION};

/// 벡터 테이블 이름
const TABLE_NAME: &str = "passages";

// ============================================================================
// LanceVectorStore
// ============================================================================

/// LanceDB 벡터 저장소 구현
///
/// Apache Arrow 기반 columnar 데이터베이스로 빠른 읽기/쓰기를 제공합니다.
pub struct LanceVectorStore {
    db: Connection,
}

impl LanceVectorStore {
    /// LanceDB 저장소 열기
    ///
    /// # Arguments
    /// * `path` - .lance 디렉토리 경로
    pub async fn open(path: &Path) -> Result<Self> {
        // 부모 디렉토리 생성
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create LanceDB directory")?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        Ok(Self { db })
    }

    /// 벡터 테이블 스키마 생성
    fn create_schema() -> Schema {
        Schema::new(vec![
            Field::new("passage_id", DataType::Utf8, false),
            Field::new("source_file", DataType::Utf8, false),
            Field::new("part_index", DataType::Int32, false),
            Field::new("text", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    EMBEDDING_DIMENSION,
                ),
                false,
            ),
        ])
    }

    /// 엔트리들을 Arrow RecordBatch로 변환
    fn entries_to_batch(entries: &[VectorEntry]) -> Result<RecordBatch> {
        if entries.is_empty() {
            anyhow::bail!("Cannot create batch from empty entries");
        }

        let passage_ids: Vec<&str> = entries.iter().map(|e| e.passage_id.as_str()).collect();
        let source_files: Vec<&str> = entries.iter().map(|e| e.source_file.as_str()).collect();
        let part_indices: Vec<i32> = entries.iter().map(|e| e.part_index).collect();
        let texts: Vec<&str> = entries.iter().map(|e| e.text.as_str()).collect();

        // 임베딩을 FixedSizeList로 변환
        let embeddings_flat: Vec<f32> = entries
            .iter()
            .flat_map(|e| e.embedding.iter().copied())
            .collect();

        let values = Float32Array::from(embeddings_flat);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings_list = FixedSizeListArray::try_new(
            field,
            EMBEDDING_DIMENSION,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create embedding array")?;

        let batch = RecordBatch::try_new(
            Arc::new(Self::create_schema()),
            vec![
                Arc::new(StringArray::from(passage_ids)),
                Arc::new(StringArray::from(source_files)),
                Arc::new(Int32Array::from(part_indices)),
                Arc::new(StringArray::from(texts)),
                Arc::new(embeddings_list),
            ],
        )
        .context("Failed to create RecordBatch")?;

        Ok(batch)
    }

    /// 테이블 존재 여부 확인
    async fn table_exists(&self) -> bool {
        self.db
            .table_names()
            .execute()
            .await
            .map(|names| names.contains(&TABLE_NAME.to_string()))
            .unwrap_or(false)
    }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn insert_batch(&self, entries: &[VectorEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let batch = Self::entries_to_batch(entries)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        if self.table_exists().await {
            // 기존 테이블에 추가
            let table = self
                .db
                .open_table(TABLE_NAME)
                .execute()
                .await
                .context("Failed to open table")?;

            table
                .add(batches)
                .execute()
                .await
                .context("Failed to add vectors to table")?;
        } else {
            // 새 테이블 생성
            self.db
                .create_table(TABLE_NAME, batches)
                .execute()
                .await
                .context("Failed to create table")?;
        }

        Ok(entries.len())
    }

    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<VectorHit>> {
        if !self.table_exists().await {
            return Ok(vec![]);
        }

        let table = self
            .db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .context("Failed to open table for search")?;

        // 벡터 검색
        let results = table
            .vector_search(query_embedding.to_vec())
            .context("Failed to create vector search")?
            .limit(limit)
            .execute()
            .await
            .context("Failed to execute vector search")?;

        let mut hits = Vec::new();

        // RecordBatch 스트림에서 결과 추출
        use futures::TryStreamExt;
        let batches: Vec<RecordBatch> = results.try_collect().await?;

        for batch in batches {
            let passage_ids = batch
                .column_by_name("passage_id")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .ok_or_else(|| anyhow::anyhow!("Missing passage_id column"))?;

            let source_files = batch
                .column_by_name("source_file")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .ok_or_else(|| anyhow::anyhow!("Missing source_file column"))?;

            let part_indices = batch
                .column_by_name("part_index")
                .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing part_index column"))?;

            let texts = batch
                .column_by_name("text")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .ok_or_else(|| anyhow::anyhow!("Missing text column"))?;

            // _distance 컬럼 (LanceDB가 자동 추가)
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing _distance column"))?;

            for i in 0..batch.num_rows() {
                let distance = distances.value(i);
                // 거리를 유사도로 변환 (L2 거리 -> 유사도 근사)
                let similarity = 1.0 / (1.0 + distance);

                hits.push(VectorHit {
                    passage_id: passage_ids.value(i).to_string(),
                    source_file: source_files.value(i).to_string(),
                    part_index: part_indices.value(i),
                    text: texts.value(i).to_string(),
                    similarity,
                });
            }
        }

        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        if !self.table_exists().await {
            return Ok(0);
        }

        let table = self
            .db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .context("Failed to open table for count")?;

        let count = table.count_rows(None).await.context("Failed to count rows")?;
        Ok(count)
    }

    async fn clear(&self) -> Result<()> {
        if !self.table_exists().await {
            return Ok(());
        }

        self.db
            .drop_table(TABLE_NAME)
            .await
            .context("Failed to drop vector table")?;

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_entry(part_index: i32) -> VectorEntry {
        VectorEntry {
            passage_id: format!("passage-{}", part_index),
            source_file: "PlanoManejo.pdf".to_string(),
            part_index,
            text: format!("Trecho {} do plano de manejo", part_index),
            embedding: vec![0.1; EMBEDDING_DIMENSION as usize],
        }
    }

    #[tokio::test]
    async fn test_lance_store_basic() {
        let temp_dir = TempDir::new().unwrap();
        let lance_path = temp_dir.path().join("test.lance");

        let store = LanceVectorStore::open(&lance_path).await.unwrap();

        // 초기 상태
        assert_eq!(store.count().await.unwrap(), 0);

        // 삽입
        let entries = vec![create_test_entry(1), create_test_entry(2)];
        let inserted = store.insert_batch(&entries).await.unwrap();
        assert_eq!(inserted, 2);

        // 개수 확인
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_lance_search() {
        let temp_dir = TempDir::new().unwrap();
        let lance_path = temp_dir.path().join("search_test.lance");

        let store = LanceVectorStore::open(&lance_path).await.unwrap();

        let entries = vec![
            create_test_entry(1),
            create_test_entry(2),
            create_test_entry(3),
        ];
        store.insert_batch(&entries).await.unwrap();

        let query = vec![0.1; EMBEDDING_DIMENSION as usize];
        let results = store.search(&query, 2).await.unwrap();

        assert!(!results.is_empty());
        assert!(results.len() <= 2);
        assert_eq!(results[0].source_file, "PlanoManejo.pdf");
    }

    #[tokio::test]
    async fn test_lance_clear() {
        let temp_dir = TempDir::new().unwrap();
        let lance_path = temp_dir.path().join("clear_test.lance");

        let store = LanceVectorStore::open(&lance_path).await.unwrap();

        store
            .insert_batch(&[create_test_entry(1), create_test_entry(2)])
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 2);

        store.clear().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
