//! Passage Store - rusqlite 기반 패시지 메타데이터 저장소
//!
//! 수집된 문서 청크(패시지)와 출처 메타데이터를 저장합니다.
//! 저장 위치: ~/.tijuca-guia/passages.db

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags};
use serde::{Deserialize, Serialize};

// ============================================================================
// Types
// ============================================================================

/// 저장된 패시지
///
/// 수집 시점에 생성되고 이후 절대 변경되지 않습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passage {
    /// 전역 고유 ID (UUID v4)
    pub id: String,
    /// 패시지 텍스트
    pub text: String,
    /// 원본 파일명
    pub source_file: String,
    /// 파일 내 순번 (1-based, 인용 표기용)
    pub part_index: i32,
    /// 파일의 전체 패시지 수
    pub total_parts: i32,
    /// 원본 문서 길이 (문자 수)
    pub char_length: usize,
    /// 수집 시각
    pub ingested_at: DateTime<Utc>,
}

/// 저장소 통계
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub passage_count: usize,
    pub source_file_count: usize,
    pub total_text_bytes: usize,
    pub db_path: PathBuf,
}

// ============================================================================
// PassageStore
// ============================================================================

/// Passage Store - 동기 패시지 저장소
///
/// SQLite 기반 패시지 저장 및 조회를 제공합니다.
/// 수집 중에만 추가되고 서비스 중에는 읽기 전용입니다.
pub struct PassageStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl PassageStore {
    /// 저장소 열기 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        // 부모 디렉토리 생성
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create database directory")?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open SQLite database")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        };

        store.initialize()?;
        Ok(store)
    }

    /// DB 경로 반환
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// 스키마 초기화
    fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS passages (
                id TEXT PRIMARY KEY,
                text TEXT NOT NULL,
                source_file TEXT NOT NULL,
                part_index INTEGER NOT NULL,
                total_parts INTEGER NOT NULL,
                char_length INTEGER NOT NULL,
                ingested_at TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create passages table")?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_passages_source ON passages(source_file)",
            [],
        )
        .context("Failed to create source_file index")?;

        tracing::debug!("Passage store initialized at {:?}", self.db_path);
        Ok(())
    }

    /// 패시지 배치 저장
    pub fn insert_batch(&self, passages: &[Passage]) -> Result<usize> {
        let mut conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let tx = conn.transaction().context("Failed to start transaction")?;
        for passage in passages {
            tx.execute(
                "INSERT INTO passages
                    (id, text, source_file, part_index, total_parts, char_length, ingested_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    passage.id,
                    passage.text,
                    passage.source_file,
                    passage.part_index,
                    passage.total_parts,
                    passage.char_length as i64,
                    passage.ingested_at.to_rfc3339(),
                ],
            )
            .context("Failed to insert passage")?;
        }
        tx.commit().context("Failed to commit passages")?;

        tracing::info!("Inserted {} passages", passages.len());
        Ok(passages.len())
    }

    /// ID로 패시지 조회
    pub fn get(&self, id: &str) -> Result<Option<Passage>> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut stmt = conn.prepare(
            "SELECT id, text, source_file, part_index, total_parts, char_length, ingested_at
             FROM passages WHERE id = ?1",
        )?;

        let passage = stmt.query_row(params![id], row_to_passage).ok();
        Ok(passage)
    }

    /// 패시지 목록 조회 (최근 수집 순)
    pub fn list(&self, limit: usize) -> Result<Vec<Passage>> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut stmt = conn.prepare(
            "SELECT id, text, source_file, part_index, total_parts, char_length, ingested_at
             FROM passages
             ORDER BY ingested_at DESC, part_index ASC
             LIMIT ?1",
        )?;

        let passages = stmt
            .query_map(params![limit as i64], row_to_passage)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(passages)
    }

    /// 패시지 개수
    pub fn count(&self) -> Result<usize> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM passages", [], |row| row.get(0))
            .unwrap_or(0);

        Ok(count as usize)
    }

    /// 전체 삭제 (명시적 재수집 시에만 사용)
    pub fn purge(&self) -> Result<usize> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let removed = conn.execute("DELETE FROM passages", [])?;
        if removed > 0 {
            tracing::info!("Purged {} passages", removed);
        }

        Ok(removed)
    }

    /// 저장소 통계
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM passages", [], |row| row.get(0))
            .unwrap_or(0);

        let sources: i64 = conn
            .query_row(
                "SELECT COUNT(DISTINCT source_file) FROM passages",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        let total_size: i64 = conn
            .query_row(
                "SELECT COALESCE(SUM(LENGTH(text)), 0) FROM passages",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        Ok(StoreStats {
            passage_count: count as usize,
            source_file_count: sources as usize,
            total_text_bytes: total_size as usize,
            db_path: self.db_path.clone(),
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn row_to_passage(row: &rusqlite::Row<'_>) -> rusqlite::Result<Passage> {
    Ok(Passage {
        id: row.get(0)?,
        text: row.get(1)?,
        source_file: row.get(2)?,
        part_index: row.get(3)?,
        total_parts: row.get(4)?,
        char_length: row.get::<_, i64>(5)? as usize,
        ingested_at: parse_datetime(row.get::<_, String>(6)?),
    })
}

/// RFC3339 문자열을 DateTime<Utc>로 파싱
fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn create_test_store() -> (TempDir, PassageStore) {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("test.db");
        let store = PassageStore::open(&db_path).unwrap();
        (dir, store)
    }

    fn test_passage(part_index: i32, total: i32) -> Passage {
        Passage {
            id: Uuid::new_v4().to_string(),
            text: format!("Trecho {} do plano de manejo do parque", part_index),
            source_file: "PlanoManejo.pdf".to_string(),
            part_index,
            total_parts: total,
            char_length: 4200,
            ingested_at: Utc::now(),
        }
    }

    #[test]
    fn test_insert_and_get() {
        let (_dir, store) = create_test_store();

        let passage = test_passage(1, 3);
        let id = passage.id.clone();
        store.insert_batch(&[passage]).unwrap();

        let retrieved = store.get(&id).unwrap();
        assert!(retrieved.is_some());

        let retrieved = retrieved.unwrap();
        assert_eq!(retrieved.source_file, "PlanoManejo.pdf");
        assert_eq!(retrieved.part_index, 1);
        assert_eq!(retrieved.total_parts, 3);
    }

    #[test]
    fn test_count_and_list() {
        let (_dir, store) = create_test_store();

        let passages: Vec<Passage> = (1..=5).map(|i| test_passage(i, 5)).collect();
        store.insert_batch(&passages).unwrap();

        assert_eq!(store.count().unwrap(), 5);

        let listed = store.list(3).unwrap();
        assert_eq!(listed.len(), 3);
    }

    #[test]
    fn test_purge() {
        let (_dir, store) = create_test_store();

        store.insert_batch(&[test_passage(1, 1)]).unwrap();
        assert_eq!(store.count().unwrap(), 1);

        let removed = store.purge().unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_stats() {
        let (_dir, store) = create_test_store();

        store
            .insert_batch(&[test_passage(1, 2), test_passage(2, 2)])
            .unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.passage_count, 2);
        assert_eq!(stats.source_file_count, 1);
        assert!(stats.total_text_bytes > 0);
    }
}
