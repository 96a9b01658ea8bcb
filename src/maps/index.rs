//! Map Index - 지도 이미지 메타데이터 및 키워드 스코어링
//!
//! 지도 페이지 레코드를 SQLite에 저장하고, 질문 키워드와
//! 트레일 어휘 매칭으로 후보를 점수화합니다.
//! 저장 위치: ~/.tijuca-guia/maps.db

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags};

use crate::error::GuideError;

use super::{ExtractionMethod, ImageRecord, MapCandidate};

/// 기본 지도 후보 수
pub const DEFAULT_MAP_TOP_K: usize = 3;

/// 트레일 도메인 어휘
///
/// 파일명/경로에 이 단어가 포함되면 질문과 무관하게 가산점이 붙습니다.
const TRAIL_KEYWORDS: &[&str] = &[
    "cascatinha",
    "taunay",
    "pico",
    "tijuca",
    "mirante",
    "mayrink",
    "excelsior",
    "imperador",
    "conde",
    "estrada",
    "caminho",
    "trilha",
    "vale",
    "floresta",
    "cachoeira",
];

/// 스코어링 가중치
const SCORE_FILENAME_MATCH: u32 = 3;
const SCORE_PATH_MATCH: u32 = 2;
const SCORE_DOC_TEXT_MATCH: u32 = 1;
const SCORE_TRAIL_KEYWORD: u32 = 1;

// ============================================================================
// MapIndex
// ============================================================================

/// 지도 인덱스
///
/// 레코드는 수집 순서를 유지하며 (rowid 오름차순),
/// 동점 후보는 수집 순서가 빠른 쪽이 앞섭니다.
pub struct MapIndex {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl MapIndex {
    /// 인덱스 열기 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
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

        let index = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        };
        index.initialize()?;
        Ok(index)
    }

    /// DB 파일 경로
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// 스키마 초기화
    fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS map_images (
                rowid           INTEGER PRIMARY KEY AUTOINCREMENT,
                id              TEXT NOT NULL UNIQUE,
                source_file     TEXT NOT NULL,
                relative_path   TEXT NOT NULL,
                folder          TEXT NOT NULL,
                page_number     INTEGER NOT NULL,
                image_index     INTEGER NOT NULL,
                width           INTEGER NOT NULL,
                height          INTEGER NOT NULL,
                method          TEXT NOT NULL,
                byte_size       INTEGER NOT NULL,
                preview_b64     TEXT,
                doc_text        TEXT NOT NULL,
                payload         BLOB NOT NULL,
                created_at      TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_map_images_source
                ON map_images(source_file);
            "#,
        )
        .context("Failed to initialize map index schema")?;

        tracing::debug!("Map index initialized at {:?}", self.db_path);
        Ok(())
    }

    /// 레코드 삽입
    pub fn insert(&self, record: &ImageRecord) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        conn.execute(
            r#"
            INSERT OR REPLACE INTO map_images
                (id, source_file, relative_path, folder, page_number, image_index,
                 width, height, method, byte_size, preview_b64, doc_text, payload, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                record.id,
                record.source_file,
                record.relative_path,
                record.folder,
                record.page_number,
                record.image_index,
                record.width,
                record.height,
                record.method.as_str(),
                record.byte_size as i64,
                record.preview_b64,
                record.doc_text,
                payload_to_blob(&record.payload),
                record.created_at.to_rfc3339(),
            ],
        )
        .context("Failed to insert map record")?;

        Ok(())
    }

    /// 전체 레코드 수
    pub fn count(&self) -> Result<usize> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM map_images", [], |row| row.get(0))
            .context("Failed to count map records")?;
        Ok(count as usize)
    }

    /// 재수집 전 전체 삭제
    pub fn clear(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        conn.execute("DELETE FROM map_images", [])
            .context("Failed to clear map index")?;
        // AUTOINCREMENT 시퀀스도 리셋 (수집 순서 = rowid 순서 유지)
        conn.execute(
            "DELETE FROM sqlite_sequence WHERE name = 'map_images'",
            [],
        )
        .ok();
        Ok(())
    }

    /// ID로 픽셀 페이로드 조회 (복원 시점에만 로드)
    pub fn get_payload(&self, id: &str) -> Result<Vec<f32>> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        let blob: Vec<u8> = conn
            .query_row(
                "SELECT payload FROM map_images WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .context("Map record not found")?;
        Ok(blob_to_payload(&blob))
    }

    /// 질문 키워드로 후보 스코어링
    ///
    /// 인덱스가 비어 있으면 빈 벡터를 반환합니다 (지도 없음은 오류가 아님).
    /// 점수 0 후보는 제외되고, 결과는 점수 내림차순 + 수집 순서 안정 정렬입니다.
    pub fn score_candidates(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<MapCandidate>, GuideError> {
        let rows = self
            .candidate_rows()
            .map_err(|e| GuideError::store_unavailable("map_images", e.to_string()))?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        // 3자 이상 단어만 질문 키워드로 사용
        let query_terms: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .filter(|w| w.len() > 2)
            .map(|w| w.to_string())
            .collect();

        let mut scored: Vec<MapCandidate> = Vec::new();
        for row in &rows {
            let score = score_row(row, &query_terms);
            if score == 0 {
                continue;
            }
            scored.push(MapCandidate {
                image_record_id: row.id.clone(),
                display_name: row.source_file.clone(),
                page_number: row.page_number,
                relevance_score: score,
                method: ExtractionMethod::from_str(&row.method),
            });
        }

        // 안정 정렬: 동점이면 수집 순서 유지
        scored.sort_by(|a, b| b.relevance_score.cmp(&a.relevance_score));
        scored.truncate(top_k);
        Ok(scored)
    }

    /// 스코어링용 메타데이터 행 (페이로드 제외, rowid 오름차순)
    fn candidate_rows(&self) -> Result<Vec<CandidateRow>> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, source_file, relative_path, page_number, method, doc_text
            FROM map_images
            ORDER BY rowid ASC
            "#,
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok(CandidateRow {
                    id: row.get(0)?,
                    source_file: row.get(1)?,
                    relative_path: row.get(2)?,
                    page_number: row.get(3)?,
                    method: row.get(4)?,
                    doc_text: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// ID로 레코드 메타데이터 조회 (표시용, 페이로드 제외)
    pub fn get(&self, id: &str) -> Result<Option<MapRecordMeta>> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, source_file, relative_path, folder, page_number, image_index,
                   width, height, method, byte_size, preview_b64, doc_text, created_at
            FROM map_images WHERE id = ?1
            "#,
        )?;

        let mut rows = stmt.query(params![id])?;
        if let Some(row) = rows.next()? {
            let created_at: String = row.get(12)?;
            Ok(Some(MapRecordMeta {
                id: row.get(0)?,
                source_file: row.get(1)?,
                relative_path: row.get(2)?,
                folder: row.get(3)?,
                page_number: row.get(4)?,
                image_index: row.get(5)?,
                width: row.get::<_, i64>(6)? as u32,
                height: row.get::<_, i64>(7)? as u32,
                method: ExtractionMethod::from_str(&row.get::<_, String>(8)?),
                byte_size: row.get::<_, i64>(9)? as u64,
                preview_b64: row.get(10)?,
                doc_text: row.get(11)?,
                created_at: parse_datetime(&created_at),
            }))
        } else {
            Ok(None)
        }
    }
}

/// 페이로드 없는 레코드 메타데이터
#[derive(Debug, Clone)]
pub struct MapRecordMeta {
    pub id: String,
    pub source_file: String,
    pub relative_path: String,
    pub folder: String,
    pub page_number: i32,
    pub image_index: i32,
    pub width: u32,
    pub height: u32,
    pub method: ExtractionMethod,
    pub byte_size: u64,
    pub preview_b64: Option<String>,
    pub doc_text: String,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Scoring
// ============================================================================

struct CandidateRow {
    id: String,
    source_file: String,
    relative_path: String,
    page_number: i32,
    method: String,
    doc_text: String,
}

/// 단일 후보 점수 계산
///
/// 질문 키워드: 파일명 +3, 경로 +2, 문서 텍스트 +1.
/// 트레일 어휘: 파일명/경로 포함 시 단어당 +1 (질문과 무관).
fn score_row(row: &CandidateRow, query_terms: &[String]) -> u32 {
    let filename = row.source_file.to_lowercase();
    let path = row.relative_path.to_lowercase();
    let doc_text = row.doc_text.to_lowercase();

    let mut score = 0u32;

    for term in query_terms {
        if filename.contains(term.as_str()) {
            score += SCORE_FILENAME_MATCH;
        }
        if path.contains(term.as_str()) {
            score += SCORE_PATH_MATCH;
        }
        if doc_text.contains(term.as_str()) {
            score += SCORE_DOC_TEXT_MATCH;
        }
    }

    for keyword in TRAIL_KEYWORDS {
        if filename.contains(keyword) || path.contains(keyword) {
            score += SCORE_TRAIL_KEYWORD;
        }
    }

    score
}

// ============================================================================
// Payload encoding
// ============================================================================

/// f32 슬라이스 -> little-endian BLOB
fn payload_to_blob(payload: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(payload.len() * 4);
    for v in payload {
        blob.extend_from_slice(&v.to_le_bytes());
    }
    blob
}

/// little-endian BLOB -> f32 벡터
fn blob_to_payload(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
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

    fn test_record(id: &str, source_file: &str, relative_path: &str, page: i32) -> ImageRecord {
        ImageRecord {
            id: id.to_string(),
            source_file: source_file.to_string(),
            relative_path: relative_path.to_string(),
            folder: "mapas".to_string(),
            page_number: page,
            image_index: 1,
            width: 224,
            height: 224,
            method: ExtractionMethod::Rendered,
            byte_size: 1024,
            preview_b64: None,
            doc_text: format!("{}_p{}_i1", relative_path, page),
            payload: vec![0.5; 12],
            created_at: Utc::now(),
        }
    }

    fn test_index(dir: &TempDir) -> MapIndex {
        MapIndex::open(&dir.path().join("maps.db")).unwrap()
    }

    #[test]
    fn test_insert_and_count() {
        let dir = TempDir::new().unwrap();
        let index = test_index(&dir);

        index
            .insert(&test_record("a_p1_i1", "a.png", "mapas/a.png", 1))
            .unwrap();
        assert_eq!(index.count().unwrap(), 1);

        index.clear().unwrap();
        assert_eq!(index.count().unwrap(), 0);
    }

    #[test]
    fn test_get_returns_metadata_without_payload() {
        let dir = TempDir::new().unwrap();
        let index = test_index(&dir);

        index
            .insert(&test_record("a_p2_i1", "a.png", "mapas/a.png", 2))
            .unwrap();

        let meta = index.get("a_p2_i1").unwrap().unwrap();
        assert_eq!(meta.source_file, "a.png");
        assert_eq!(meta.page_number, 2);
        assert_eq!((meta.width, meta.height), (224, 224));
        assert_eq!(meta.method, ExtractionMethod::Rendered);

        assert!(index.get("inexistente").unwrap().is_none());
    }

    #[test]
    fn test_payload_round_trip() {
        let dir = TempDir::new().unwrap();
        let index = test_index(&dir);

        let mut record = test_record("a_p1_i1", "a.png", "mapas/a.png", 1);
        record.payload = vec![0.0, 0.25, 0.5, 1.0];
        index.insert(&record).unwrap();

        let payload = index.get_payload("a_p1_i1").unwrap();
        assert_eq!(payload, vec![0.0, 0.25, 0.5, 1.0]);
    }

    #[test]
    fn test_horto_query_scores_matching_map() {
        let dir = TempDir::new().unwrap();
        let index = test_index(&dir);

        index
            .insert(&test_record(
                "horto_p1_i1",
                "Mapa_Circuito_Horto.png",
                "mapas/horto/Mapa_Circuito_Horto.png",
                1,
            ))
            .unwrap();
        index
            .insert(&test_record(
                "paineiras_p1_i1",
                "Setor_Paineiras.png",
                "mapas/paineiras/Setor_Paineiras.png",
                1,
            ))
            .unwrap();

        let candidates = index
            .score_candidates("Onde fica a trilha do Horto", 3)
            .unwrap();

        // 파일명 +3, 경로 +2 이상의 매칭
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].display_name, "Mapa_Circuito_Horto.png");
        assert!(candidates[0].relevance_score >= 5);
    }

    #[test]
    fn test_zero_score_candidates_excluded() {
        let dir = TempDir::new().unwrap();
        let index = test_index(&dir);

        index
            .insert(&test_record("x_p1_i1", "Planta_Baixa.png", "outros/Planta_Baixa.png", 1))
            .unwrap();

        let candidates = index.score_candidates("qual o horario?", 3).unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_empty_index_returns_no_candidates() {
        let dir = TempDir::new().unwrap();
        let index = test_index(&dir);

        let candidates = index.score_candidates("trilha do pico", 3).unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_top_k_limits_results() {
        let dir = TempDir::new().unwrap();
        let index = test_index(&dir);

        for i in 0..5 {
            index
                .insert(&test_record(
                    &format!("t{}_p1_i1", i),
                    &format!("Trilha_{}.png", i),
                    &format!("mapas/Trilha_{}.png", i),
                    1,
                ))
                .unwrap();
        }

        let candidates = index.score_candidates("trilha", 3).unwrap();
        assert_eq!(candidates.len(), 3);
    }

    #[test]
    fn test_stable_ordering_on_ties() {
        let dir = TempDir::new().unwrap();
        let index = test_index(&dir);

        // 동일 점수 레코드 - 수집 순서가 유지되어야 함
        index
            .insert(&test_record("a_p1_i1", "Trilha_A.png", "mapas/Trilha_A.png", 1))
            .unwrap();
        index
            .insert(&test_record("b_p1_i1", "Trilha_B.png", "mapas/Trilha_B.png", 1))
            .unwrap();

        let candidates = index.score_candidates("mapa", 3).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].image_record_id, "a_p1_i1");
        assert_eq!(candidates[1].image_record_id, "b_p1_i1");
    }
}
