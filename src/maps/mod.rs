//! Maps - 트레일 지도 인덱스 및 픽셀 복원
//!
//! 지도 페이지 래스터를 정규화 픽셀 페이로드로 저장하고,
//! 키워드 스코어링으로 후보를 선별한 뒤 요청 시 이미지를 복원합니다.

pub mod index;
pub mod reconstruct;

pub use index::{MapIndex, DEFAULT_MAP_TOP_K};
pub use reconstruct::{reconstruct_image, upscale_for_display};

use chrono::{DateTime, Utc};

// ============================================================================
// Types
// ============================================================================

/// 이미지 추출 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMethod {
    /// PDF에 내장된 원본 이미지
    Embedded,
    /// 페이지 전체 렌더링
    Rendered,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::Embedded => "embutida",
            ExtractionMethod::Rendered => "renderizada",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "embutida" => ExtractionMethod::Embedded,
            _ => ExtractionMethod::Rendered,
        }
    }
}

/// 인덱싱된 지도 이미지 레코드
#[derive(Debug, Clone)]
pub struct ImageRecord {
    /// 레코드 ID (예: "Mapa_Trilhas_p3_i1")
    pub id: String,
    /// 원본 파일명
    pub source_file: String,
    /// 인덱스 루트 기준 상대 경로
    pub relative_path: String,
    /// 상위 폴더명
    pub folder: String,
    /// 페이지 번호 (1부터)
    pub page_number: i32,
    /// 페이지 내 이미지 순번 (1부터)
    pub image_index: i32,
    /// 정규화 전 원본 크기
    pub width: u32,
    pub height: u32,
    /// 추출 방식
    pub method: ExtractionMethod,
    /// 원본 파일 바이트 수
    pub byte_size: u64,
    /// 미리보기 (base64 JPEG, 1000자 절단)
    pub preview_b64: Option<String>,
    /// 스코어링 대상 텍스트
    pub doc_text: String,
    /// 정규화 픽셀 페이로드 (RGB, [0,1] f32)
    pub payload: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

/// 스코어링된 지도 후보 (페이로드 미포함)
#[derive(Debug, Clone)]
pub struct MapCandidate {
    /// ImageRecord ID
    pub image_record_id: String,
    /// 표시용 이름 (원본 파일명)
    pub display_name: String,
    /// 페이지 번호
    pub page_number: i32,
    /// 키워드 관련도 점수
    pub relevance_score: u32,
    /// 추출 방식
    pub method: ExtractionMethod,
}
