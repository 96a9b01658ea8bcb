//! Ingest - 문서 및 지도 수집
//!
//! PDF 문서는 텍스트 추출 후 패시지로 인덱싱하고,
//! 지도 이미지는 정규화 픽셀 페이로드로 저장합니다.

use std::io::Cursor;
use std::path::Path;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use image::imageops::FilterType;
use regex::Regex;
use walkdir::WalkDir;

use crate::knowledge::PassageRetriever;
use crate::maps::{ExtractionMethod, ImageRecord, MapIndex};

/// 수집 시 지도 저장 해상도
const MAP_STORE_SIDE: u32 = 224;

/// 미리보기 최대 크기 및 base64 절단 길이
const PREVIEW_MAX_SIDE: u32 = 800;
const PREVIEW_B64_LIMIT: usize = 1000;

// ============================================================================
// Document ingestion
// ============================================================================

/// 문서 수집 통계
#[derive(Debug, Clone, Default)]
pub struct IngestStats {
    pub files_processed: usize,
    pub files_failed: usize,
    pub passages_indexed: usize,
}

/// 디렉토리의 PDF 문서를 재귀 수집
pub async fn ingest_docs(retriever: &PassageRetriever, dir: &Path) -> Result<IngestStats> {
    if !dir.is_dir() {
        anyhow::bail!("Not a directory: {:?}", dir);
    }

    let mut stats = IngestStats::default();

    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_file() || !has_extension(path, &["pdf"]) {
            continue;
        }

        let file_name = display_file_name(path);
        tracing::info!("Extracting PDF: {}", file_name);

        // pdf-extract는 동기 API라 블로킹 풀에서 실행
        let owned = path.to_path_buf();
        let extracted = tokio::task::spawn_blocking(move || extract_pdf_text(&owned))
            .await
            .context("PDF extraction task panicked")?;

        let text = match extracted {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!("Failed to extract {}: {}", file_name, e);
                stats.files_failed += 1;
                continue;
            }
        };

        if text.trim().is_empty() {
            tracing::warn!("No text in PDF (scanned document?): {}", file_name);
            stats.files_failed += 1;
            continue;
        }

        match retriever.index_text(&file_name, &text).await {
            Ok(outcome) => {
                stats.files_processed += 1;
                stats.passages_indexed += outcome.passage_count;
            }
            Err(e) => {
                tracing::warn!("Failed to index {}: {}", file_name, e);
                stats.files_failed += 1;
            }
        }
    }

    Ok(stats)
}

fn extract_pdf_text(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read PDF: {:?}", path))?;
    pdf_extract::extract_text_from_mem(&bytes)
        .with_context(|| format!("Failed to extract text from PDF: {:?}", path))
}

// ============================================================================
// Map ingestion
// ============================================================================

/// 지도 수집 통계
#[derive(Debug, Clone, Default)]
pub struct MapIngestStats {
    pub images_indexed: usize,
    pub images_failed: usize,
}

/// 디렉토리의 지도 이미지를 재귀 수집
///
/// 기존 인덱스는 먼저 비워집니다 (재수집 = 전체 교체).
/// 파일명의 `_p<N>` / `_i<N>` 패턴에서 페이지/순번을 파싱합니다.
pub async fn ingest_maps(index: &MapIndex, dir: &Path) -> Result<MapIngestStats> {
    if !dir.is_dir() {
        anyhow::bail!("Not a directory: {:?}", dir);
    }

    index.clear().context("Failed to clear map index")?;

    let page_re = Regex::new(r"_p(\d+)").context("Invalid page regex")?;
    let image_re = Regex::new(r"_i(\d+)").context("Invalid image index regex")?;

    let mut stats = MapIngestStats::default();

    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_file() || !has_extension(path, &["png", "jpg", "jpeg"]) {
            continue;
        }

        let file_name = display_file_name(path);
        let relative_path = path
            .strip_prefix(dir)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        let folder = path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .to_string();

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&file_name)
            .to_string();
        let page_number = capture_number(&page_re, &stem).unwrap_or(1);
        let image_index = capture_number(&image_re, &stem).unwrap_or(1);

        let byte_size = entry.metadata().map(|m| m.len()).unwrap_or(0);

        // 디코딩/리사이즈는 CPU 바운드라 블로킹 풀에서 실행
        let owned = path.to_path_buf();
        let loaded = tokio::task::spawn_blocking(move || load_map_image(&owned))
            .await
            .context("Image processing task panicked")?;

        let (width, height, payload, preview_b64) = match loaded {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Failed to process image {}: {}", file_name, e);
                stats.images_failed += 1;
                continue;
            }
        };

        let id = format!("{}_p{}_i{}", stem, page_number, image_index);
        let doc_text = format!("{}_p{}_i{}", relative_path, page_number, image_index);

        let record = ImageRecord {
            id,
            source_file: file_name.clone(),
            relative_path,
            folder,
            page_number,
            image_index,
            width,
            height,
            method: ExtractionMethod::Rendered,
            byte_size,
            preview_b64: Some(preview_b64),
            doc_text,
            payload,
            created_at: Utc::now(),
        };

        match index.insert(&record) {
            Ok(()) => {
                tracing::info!("Indexed map: {}", file_name);
                stats.images_indexed += 1;
            }
            Err(e) => {
                tracing::warn!("Failed to index map {}: {}", file_name, e);
                stats.images_failed += 1;
            }
        }
    }

    Ok(stats)
}

/// 이미지 로드 + 정규화 페이로드 + 미리보기 생성
fn load_map_image(path: &Path) -> Result<(u32, u32, Vec<f32>, String)> {
    let img = image::open(path).with_context(|| format!("Failed to open image: {:?}", path))?;
    let (width, height) = (img.width(), img.height());

    // 저장용: 224x224 RGB, [0,1] 정규화
    let resized = img
        .resize_exact(MAP_STORE_SIDE, MAP_STORE_SIDE, FilterType::Lanczos3)
        .to_rgb8();
    let payload: Vec<f32> = resized.as_raw().iter().map(|&b| b as f32 / 255.0).collect();

    // 미리보기: 축소 JPEG base64 (절단)
    let thumb = img.thumbnail(PREVIEW_MAX_SIDE, PREVIEW_MAX_SIDE).to_rgb8();
    let mut jpeg_bytes = Vec::new();
    thumb
        .write_to(&mut Cursor::new(&mut jpeg_bytes), image::ImageFormat::Jpeg)
        .context("Failed to encode preview")?;
    let mut preview = STANDARD.encode(&jpeg_bytes);
    preview.truncate(PREVIEW_B64_LIMIT);

    Ok((width, height, payload, preview))
}

// ============================================================================
// Helpers
// ============================================================================

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_lowercase();
            extensions.contains(&e.as_str())
        })
        .unwrap_or(false)
}

fn display_file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string()
}

fn capture_number(re: &Regex, s: &str) -> Option<i32> {
    re.captures(s)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_page_and_index() {
        let page_re = Regex::new(r"_p(\d+)").unwrap();
        let image_re = Regex::new(r"_i(\d+)").unwrap();

        assert_eq!(capture_number(&page_re, "Mapa_Trilhas_p3_i2"), Some(3));
        assert_eq!(capture_number(&image_re, "Mapa_Trilhas_p3_i2"), Some(2));
        assert_eq!(capture_number(&page_re, "Mapa_Simples"), None);
    }

    #[test]
    fn test_has_extension_is_case_insensitive() {
        assert!(has_extension(Path::new("a/Mapa.PNG"), &["png", "jpg"]));
        assert!(has_extension(Path::new("doc.pdf"), &["pdf"]));
        assert!(!has_extension(Path::new("doc.txt"), &["pdf"]));
    }

    #[test]
    fn test_map_payload_normalization() {
        use tempfile::TempDir;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mapa_p1_i1.png");

        // 단색 이미지 저장 후 로드
        let img = image::RgbImage::from_pixel(64, 64, image::Rgb([255, 0, 128]));
        img.save(&path).unwrap();

        let (width, height, payload, preview) = load_map_image(&path).unwrap();
        assert_eq!((width, height), (64, 64));
        assert_eq!(payload.len(), (MAP_STORE_SIDE * MAP_STORE_SIDE * 3) as usize);
        assert!(payload.iter().all(|v| (0.0..=1.0).contains(v)));
        assert!(!preview.is_empty());
    }
}
