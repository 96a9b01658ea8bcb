//! Map Reconstruction - 정규화 픽셀 페이로드 -> 이미지 복원
//!
//! 저장된 [0,1] f32 RGB 페이로드에서 기하를 추론하고
//! 표시용 이미지로 복원/확대합니다.

use image::imageops::FilterType;
use image::RgbImage;

use crate::error::GuideError;

/// 448x448 RGB 페이로드 길이
const PAYLOAD_LEN_448: usize = 448 * 448 * 3;
/// 224x224 RGB 페이로드 길이
const PAYLOAD_LEN_224: usize = 224 * 224 * 3;

// ============================================================================
// Geometry
// ============================================================================

/// 페이로드 길이에서 정방형 기하 추론
///
/// 알려진 길이(448, 224)를 우선 확인하고, 그 외에는
/// 정수 제곱근으로 한 변을 역산합니다.
fn detect_geometry(id: &str, len: usize) -> Result<u32, GuideError> {
    match len {
        PAYLOAD_LEN_448 => Ok(448),
        PAYLOAD_LEN_224 => Ok(224),
        _ => {
            let side = ((len as f64 / 3.0).sqrt()).floor() as usize;
            if side > 0 && side * side * 3 == len {
                Ok(side as u32)
            } else {
                Err(GuideError::UnrenderableImage {
                    id: id.to_string(),
                    len,
                })
            }
        }
    }
}

// ============================================================================
// Reconstruction
// ============================================================================

/// 페이로드에서 RGB 이미지 복원
///
/// 각 채널 값은 v * 255를 [0, 255]로 클램프해 u8로 변환합니다.
pub fn reconstruct_image(id: &str, payload: &[f32]) -> Result<RgbImage, GuideError> {
    let side = detect_geometry(id, payload.len())?;

    let pixels: Vec<u8> = payload
        .iter()
        .map(|v| (v * 255.0).clamp(0.0, 255.0) as u8)
        .collect();

    RgbImage::from_raw(side, side, pixels).ok_or_else(|| GuideError::UnrenderableImage {
        id: id.to_string(),
        len: payload.len(),
    })
}

/// 표시용 확대
///
/// 저장 해상도가 낮으므로 Lanczos3로 확대합니다.
/// 448 -> 3배, 224 -> 6배, 그 외 -> 3배.
pub fn upscale_for_display(img: &RgbImage) -> RgbImage {
    let factor = match img.width() {
        448 => 3,
        224 => 6,
        _ => 3,
    };

    image::imageops::resize(
        img,
        img.width() * factor,
        img.height() * factor,
        FilterType::Lanczos3,
    )
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_known_geometries() {
        assert_eq!(detect_geometry("a", PAYLOAD_LEN_448).unwrap(), 448);
        assert_eq!(detect_geometry("a", PAYLOAD_LEN_224).unwrap(), 224);
        // 제곱근 폴백: 100x100x3
        assert_eq!(detect_geometry("a", 100 * 100 * 3).unwrap(), 100);
    }

    #[test]
    fn test_invalid_length_is_unrenderable() {
        let result = detect_geometry("mapa_p1_i1", 12345);
        assert!(matches!(
            result,
            Err(GuideError::UnrenderableImage { len: 12345, .. })
        ));
    }

    #[test]
    fn test_reconstruct_224() {
        let payload = vec![0.5_f32; PAYLOAD_LEN_224];
        let img = reconstruct_image("a_p1_i1", &payload).unwrap();
        assert_eq!(img.width(), 224);
        assert_eq!(img.height(), 224);
        assert_eq!(img.get_pixel(0, 0).0, [127, 127, 127]);
    }

    #[test]
    fn test_reconstruct_clamps_out_of_range() {
        let mut payload = vec![0.0_f32; PAYLOAD_LEN_224];
        payload[0] = -1.0;
        payload[1] = 2.0;
        let img = reconstruct_image("a_p1_i1", &payload).unwrap();
        let px = img.get_pixel(0, 0);
        assert_eq!(px.0[0], 0);
        assert_eq!(px.0[1], 255);
    }

    #[test]
    fn test_upscale_factors() {
        let small = RgbImage::new(224, 224);
        let upscaled = upscale_for_display(&small);
        assert_eq!(upscaled.width(), 1344);

        let large = RgbImage::new(448, 448);
        let upscaled = upscale_for_display(&large);
        assert_eq!(upscaled.width(), 1344);
    }
}
