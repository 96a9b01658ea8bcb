//! Text Chunking Module
//!
//! 문서 텍스트를 수집용 패시지로 분할합니다.
//! 문자 수 기준으로 자르되, 단어 중간에서 끊기지 않도록
//! 마지막 공백 위치로 경계를 되돌립니다.

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// 최대 청크 크기 (문자 수)
    pub max_characters: usize,
    /// 청크 간 오버랩 (문자 수)
    pub overlap_characters: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_characters: 1000,
            overlap_characters: 200,
        }
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// TextChunker
// ============================================================================

/// 단어 경계 인식 청커
///
/// 공백을 정규화한 뒤 max_characters 단위로 자르고,
/// 경계가 단어 중간이면 마지막 공백까지 되돌립니다.
/// 연속 청크는 overlap_characters만큼 겹칩니다.
pub struct TextChunker {
    config: ChunkConfig,
}

impl TextChunker {
    /// 설정으로 생성
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    /// 기본 설정으로 생성
    pub fn with_defaults() -> Self {
        Self::new(ChunkConfig::default())
    }
}

impl Chunker for TextChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        // 공백 정규화 (개행/연속 공백 -> 단일 공백)
        let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if normalized.is_empty() {
            return vec![];
        }

        let chars: Vec<char> = normalized.chars().collect();
        let max = self.config.max_characters.max(1);
        let overlap = self.config.overlap_characters;

        let mut chunks = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            let mut end = (start + max).min(chars.len());

            // 단어 경계로 되돌리기
            if end < chars.len() {
                if let Some(pos) = chars[start..end].iter().rposition(|c| *c == ' ') {
                    if pos > 0 {
                        end = start + pos;
                    }
                }
            }

            let chunk: String = chars[start..end].iter().collect();
            let chunk = chunk.trim();
            if !chunk.is_empty() {
                chunks.push(chunk.to_string());
            }

            if end >= chars.len() {
                break;
            }

            // 오버랩 적용, 전진 보장
            start = end.saturating_sub(overlap).max(start + 1);
        }

        chunks
    }

    fn name(&self) -> &'static str {
        "text-word-boundary"
    }
}

/// 기본 청커 생성
pub fn default_chunker() -> Box<dyn Chunker> {
    Box::new(TextChunker::with_defaults())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn small_chunker(max: usize, overlap: usize) -> TextChunker {
        TextChunker::new(ChunkConfig {
            max_characters: max,
            overlap_characters: overlap,
        })
    }

    #[test]
    fn test_chunk_empty() {
        let chunker = TextChunker::with_defaults();
        assert!(chunker.chunk("").is_empty());
        assert!(chunker.chunk("   \n  ").is_empty());
    }

    #[test]
    fn test_chunk_small_text_single_chunk() {
        let chunker = TextChunker::with_defaults();
        let chunks = chunker.chunk("uma trilha curta");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], "uma trilha curta");
    }

    #[test]
    fn test_chunk_respects_word_boundary() {
        let chunker = small_chunker(10, 0);
        let chunks = chunker.chunk("cachoeira mirante floresta");

        // 단어가 경계에서 잘리지 않는다
        for chunk in &chunks {
            assert!(!chunk.starts_with(' '));
            assert!(!chunk.ends_with(' '));
        }
        assert_eq!(chunks[0], "cachoeira");
    }

    #[test]
    fn test_chunk_normalizes_whitespace() {
        let chunker = TextChunker::with_defaults();
        let chunks = chunker.chunk("trilha\n\ndo   pico\tda tijuca");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], "trilha do pico da tijuca");
    }

    #[test]
    fn test_chunk_overlap_repeats_tail() {
        let chunker = small_chunker(20, 8);
        let text = "a floresta da tijuca cobre grande parte do parque nacional";
        let chunks = chunker.chunk(text);

        assert!(chunks.len() > 1);
        // 오버랩 때문에 이웃 청크가 내용을 공유한다
        let first_tail: String = chunks[0].chars().rev().take(4).collect();
        let tail: String = first_tail.chars().rev().collect();
        assert!(chunks[1].contains(tail.trim()));
    }

    #[test]
    fn test_chunk_terminates_on_long_word() {
        // 공백 없는 텍스트도 전진이 보장되어야 한다
        let chunker = small_chunker(5, 4);
        let chunks = chunker.chunk(&"x".repeat(30));
        assert!(!chunks.is_empty());
    }
}
