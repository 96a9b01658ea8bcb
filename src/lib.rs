//! tijuca-guia - Parque Nacional da Tijuca 대화형 가이드
//!
//! 질문을 clima/trilhas/geral 도메인으로 분류하고,
//! 시맨틱 패시지 검색 + 지도 인덱스를 결합한 RAG 파이프라인으로
//! 포르투갈어 답변을 생성합니다.

pub mod classifier;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod knowledge;
pub mod llm;
pub mod maps;
pub mod pipeline;
pub mod session;
pub mod weather;

// Re-exports
pub use classifier::{Classification, Label, QueryClassifier};
pub use config::{AppConfig, CapabilitySet};
pub use embedding::{EmbeddingProvider, HttpEmbedding};
pub use error::GuideError;
pub use knowledge::{
    ChunkConfig, Chunker, LanceVectorStore, Passage, PassageRetriever, PassageStore,
    RetrievedPassage, StoreStats, TextChunker, VectorStore, default_chunker,
};
pub use llm::{ChatMessage, ChatOptions, ChatProvider, GroqChat};
pub use maps::{ImageRecord, MapCandidate, MapIndex};
pub use pipeline::{Citation, Guide, GuideReply};
pub use session::{ChatHistory, Role, SessionManager, Turn};
pub use weather::{CurrentConditions, DayForecast, WeatherApi, WeatherProvider};
