//! Knowledge Base - 패시지 저장 및 시맨틱 검색
//!
//! SQLite(원문) + LanceDB(벡터) 이중 저장 구조로
//! 공원 문서 패시지를 관리합니다.

pub mod chunker;
pub mod lance;
pub mod retriever;
pub mod store;
pub mod vector;

pub use chunker::{default_chunker, ChunkConfig, Chunker, TextChunker};
pub use lance::LanceVectorStore;
pub use retriever::{IndexOutcome, PassageRetriever, RetrievedPassage, RetrieverStats};
pub use store::{Passage, PassageStore, StoreStats};
pub use vector::{VectorEntry, VectorHit, VectorStore, EMBEDDING_DIMENSION};
