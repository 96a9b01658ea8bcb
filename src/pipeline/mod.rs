//! Guide Pipeline - 질문 처리 파이프라인
//!
//! 분류 -> 검색 -> 컨텍스트 구성 -> 생성 -> 세션 갱신의 전체 흐름.
//! 파이프라인은 전송 계층에 절대 Err를 반환하지 않습니다.
//! 모든 실패는 사용자용 포르투갈어 메시지로 변환됩니다.

use std::sync::Arc;
use std::time::Duration;

use crate::classifier::{Classification, Label, QueryClassifier};
use crate::config::CapabilitySet;
use crate::error::GuideError;
use crate::knowledge::{PassageRetriever, RetrievedPassage};
use crate::llm::{ChatMessage, ChatOptions, ChatProvider};
use crate::maps::{MapCandidate, MapIndex, DEFAULT_MAP_TOP_K};
use crate::session::{ChatHistory, Role, SessionManager};
use crate::weather::{answer_weather, WeatherProvider};

/// 텍스트 패시지 검색 수
const TEXT_TOP_K: usize = 5;

/// 생성 재시도 전 대기 시간
const RETRY_BACKOFF: Duration = Duration::from_millis(1500);

/// geral 도메인 시스템 프롬프트
const GERAL_PROMPT: &str = "\
Você é um guia virtual do Parque Nacional da Tijuca, no Rio de Janeiro.
Responda em português, de forma clara e acolhedora.

Use APENAS as informações do contexto abaixo para responder.
Se a informação não estiver no contexto, diga que não encontrou essa \
informação nos documentos do parque.
Cite a fonte quando possível.

Contexto:
{context}";

/// trilhas 도메인 시스템 프롬프트
const TRILHAS_PROMPT: &str = "\
Você é um guia de trilhas do Parque Nacional da Tijuca, no Rio de Janeiro.
Responda em português, com orientações práticas e seguras.

Use APENAS as informações do contexto abaixo para responder.
Se houver mapas disponíveis no contexto, mencione-os ao final da resposta.
Se a informação não estiver no contexto, diga que não encontrou essa \
informação nos documentos do parque.

Contexto:
{context}";

// 사용자용 실패 메시지
const MSG_KB_EMPTY: &str = "Desculpe, a base de conhecimento do parque ainda não \
foi carregada. Peça ao administrador para executar a ingestão de documentos.";
const MSG_GENERATION_FAILED: &str = "Desculpe, não consegui gerar uma resposta \
no momento. Tente novamente em alguns instantes.";
const MSG_NO_GENERATION_KEY: &str = "O serviço de respostas não está configurado \
(chave de API ausente). Contate o administrador.";
const MSG_NO_WEATHER: &str = "A consulta de clima não está disponível no momento \
(serviço não configurado).";
const MSG_WEATHER_FAILED: &str = "Não foi possível consultar o clima agora. \
Tente novamente em alguns instantes.";

// ============================================================================
// Types
// ============================================================================

/// 답변이 근거로 삼은 패시지 출처
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Citation {
    /// 원본 파일명
    pub source_file: String,
    /// 파일 내 순번
    pub part_index: i32,
}

/// 구조화된 응답
///
/// 전송 계층(CLI 등)은 이 구조체만 보고 표시를 결정합니다.
#[derive(Debug, Clone)]
pub struct GuideReply {
    /// 분류된 도메인
    pub label: Label,
    /// 분류가 geral로 폴백되었는지
    pub defaulted_label: bool,
    /// 사용자에게 보여줄 답변 텍스트
    pub answer: String,
    /// 근거 패시지 출처 (clima는 항상 빈 벡터)
    pub citations: Vec<Citation>,
    /// 지도 후보 (trilhas에서만 비어 있지 않을 수 있음)
    pub map_candidates: Vec<MapCandidate>,
}

impl GuideReply {
    fn degraded(classification: Classification, answer: impl Into<String>) -> Self {
        Self {
            label: classification.label,
            defaulted_label: classification.defaulted,
            answer: answer.into(),
            citations: Vec::new(),
            map_candidates: Vec::new(),
        }
    }
}

// ============================================================================
// Guide
// ============================================================================

/// 공원 가이드 파이프라인
///
/// 모든 협력 서비스는 생성 시점에 주입됩니다.
pub struct Guide {
    classifier: QueryClassifier,
    llm: Arc<dyn ChatProvider>,
    retriever: Arc<PassageRetriever>,
    maps: Arc<MapIndex>,
    weather: Option<Arc<dyn WeatherProvider>>,
    sessions: SessionManager,
    capabilities: CapabilitySet,
}

impl Guide {
    pub fn new(
        llm: Arc<dyn ChatProvider>,
        retriever: Arc<PassageRetriever>,
        maps: Arc<MapIndex>,
        weather: Option<Arc<dyn WeatherProvider>>,
        capabilities: CapabilitySet,
    ) -> Self {
        Self {
            classifier: QueryClassifier::new(llm.clone()),
            llm,
            retriever,
            maps,
            weather,
            sessions: SessionManager::new(),
            capabilities,
        }
    }

    /// 세션 초기화
    pub async fn reset_session(&self, session_id: &str) {
        self.sessions.reset(session_id).await;
    }

    /// 질문 처리 (전수 함수)
    ///
    /// 어떤 내부 실패든 사용자용 메시지가 담긴 GuideReply로 변환됩니다.
    /// 실패한 턴은 세션 히스토리에 기록되지 않습니다.
    pub async fn process_query(&self, session_id: &str, question: &str) -> GuideReply {
        // 같은 세션의 턴이 섞이지 않도록 락을 턴 전체 동안 유지
        let history = self.sessions.session(session_id).await;
        let mut history = history.lock().await;

        let classification = self.classifier.classify(question).await;
        tracing::info!(
            "Processing query: label={} defaulted={}",
            classification.label,
            classification.defaulted
        );

        match classification.label {
            Label::Clima => self.handle_weather(&mut history, question, classification).await,
            Label::Trilhas => self.handle_trails(&mut history, question, classification).await,
            Label::Geral => self.handle_general(&mut history, question, classification).await,
        }
    }

    // ------------------------------------------------------------------
    // Domain handlers
    // ------------------------------------------------------------------

    async fn handle_weather(
        &self,
        history: &mut ChatHistory,
        question: &str,
        classification: Classification,
    ) -> GuideReply {
        let Some(provider) = &self.weather else {
            return GuideReply::degraded(classification, MSG_NO_WEATHER);
        };

        let answer = match answer_weather(provider.as_ref(), question).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!("Weather lookup failed: {}", e);
                return GuideReply::degraded(classification, MSG_WEATHER_FAILED);
            }
        };

        history.append(Role::User, question);
        history.append(Role::Assistant, &answer);

        GuideReply {
            label: classification.label,
            defaulted_label: classification.defaulted,
            answer,
            citations: Vec::new(),
            map_candidates: Vec::new(),
        }
    }

    async fn handle_trails(
        &self,
        history: &mut ChatHistory,
        question: &str,
        classification: Classification,
    ) -> GuideReply {
        // 패시지 검색과 지도 스코어링을 동시에 수행
        let (passages, maps) = tokio::join!(
            self.retriever.retrieve_top_k(question, TEXT_TOP_K),
            self.score_maps(question),
        );

        let passages = match passages {
            Ok(p) => p,
            Err(e) => return self.degraded_retrieval(classification, e),
        };

        // 지도 인덱스 문제는 턴을 중단시키지 않음
        let map_candidates = maps.unwrap_or_else(|e| {
            tracing::warn!("Map scoring failed: {}", e);
            Vec::new()
        });

        let context = compose_context(&passages, &map_candidates);
        let system_prompt = TRILHAS_PROMPT.replace("{context}", &context);

        self.generate_reply(
            history,
            question,
            classification,
            &system_prompt,
            &passages,
            map_candidates,
        )
        .await
    }

    async fn handle_general(
        &self,
        history: &mut ChatHistory,
        question: &str,
        classification: Classification,
    ) -> GuideReply {
        let passages = match self.retriever.retrieve_top_k(question, TEXT_TOP_K).await {
            Ok(p) => p,
            Err(e) => return self.degraded_retrieval(classification, e),
        };

        let context = compose_context(&passages, &[]);
        let system_prompt = GERAL_PROMPT.replace("{context}", &context);

        self.generate_reply(
            history,
            question,
            classification,
            &system_prompt,
            &passages,
            Vec::new(),
        )
        .await
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn score_maps(&self, question: &str) -> Result<Vec<MapCandidate>, GuideError> {
        self.maps.score_candidates(question, DEFAULT_MAP_TOP_K)
    }

    fn degraded_retrieval(
        &self,
        classification: Classification,
        error: GuideError,
    ) -> GuideReply {
        tracing::warn!("Retrieval unavailable: {}", error);
        GuideReply::degraded(classification, MSG_KB_EMPTY)
    }

    /// 컨텍스트가 준비된 상태에서 답변 생성 및 세션 기록
    ///
    /// 성공한 턴만 히스토리에 기록됩니다.
    async fn generate_reply(
        &self,
        history: &mut ChatHistory,
        question: &str,
        classification: Classification,
        system_prompt: &str,
        passages: &[RetrievedPassage],
        map_candidates: Vec<MapCandidate>,
    ) -> GuideReply {
        if !self.capabilities.generation {
            return GuideReply::degraded(classification, MSG_NO_GENERATION_KEY);
        }

        let snapshot = history.snapshot();

        let mut messages = Vec::with_capacity(snapshot.len() + 2);
        messages.push(ChatMessage::system(system_prompt));
        for turn in &snapshot {
            messages.push(match turn.role {
                Role::User => ChatMessage::user(&turn.content),
                Role::Assistant => ChatMessage::assistant(&turn.content),
            });
        }
        messages.push(ChatMessage::user(question));

        let answer = match self.chat_with_retry(&messages).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::error!("Answer generation failed: {}", e);
                return GuideReply::degraded(classification, MSG_GENERATION_FAILED);
            }
        };

        history.append(Role::User, question);
        history.append(Role::Assistant, &answer);

        GuideReply {
            label: classification.label,
            defaulted_label: classification.defaulted,
            answer,
            citations: passages
                .iter()
                .map(|p| Citation {
                    source_file: p.source_file.clone(),
                    part_index: p.part_index,
                })
                .collect(),
            map_candidates,
        }
    }

    /// 생성 호출 (일시 장애 대비 1회 재시도)
    async fn chat_with_retry(&self, messages: &[ChatMessage]) -> Result<String, GuideError> {
        match self.llm.chat(messages, ChatOptions::for_answering()).await {
            Ok(answer) => Ok(answer),
            Err(first) => {
                tracing::warn!("Generation attempt failed, retrying: {}", first);
                tokio::time::sleep(RETRY_BACKOFF).await;
                self.llm.chat(messages, ChatOptions::for_answering()).await
            }
        }
    }
}

// ============================================================================
// Context composition
// ============================================================================

/// 검색 결과를 프롬프트 컨텍스트로 구성
///
/// 패시지는 `[Fonte: 파일 - Parte N]` 헤더와 함께 이어 붙이고,
/// 지도 후보가 있으면 목록 블록을 덧붙입니다.
fn compose_context(passages: &[RetrievedPassage], map_candidates: &[MapCandidate]) -> String {
    let mut blocks: Vec<String> = passages
        .iter()
        .map(|p| {
            format!(
                "[Fonte: {} - Parte {}]\n{}",
                p.source_file, p.part_index, p.text
            )
        })
        .collect();

    if !map_candidates.is_empty() {
        let mut lines = vec!["Mapas disponíveis:".to_string()];
        for (i, c) in map_candidates.iter().enumerate() {
            lines.push(format!(
                "{}. {} (Página {}) - Score: {}",
                i + 1,
                c.display_name,
                c.page_number,
                c.relevance_score
            ));
        }
        blocks.push(lines.join("\n"));
    }

    blocks.join("\n\n")
}

// ============================================================================
// Tests
// ============================================================================
