//! Query Classifier - 질문 의도 분류
//!
//! LLM으로 질문을 clima / trilhas / geral 세 도메인 중 하나로
//! 분류합니다. 분류 실패 시 geral로 폴백하며 절대 실패하지 않습니다.

use std::sync::Arc;

use crate::error::GuideError;
use crate::llm::{ChatMessage, ChatOptions, ChatProvider};

/// 분류 프롬프트 (포르투갈어, 단일 토큰 응답 요구)
const CLASSIFIER_PROMPT: &str = "\
Você é um classificador de perguntas sobre o Parque Nacional da Tijuca.

Classifique a pergunta do usuário em UMA das categorias:
- clima: perguntas sobre tempo, chuva, temperatura, previsão do tempo
- trilhas: perguntas sobre trilhas, caminhadas, mapas, rotas, percursos
- geral: qualquer outra pergunta sobre o parque (história, fauna, flora, \
horários, ingressos, regras)

Responda APENAS com a categoria, em minúsculas, sem pontuação.";

// ============================================================================
// Types
// ============================================================================

/// 질문 도메인 라벨
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    /// 날씨/예보 질문
    Clima,
    /// 트레일/지도 질문
    Trilhas,
    /// 그 외 공원 일반 질문
    Geral,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Clima => "clima",
            Label::Trilhas => "trilhas",
            Label::Geral => "geral",
        }
    }

    /// 모델 응답 토큰에서 라벨 파싱 (알 수 없으면 None)
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "clima" => Some(Label::Clima),
            "trilhas" => Some(Label::Trilhas),
            "geral" => Some(Label::Geral),
            _ => None,
        }
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 분류 결과
///
/// defaulted가 true면 모델 응답이 무효이거나 호출이 실패해
/// geral로 폴백했음을 뜻합니다.
#[derive(Debug, Clone, Copy)]
pub struct Classification {
    pub label: Label,
    pub defaulted: bool,
}

// ============================================================================
// QueryClassifier
// ============================================================================

/// 질문 분류기
pub struct QueryClassifier {
    llm: Arc<dyn ChatProvider>,
}

impl QueryClassifier {
    pub fn new(llm: Arc<dyn ChatProvider>) -> Self {
        Self { llm }
    }

    /// 질문 분류 (전수 함수 - 항상 결과를 반환)
    pub async fn classify(&self, question: &str) -> Classification {
        let messages = [
            ChatMessage::system(CLASSIFIER_PROMPT),
            ChatMessage::user(question),
        ];

        match self
            .llm
            .chat(&messages, ChatOptions::for_classification())
            .await
        {
            Ok(response) => {
                let token = response.trim().to_lowercase();
                match Label::from_token(&token) {
                    Some(label) => {
                        tracing::debug!("Query classified as: {}", label);
                        Classification {
                            label,
                            defaulted: false,
                        }
                    }
                    None => {
                        tracing::warn!(
                            "Unrecognized classification token: {:?}, defaulting to geral",
                            token
                        );
                        Classification {
                            label: Label::Geral,
                            defaulted: true,
                        }
                    }
                }
            }
            Err(e) => {
                let failure = GuideError::ClassificationFailure(e.to_string());
                tracing::warn!("{}, defaulting to geral", failure);
                Classification {
                    label: Label::Geral,
                    defaulted: true,
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GuideError;
    use async_trait::async_trait;

    /// 고정 응답 스텁
    struct StubChat {
        response: Result<String, ()>,
    }

    #[async_trait]
    impl ChatProvider for StubChat {
        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _options: ChatOptions,
        ) -> Result<String, GuideError> {
            match &self.response {
                Ok(s) => Ok(s.clone()),
                Err(_) => Err(GuideError::GenerationFailure("stub failure".to_string())),
            }
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    fn classifier_with(response: Result<&str, ()>) -> QueryClassifier {
        QueryClassifier::new(Arc::new(StubChat {
            response: response.map(|s| s.to_string()),
        }))
    }

    #[tokio::test]
    async fn test_valid_labels() {
        for (token, expected) in [
            ("clima", Label::Clima),
            ("trilhas", Label::Trilhas),
            ("geral", Label::Geral),
        ] {
            let result = classifier_with(Ok(token)).classify("pergunta").await;
            assert_eq!(result.label, expected);
            assert!(!result.defaulted);
        }
    }

    #[tokio::test]
    async fn test_normalizes_case_and_whitespace() {
        let result = classifier_with(Ok("  Trilhas \n")).classify("pergunta").await;
        assert_eq!(result.label, Label::Trilhas);
        assert!(!result.defaulted);
    }

    #[tokio::test]
    async fn test_invalid_token_defaults_to_geral() {
        let result = classifier_with(Ok("categoria: trilhas"))
            .classify("pergunta")
            .await;
        assert_eq!(result.label, Label::Geral);
        assert!(result.defaulted);
    }

    #[tokio::test]
    async fn test_provider_error_defaults_to_geral() {
        let result = classifier_with(Err(())).classify("pergunta").await;
        assert_eq!(result.label, Label::Geral);
        assert!(result.defaulted);
    }
}
