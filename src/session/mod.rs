//! 세션 상태 모듈 - 대화 히스토리 관리
//!
//! 세션마다 순서가 보장된 턴 히스토리를 보관합니다.
//! 히스토리는 프로세스 수명 동안만 유지되며, 영속화되지 않습니다.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

/// 히스토리에 유지하는 최대 턴 수
///
/// 무한정 쌓이면 생성 백엔드의 입력 한도를 넘기 때문에
/// 가장 최근 턴들만 유지합니다.
pub const MAX_HISTORY_TURNS: usize = 20;

// ============================================================================
// Types
// ============================================================================

/// 대화 턴의 발화자
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// 대화 턴
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

// ============================================================================
// ChatHistory
// ============================================================================

/// 단일 세션의 대화 히스토리
///
/// 한 세션이 단독으로 소유하며, 턴은 항상 시간 순서로 쌓입니다.
#[derive(Debug, Default)]
pub struct ChatHistory {
    turns: Vec<Turn>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self { turns: Vec::new() }
    }

    /// 턴 추가
    ///
    /// MAX_HISTORY_TURNS를 넘으면 가장 오래된 턴부터 버립니다.
    pub fn append(&mut self, role: Role, content: impl Into<String>) {
        self.turns.push(Turn {
            role,
            content: content.into(),
        });

        if self.turns.len() > MAX_HISTORY_TURNS {
            let excess = self.turns.len() - MAX_HISTORY_TURNS;
            self.turns.drain(0..excess);
        }
    }

    /// 현재 히스토리의 순서 보존 스냅샷
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.clone()
    }

    /// 히스토리 초기화
    pub fn reset(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

// ============================================================================
// SessionManager
// ============================================================================

/// 세션 관리자
///
/// 세션 ID마다 독립적인 히스토리를 보관합니다. 세션 내부의 턴은
/// 히스토리 뮤텍스로 직렬화되고, 서로 다른 세션은 병렬로 처리됩니다.
#[derive(Default)]
pub struct SessionManager {
    sessions: Mutex<HashMap<String, Arc<Mutex<ChatHistory>>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 세션 히스토리 핸들 획득 (없으면 생성)
    pub async fn session(&self, session_id: &str) -> Arc<Mutex<ChatHistory>> {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(ChatHistory::new())))
            .clone()
    }

    /// 세션 히스토리 초기화
    pub async fn reset(&self, session_id: &str) {
        let handle = self.session(session_id).await;
        handle.lock().await.reset();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_snapshot_order() {
        let mut history = ChatHistory::new();
        history.append(Role::User, "primeira pergunta");
        history.append(Role::Assistant, "primeira resposta");
        history.append(Role::User, "segunda pergunta");

        let snap = history.snapshot();
        assert_eq!(snap.len(), 3);
        assert_eq!(snap[0].role, Role::User);
        assert_eq!(snap[0].content, "primeira pergunta");
        assert_eq!(snap[2].content, "segunda pergunta");
    }

    #[test]
    fn test_snapshot_idempotent() {
        let mut history = ChatHistory::new();
        history.append(Role::User, "oi");
        history.append(Role::Assistant, "olá");

        let first = history.snapshot();
        let second = history.snapshot();
        assert_eq!(first, second);
    }

    #[test]
    fn test_reset() {
        let mut history = ChatHistory::new();
        history.append(Role::User, "oi");
        assert!(!history.is_empty());

        history.reset();
        assert!(history.is_empty());
        assert!(history.snapshot().is_empty());
    }

    #[test]
    fn test_truncation_keeps_most_recent() {
        let mut history = ChatHistory::new();
        for i in 0..(MAX_HISTORY_TURNS + 6) {
            history.append(Role::User, format!("turno {}", i));
        }

        let snap = history.snapshot();
        assert_eq!(snap.len(), MAX_HISTORY_TURNS);
        // 가장 오래된 턴이 버려지고 최신 턴이 남는다
        assert_eq!(snap.last().map(|t| t.content.as_str()), Some("turno 25"));
        assert_eq!(snap[0].content, "turno 6");
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let manager = SessionManager::new();

        let a = manager.session("canal-a").await;
        a.lock().await.append(Role::User, "pergunta do canal a");

        let b = manager.session("canal-b").await;
        assert!(b.lock().await.is_empty());

        manager.reset("canal-a").await;
        assert!(a.lock().await.is_empty());
    }
}
