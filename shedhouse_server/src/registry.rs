use dashmap::DashMap;
use tracing::{info, warn};
use uuid::Uuid;

use shedhouse_core::{GameState, PlayerId, RejoinToken, SessionId};

use crate::session::{SessionConfig, SessionError, SessionHandle};

/// 所有进行中的会话。每个会话在表里只有一个句柄，也就只有一个写者。
pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionHandle>,
    // 每个座位的重连凭证，只发给坐下的那个连接
    tokens: DashMap<(SessionId, PlayerId), RejoinToken>,
    config: SessionConfig,
}

impl SessionRegistry {
    pub fn new(config: SessionConfig) -> Self {
        Self { sessions: DashMap::new(), tokens: DashMap::new(), config }
    }

    /// 打开一个空大厅
    pub fn create(&self) -> SessionHandle {
        let session_id = Uuid::new_v4();
        let handle = SessionHandle::spawn(GameState::new(session_id), &self.config);
        self.sessions.insert(session_id, handle.clone());
        info!("创建了新会话 {}", session_id);
        handle
    }

    /// 取会话句柄
    ///
    /// 写者异常退出时，在原地从最后的快照重新指派一个。
    /// 房主已经结束的会话直接从表里移除，不会被重新指派。
    pub fn get(&self, session_id: SessionId) -> Result<SessionHandle, SessionError> {
        let mut entry = self.sessions.get_mut(&session_id).ok_or(SessionError::NotFound)?;
        if entry.is_alive() {
            return Ok(entry.clone());
        }
        if entry.is_ended() {
            drop(entry);
            self.forget(session_id);
            return Err(SessionError::NotFound);
        }
        warn!("会话 {} 的写者不可用", session_id);
        let replacement = entry.respawn(&self.config)?;
        *entry = replacement;
        Ok(entry.clone())
    }

    pub fn contains(&self, session_id: SessionId) -> bool {
        self.sessions.contains_key(&session_id)
    }

    /// 房主结束会话，状态随写者一起销毁
    pub async fn end(&self, session_id: SessionId, requested_by: PlayerId) -> Result<(), SessionError> {
        let handle = self.get(session_id)?;
        handle.end(requested_by).await?;
        self.forget(session_id);
        Ok(())
    }

    fn forget(&self, session_id: SessionId) {
        if self.sessions.remove(&session_id).is_some() {
            info!("会话 {} 已移除", session_id);
        }
        self.tokens.retain(|(session, _), _| *session != session_id);
    }

    /// 座位的重连凭证，同一个座位重复加入时沿用原来的
    pub fn issue_token(&self, session_id: SessionId, player_id: PlayerId) -> RejoinToken {
        *self.tokens.entry((session_id, player_id)).or_insert_with(Uuid::new_v4)
    }

    /// 带着玩家ID重连时核对凭证
    pub fn check_rejoin(
        &self,
        session_id: SessionId,
        player_id: PlayerId,
        token: Option<RejoinToken>,
    ) -> Result<(), SessionError> {
        match self.tokens.get(&(session_id, player_id)) {
            Some(expected) if Some(*expected) == token => Ok(()),
            _ => {
                warn!("会话 {} 中玩家 {} 的重连凭证不匹配", session_id, player_id);
                Err(SessionError::RejoinDenied)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
