use crate::error::Rejection;
use crate::intent::{IntentId, IntentKind};
use crate::state::{GameState, PlayerId, RejoinToken, SessionId};
use serde::{Deserialize, Serialize};

// --- 客户端 -> 服务器 的消息 ---
// 这些是客户端可以发送给服务器的指令。对局内的动作都包成 Intent 排队，由权威循环处理。

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    // --- 会话管理消息 ---
    /// 打开一个新大厅，发起者成为房主
    CreateSession { nickname: String, avatar: Option<String> },
    /// 加入已存在的大厅；带上 player_id 和加入时拿到的 rejoin_token 表示断线重连，沿用原来的座位
    JoinSession {
        session_id: SessionId,
        nickname: String,
        avatar: Option<String>,
        player_id: Option<PlayerId>,
        rejoin_token: Option<RejoinToken>,
    },
    /// 房主结束会话，游戏状态随之销毁
    EndSession,

    // --- 游戏内消息 ---
    /// 提交一条指令。intent_id 由客户端生成，用于对应确认或拒绝消息
    Submit { intent_id: IntentId, kind: IntentKind },
    /// 请求完整状态，用于版本缺口或确认超时之后
    ResyncRequest,
}

// --- 服务器 -> 客户端 的消息 ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// 成功加入或创建会话后，私密地发给该玩家
    SessionJoined {
        session_id: SessionId,
        your_id: PlayerId,
        rejoin_token: RejoinToken,
        snapshot: GameState,
    },

    /// 权威循环提交后广播的完整快照
    Snapshot { snapshot: GameState },

    /// 对 ResyncRequest 的回应，客户端应无条件采用
    ResyncResponse { snapshot: GameState },

    /// 指令已被应用（所在的提交版本号）
    IntentAck { intent_id: IntentId, version: u64 },

    /// 指令被拒绝，只发给提交者
    IntentRejected { intent_id: IntentId, reason: Rejection },

    /// 会话已被房主结束
    SessionEnded { session_id: SessionId },

    /// 服务器向特定客户端发送错误信息
    Error { message: String },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error { message: message.into() }
    }
}

impl From<IntentKind> for ClientMessage {
    fn from(kind: IntentKind) -> Self {
        ClientMessage::Submit { intent_id: uuid::Uuid::new_v4(), kind }
    }
}
