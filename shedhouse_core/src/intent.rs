use crate::card::{CardId, Color};
use crate::state::PlayerId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type IntentId = Uuid;

/// 玩家提交的指令，等待权威循环验证。提交后不可变。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub id: IntentId,
    pub submitted_at: DateTime<Utc>,
    pub player_id: PlayerId,
    pub kind: IntentKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IntentKind {
    Join { nickname: String, avatar: Option<String> },
    Disconnect,
    Start,
    Play { card_id: CardId, chosen_color: Option<Color> },
    Draw,
    Pass,
    PlayAgain,
}

impl Intent {
    pub fn new(player_id: PlayerId, kind: IntentKind) -> Self {
        Intent::with_id(Uuid::new_v4(), player_id, kind)
    }

    /// 客户端自带 id 时使用，便于把确认消息对回去
    pub fn with_id(id: IntentId, player_id: PlayerId, kind: IntentKind) -> Self {
        Intent { id, submitted_at: Utc::now(), player_id, kind }
    }
}

impl IntentKind {
    pub fn play(card_id: CardId) -> Self {
        IntentKind::Play { card_id, chosen_color: None }
    }

    pub fn play_wild(card_id: CardId, color: Color) -> Self {
        IntentKind::Play { card_id, chosen_color: Some(color) }
    }
}
