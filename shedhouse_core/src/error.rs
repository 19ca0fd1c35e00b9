use crate::card::CardId;
use crate::state::GamePhase;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 非法操作的原因。只回报给提交者，不会改变状态，也不会广播。
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    #[error("座位已满")]
    SessionFull,
    #[error("牌局进行中，不能占用新座位")]
    GameInProgress,
    #[error("玩家不在本局中")]
    UnknownPlayer,
    #[error("只有房主可以执行该操作")]
    NotOwner,
    #[error("至少需要 {required} 名玩家，当前只有 {seated} 名")]
    NotEnoughPlayers { seated: usize, required: usize },
    #[error("当前阶段 {phase:?} 不允许该操作")]
    WrongPhase { phase: GamePhase },
    #[error("还没轮到你")]
    NotYourTurn,
    #[error("手中没有这张牌: #{}", .card_id.0)]
    CardNotInHand { card_id: CardId },
    #[error("这张牌接不上弃牌堆顶: #{}", .card_id.0)]
    CardDoesNotMatch { card_id: CardId },
    #[error("手中还有当前颜色的牌，不能出变色+4")]
    WildDrawFourNotAllowed,
    #[error("出万能牌必须选择颜色")]
    ColorChoiceRequired,
    #[error("必须先决定是否打出刚摸到的牌")]
    DecisionPending,
    #[error("只能打出刚摸到的那张牌: #{}", .card_id.0)]
    MustPlayDrawnCard { card_id: CardId },
    #[error("手中有可以出的牌，不能摸牌")]
    HasPlayableCard,
    #[error("没有可以放弃的摸牌决定")]
    NothingToPass,
}

/// 牌堆层面的错误，说明逻辑有缺陷。本手牌拒绝继续，绝不凭空造牌。
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "fault", rename_all = "snake_case")]
pub enum DeckFault {
    #[error("摸牌堆和弃牌堆都已耗尽")]
    Exhausted,
    #[error("牌局进行中但弃牌堆为空")]
    EmptyDiscard,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("非法操作: {0}")]
    Rejected(#[from] Rejection),
    #[error("牌堆错误: {0}")]
    Fault(#[from] DeckFault),
}
