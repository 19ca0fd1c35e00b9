//! # 出牌游戏核心逻辑库
//!
//! 这个 `core` crate 包含了出牌游戏（按颜色/数字跟牌、先出完者胜）的状态定义和规则引擎、
//! 德州扑克的牌力评估、读者端的快照同步协议，以及客户端-服务器通信消息的定义。
//! 它不做任何 I/O，也不读系统时钟之外的全局状态，可以被任何上层应用复用。

mod card;
mod error;
mod intent;
mod message;
pub mod poker;
mod rules;
mod state;
pub mod sync;

pub use card::*;

pub use error::*;

pub use intent::*;

pub use message::*;

pub use rules::{apply_intent, is_playable, MAX_START_REDRAWS};

pub use state::*;

pub use sync::{reconcile, Decision, Reconciled, Reconciler};

pub use poker::{evaluate_best_hand, Evaluation, HandCategory, HandScore, PokerCard};
