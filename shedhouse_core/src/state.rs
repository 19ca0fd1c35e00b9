use crate::card::{Card, CardId, Color, DECK_SIZE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use uuid::Uuid;

pub type SessionId = Uuid;
pub type PlayerId = Uuid;
/// 座位的重连凭证，只发给坐在这个座位上的连接，不出现在快照里
pub type RejoinToken = Uuid;

/// 每局最多座位数
pub const MAX_SEATS: usize = 10;
/// 开局最少人数
pub const MIN_PLAYERS: usize = 2;
/// 开局每人发牌数
pub const HAND_SIZE: usize = 7;
/// 操作日志最多保留的条数，超出后丢弃最旧的
pub const MAX_LOG_ENTRIES: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    pub session_id: SessionId,
    pub owner_id: Option<PlayerId>, // 房主：第一个加入的玩家
    // 按座位号排列，players[i].seat == i
    pub players: Vec<Player>,

    pub phase: GamePhase,
    pub dealer_index: usize,
    pub direction: Direction,
    pub current_player_index: usize,
    // 只有在 Playing 阶段之外才是 None
    pub current_color: Option<Color>,

    // 牌堆顶都是最后一个元素
    pub draw_pile: Vec<Card>,
    pub discard_pile: Vec<Card>,

    // 刚摸到一张能出的牌，必须先决定出还是过
    pub drawn_playable: Option<DrawnPlayable>,
    pub winner_id: Option<PlayerId>,

    // 只由权威循环在提交时修改
    pub version: u64,
    pub updated_at: Option<DateTime<Utc>>,

    pub action_log: VecDeque<LogEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub seat: usize,
    pub nickname: String,
    pub avatar: Option<String>,
    pub connected: bool,
    pub hand: Vec<Card>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum GamePhase {
    Lobby,
    Playing,
    Finished,
}

/// 出牌方向
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Direction {
    Clockwise,        // 座位号 +1
    CounterClockwise, // 座位号 -1
}

impl Direction {
    pub fn step(self) -> i64 {
        match self {
            Direction::Clockwise => 1,
            Direction::CounterClockwise => -1,
        }
    }

    pub fn flipped(self) -> Direction {
        match self {
            Direction::Clockwise => Direction::CounterClockwise,
            Direction::CounterClockwise => Direction::Clockwise,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DrawnPlayable {
    pub player_id: PlayerId,
    pub card_id: CardId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub player_id: Option<PlayerId>,
    pub event: GameEvent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    Joined { seat: usize },
    Rejoined,
    Disconnected,
    Started { starting_card: Card },
    Played { card: Card, chosen_color: Option<Color> },
    Drew,
    Penalized { count: usize },
    Passed,
    Won,
    Reset,
}

// --- GameState 的实现方法 ---

impl GameState {
    /// 打开一个新大厅：空座位、空牌堆
    pub fn new(session_id: SessionId) -> Self {
        GameState {
            session_id,
            owner_id: None,
            players: Vec::new(),
            phase: GamePhase::Lobby,
            dealer_index: 0,
            direction: Direction::Clockwise,
            current_player_index: 0,
            current_color: None,
            draw_pile: Vec::new(),
            discard_pile: Vec::new(),
            drawn_playable: None,
            winner_id: None,
            version: 0,
            updated_at: None,
            action_log: VecDeque::new(),
        }
    }

    pub fn player(&self, id: &PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == *id)
    }

    pub fn player_mut(&mut self, id: &PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == *id)
    }

    pub fn seat_of(&self, id: &PlayerId) -> Option<usize> {
        self.player(id).map(|p| p.seat)
    }

    /// 获取当前行动的玩家 (只在 Playing 阶段有意义)
    pub fn current_player(&self) -> Option<&Player> {
        if self.phase != GamePhase::Playing {
            return None;
        }
        self.players.get(self.current_player_index)
    }

    pub fn current_player_id(&self) -> Option<PlayerId> {
        self.current_player().map(|p| p.id)
    }

    pub fn top_discard(&self) -> Option<&Card> {
        self.discard_pile.last()
    }

    /// 从 `from` 出发，沿当前方向走 `steps` 个座位
    pub fn seat_after(&self, from: usize, steps: usize) -> usize {
        let n = self.players.len() as i64;
        if n == 0 {
            return 0;
        }
        (from as i64 + self.direction.step() * steps as i64).rem_euclid(n) as usize
    }

    /// 手牌、摸牌堆、弃牌堆的总张数
    pub fn card_count(&self) -> usize {
        self.players.iter().map(|p| p.hand.len()).sum::<usize>()
            + self.draw_pile.len()
            + self.discard_pile.len()
    }

    /// 牌数守恒检查：牌局进行中（或刚结束）时，三处的牌恰好是整副牌，没有重复也没有缺失。
    /// 大厅阶段所有牌堆都为空。
    pub fn cards_conserved(&self) -> bool {
        if self.phase == GamePhase::Lobby {
            return self.card_count() == 0;
        }
        let ids: HashSet<CardId> = self
            .players
            .iter()
            .flat_map(|p| p.hand.iter())
            .chain(self.draw_pile.iter())
            .chain(self.discard_pile.iter())
            .map(|c| c.id)
            .collect();
        self.card_count() == DECK_SIZE
            && ids.len() == DECK_SIZE
            && ids.iter().all(|id| (id.0 as usize) < DECK_SIZE)
    }

    /// 追加一条日志，超过上限时丢弃最旧的
    pub(crate) fn log(&mut self, at: DateTime<Utc>, player_id: Option<PlayerId>, event: GameEvent) {
        self.action_log.push_back(LogEntry { at, player_id, event });
        while self.action_log.len() > MAX_LOG_ENTRIES {
            self.action_log.pop_front();
        }
    }
}
