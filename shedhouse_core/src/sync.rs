//! 读者端的同步协议
//!
//! 每个订阅者用它来决定怎么处理收到的快照：过期的丢掉，同版本的重新应用，
//! 出现版本缺口时请求一次完整重同步，同时先用收到的快照顶上。

use crate::card::CardId;
use crate::state::{GameState, PlayerId};

/// 对一份快照的处理决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Discard,
    ResyncRequested,
}

/// 只看版本号的判定规则
///
/// - 比已接受的版本旧：丢弃。
/// - 与已接受的版本相同：照常应用。写者交接或重连后会合法地重发同一版本，
///   把它当成过期会丢数据。
/// - 比已接受的版本大 1 以上：有缺口，需要重同步。
/// - 恰好大 1，或者本地还没有任何版本：接受。
pub fn reconcile(local_version: Option<u64>, incoming_version: u64) -> Decision {
    match local_version {
        None => Decision::Accept,
        Some(local) if incoming_version < local => Decision::Discard,
        Some(local) if incoming_version <= local + 1 => Decision::Accept,
        Some(_) => Decision::ResyncRequested,
    }
}

/// 处理一份快照的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub decision: Decision,
    /// 本地呈现的状态是否发生了变化
    pub changed: bool,
    /// 调用方现在应该发出重同步请求（已经有一个在途时为 false）
    pub request_resync: bool,
    /// 乐观出牌被权威状态否定时，返回那张牌
    pub rolled_back: Option<CardId>,
}

/// 乐观地当作已经打出的牌，只影响呈现
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OptimisticPlay {
    player_id: PlayerId,
    card_id: CardId,
}

#[derive(Debug, Default)]
pub struct Reconciler {
    accepted: Option<GameState>,
    resync_pending: bool,
    optimistic: Option<OptimisticPlay>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_version(&self) -> Option<u64> {
        self.accepted.as_ref().map(|s| s.version)
    }

    /// 最近一次接受的权威状态
    pub fn state(&self) -> Option<&GameState> {
        self.accepted.as_ref()
    }

    pub fn resync_pending(&self) -> bool {
        self.resync_pending
    }

    /// 用于呈现的状态：权威状态减去乐观打出的那张牌
    pub fn presented(&self) -> Option<GameState> {
        let mut state = self.accepted.clone()?;
        if let Some(play) = self.optimistic {
            if let Some(player) = state.player_mut(&play.player_id) {
                player.hand.retain(|c| c.id != play.card_id);
            }
        }
        Some(state)
    }

    /// 处理一份广播来的快照
    pub fn receive(&mut self, snapshot: GameState) -> Reconciled {
        let decision = reconcile(self.last_version(), snapshot.version);
        if decision == Decision::Discard {
            return Reconciled { decision, changed: false, request_resync: false, rolled_back: None };
        }

        let request_resync = decision == Decision::ResyncRequested && !self.resync_pending;
        if decision == Decision::ResyncRequested {
            self.resync_pending = true;
        }

        // 缺口时也先应用，重同步回来之前不至于停在更旧的画面上
        let (changed, rolled_back) = self.adopt(snapshot);
        Reconciled { decision, changed, request_resync, rolled_back }
    }

    /// 重同步的响应：无条件采用，包括版本号
    pub fn adopt_resync(&mut self, snapshot: GameState) -> Reconciled {
        self.resync_pending = false;
        let (changed, rolled_back) = self.adopt(snapshot);
        Reconciled { decision: Decision::Accept, changed, request_resync: false, rolled_back }
    }

    /// 重同步超时，允许下次再发
    pub fn resync_failed(&mut self) {
        self.resync_pending = false;
    }

    /// 本地先把这张牌当作已经打出去
    pub fn play_optimistically(&mut self, player_id: PlayerId, card_id: CardId) {
        self.optimistic = Some(OptimisticPlay { player_id, card_id });
    }

    /// 乐观出牌被直接拒绝时撤回，权威状态本身没有变化
    pub fn rollback_optimistic(&mut self) -> Option<CardId> {
        self.optimistic.take().map(|play| play.card_id)
    }

    fn adopt(&mut self, snapshot: GameState) -> (bool, Option<CardId>) {
        let rolled_back = self.optimistic.take().and_then(|play| {
            let still_held = snapshot
                .player(&play.player_id)
                .is_some_and(|p| p.hand.iter().any(|c| c.id == play.card_id));
            still_held.then_some(play.card_id)
        });
        let changed = self.accepted.as_ref() != Some(&snapshot) || rolled_back.is_some();
        self.accepted = Some(snapshot);
        (changed, rolled_back)
    }
}
