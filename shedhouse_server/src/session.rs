//! 权威循环
//!
//! 每个会话只有一个写者任务持有 `GameState`。外部通过邮箱提交指令，
//! 写者按固定节拍把队列里的指令依次交给规则引擎，每个节拍最多提交一个新版本并广播。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::AbortHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use shedhouse_core::{
    apply_intent, DeckFault, EngineError, GameState, Intent, IntentId, PlayerId, Rejection, SessionId,
};

/// 会话配置
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// 写者的节拍
    pub tick_interval: Duration,
    /// 邮箱容量
    pub mailbox_capacity: usize,
    /// 快照广播容量，落后更多的读者会丢消息，靠缺口检测补齐
    pub broadcast_capacity: usize,
    /// 固定种子，便于复现；None 时使用系统熵
    pub seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(150),
            mailbox_capacity: 256,
            broadcast_capacity: 64,
            seed: None,
        }
    }
}

/// 单条指令的处理结果，只回给提交者
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentOutcome {
    /// 已应用，状态包含在该版本里
    Applied { version: u64 },
    Rejected(Rejection),
    /// 牌堆错误：指令被丢弃，状态保持不变
    Faulted(DeckFault),
}

/// 一个节拍的处理汇总
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// 本节拍提交的新版本
    pub committed: Option<u64>,
    pub applied: usize,
    pub rejected: usize,
    pub faulted: usize,
}

/// 广播给订阅者的内容
#[derive(Debug, Clone)]
pub enum Published {
    Snapshot(Arc<GameState>),
    Ended,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("会话不存在")]
    NotFound,
    #[error("会话的写者不可用")]
    WriterUnavailable,
    #[error("等待确认超时")]
    AckTimeout,
    #[error("重同步超时")]
    ResyncTimeout,
    #[error("只有房主可以结束会话")]
    NotOwner,
    #[error("重连凭证无效")]
    RejoinDenied,
}

struct Queued {
    intent: Intent,
    reply: Option<oneshot::Sender<IntentOutcome>>,
}

// --- 权威循环本体（同步部分，便于直接测试） ---

pub struct AuthoritativeLoop<R> {
    state: GameState,
    queue: VecDeque<Queued>,
    rng: R,
}

impl<R: Rng> AuthoritativeLoop<R> {
    pub fn new(state: GameState, rng: R) -> Self {
        Self { state, queue: VecDeque::new(), rng }
    }

    /// 最近一次提交的状态
    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn enqueue(&mut self, intent: Intent, reply: Option<oneshot::Sender<IntentOutcome>>) {
        self.queue.push_back(Queued { intent, reply });
    }

    /// 处理一个节拍
    ///
    /// 按到达顺序把队列里的指令全部应用一遍。只要状态（按值比较）有变化就提交一次：
    /// 版本号 +1，记录更新时间，然后调用 `publish`。一个节拍里多条有效指令只产生一个版本。
    /// 各指令的结果在发布之后才回给提交者。
    pub fn process_tick(&mut self, now: DateTime<Utc>, publish: impl FnOnce(&GameState)) -> TickReport {
        let mut report = TickReport::default();
        if self.queue.is_empty() {
            return report;
        }

        let mut next = self.state.clone();
        let mut replies: Vec<(IntentId, Option<oneshot::Sender<IntentOutcome>>, Result<(), IntentOutcome>)> =
            Vec::with_capacity(self.queue.len());

        for Queued { intent, reply } in self.queue.drain(..) {
            match apply_intent(&next, &intent, &mut self.rng) {
                Ok(applied) => {
                    debug!("应用指令 {} ({:?})", intent.id, intent.kind);
                    next = applied;
                    report.applied += 1;
                    replies.push((intent.id, reply, Ok(())));
                }
                Err(EngineError::Rejected(reason)) => {
                    warn!("拒绝玩家 {} 的指令 {}: {}", intent.player_id, intent.id, reason);
                    report.rejected += 1;
                    replies.push((intent.id, reply, Err(IntentOutcome::Rejected(reason))));
                }
                Err(EngineError::Fault(fault)) => {
                    error!("指令 {} 触发牌堆错误，拒绝继续: {}", intent.id, fault);
                    report.faulted += 1;
                    replies.push((intent.id, reply, Err(IntentOutcome::Faulted(fault))));
                }
            }
        }

        if next != self.state {
            next.version = self.state.version + 1;
            next.updated_at = Some(now);
            self.state = next;
            report.committed = Some(self.state.version);
            publish(&self.state);
        }

        let version = self.state.version;
        for (intent_id, reply, result) in replies {
            let outcome = result.err().unwrap_or(IntentOutcome::Applied { version });
            if let Some(reply) = reply {
                if reply.send(outcome).is_err() {
                    debug!("指令 {} 的提交者已不再等待结果", intent_id);
                }
            }
        }

        report
    }
}

// --- 写者任务与句柄 ---

enum Command {
    Submit { intent: Intent, reply: Option<oneshot::Sender<IntentOutcome>> },
    Resync { reply: oneshot::Sender<GameState> },
    End { requested_by: PlayerId, reply: oneshot::Sender<Result<(), SessionError>> },
}

/// 发布端：换写者时沿用，订阅者不用重新订阅
struct Publisher {
    snapshots: broadcast::Sender<Published>,
    latest: watch::Sender<Arc<GameState>>,
    // 房主结束后置位，之后不再指派新的写者
    ended: AtomicBool,
}

impl Publisher {
    fn publish(&self, state: &GameState) {
        let snapshot = Arc::new(state.clone());
        self.latest.send_replace(snapshot.clone());
        // 没有订阅者时发送失败，忽略即可
        let _ = self.snapshots.send(Published::Snapshot(snapshot));
    }
}

/// 会话句柄，可以随意克隆，所有克隆都指向同一个写者
#[derive(Clone)]
pub struct SessionHandle {
    session_id: SessionId,
    commands: mpsc::Sender<Command>,
    publisher: Arc<Publisher>,
    writer: AbortHandle,
}

impl SessionHandle {
    /// 为一个新大厅启动写者
    pub fn spawn(state: GameState, config: &SessionConfig) -> Self {
        let (snapshots, _) = broadcast::channel(config.broadcast_capacity.max(1));
        let (latest, _) = watch::channel(Arc::new(state.clone()));
        let publisher = Arc::new(Publisher { snapshots, latest, ended: AtomicBool::new(false) });
        Self::spawn_writer(publisher, state, config, false)
    }

    /// 原来的写者不可用时，从最后一次提交的快照启动新的写者。
    /// 新写者先重发同一版本，之后从这个版本继续递增，版本号不会回退。
    /// 已被房主结束的会话不会再有写者。
    pub fn respawn(&self, config: &SessionConfig) -> Result<Self, SessionError> {
        if self.is_ended() {
            return Err(SessionError::NotFound);
        }
        let state = (**self.publisher.latest.borrow()).clone();
        info!("会话 {} 的写者在版本 {} 重新指派", self.session_id, state.version);
        Ok(Self::spawn_writer(self.publisher.clone(), state, config, true))
    }

    fn spawn_writer(publisher: Arc<Publisher>, state: GameState, config: &SessionConfig, republish: bool) -> Self {
        let session_id = state.session_id;
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed ^ session_id.as_u64_pair().0),
            None => ChaCha8Rng::from_os_rng(),
        };
        let (commands, mailbox) = mpsc::channel(config.mailbox_capacity.max(1));

        if republish {
            publisher.publish(&state);
        }
        let writer = AuthoritativeLoop::new(state, rng);
        let writer = tokio::spawn(run_writer(writer, mailbox, publisher.clone(), config.tick_interval)).abort_handle();

        Self { session_id, commands, publisher, writer }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn is_alive(&self) -> bool {
        !self.commands.is_closed()
    }

    /// 房主已经结束了这个会话
    pub fn is_ended(&self) -> bool {
        self.publisher.ended.load(Ordering::SeqCst)
    }

    /// 让写者任务异常退出，等到邮箱关闭为止
    #[cfg(test)]
    pub(crate) async fn crash_writer(&self) {
        self.writer.abort();
        while self.is_alive() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Published> {
        self.publisher.snapshots.subscribe()
    }

    /// 最后一次提交的快照
    pub fn latest(&self) -> Arc<GameState> {
        self.publisher.latest.borrow().clone()
    }

    /// 把指令放进队列后立即返回，结果通过返回的接收端异步送达
    pub async fn submit(&self, intent: Intent) -> Result<oneshot::Receiver<IntentOutcome>, SessionError> {
        let (reply, outcome) = oneshot::channel();
        self.commands
            .send(Command::Submit { intent, reply: Some(reply) })
            .await
            .map_err(|_| SessionError::WriterUnavailable)?;
        Ok(outcome)
    }

    /// 只入队，不关心结果
    pub async fn submit_detached(&self, intent: Intent) -> Result<(), SessionError> {
        self.commands
            .send(Command::Submit { intent, reply: None })
            .await
            .map_err(|_| SessionError::WriterUnavailable)
    }

    /// 提交并在限定时间内等待结果。超时不代表指令没有被应用。
    pub async fn submit_and_wait(&self, intent: Intent, timeout: Duration) -> Result<IntentOutcome, SessionError> {
        let outcome = self.submit(intent).await?;
        match tokio::time::timeout(timeout, outcome).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(_)) => Err(SessionError::WriterUnavailable),
            Err(_) => Err(SessionError::AckTimeout),
        }
    }

    /// 向写者要一份完整的当前状态
    pub async fn resync(&self, timeout: Duration) -> Result<GameState, SessionError> {
        let (reply, state) = oneshot::channel();
        self.commands
            .send(Command::Resync { reply })
            .await
            .map_err(|_| SessionError::WriterUnavailable)?;
        match tokio::time::timeout(timeout, state).await {
            Ok(Ok(state)) => Ok(state),
            Ok(Err(_)) => Err(SessionError::WriterUnavailable),
            Err(_) => Err(SessionError::ResyncTimeout),
        }
    }

    /// 房主结束会话，写者随即退出
    pub async fn end(&self, requested_by: PlayerId) -> Result<(), SessionError> {
        let (reply, result) = oneshot::channel();
        self.commands
            .send(Command::End { requested_by, reply })
            .await
            .map_err(|_| SessionError::WriterUnavailable)?;
        result.await.map_err(|_| SessionError::WriterUnavailable)?
    }
}

/// 写者任务：节拍到了就处理队列，其余时间收邮箱
async fn run_writer(
    mut writer: AuthoritativeLoop<ChaCha8Rng>,
    mut mailbox: mpsc::Receiver<Command>,
    publisher: Arc<Publisher>,
    tick_interval: Duration,
) {
    let session_id = writer.state().session_id;
    let mut ticker = tokio::time::interval(tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("会话 {} 的写者已启动", session_id);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = writer.process_tick(Utc::now(), |state| publisher.publish(state));
                if let Some(version) = report.committed {
                    debug!(
                        "会话 {} 提交版本 {}（应用 {}，拒绝 {}，错误 {}）",
                        session_id, version, report.applied, report.rejected, report.faulted
                    );
                }
            }
            command = mailbox.recv() => match command {
                Some(Command::Submit { intent, reply }) => writer.enqueue(intent, reply),
                Some(Command::Resync { reply }) => {
                    let _ = reply.send(writer.state().clone());
                }
                Some(Command::End { requested_by, reply }) => {
                    if writer.state().owner_id == Some(requested_by) {
                        info!("会话 {} 被房主 {} 结束", session_id, requested_by);
                        // 先置位再关邮箱：看到邮箱关闭的人一定也能看到会话已结束
                        publisher.ended.store(true, Ordering::SeqCst);
                        mailbox.close();
                        let _ = publisher.snapshots.send(Published::Ended);
                        let _ = reply.send(Ok(()));
                        break;
                    }
                    let _ = reply.send(Err(SessionError::NotOwner));
                }
                // 所有句柄都已丢弃
                None => break,
            }
        }
    }

    if writer.pending() > 0 {
        warn!("会话 {} 的写者退出时丢弃了 {} 条未处理的指令", session_id, writer.pending());
    }
    info!("会话 {} 的写者已退出", session_id);
}
