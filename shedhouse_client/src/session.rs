//! 客户端的会话状态：把命令翻译成消息，把服务器消息交给同步协议，并管理两类超时。
//!
//! 这里不做任何 I/O，所有动作以 `Effect` 的形式交给调用方执行。

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use uuid::Uuid;

use shedhouse_core::{
    ClientMessage, Color, GameState, IntentId, IntentKind, PlayerId, Reconciler, RejoinToken, ServerMessage,
    SessionId,
};

use crate::command::{Command, HELP};
use crate::error::ClientError;
use crate::view::render;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Send(ClientMessage),
    Print(String),
    Exit,
}

pub struct ClientSession {
    reconciler: Reconciler,
    session_id: Option<SessionId>,
    me: Option<PlayerId>,
    rejoin_token: Option<RejoinToken>,
    // 等待结果的指令及其截止时间
    awaiting: HashMap<IntentId, Instant>,
    // 乐观打出的那张牌对应的指令
    optimistic_intent: Option<IntentId>,
    // 在途的重同步请求的截止时间
    resync_deadline: Option<Instant>,
    ack_timeout: Duration,
    resync_timeout: Duration,
}

impl ClientSession {
    pub fn new(ack_timeout: Duration, resync_timeout: Duration) -> Self {
        Self {
            reconciler: Reconciler::new(),
            session_id: None,
            me: None,
            rejoin_token: None,
            awaiting: HashMap::new(),
            optimistic_intent: None,
            resync_deadline: None,
            ack_timeout,
            resync_timeout,
        }
    }

    pub fn me(&self) -> Option<PlayerId> {
        self.me
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }

    pub fn rejoin_token(&self) -> Option<RejoinToken> {
        self.rejoin_token
    }

    pub fn presented(&self) -> Option<GameState> {
        self.reconciler.presented()
    }

    pub fn resyncing(&self) -> bool {
        self.resync_deadline.is_some()
    }

    // --- 用户命令 ---

    pub fn command(&mut self, command: Command, now: Instant) -> Result<Vec<Effect>, ClientError> {
        let effects = match command {
            Command::Create { nickname } => vec![Effect::Send(ClientMessage::CreateSession { nickname, avatar: None })],
            Command::Join { session_id, nickname, rejoin } => vec![Effect::Send(ClientMessage::JoinSession {
                session_id,
                nickname,
                avatar: None,
                player_id: rejoin.map(|(player_id, _)| player_id),
                rejoin_token: rejoin.map(|(_, token)| token),
            })],
            Command::Start => self.submit(IntentKind::Start, now)?,
            Command::Draw => self.submit(IntentKind::Draw, now)?,
            Command::Pass => self.submit(IntentKind::Pass, now)?,
            Command::Again => self.submit(IntentKind::PlayAgain, now)?,
            Command::Play { index, color } => self.play(index, color, now)?,
            Command::Resync => {
                self.require_seat()?;
                self.request_resync(now)
            }
            Command::End => {
                self.require_seat()?;
                vec![Effect::Send(ClientMessage::EndSession)]
            }
            Command::Show => match self.reconciler.presented() {
                Some(state) => vec![Effect::Print(render(&state, self.me))],
                None => vec![Effect::Print("还没有加入任何会话".to_string())],
            },
            Command::Help => vec![Effect::Print(HELP.to_string())],
            Command::Exit => vec![Effect::Exit],
        };
        Ok(effects)
    }

    fn require_seat(&self) -> Result<PlayerId, ClientError> {
        match (self.session_id, self.me) {
            (Some(_), Some(me)) => Ok(me),
            _ => Err(ClientError::NotSeated),
        }
    }

    fn submit(&mut self, kind: IntentKind, now: Instant) -> Result<Vec<Effect>, ClientError> {
        self.require_seat()?;
        let intent_id = Uuid::new_v4();
        self.awaiting.insert(intent_id, now + self.ack_timeout);
        Ok(vec![Effect::Send(ClientMessage::Submit { intent_id, kind })])
    }

    fn play(&mut self, index: usize, color: Option<Color>, now: Instant) -> Result<Vec<Effect>, ClientError> {
        let me = self.require_seat()?;
        let card = self
            .reconciler
            .presented()
            .and_then(|state| {
                let player = state.player(&me)?;
                player.hand.get(index.checked_sub(1)?).copied()
            })
            .ok_or(ClientError::NoSuchCard(index))?;
        if card.face.is_wild() && color.is_none() {
            return Err(ClientError::ColorRequired);
        }
        let chosen_color = if card.face.is_wild() { color } else { None };

        let mut effects = self.submit(IntentKind::Play { card_id: card.id, chosen_color }, now)?;
        // 先在本地把牌打出去，等权威快照确认或撤回
        self.reconciler.play_optimistically(me, card.id);
        if let Some(Effect::Send(ClientMessage::Submit { intent_id, .. })) = effects.first() {
            self.optimistic_intent = Some(*intent_id);
        }
        if let Some(state) = self.reconciler.presented() {
            effects.push(Effect::Print(render(&state, Some(me))));
        }
        Ok(effects)
    }

    fn request_resync(&mut self, now: Instant) -> Vec<Effect> {
        self.resync_deadline = Some(now + self.resync_timeout);
        vec![Effect::Send(ClientMessage::ResyncRequest)]
    }

    // --- 服务器消息 ---

    pub fn on_server_message(&mut self, msg: ServerMessage, now: Instant) -> Vec<Effect> {
        match msg {
            ServerMessage::SessionJoined { session_id, your_id, rejoin_token, snapshot } => {
                self.session_id = Some(session_id);
                self.me = Some(your_id);
                self.rejoin_token = Some(rejoin_token);
                self.reconciler = Reconciler::new();
                self.awaiting.clear();
                self.resync_deadline = None;
                self.reconciler.adopt_resync(snapshot);
                let mut effects = vec![Effect::Print(format!(
                    "已加入会话 {}，你的玩家ID是 {}，重连凭证是 {}",
                    session_id, your_id, rejoin_token
                ))];
                effects.extend(self.show());
                effects
            }
            ServerMessage::Snapshot { snapshot } => {
                let report = self.reconciler.receive(snapshot);
                debug!("收到快照: {:?}", report.decision);
                let mut effects = Vec::new();
                if report.request_resync && self.resync_deadline.is_none() {
                    effects.push(Effect::Print("版本出现缺口，正在重新同步".to_string()));
                    effects.extend(self.request_resync(now));
                }
                if let Some(card_id) = report.rolled_back {
                    effects.push(Effect::Print(format!("出牌未被接受，牌 {} 已放回手牌", card_id.0)));
                }
                if report.changed {
                    effects.extend(self.show());
                }
                effects
            }
            ServerMessage::ResyncResponse { snapshot } => {
                self.resync_deadline = None;
                let report = self.reconciler.adopt_resync(snapshot);
                if report.changed { self.show() } else { Vec::new() }
            }
            ServerMessage::IntentAck { intent_id, version } => {
                self.awaiting.remove(&intent_id);
                debug!("指令 {} 已在版本 {} 生效", intent_id, version);
                Vec::new()
            }
            ServerMessage::IntentRejected { intent_id, reason } => {
                self.awaiting.remove(&intent_id);
                let mut effects = vec![Effect::Print(format!("操作被拒绝: {}", reason))];
                if self.optimistic_intent == Some(intent_id) {
                    self.optimistic_intent = None;
                    if self.reconciler.rollback_optimistic().is_some() {
                        effects.extend(self.show());
                    }
                }
                effects
            }
            ServerMessage::SessionEnded { session_id } => {
                self.session_id = None;
                self.me = None;
                self.rejoin_token = None;
                self.reconciler = Reconciler::new();
                self.awaiting.clear();
                self.resync_deadline = None;
                vec![Effect::Print(format!("会话 {} 已被房主结束", session_id))]
            }
            ServerMessage::Error { message } => vec![Effect::Print(format!("服务器错误: {}", message))],
        }
    }

    /// 检查超时。确认超时不做任何假设，只去要一份完整状态；重同步超时则重试。
    pub fn poll(&mut self, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();

        let before = self.awaiting.len();
        self.awaiting.retain(|_, deadline| *deadline > now);
        let expired = before - self.awaiting.len();

        if let Some(deadline) = self.resync_deadline {
            if deadline <= now {
                warn!("重同步超时");
                self.reconciler.resync_failed();
                effects.push(Effect::Print("重新连接中...".to_string()));
                effects.extend(self.request_resync(now));
            }
        } else if expired > 0 && self.session_id.is_some() {
            warn!("{} 条指令没有收到结果", expired);
            effects.push(Effect::Print("连接不稳定，重新连接中...".to_string()));
            effects.extend(self.request_resync(now));
        }
        effects
    }

    fn show(&self) -> Vec<Effect> {
        match self.reconciler.presented() {
            Some(state) => vec![Effect::Print(render(&state, self.me))],
            None => Vec::new(),
        }
    }
}
