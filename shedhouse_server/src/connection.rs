//! 单个 WebSocket 连接上的消息处理，与具体的传输无关：
//! 进来的是解析好的 `ClientMessage`，出去的消息都写进该连接的发送通道。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shedhouse_core::{ClientMessage, Intent, IntentKind, PlayerId, ServerMessage, SessionId};

use crate::registry::SessionRegistry;
use crate::session::{IntentOutcome, Published, SessionError, SessionHandle};

// 服务器全局状态
pub struct AppState {
    pub sessions: SessionRegistry,
    pub ack_timeout: Duration,
}

pub type SharedState = Arc<AppState>;

/// 当前连接所在的会话，加入成功后填充
pub struct Seat {
    session_id: SessionId,
    player_id: PlayerId,
    // 把该会话的快照转发给这个连接的任务
    forwarder: JoinHandle<()>,
}

pub async fn handle_client_message(
    msg: ClientMessage,
    state: &SharedState,
    tx: &mpsc::Sender<ServerMessage>,
    seat: &mut Option<Seat>,
) {
    // 会话被结束后，旧的座位信息作废
    if let Some(current) = seat.as_ref() {
        if !state.sessions.contains(current.session_id) {
            if let Some(stale) = seat.take() {
                stale.forwarder.abort();
            }
        }
    }

    match msg {
        ClientMessage::CreateSession { nickname, avatar } => {
            if seat.is_some() {
                let _ = tx.send(ServerMessage::error("你已经在一个会话里了")).await;
                return;
            }
            let handle = state.sessions.create();
            let player_id = Uuid::new_v4();
            info!("玩家 {} 创建了会话 {}", player_id, handle.session_id());
            *seat = join_session(state, &handle, player_id, nickname, avatar, tx).await;
        }
        ClientMessage::JoinSession { session_id, nickname, avatar, player_id, rejoin_token } => {
            if seat.is_some() {
                let _ = tx.send(ServerMessage::error("你已经在一个会话里了")).await;
                return;
            }
            let handle = match state.sessions.get(session_id) {
                Ok(handle) => handle,
                Err(e) => {
                    let _ = tx.send(ServerMessage::error(e.to_string())).await;
                    return;
                }
            };
            // 带着原来的 id 回来就是重连，必须出示当初发的凭证
            let player_id = match player_id {
                Some(player_id) => {
                    if let Err(e) = state.sessions.check_rejoin(session_id, player_id, rejoin_token) {
                        let _ = tx.send(ServerMessage::error(e.to_string())).await;
                        return;
                    }
                    player_id
                }
                None => Uuid::new_v4(),
            };
            *seat = join_session(state, &handle, player_id, nickname, avatar, tx).await;
        }
        ClientMessage::EndSession => {
            let Some(current) = seat.as_ref() else {
                let _ = tx.send(ServerMessage::error("请先加入或创建会话")).await;
                return;
            };
            if let Err(e) = state.sessions.end(current.session_id, current.player_id).await {
                let _ = tx.send(ServerMessage::error(e.to_string())).await;
            }
            // 成功时由转发任务把 SessionEnded 发给每个连接，包括自己
        }
        ClientMessage::Submit { intent_id, kind } => {
            let Some(current) = seat.as_ref() else {
                let _ = tx.send(ServerMessage::error("请先加入或创建会话")).await;
                return;
            };
            let handle = match state.sessions.get(current.session_id) {
                Ok(handle) => handle,
                Err(e) => {
                    let _ = tx.send(ServerMessage::error(e.to_string())).await;
                    return;
                }
            };
            let intent = Intent::with_id(intent_id, current.player_id, kind);
            match handle.submit(intent).await {
                Ok(outcome) => {
                    // 结果只回给提交者；不阻塞这个连接继续读消息
                    let tx = tx.clone();
                    let ack_timeout = state.ack_timeout;
                    tokio::spawn(async move {
                        match tokio::time::timeout(ack_timeout, outcome).await {
                            Ok(Ok(outcome)) => {
                                let _ = tx.send(outcome_message(intent_id, outcome)).await;
                            }
                            Ok(Err(_)) => debug!("指令 {} 的结果已丢失", intent_id),
                            Err(_) => warn!("指令 {} 的结果超时，客户端应重新同步", intent_id),
                        }
                    });
                }
                Err(e) => {
                    let _ = tx.send(ServerMessage::error(e.to_string())).await;
                }
            }
        }
        ClientMessage::ResyncRequest => {
            let Some(current) = seat.as_ref() else {
                let _ = tx.send(ServerMessage::error("请先加入或创建会话")).await;
                return;
            };
            let result = match state.sessions.get(current.session_id) {
                Ok(handle) => handle.resync(state.ack_timeout).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(snapshot) => {
                    let _ = tx.send(ServerMessage::ResyncResponse { snapshot }).await;
                }
                Err(e) => {
                    warn!("会话 {} 重同步失败: {}", current.session_id, e);
                    let _ = tx.send(ServerMessage::error(e.to_string())).await;
                }
            }
        }
    }
}

/// 提交 Join 指令并等待结果，成功后开始转发快照
async fn join_session(
    state: &SharedState,
    handle: &SessionHandle,
    player_id: PlayerId,
    nickname: String,
    avatar: Option<String>,
    tx: &mpsc::Sender<ServerMessage>,
) -> Option<Seat> {
    let session_id = handle.session_id();
    // 先订阅再提交，加入之后的每个版本都不会漏掉
    let snapshots = handle.subscribe();
    let intent = Intent::new(player_id, IntentKind::Join { nickname, avatar });

    match handle.submit_and_wait(intent, state.ack_timeout).await {
        Ok(IntentOutcome::Applied { .. }) => {
            info!("玩家 {} 加入了会话 {}", player_id, session_id);
            let rejoin_token = state.sessions.issue_token(session_id, player_id);
            // SessionJoined 必须是这个连接收到的第一条会话消息，转发任务在它之后才启动；
            // 订阅里积压的旧版本会被客户端当作过期或同版本处理
            let joined = ServerMessage::SessionJoined {
                session_id,
                your_id: player_id,
                rejoin_token,
                snapshot: (*handle.latest()).clone(),
            };
            if tx.send(joined).await.is_err() {
                return None;
            }
            let forwarder = spawn_forwarder(snapshots, tx.clone(), session_id);
            Some(Seat { session_id, player_id, forwarder })
        }
        Ok(IntentOutcome::Rejected(reason)) => {
            let _ = tx.send(ServerMessage::error(format!("无法加入会话: {}", reason))).await;
            None
        }
        Ok(IntentOutcome::Faulted(fault)) => {
            let _ = tx.send(ServerMessage::error(fault.to_string())).await;
            None
        }
        Err(e) => {
            let _ = tx.send(ServerMessage::error(e.to_string())).await;
            None
        }
    }
}

/// 把会话广播的快照转发给一个连接
fn spawn_forwarder(
    mut snapshots: broadcast::Receiver<Published>,
    tx: mpsc::Sender<ServerMessage>,
    session_id: SessionId,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let msg = match snapshots.recv().await {
                Ok(Published::Snapshot(snapshot)) => ServerMessage::Snapshot { snapshot: (*snapshot).clone() },
                Ok(Published::Ended) => {
                    let _ = tx.send(ServerMessage::SessionEnded { session_id }).await;
                    break;
                }
                // 跳过的版本由客户端发现缺口后重同步补齐
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("会话 {} 的一个连接落后了 {} 个快照", session_id, skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            if tx.send(msg).await.is_err() {
                break;
            }
        }
    })
}

fn outcome_message(intent_id: Uuid, outcome: IntentOutcome) -> ServerMessage {
    match outcome {
        IntentOutcome::Applied { version } => ServerMessage::IntentAck { intent_id, version },
        IntentOutcome::Rejected(reason) => ServerMessage::IntentRejected { intent_id, reason },
        IntentOutcome::Faulted(fault) => ServerMessage::error(format!("指令 {} 未能执行: {}", intent_id, fault)),
    }
}

/// 玩家断开连接后的处理：座位保留，只标记为离线
pub async fn handle_disconnect(state: &SharedState, seat: Seat) {
    info!("玩家 {} 从会话 {} 断开连接", seat.player_id, seat.session_id);
    seat.forwarder.abort();

    match state.sessions.get(seat.session_id) {
        Ok(handle) => {
            let intent = Intent::new(seat.player_id, IntentKind::Disconnect);
            if let Err(e) = handle.submit_detached(intent).await {
                warn!("无法记录玩家 {} 的断线: {}", seat.player_id, e);
            }
        }
        Err(SessionError::NotFound) => debug!("会话 {} 已经结束", seat.session_id),
        Err(e) => warn!("无法记录玩家 {} 的断线: {}", seat.player_id, e),
    }
}
