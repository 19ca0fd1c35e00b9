use std::fmt::Write;

use shedhouse_core::{Direction, GameEvent, GamePhase, GameState, LogEntry, PlayerId};

/// 最近几条动作记录
const RECENT_EVENTS: usize = 5;

/// 把一份状态整理成文本摘要
pub fn render(state: &GameState, me: Option<PlayerId>) -> String {
    let mut out = String::new();
    let phase = match state.phase {
        GamePhase::Lobby => "大厅",
        GamePhase::Playing => "对局中",
        GamePhase::Finished => "已结束",
    };
    let _ = writeln!(out, "=== 会话 {} | {} | 版本 {} ===", state.session_id, phase, state.version);

    for player in &state.players {
        let mut marks = Vec::new();
        if Some(player.id) == me {
            marks.push("你");
        }
        if Some(player.id) == state.owner_id {
            marks.push("房主");
        }
        if !player.connected {
            marks.push("离线");
        }
        if Some(player.id) == state.winner_id {
            marks.push("胜者");
        }
        let turn = if state.current_player_id() == Some(player.id) { "->" } else { "  " };
        let marks = if marks.is_empty() { String::new() } else { format!(" [{}]", marks.join(",")) };
        let _ = writeln!(
            out,
            "{} {}号 {}{}: {} 张牌",
            turn,
            player.seat + 1,
            player.nickname,
            marks,
            player.hand.len()
        );
    }

    if state.phase != GamePhase::Lobby {
        let direction = match state.direction {
            Direction::Clockwise => "顺时针",
            Direction::CounterClockwise => "逆时针",
        };
        let top = state.top_discard().map_or("无".to_string(), |c| c.face.to_string());
        let color = state.current_color.map_or("无".to_string(), |c| c.to_string());
        let _ = writeln!(
            out,
            "弃牌堆顶: {} | 当前颜色: {} | 方向: {} | 摸牌堆: {} 张",
            top,
            color,
            direction,
            state.draw_pile.len()
        );
    }

    if let Some(player) = me.and_then(|id| state.player(&id)) {
        let hand: Vec<String> = player
            .hand
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{}:{}", i + 1, c.face))
            .collect();
        let _ = writeln!(out, "你的手牌: {}", hand.join("  "));
        if let Some(pending) = state.drawn_playable.filter(|p| p.player_id == player.id) {
            if let Some(index) = player.hand.iter().position(|c| c.id == pending.card_id) {
                let _ = writeln!(out, "刚摸到的第 {} 张可以打出，play {} 或 pass", index + 1, index + 1);
            }
        }
    }

    let skip = state.action_log.len().saturating_sub(RECENT_EVENTS);
    for entry in state.action_log.iter().skip(skip) {
        let _ = writeln!(out, "  · {}", describe(state, entry));
    }
    out
}

fn describe(state: &GameState, entry: &LogEntry) -> String {
    let who = entry
        .player_id
        .and_then(|id| state.player(&id))
        .map_or("系统".to_string(), |p| p.nickname.clone());
    match &entry.event {
        GameEvent::Joined { seat } => format!("{} 坐到了 {} 号座位", who, seat + 1),
        GameEvent::Rejoined => format!("{} 重新连接", who),
        GameEvent::Disconnected => format!("{} 断开连接", who),
        GameEvent::Started { starting_card } => format!("{} 开局，起始牌 {}", who, starting_card.face),
        GameEvent::Played { card, chosen_color: Some(color) } => format!("{} 打出 {}，指定 {}", who, card.face, color),
        GameEvent::Played { card, chosen_color: None } => format!("{} 打出 {}", who, card.face),
        GameEvent::Drew => format!("{} 摸了一张牌", who),
        GameEvent::Penalized { count } => format!("{} 被罚摸 {} 张", who, count),
        GameEvent::Passed => format!("{} 过", who),
        GameEvent::Won => format!("{} 出完了所有牌！", who),
        GameEvent::Reset => format!("{} 重开了一局", who),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shedhouse_core::{apply_intent, Intent, IntentKind};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use uuid::Uuid;

    #[test]
    fn test_render_marks_me_owner_and_turn() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut state = GameState::new(Uuid::new_v4());
        for (id, name) in [(a, "alice"), (b, "bob")] {
            let join = Intent::new(id, IntentKind::Join { nickname: name.into(), avatar: None });
            state = apply_intent(&state, &join, &mut rng).unwrap();
        }
        let lobby = render(&state, Some(b));
        assert!(lobby.contains("大厅"));
        assert!(lobby.contains("alice [房主]"));
        assert!(lobby.contains("bob [你]"));

        state = apply_intent(&state, &Intent::new(a, IntentKind::Start), &mut rng).unwrap();
        let playing = render(&state, Some(a));
        assert!(playing.contains("对局中"));
        assert!(playing.contains("你的手牌: 1:"));
        assert!(playing.contains("起始牌"));
        assert_eq!(playing.lines().filter(|l| l.starts_with("->")).count(), 1);
    }
}
