use crate::card::*;
use crate::error::{DeckFault, EngineError, Rejection};
use crate::intent::{Intent, IntentKind};
use crate::state::*;
use chrono::{DateTime, Utc};
use rand::Rng;

/// 起始牌是万能牌时最多重抽的次数，用完后接受抽到的牌
pub const MAX_START_REDRAWS: usize = 10;

// --- 规则引擎入口 ---

/// 对当前状态应用一条指令
///
/// 纯函数：输入状态不会被修改，成功时返回新状态，失败时返回拒绝原因。
/// 唯一的随机性来自调用方提供的 `rng`（开局洗牌、弃牌堆回洗）。
/// 版本号不在这里修改，由权威循环在提交时统一递增。
pub fn apply_intent<R: Rng + ?Sized>(
    state: &GameState,
    intent: &Intent,
    rng: &mut R,
) -> Result<GameState, EngineError> {
    let mut next = state.clone();
    let at = intent.submitted_at;
    let player_id = intent.player_id;

    match &intent.kind {
        IntentKind::Join { nickname, avatar } => {
            join(&mut next, player_id, nickname, avatar.as_deref(), at)?
        }
        IntentKind::Disconnect => disconnect(&mut next, player_id, at)?,
        IntentKind::Start => start_game(&mut next, player_id, at, rng)?,
        IntentKind::Play { card_id, chosen_color } => {
            play_card(&mut next, player_id, *card_id, *chosen_color, at, rng)?
        }
        IntentKind::Draw => draw(&mut next, player_id, at, rng)?,
        IntentKind::Pass => pass(&mut next, player_id, at)?,
        IntentKind::PlayAgain => play_again(&mut next, player_id, at)?,
    }

    Ok(next)
}

/// 某张手牌此刻能否打出（用于提示和"有牌必须出"的检查）
pub fn is_playable(state: &GameState, player_id: &PlayerId, card_id: CardId) -> bool {
    let Some(player) = state.player(player_id) else { return false };
    let Some(card) = player.hand.iter().find(|c| c.id == card_id) else { return false };
    table_top(state)
        .map(|(top, color)| check_playable(&top, color, &player.hand, card).is_ok())
        .unwrap_or(false)
}

// --- 大厅 ---

fn join(
    state: &mut GameState,
    player_id: PlayerId,
    nickname: &str,
    avatar: Option<&str>,
    at: DateTime<Utc>,
) -> Result<(), EngineError> {
    // 已经有座位的玩家重新加入：只刷新资料和连接状态，任何阶段都允许
    if let Some(player) = state.player_mut(&player_id) {
        let was_connected = player.connected;
        player.nickname = nickname.to_string();
        player.avatar = avatar.map(str::to_string);
        player.connected = true;
        if !was_connected {
            state.log(at, Some(player_id), GameEvent::Rejoined);
        }
        return Ok(());
    }

    if state.phase != GamePhase::Lobby {
        return Err(Rejection::GameInProgress.into());
    }
    if state.players.len() >= MAX_SEATS {
        return Err(Rejection::SessionFull.into());
    }

    let seat = state.players.len();
    state.players.push(Player {
        id: player_id,
        seat,
        nickname: nickname.to_string(),
        avatar: avatar.map(str::to_string),
        connected: true,
        hand: Vec::new(),
    });
    state.owner_id.get_or_insert(player_id);
    state.log(at, Some(player_id), GameEvent::Joined { seat });
    Ok(())
}

/// 只标记离线，不移除座位，也不影响牌局
fn disconnect(state: &mut GameState, player_id: PlayerId, at: DateTime<Utc>) -> Result<(), EngineError> {
    let player = state.player_mut(&player_id).ok_or(Rejection::UnknownPlayer)?;
    if player.connected {
        player.connected = false;
        state.log(at, Some(player_id), GameEvent::Disconnected);
    }
    Ok(())
}

/// 开始新的一局
///
/// - 洗一副新牌，每个座位发 7 张。
/// - 翻起始牌：万能牌放回去重洗再翻，最多 MAX_START_REDRAWS 次。
/// - 起始牌的效果视为庄家打出的：数字牌从庄家下家开始，禁牌跳过下家，
///   反转改变方向（两人时仍由庄家先出），+2 让下家罚抽并跳过。
fn start_game<R: Rng + ?Sized>(
    state: &mut GameState,
    player_id: PlayerId,
    at: DateTime<Utc>,
    rng: &mut R,
) -> Result<(), EngineError> {
    require_phase(state, GamePhase::Lobby)?;
    require_owner(state, player_id)?;
    if state.players.len() < MIN_PLAYERS {
        return Err(Rejection::NotEnoughPlayers { seated: state.players.len(), required: MIN_PLAYERS }.into());
    }

    let mut deck = shuffled_deck(rng);
    for player in state.players.iter_mut() {
        player.hand.clear();
    }
    for _ in 0..HAND_SIZE {
        for player in state.players.iter_mut() {
            player.hand.push(deck.pop().ok_or(DeckFault::Exhausted)?);
        }
    }
    state.draw_pile = deck;
    state.discard_pile.clear();
    turn_starter(state, at, rng)
}

/// 从摸牌堆顶翻起始牌并结算它的效果，庄家视为出牌者
fn turn_starter<R: Rng + ?Sized>(state: &mut GameState, at: DateTime<Utc>, rng: &mut R) -> Result<(), EngineError> {
    let mut starter = state.draw_pile.pop().ok_or(DeckFault::Exhausted)?;
    let mut redraws = 0;
    while starter.face.is_wild() && redraws < MAX_START_REDRAWS {
        state.draw_pile.push(starter);
        shuffle(&mut state.draw_pile, rng);
        starter = state.draw_pile.pop().ok_or(DeckFault::Exhausted)?;
        redraws += 1;
    }
    state.discard_pile.push(starter);

    state.phase = GamePhase::Playing;
    state.direction = Direction::Clockwise;
    state.dealer_index %= state.players.len();
    state.current_player_index = state.dealer_index;
    state.drawn_playable = None;
    state.winner_id = None;
    // 重抽次数用完仍是万能牌时，随机定一个颜色，按普通变色牌处理
    state.current_color = Some(
        starter
            .face
            .color()
            .unwrap_or_else(|| Color::ALL[rng.random_range(0..Color::ALL.len())]),
    );
    state.log(at, None, GameEvent::Started { starting_card: starter });

    let effect = if starter.face.is_wild() { Face::Wild } else { starter.face };
    apply_effect(state, effect, at, rng)?;
    Ok(())
}

/// 一局结束后由房主发起，回到大厅，保留座位，庄家顺延一位
fn play_again(state: &mut GameState, player_id: PlayerId, at: DateTime<Utc>) -> Result<(), EngineError> {
    require_phase(state, GamePhase::Finished)?;
    require_owner(state, player_id)?;

    for player in state.players.iter_mut() {
        player.hand.clear();
    }
    state.draw_pile.clear();
    state.discard_pile.clear();
    state.current_color = None;
    state.winner_id = None;
    state.drawn_playable = None;
    state.direction = Direction::Clockwise;
    state.dealer_index = (state.dealer_index + 1) % state.players.len().max(1);
    state.current_player_index = state.dealer_index;
    state.phase = GamePhase::Lobby;
    state.log(at, Some(player_id), GameEvent::Reset);
    Ok(())
}

// --- 牌局内的动作 ---

/// 出牌
///
/// 所有检查都在修改状态之前完成。之后依次：手牌移除、放上弃牌堆、设置颜色、
/// 清除摸牌决定、记日志，再结算这张牌的效果。手牌打空时立即结束，不再结算效果。
fn play_card<R: Rng + ?Sized>(
    state: &mut GameState,
    player_id: PlayerId,
    card_id: CardId,
    chosen_color: Option<Color>,
    at: DateTime<Utc>,
    rng: &mut R,
) -> Result<(), EngineError> {
    let seat = require_turn(state, player_id)?;

    if let Some(pending) = state.drawn_playable {
        if pending.player_id == player_id && pending.card_id != card_id {
            return Err(Rejection::MustPlayDrawnCard { card_id: pending.card_id }.into());
        }
    }

    let hand = &state.players[seat].hand;
    let pos = hand
        .iter()
        .position(|c| c.id == card_id)
        .ok_or(Rejection::CardNotInHand { card_id })?;
    let card = hand[pos];

    let (top, color) = table_top(state)?;
    check_playable(&top, color, hand, &card)?;

    let new_color = match (card.face.color(), chosen_color) {
        (Some(own), _) => own,
        (None, Some(chosen)) => chosen,
        (None, None) => return Err(Rejection::ColorChoiceRequired.into()),
    };

    state.players[seat].hand.remove(pos);
    state.discard_pile.push(card);
    state.current_color = Some(new_color);
    state.drawn_playable = None;
    state.log(at, Some(player_id), GameEvent::Played {
        card,
        chosen_color: card.face.is_wild().then_some(new_color),
    });

    if state.players[seat].hand.is_empty() {
        state.phase = GamePhase::Finished;
        state.winner_id = Some(player_id);
        state.log(at, Some(player_id), GameEvent::Won);
        return Ok(());
    }

    apply_effect(state, card.face, at, rng)?;
    Ok(())
}

/// 摸一张牌
///
/// 手里有能出的牌时不允许摸牌。摸到能出的牌时挂起一个决定，回合不前进；
/// 摸到不能出的牌时回合前进一位。
fn draw<R: Rng + ?Sized>(
    state: &mut GameState,
    player_id: PlayerId,
    at: DateTime<Utc>,
    rng: &mut R,
) -> Result<(), EngineError> {
    let seat = require_turn(state, player_id)?;
    if state.drawn_playable.is_some() {
        return Err(Rejection::DecisionPending.into());
    }

    let (top, color) = table_top(state)?;
    let hand = &state.players[seat].hand;
    if hand.iter().any(|c| check_playable(&top, color, hand, c).is_ok()) {
        return Err(Rejection::HasPlayableCard.into());
    }

    let card = draw_card(state, rng)?;
    state.players[seat].hand.push(card);
    state.log(at, Some(player_id), GameEvent::Drew);

    let hand = &state.players[seat].hand;
    if check_playable(&top, color, hand, &card).is_ok() {
        state.drawn_playable = Some(DrawnPlayable { player_id, card_id: card.id });
    } else {
        advance(state, 1);
    }
    Ok(())
}

/// 摸到能出的牌后选择不出
fn pass(state: &mut GameState, player_id: PlayerId, at: DateTime<Utc>) -> Result<(), EngineError> {
    require_turn(state, player_id)?;
    match state.drawn_playable {
        Some(pending) if pending.player_id == player_id => {
            state.drawn_playable = None;
            state.log(at, Some(player_id), GameEvent::Passed);
            advance(state, 1);
            Ok(())
        }
        _ => Err(Rejection::NothingToPass.into()),
    }
}

// --- 辅助逻辑函数 ---

/// 结算一张牌的效果，推进回合
fn apply_effect<R: Rng + ?Sized>(
    state: &mut GameState,
    face: Face,
    at: DateTime<Utc>,
    rng: &mut R,
) -> Result<(), DeckFault> {
    match face {
        Face::Numeral { .. } | Face::Wild => advance(state, 1),
        Face::Skip { .. } => advance(state, 2),
        Face::Reverse { .. } => {
            state.direction = state.direction.flipped();
            // 两人时反转等同于禁牌：座位不动，出牌者接着出
            if state.players.len() != 2 {
                advance(state, 1);
            }
        }
        Face::DrawTwo { .. } | Face::WildDrawFour => {
            let victim = state.seat_after(state.current_player_index, 1);
            penalize(state, victim, face.penalty(), at, rng)?;
            advance(state, 2);
        }
    }
    Ok(())
}

fn advance(state: &mut GameState, steps: usize) {
    state.current_player_index = state.seat_after(state.current_player_index, steps);
}

/// 罚抽
fn penalize<R: Rng + ?Sized>(
    state: &mut GameState,
    seat: usize,
    count: usize,
    at: DateTime<Utc>,
    rng: &mut R,
) -> Result<(), DeckFault> {
    for _ in 0..count {
        let card = draw_card(state, rng)?;
        state.players[seat].hand.push(card);
    }
    let victim = state.players[seat].id;
    state.log(at, Some(victim), GameEvent::Penalized { count });
    Ok(())
}

/// 从摸牌堆顶取一张。摸牌堆空了就用弃牌堆回洗，两边都没有牌时报错而不是造牌。
fn draw_card<R: Rng + ?Sized>(state: &mut GameState, rng: &mut R) -> Result<Card, DeckFault> {
    if state.draw_pile.is_empty() && state.discard_pile.len() > 1 {
        refill_draw_pile(state, rng);
    }
    state.draw_pile.pop().ok_or(DeckFault::Exhausted)
}

/// 保留弃牌堆顶那张，其余洗匀作为新的摸牌堆
fn refill_draw_pile<R: Rng + ?Sized>(state: &mut GameState, rng: &mut R) {
    let Some(top) = state.discard_pile.pop() else { return };
    state.draw_pile.append(&mut state.discard_pile);
    shuffle(&mut state.draw_pile, rng);
    state.discard_pile.push(top);
}

/// 能否跟在 `top` 之上打出 `card`，`hand` 用于 +4 的颜色检查
fn check_playable(top: &Face, color: Color, hand: &[Card], card: &Card) -> Result<(), Rejection> {
    if !card.face.matches(top, color) {
        return Err(Rejection::CardDoesNotMatch { card_id: card.id });
    }
    if card.face == Face::WildDrawFour && hand.iter().any(|c| c.face.color() == Some(color)) {
        return Err(Rejection::WildDrawFourNotAllowed);
    }
    Ok(())
}

/// 弃牌堆顶的牌面和当前颜色，牌局进行中两者必须都存在
fn table_top(state: &GameState) -> Result<(Face, Color), DeckFault> {
    match (state.top_discard(), state.current_color) {
        (Some(top), Some(color)) => Ok((top.face, color)),
        _ => Err(DeckFault::EmptyDiscard),
    }
}

fn require_phase(state: &GameState, phase: GamePhase) -> Result<(), Rejection> {
    if state.phase != phase {
        return Err(Rejection::WrongPhase { phase: state.phase });
    }
    Ok(())
}

fn require_owner(state: &GameState, player_id: PlayerId) -> Result<(), Rejection> {
    if state.owner_id != Some(player_id) {
        return Err(Rejection::NotOwner);
    }
    Ok(())
}

/// 必须是 Playing 阶段且轮到该玩家，返回其座位号
fn require_turn(state: &GameState, player_id: PlayerId) -> Result<usize, Rejection> {
    require_phase(state, GamePhase::Playing)?;
    let seat = state.seat_of(&player_id).ok_or(Rejection::UnknownPlayer)?;
    if seat != state.current_player_index {
        return Err(Rejection::NotYourTurn);
    }
    Ok(seat)
}

// --- 单元测试 ---

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use uuid::Uuid;
    use Color::*;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(42)
    }

    fn apply(state: &GameState, player_id: PlayerId, kind: IntentKind) -> Result<GameState, EngineError> {
        apply_intent(state, &Intent::new(player_id, kind), &mut rng())
    }

    fn rejected(state: &GameState, player_id: PlayerId, kind: IntentKind) -> Rejection {
        match apply(state, player_id, kind) {
            Err(EngineError::Rejected(r)) => r,
            other => panic!("期望被拒绝，实际为 {:?}", other),
        }
    }

    // 辅助函数：通过 Join 指令创建一个有 n 名玩家的大厅
    fn setup_lobby(n: usize) -> (GameState, Vec<PlayerId>) {
        let mut state = GameState::new(Uuid::new_v4());
        let mut ids = Vec::new();
        for i in 0..n {
            let id = Uuid::new_v4();
            let kind = IntentKind::Join { nickname: format!("Player_{}", i), avatar: None };
            state = apply(&state, id, kind).unwrap();
            ids.push(id);
        }
        (state, ids)
    }

    fn take(pool: &mut Vec<Card>, face: Face) -> Card {
        let pos = pool.iter().position(|c| c.face == face).expect("牌面已经用完");
        pool.remove(pos)
    }

    // 辅助函数：构造一个指定手牌和顶牌的牌局，其余的牌都在摸牌堆里，轮到座位 0
    fn rigged(hands: &[&[Face]], top: Face, color: Color) -> (GameState, Vec<PlayerId>) {
        let (mut state, ids) = setup_lobby(hands.len());
        let mut pool = full_deck();
        for (seat, faces) in hands.iter().enumerate() {
            state.players[seat].hand = faces.iter().map(|f| take(&mut pool, *f)).collect();
        }
        state.discard_pile = vec![take(&mut pool, top)];
        state.draw_pile = pool;
        state.current_color = Some(color);
        state.phase = GamePhase::Playing;
        state.current_player_index = 0;
        assert!(state.cards_conserved());
        (state, ids)
    }

    fn put_on_draw_top(state: &mut GameState, face: Face) {
        let card = take(&mut state.draw_pile, face);
        state.draw_pile.push(card);
    }

    fn card_id(state: &GameState, seat: usize, face: Face) -> CardId {
        state.players[seat].hand.iter().find(|c| c.face == face).unwrap().id
    }

    fn num(color: Color, value: u8) -> Face {
        Face::Numeral { color, value }
    }

    // --- 大厅 ---

    #[test]
    fn test_join_assigns_dense_seats_and_owner() {
        let (state, ids) = setup_lobby(3);
        assert_eq!(state.players.len(), 3);
        for (i, p) in state.players.iter().enumerate() {
            assert_eq!(p.seat, i);
            assert_eq!(p.id, ids[i]);
        }
        assert_eq!(state.owner_id, Some(ids[0]));
    }

    #[test]
    fn test_rejoin_refreshes_instead_of_duplicating() {
        let (state, ids) = setup_lobby(2);
        let state = apply(&state, ids[1], IntentKind::Disconnect).unwrap();
        assert!(!state.players[1].connected);

        let kind = IntentKind::Join { nickname: "新名字".into(), avatar: Some("cat".into()) };
        let state = apply(&state, ids[1], kind).unwrap();
        assert_eq!(state.players.len(), 2);
        assert!(state.players[1].connected);
        assert_eq!(state.players[1].nickname, "新名字");
        assert_eq!(state.players[1].avatar.as_deref(), Some("cat"));
    }

    #[test]
    fn test_seat_limit() {
        let (state, _) = setup_lobby(MAX_SEATS);
        let kind = IntentKind::Join { nickname: "late".into(), avatar: None };
        assert_eq!(rejected(&state, Uuid::new_v4(), kind), Rejection::SessionFull);
    }

    #[test]
    fn test_disconnect_keeps_seat_during_play() {
        let (state, ids) = rigged(&[&[num(Red, 1)], &[num(Blue, 2)]], num(Red, 5), Red);
        let next = apply(&state, ids[1], IntentKind::Disconnect).unwrap();
        assert!(!next.players[1].connected);
        assert_eq!(next.players[1].hand, state.players[1].hand);
        assert_eq!(next.current_player_index, state.current_player_index);
        assert_eq!(rejected(&state, Uuid::new_v4(), IntentKind::Disconnect), Rejection::UnknownPlayer);
    }

    #[test]
    fn test_new_seat_rejected_while_playing_but_rejoin_allowed() {
        let (state, ids) = rigged(&[&[num(Red, 1)], &[num(Blue, 2)]], num(Red, 5), Red);
        let kind = IntentKind::Join { nickname: "late".into(), avatar: None };
        assert_eq!(rejected(&state, Uuid::new_v4(), kind.clone()), Rejection::GameInProgress);
        assert!(apply(&state, ids[1], kind).is_ok());
    }

    // --- 开局 ---

    #[test]
    fn test_start_requires_owner_and_two_players() {
        let (state, ids) = setup_lobby(1);
        assert_eq!(
            rejected(&state, ids[0], IntentKind::Start),
            Rejection::NotEnoughPlayers { seated: 1, required: 2 }
        );
        let (state, ids) = setup_lobby(3);
        assert_eq!(rejected(&state, ids[1], IntentKind::Start), Rejection::NotOwner);
    }

    #[test]
    fn test_start_deals_and_turns_a_non_wild_starter() {
        for seed in 0..20 {
            let (state, ids) = setup_lobby(4);
            let started = apply_intent(
                &state,
                &Intent::new(ids[0], IntentKind::Start),
                &mut ChaCha8Rng::seed_from_u64(seed),
            )
            .unwrap();
            assert_eq!(started.phase, GamePhase::Playing);
            assert!(started.cards_conserved());
            assert_eq!(started.discard_pile.len(), 1);
            let starter = started.discard_pile[0];
            assert!(!starter.face.is_wild());
            assert_eq!(started.current_color, starter.face.color());

            // 罚抽的玩家多 2 张，其余都是 7 张
            let penalty = starter.face.penalty();
            let total: usize = started.players.iter().map(|p| p.hand.len()).sum();
            assert_eq!(total, 4 * HAND_SIZE + penalty);
            assert_eq!(started.draw_pile.len(), 108 - 4 * HAND_SIZE - 1 - penalty);

            let expected = match starter.face {
                Face::Numeral { .. } => 1,
                Face::Skip { .. } | Face::DrawTwo { .. } => 2,
                Face::Reverse { .. } => 3, // 反方向走一位
                Face::Wild | Face::WildDrawFour => unreachable!(),
            };
            assert_eq!(started.current_player_index, expected, "seed {}", seed);
        }
    }

    // 辅助函数：每人发好 7 张，`on_top` 的最后一张在摸牌堆顶，庄家是座位 0
    fn dealt(n: usize, on_top: &[Face]) -> (GameState, Vec<PlayerId>) {
        let (mut state, ids) = setup_lobby(n);
        let mut pool = full_deck();
        let stacked: Vec<Card> = on_top.iter().map(|f| take(&mut pool, *f)).collect();
        for player in state.players.iter_mut() {
            player.hand = pool.split_off(pool.len() - HAND_SIZE);
        }
        pool.extend(stacked);
        state.draw_pile = pool;
        (state, ids)
    }

    fn turned(mut state: GameState) -> GameState {
        turn_starter(&mut state, Utc::now(), &mut rng()).unwrap();
        state
    }

    #[test]
    fn test_starter_effects_follow_the_dealer() {
        let started = turned(dealt(4, &[num(Green, 7)]).0);
        assert_eq!(started.current_player_index, 1);
        assert_eq!(started.current_color, Some(Green));
        assert!(started.cards_conserved());

        let started = turned(dealt(4, &[Face::Skip { color: Red }]).0);
        assert_eq!(started.current_player_index, 2);

        let started = turned(dealt(4, &[Face::Reverse { color: Blue }]).0);
        assert_eq!(started.direction, Direction::CounterClockwise);
        assert_eq!(started.current_player_index, 3);

        let started = turned(dealt(3, &[Face::Reverse { color: Blue }]).0);
        assert_eq!(started.current_player_index, 2);
    }

    #[test]
    fn test_two_player_reverse_starter_keeps_dealer_on_turn() {
        let (state, ids) = dealt(2, &[Face::Reverse { color: Yellow }]);
        let started = turned(state);
        assert_eq!(started.direction, Direction::CounterClockwise);
        assert_eq!(started.current_player_index, 0);
        assert_eq!(started.current_player_id(), Some(ids[0]));
    }

    #[test]
    fn test_draw_two_starter_penalizes_next_seat() {
        let started = turned(dealt(4, &[Face::DrawTwo { color: Red }]).0);
        assert_eq!(started.players[1].hand.len(), HAND_SIZE + 2);
        assert_eq!(started.players[2].hand.len(), HAND_SIZE);
        assert_eq!(started.current_player_index, 2);
        assert_eq!(started.draw_pile.len(), 108 - 4 * HAND_SIZE - 1 - 2);
        assert!(started.cards_conserved());
    }

    #[test]
    fn test_wild_starter_is_put_back_and_redrawn() {
        let started = turned(dealt(3, &[Face::WildDrawFour]).0);
        let starter = started.discard_pile[0];
        assert!(!starter.face.is_wild());
        assert_eq!(started.current_color, starter.face.color());
        // 被放回去的 +4 仍在摸牌堆里，没有人被罚抽
        assert!(started.draw_pile.iter().any(|c| c.face == Face::WildDrawFour));
        assert!(started.cards_conserved());
    }

    #[test]
    fn test_redraw_cap_accepts_a_wild_as_plain_wild() {
        let (mut state, _) = setup_lobby(3);
        let mut pool = full_deck();
        for (seat, player) in state.players.iter_mut().enumerate() {
            player.hand = vec![take(&mut pool, num(Red, seat as u8 + 1))];
        }
        // 摸牌堆里只有万能牌，重抽多少次都还是万能牌
        state.draw_pile = pool.into_iter().filter(|c| c.face.is_wild()).collect();
        assert_eq!(state.draw_pile.len(), 8);

        let started = turned(state);
        assert!(started.discard_pile[0].face.is_wild());
        assert!(started.current_color.is_some());
        // 按普通变色牌处理：下家出牌，+4 也不罚抽
        assert_eq!(started.current_player_index, 1);
        assert!(started.players.iter().all(|p| p.hand.len() == 1));
        assert_eq!(started.draw_pile.len(), 7);
    }

    // --- 出牌 ---

    #[test]
    fn test_play_numeral_advances_one_and_sets_color() {
        let (state, ids) = rigged(&[&[num(Blue, 5), num(Red, 1)], &[num(Green, 2)], &[num(Green, 3)]], num(Red, 5), Red);
        let id = card_id(&state, 0, num(Blue, 5));
        let next = apply(&state, ids[0], IntentKind::play(id)).unwrap();
        assert_eq!(next.current_player_index, 1);
        assert_eq!(next.current_color, Some(Blue));
        assert_eq!(next.top_discard().map(|c| c.id), Some(id));
        assert!(next.cards_conserved());
    }

    #[test]
    fn test_illegal_plays_leave_state_untouched() {
        let (state, ids) = rigged(&[&[num(Blue, 6), num(Red, 1)], &[num(Red, 2)]], num(Red, 5), Red);
        let blue6 = card_id(&state, 0, num(Blue, 6));
        let red2 = card_id(&state, 1, num(Red, 2));

        assert_eq!(rejected(&state, ids[1], IntentKind::play(red2)), Rejection::NotYourTurn);
        assert_eq!(rejected(&state, ids[0], IntentKind::play(red2)), Rejection::CardNotInHand { card_id: red2 });
        assert_eq!(rejected(&state, ids[0], IntentKind::play(blue6)), Rejection::CardDoesNotMatch { card_id: blue6 });
        assert_eq!(rejected(&state, Uuid::new_v4(), IntentKind::Draw), Rejection::UnknownPlayer);
    }

    #[test]
    fn test_skip_advances_two() {
        let (state, ids) = rigged(&[&[Face::Skip { color: Red }, num(Red, 1)], &[num(Red, 2)], &[num(Red, 3)]], num(Red, 5), Red);
        let id = card_id(&state, 0, Face::Skip { color: Red });
        let next = apply(&state, ids[0], IntentKind::play(id)).unwrap();
        assert_eq!(next.current_player_index, 2);
    }

    #[test]
    fn test_reverse_with_three_players_turns_back() {
        let (state, ids) = rigged(&[&[Face::Reverse { color: Red }, num(Red, 1)], &[num(Red, 2)], &[num(Red, 3)]], num(Red, 5), Red);
        let id = card_id(&state, 0, Face::Reverse { color: Red });
        let next = apply(&state, ids[0], IntentKind::play(id)).unwrap();
        assert_eq!(next.direction, Direction::CounterClockwise);
        assert_eq!(next.current_player_index, 2);
    }

    #[test]
    fn test_reverse_with_two_players_keeps_turn() {
        let (state, ids) = rigged(&[&[Face::Reverse { color: Red }, num(Red, 1)], &[num(Red, 2)]], num(Red, 5), Red);
        let id = card_id(&state, 0, Face::Reverse { color: Red });
        let next = apply(&state, ids[0], IntentKind::play(id)).unwrap();
        assert_eq!(next.direction, Direction::CounterClockwise);
        assert_eq!(next.current_player_index, 0);
        assert_eq!(next.current_player_id(), Some(ids[0]));
    }

    #[test]
    fn test_draw_two_penalizes_and_skips_next() {
        let (state, ids) = rigged(&[&[Face::DrawTwo { color: Red }, num(Red, 1)], &[num(Red, 2)], &[num(Red, 3)]], num(Red, 5), Red);
        let id = card_id(&state, 0, Face::DrawTwo { color: Red });
        let next = apply(&state, ids[0], IntentKind::play(id)).unwrap();
        assert_eq!(next.players[1].hand.len(), 3);
        assert_eq!(next.current_player_index, 2);
        assert!(next.cards_conserved());
    }

    #[test]
    fn test_draw_two_follows_current_direction() {
        let (mut state, ids) = rigged(&[&[Face::DrawTwo { color: Red }, num(Red, 1)], &[num(Red, 2)], &[num(Red, 3)]], num(Red, 5), Red);
        state.direction = Direction::CounterClockwise;
        let id = card_id(&state, 0, Face::DrawTwo { color: Red });
        let next = apply(&state, ids[0], IntentKind::play(id)).unwrap();
        assert_eq!(next.players[2].hand.len(), 3);
        assert_eq!(next.players[1].hand.len(), 1);
        assert_eq!(next.current_player_index, 1);
    }

    #[test]
    fn test_wild_requires_color_choice() {
        let (state, ids) = rigged(&[&[Face::Wild, num(Red, 1)], &[num(Red, 2)]], num(Red, 5), Red);
        let id = card_id(&state, 0, Face::Wild);
        assert_eq!(rejected(&state, ids[0], IntentKind::play(id)), Rejection::ColorChoiceRequired);

        let next = apply(&state, ids[0], IntentKind::play_wild(id, Green)).unwrap();
        assert_eq!(next.current_color, Some(Green));
        assert_eq!(next.current_player_index, 1);
    }

    #[test]
    fn test_wild_draw_four_only_without_current_color() {
        let (state, ids) = rigged(&[&[Face::WildDrawFour, num(Red, 1)], &[num(Red, 2)], &[num(Red, 3)]], num(Red, 5), Red);
        let id = card_id(&state, 0, Face::WildDrawFour);
        assert_eq!(
            rejected(&state, ids[0], IntentKind::play_wild(id, Blue)),
            Rejection::WildDrawFourNotAllowed
        );

        // 手里只有非当前颜色的牌时可以出
        let (state, ids) = rigged(&[&[Face::WildDrawFour, num(Blue, 1)], &[num(Red, 2)], &[num(Red, 3)]], num(Red, 5), Red);
        let id = card_id(&state, 0, Face::WildDrawFour);
        let next = apply(&state, ids[0], IntentKind::play_wild(id, Blue)).unwrap();
        assert_eq!(next.players[1].hand.len(), 5);
        assert_eq!(next.current_player_index, 2);
        assert_eq!(next.current_color, Some(Blue));
    }

    #[test]
    fn test_last_card_wins_without_effect() {
        let (state, ids) = rigged(&[&[Face::DrawTwo { color: Red }], &[num(Red, 2)]], num(Red, 5), Red);
        let id = card_id(&state, 0, Face::DrawTwo { color: Red });
        let next = apply(&state, ids[0], IntentKind::play(id)).unwrap();
        assert_eq!(next.phase, GamePhase::Finished);
        assert_eq!(next.winner_id, Some(ids[0]));
        assert_eq!(next.players[1].hand.len(), 1, "胜利后不再结算 +2");
        assert!(next.cards_conserved());
    }

    // --- 摸牌与放弃 ---

    #[test]
    fn test_cannot_draw_with_playable_card() {
        let (state, ids) = rigged(&[&[num(Red, 1)], &[num(Red, 2)]], num(Red, 5), Red);
        assert_eq!(rejected(&state, ids[0], IntentKind::Draw), Rejection::HasPlayableCard);
    }

    #[test]
    fn test_draw_unplayable_advances() {
        let (mut state, ids) = rigged(&[&[num(Blue, 1)], &[num(Red, 2)]], num(Red, 5), Red);
        put_on_draw_top(&mut state, num(Green, 7));
        let next = apply(&state, ids[0], IntentKind::Draw).unwrap();
        assert_eq!(next.players[0].hand.len(), 2);
        assert_eq!(next.drawn_playable, None);
        assert_eq!(next.current_player_index, 1);
    }

    #[test]
    fn test_draw_playable_then_pass_or_play() {
        let (mut state, ids) = rigged(&[&[num(Blue, 1)], &[num(Red, 2)]], num(Red, 5), Red);
        put_on_draw_top(&mut state, num(Red, 7));
        let drawn = state.draw_pile.last().unwrap().id;

        let pending = apply(&state, ids[0], IntentKind::Draw).unwrap();
        assert_eq!(pending.drawn_playable, Some(DrawnPlayable { player_id: ids[0], card_id: drawn }));
        assert_eq!(pending.current_player_index, 0);
        assert_eq!(rejected(&pending, ids[0], IntentKind::Draw), Rejection::DecisionPending);

        // 只能打出刚摸到的那张
        let blue1 = card_id(&pending, 0, num(Blue, 1));
        assert_eq!(
            rejected(&pending, ids[0], IntentKind::play(blue1)),
            Rejection::MustPlayDrawnCard { card_id: drawn }
        );

        let passed = apply(&pending, ids[0], IntentKind::Pass).unwrap();
        assert_eq!(passed.drawn_playable, None);
        assert_eq!(passed.current_player_index, 1);

        let played = apply(&pending, ids[0], IntentKind::play(drawn)).unwrap();
        assert_eq!(played.drawn_playable, None);
        assert_eq!(played.current_player_index, 1);
        assert_eq!(played.players[0].hand.len(), 1);
    }

    #[test]
    fn test_pass_requires_pending_decision() {
        let (state, ids) = rigged(&[&[num(Blue, 1)], &[num(Red, 2)]], num(Red, 5), Red);
        assert_eq!(rejected(&state, ids[0], IntentKind::Pass), Rejection::NothingToPass);
    }

    #[test]
    fn test_refill_keeps_top_discard() {
        let (mut state, ids) = rigged(&[&[num(Blue, 1)], &[num(Red, 2)]], num(Red, 5), Red);
        // 把摸牌堆全部挪到弃牌堆下面，顶牌不变
        let top = state.discard_pile.pop().unwrap();
        state.discard_pile.append(&mut state.draw_pile);
        state.discard_pile.push(top);
        let before = state.discard_pile.len();

        let next = apply(&state, ids[0], IntentKind::Draw).unwrap();
        assert_eq!(next.discard_pile, vec![top]);
        assert_eq!(next.draw_pile.len(), before - 2);
        assert!(next.cards_conserved());
    }

    #[test]
    fn test_exhausted_piles_fault() {
        let (mut state, ids) = rigged(&[&[num(Blue, 1)], &[num(Red, 2)]], num(Red, 5), Red);
        // 把剩下的牌都塞进玩家 1 手里，摸牌堆和弃牌堆（除顶牌）都为空
        let rest: Vec<Card> = state.draw_pile.drain(..).collect();
        state.players[1].hand.extend(rest);
        match apply(&state, ids[0], IntentKind::Draw) {
            Err(EngineError::Fault(DeckFault::Exhausted)) => {}
            other => panic!("期望牌堆错误，实际为 {:?}", other),
        }
    }

    // --- 再来一局 ---

    #[test]
    fn test_play_again_resets_to_lobby() {
        let (state, ids) = rigged(&[&[num(Red, 1)], &[num(Red, 2)], &[num(Red, 3)]], num(Red, 5), Red);
        let id = card_id(&state, 0, num(Red, 1));
        let finished = apply(&state, ids[0], IntentKind::play(id)).unwrap();
        assert_eq!(finished.phase, GamePhase::Finished);

        assert_eq!(rejected(&state, ids[0], IntentKind::PlayAgain), Rejection::WrongPhase { phase: GamePhase::Playing });
        assert_eq!(rejected(&finished, ids[1], IntentKind::PlayAgain), Rejection::NotOwner);

        let lobby = apply(&finished, ids[0], IntentKind::PlayAgain).unwrap();
        assert_eq!(lobby.phase, GamePhase::Lobby);
        assert_eq!(lobby.players.len(), 3);
        assert!(lobby.players.iter().all(|p| p.hand.is_empty()));
        assert!(lobby.draw_pile.is_empty() && lobby.discard_pile.is_empty());
        assert_eq!(lobby.current_color, None);
        assert_eq!(lobby.winner_id, None);
        assert_eq!(lobby.dealer_index, 1);
        assert!(lobby.cards_conserved());
    }

    #[test]
    fn test_is_playable_hint() {
        let (state, ids) = rigged(&[&[num(Red, 1), num(Blue, 2)], &[num(Red, 2)]], num(Red, 5), Red);
        assert!(is_playable(&state, &ids[0], card_id(&state, 0, num(Red, 1))));
        assert!(!is_playable(&state, &ids[0], card_id(&state, 0, num(Blue, 2))));
    }
}
