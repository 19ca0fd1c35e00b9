use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// --- 扑克牌数据结构 ---

/// 花色 (Suit)
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize, Deserialize)]
pub enum Suit {
    Spade,   // 黑桃 ♠️
    Heart,   // 红心 ♥️
    Club,    // 梅花 ♣️
    Diamond, // 方块 ♦️
}

/// 点数 (Rank)
/// Ord 的派生让 Ace 默认是最大的，A-2-3-4-5 顺子单独处理
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize, Deserialize)]
pub enum Rank {
    Two = 2,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    Ten,
    Jack,
    Queen,
    King,
    Ace,
}

impl Rank {
    /// 2..=14，正好放进 4 个比特
    pub fn value(self) -> u32 {
        self as u32
    }
}

/// 单张扑克牌
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize, Deserialize)]
pub struct PokerCard {
    pub rank: Rank,
    pub suit: Suit,
}

impl PokerCard {
    pub fn new(rank: Rank, suit: Suit) -> PokerCard {
        PokerCard { rank, suit }
    }
}

/// 牌型类别，判别值越大牌型越大
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize, Deserialize)]
pub enum HandCategory {
    HighCard = 0,
    OnePair,
    TwoPair,
    ThreeOfAKind,
    Straight,
    Flush,
    FullHouse,
    FourOfAKind,
    StraightFlush,
    RoyalFlush,
}

impl HandCategory {
    pub fn name(self) -> &'static str {
        match self {
            HandCategory::HighCard => "High Card",
            HandCategory::OnePair => "One Pair",
            HandCategory::TwoPair => "Two Pair",
            HandCategory::ThreeOfAKind => "Three of a Kind",
            HandCategory::Straight => "Straight",
            HandCategory::Flush => "Flush",
            HandCategory::FullHouse => "Full House",
            HandCategory::FourOfAKind => "Four of a Kind",
            HandCategory::StraightFlush => "Straight Flush",
            HandCategory::RoyalFlush => "Royal Flush",
        }
    }
}

/// 牌力分数
/// 高位是牌型类别，之后依次是 5 个 4 比特的比较位（点数、踢脚牌）。
/// 任意两个分数都可以直接比较，分数相等即平分底池。
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandScore(pub u32);

impl HandScore {
    fn pack(category: HandCategory, tiebreakers: &[Rank]) -> HandScore {
        debug_assert!(tiebreakers.len() <= 5);
        let mut score = (category as u32) << 20;
        for (i, rank) in tiebreakers.iter().enumerate() {
            score |= rank.value() << (16 - 4 * i as u32);
        }
        HandScore(score)
    }

    pub fn category(self) -> HandCategory {
        match self.0 >> 20 {
            0 => HandCategory::HighCard,
            1 => HandCategory::OnePair,
            2 => HandCategory::TwoPair,
            3 => HandCategory::ThreeOfAKind,
            4 => HandCategory::Straight,
            5 => HandCategory::Flush,
            6 => HandCategory::FullHouse,
            7 => HandCategory::FourOfAKind,
            8 => HandCategory::StraightFlush,
            _ => HandCategory::RoyalFlush,
        }
    }
}

/// 一次评估的结果：牌型、组成牌型的 5 张牌、分数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub category: HandCategory,
    pub best_five: [PokerCard; 5],
    pub score: HandScore,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    #[error("牌数必须在5到7张之间，实际为 {0}")]
    CardCount(usize),
    #[error("重复的牌: {0}")]
    DuplicateCard(PokerCard),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("无法解析的扑克牌: {0}")]
pub struct ParseCardError(pub String);

// --- 实现辅助功能 ---

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", match self {
            Suit::Spade => "s",
            Suit::Heart => "h",
            Suit::Club => "c",
            Suit::Diamond => "d",
        })
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", match self {
            Rank::Two => "2",
            Rank::Three => "3",
            Rank::Four => "4",
            Rank::Five => "5",
            Rank::Six => "6",
            Rank::Seven => "7",
            Rank::Eight => "8",
            Rank::Nine => "9",
            Rank::Ten => "T",
            Rank::Jack => "J",
            Rank::Queen => "Q",
            Rank::King => "K",
            Rank::Ace => "A",
        })
    }
}

impl fmt::Display for PokerCard {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.rank, self.suit)
    }
}

impl fmt::Display for HandCategory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 解析 "As"、"Td"、"9h" 这样的两字符写法
impl FromStr for PokerCard {
    type Err = ParseCardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let (Some(r), Some(u), None) = (chars.next(), chars.next(), chars.next()) else {
            return Err(ParseCardError(s.to_string()));
        };
        let rank = match r.to_ascii_uppercase() {
            '2' => Rank::Two,
            '3' => Rank::Three,
            '4' => Rank::Four,
            '5' => Rank::Five,
            '6' => Rank::Six,
            '7' => Rank::Seven,
            '8' => Rank::Eight,
            '9' => Rank::Nine,
            'T' => Rank::Ten,
            'J' => Rank::Jack,
            'Q' => Rank::Queen,
            'K' => Rank::King,
            'A' => Rank::Ace,
            _ => return Err(ParseCardError(s.to_string())),
        };
        let suit = match u.to_ascii_lowercase() {
            's' => Suit::Spade,
            'h' => Suit::Heart,
            'c' => Suit::Club,
            'd' => Suit::Diamond,
            _ => return Err(ParseCardError(s.to_string())),
        };
        Ok(PokerCard { rank, suit })
    }
}

// --- 牌型评估逻辑 ---

/// 从 5 到 7 张牌中找出最优的 5 张牌组合
///
/// 枚举全部 C(n,5) 个组合（最多 21 个）逐一打分。贪心地去掉小牌可能会破坏顺子或同花，
/// 所以这里不做任何剪枝。分数相同的组合保留最先枚举到的那个，保证结果确定。
pub fn evaluate_best_hand(cards: &[PokerCard]) -> Result<Evaluation, EvaluationError> {
    if !(5..=7).contains(&cards.len()) {
        return Err(EvaluationError::CardCount(cards.len()));
    }
    let mut seen = HashSet::with_capacity(cards.len());
    for card in cards {
        if !seen.insert(*card) {
            return Err(EvaluationError::DuplicateCard(*card));
        }
    }

    let mut best: Option<Evaluation> = None;
    for combo in get_combinations(cards, 5) {
        let hand = [combo[0], combo[1], combo[2], combo[3], combo[4]];
        let score = score_5_card_hand(&hand);
        if best.as_ref().is_none_or(|b| score > b.score) {
            best = Some(Evaluation { category: score.category(), best_five: hand, score });
        }
    }

    // 组合至少有一个，这里不会是 None
    best.ok_or(EvaluationError::CardCount(cards.len()))
}

/// 比较两手牌（各 5-7 张）的大小
/// 只看分数，同分的两手牌即使牌面不同也是 Equal
pub fn compare_hands(a: &[PokerCard], b: &[PokerCard]) -> Result<Ordering, EvaluationError> {
    Ok(evaluate_best_hand(a)?.score.cmp(&evaluate_best_hand(b)?.score))
}

/// 给恰好 5 张牌打分
fn score_5_card_hand(hand: &[PokerCard; 5]) -> HandScore {
    let mut cards = *hand;
    // 从大到小排序，方便处理
    cards.sort_by(|a, b| b.rank.cmp(&a.rank));
    let ranks: Vec<Rank> = cards.iter().map(|c| c.rank).collect();

    let is_flush = cards.windows(2).all(|w| w[0].suit == w[1].suit);

    let is_wheel = ranks == [Rank::Ace, Rank::Five, Rank::Four, Rank::Three, Rank::Two];
    let is_straight = is_wheel || ranks.windows(2).all(|w| w[0].value() == w[1].value() + 1);
    // A-5 顺子中，5 是最大的牌
    let high_card = if is_wheel { Rank::Five } else { ranks[0] };

    if is_straight && is_flush {
        return if high_card == Rank::Ace {
            HandScore::pack(HandCategory::RoyalFlush, &[])
        } else {
            HandScore::pack(HandCategory::StraightFlush, &[high_card])
        };
    }

    // 统计点数出现次数，按 (次数, 点数) 从大到小排列
    let mut counts: HashMap<Rank, u8> = HashMap::new();
    for rank in &ranks {
        *counts.entry(*rank).or_insert(0) += 1;
    }
    let mut groups: Vec<(u8, Rank)> = counts.into_iter().map(|(r, c)| (c, r)).collect();
    groups.sort_by(|a, b| b.cmp(a));
    let group_ranks: Vec<Rank> = groups.iter().map(|g| g.1).collect();

    match (groups[0].0, groups.get(1).map(|g| g.0)) {
        (4, _) => HandScore::pack(HandCategory::FourOfAKind, &group_ranks),
        (3, Some(2)) => HandScore::pack(HandCategory::FullHouse, &group_ranks),
        _ if is_flush => HandScore::pack(HandCategory::Flush, &ranks),
        _ if is_straight => HandScore::pack(HandCategory::Straight, &[high_card]),
        (3, _) => HandScore::pack(HandCategory::ThreeOfAKind, &group_ranks),
        (2, Some(2)) => HandScore::pack(HandCategory::TwoPair, &group_ranks),
        (2, _) => HandScore::pack(HandCategory::OnePair, &group_ranks),
        _ => HandScore::pack(HandCategory::HighCard, &ranks),
    }
}

/// 辅助函数：从一个切片中按原顺序生成所有大小为 k 的组合
fn get_combinations<T: Copy>(data: &[T], k: usize) -> Vec<Vec<T>> {
    if k == 0 {
        return vec![vec![]];
    }
    if data.len() < k {
        return vec![];
    }

    let (first, rest) = (data[0], &data[1..]);

    // 包含第一个元素的组合
    let mut result: Vec<Vec<T>> = get_combinations(rest, k - 1)
        .into_iter()
        .map(|mut combo| {
            combo.insert(0, first);
            combo
        })
        .collect();

    // 不包含第一个元素的组合
    result.extend(get_combinations(rest, k));
    result
}

// --- 单元测试 ---
