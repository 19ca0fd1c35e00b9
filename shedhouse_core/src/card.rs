use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// --- 核心数据结构定义 ---

/// 一副完整牌的张数
pub const DECK_SIZE: usize = 108;

/// 颜色 (Color)
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize, Deserialize)]
pub enum Color {
    Red,
    Yellow,
    Green,
    Blue,
}

impl Color {
    pub const ALL: [Color; 4] = [Color::Red, Color::Yellow, Color::Green, Color::Blue];
}

/// 牌面 (Face)
/// 封闭的变体集合：增删一种牌面时，所有 match 都会在编译期报错。
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Face {
    Numeral { color: Color, value: u8 }, // 数字牌 0-9
    Skip { color: Color },               // 跳过
    Reverse { color: Color },            // 反转
    DrawTwo { color: Color },            // +2
    Wild,                                // 变色
    WildDrawFour,                        // 变色 +4
}

impl Face {
    /// 牌面自带的颜色，万能牌没有颜色
    pub fn color(&self) -> Option<Color> {
        match *self {
            Face::Numeral { color, .. }
            | Face::Skip { color }
            | Face::Reverse { color }
            | Face::DrawTwo { color } => Some(color),
            Face::Wild | Face::WildDrawFour => None,
        }
    }

    pub fn is_wild(&self) -> bool {
        matches!(self, Face::Wild | Face::WildDrawFour)
    }

    /// 下家需要罚抽的张数
    pub fn penalty(&self) -> usize {
        match self {
            Face::DrawTwo { .. } => 2,
            Face::WildDrawFour => 4,
            _ => 0,
        }
    }

    /// 不看颜色时两张牌是否"同号"：数字相同，或同一种行动牌
    fn same_symbol(&self, other: &Face) -> bool {
        match (self, other) {
            (Face::Numeral { value: a, .. }, Face::Numeral { value: b, .. }) => a == b,
            (Face::Skip { .. }, Face::Skip { .. })
            | (Face::Reverse { .. }, Face::Reverse { .. })
            | (Face::DrawTwo { .. }, Face::DrawTwo { .. }) => true,
            _ => false,
        }
    }

    /// 能否接在弃牌堆顶 `top` 之上出牌。
    /// 颜色比对使用 `current_color` 而不是顶牌颜色，因为顶牌可能是万能牌。
    /// +4 的额外限制（手中不能有当前颜色）由规则引擎检查。
    pub fn matches(&self, top: &Face, current_color: Color) -> bool {
        self.is_wild() || self.color() == Some(current_color) || self.same_symbol(top)
    }
}

/// 牌的唯一身份，取值 0..108
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardId(pub u8);

/// 单张牌 (Card)，创建后不可变
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub face: Face,
}

impl Card {
    pub fn new(id: CardId, face: Face) -> Card {
        Card { id, face }
    }
}

// --- 实现辅助功能 ---

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", match self {
            Color::Red => "红",
            Color::Yellow => "黄",
            Color::Green => "绿",
            Color::Blue => "蓝",
        })
    }
}

impl fmt::Display for Face {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Face::Numeral { color, value } => write!(f, "{}{}", color, value),
            Face::Skip { color } => write!(f, "{}禁", color),
            Face::Reverse { color } => write!(f, "{}转", color),
            Face::DrawTwo { color } => write!(f, "{}+2", color),
            Face::Wild => write!(f, "变色"),
            Face::WildDrawFour => write!(f, "变色+4"),
        }
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}#{}", self.face, self.id.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("无法识别的颜色: {0}")]
pub struct ParseColorError(pub String);

impl FromStr for Color {
    type Err = ParseColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "r" | "red" | "红" => Ok(Color::Red),
            "y" | "yellow" | "黄" => Ok(Color::Yellow),
            "g" | "green" | "绿" => Ok(Color::Green),
            "b" | "blue" | "蓝" => Ok(Color::Blue),
            _ => Err(ParseColorError(s.to_string())),
        }
    }
}

// --- 牌组生成 ---

/// 按固定顺序生成 108 张牌，id 即下标
/// 每种颜色：一张 0，1-9 各两张，禁/转/+2 各两张；另加 4 张变色和 4 张变色+4
pub fn full_deck() -> Vec<Card> {
    let mut faces = Vec::with_capacity(DECK_SIZE);
    for color in Color::ALL {
        faces.push(Face::Numeral { color, value: 0 });
        for value in 1..=9 {
            faces.push(Face::Numeral { color, value });
            faces.push(Face::Numeral { color, value });
        }
        for _ in 0..2 {
            faces.push(Face::Skip { color });
            faces.push(Face::Reverse { color });
            faces.push(Face::DrawTwo { color });
        }
    }
    for _ in 0..4 {
        faces.push(Face::Wild);
        faces.push(Face::WildDrawFour);
    }

    faces
        .into_iter()
        .enumerate()
        .map(|(i, face)| Card::new(CardId(i as u8), face))
        .collect()
}

/// 洗牌原语。随机性完全来自调用方提供的 rng，种子相同则结果相同。
pub fn shuffle<R: Rng + ?Sized>(cards: &mut [Card], rng: &mut R) {
    cards.shuffle(rng);
}

/// 生成一副洗好的新牌
pub fn shuffled_deck<R: Rng + ?Sized>(rng: &mut R) -> Vec<Card> {
    let mut deck = full_deck();
    shuffle(&mut deck, rng);
    deck
}

// --- 单元测试 ---

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashSet;
    use Color::*;

    #[test]
    fn test_full_deck_composition() {
        let deck = full_deck();
        assert_eq!(deck.len(), DECK_SIZE);

        let ids: HashSet<_> = deck.iter().map(|c| c.id).collect();
        assert_eq!(ids.len(), DECK_SIZE, "每张牌的 id 必须唯一");

        let wilds = deck.iter().filter(|c| c.face == Face::Wild).count();
        let wd4 = deck.iter().filter(|c| c.face == Face::WildDrawFour).count();
        assert_eq!((wilds, wd4), (4, 4));

        for color in Color::ALL {
            let colored = deck.iter().filter(|c| c.face.color() == Some(color)).count();
            assert_eq!(colored, 25);
            let zeros = deck
                .iter()
                .filter(|c| c.face == Face::Numeral { color, value: 0 })
                .count();
            assert_eq!(zeros, 1);
            let sevens = deck
                .iter()
                .filter(|c| c.face == Face::Numeral { color, value: 7 })
                .count();
            assert_eq!(sevens, 2);
        }
    }

    #[test]
    fn test_matching_by_color_number_and_kind() {
        let top = Face::Numeral { color: Red, value: 5 };
        assert!(Face::Numeral { color: Red, value: 9 }.matches(&top, Red));
        assert!(Face::Numeral { color: Blue, value: 5 }.matches(&top, Red));
        assert!(!Face::Numeral { color: Blue, value: 6 }.matches(&top, Red));
        assert!(Face::Wild.matches(&top, Red));
        assert!(Face::WildDrawFour.matches(&top, Red));

        let skip = Face::Skip { color: Green };
        assert!(Face::Skip { color: Yellow }.matches(&skip, Green));
        assert!(!Face::Reverse { color: Yellow }.matches(&skip, Green));
        assert!(!Face::DrawTwo { color: Yellow }.matches(&skip, Green));
    }

    #[test]
    fn test_matching_after_wild_uses_current_color() {
        // 顶牌是变色牌时，只能按选定的颜色跟牌
        assert!(Face::Numeral { color: Blue, value: 3 }.matches(&Face::Wild, Blue));
        assert!(!Face::Numeral { color: Red, value: 3 }.matches(&Face::Wild, Blue));
    }

    #[test]
    fn test_shuffle_is_deterministic_for_a_seed() {
        let a = shuffled_deck(&mut ChaCha8Rng::seed_from_u64(7));
        let b = shuffled_deck(&mut ChaCha8Rng::seed_from_u64(7));
        let c = shuffled_deck(&mut ChaCha8Rng::seed_from_u64(8));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), DECK_SIZE);
    }

    #[test]
    fn test_parse_color() {
        assert_eq!("red".parse::<Color>(), Ok(Red));
        assert_eq!("B".parse::<Color>(), Ok(Blue));
        assert!("purple".parse::<Color>().is_err());
    }
}
