use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("未知命令: {0}")]
    UnknownCommand(String),
    #[error("用法: {0}")]
    Usage(&'static str),
    #[error("无效的会话ID: {0}")]
    InvalidSessionId(String),
    #[error("无效的牌号: {0}")]
    InvalidCardIndex(String),
    #[error("手里没有第 {0} 张牌")]
    NoSuchCard(usize),
    #[error("无效的颜色: {0}")]
    InvalidColor(String),
    #[error("出万能牌需要指定颜色，例如 play 3 red")]
    ColorRequired,
    #[error("请先加入或创建会话")]
    NotSeated,
}
