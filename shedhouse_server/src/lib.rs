//! 出牌游戏的权威服务器：每个会话一个写者任务，按节拍提交版本化快照。

pub mod config;
pub mod connection;
pub mod registry;
pub mod session;

pub use config::ServerConfig;
pub use registry::SessionRegistry;
pub use session::{
    AuthoritativeLoop, IntentOutcome, Published, SessionConfig, SessionError, SessionHandle, TickReport,
};
