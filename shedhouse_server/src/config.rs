use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

use crate::session::SessionConfig;

/// 服务器启动参数，命令行优先，其次环境变量
#[derive(Debug, Clone, Parser)]
#[command(name = "shedhouse_server", version, about = "出牌游戏的权威服务器")]
pub struct ServerConfig {
    /// 监听地址
    #[arg(long, env = "SHEDHOUSE_BIND", default_value = "0.0.0.0:25917")]
    pub bind: SocketAddr,

    /// 权威循环的节拍（毫秒）
    #[arg(long, env = "SHEDHOUSE_TICK_MS", default_value_t = 150)]
    pub tick_ms: u64,

    /// 等待指令结果的最长时间（毫秒）
    #[arg(long, env = "SHEDHOUSE_ACK_TIMEOUT_MS", default_value_t = 2000)]
    pub ack_timeout_ms: u64,

    /// 每个会话的快照广播容量
    #[arg(long, env = "SHEDHOUSE_BROADCAST_CAPACITY", default_value_t = 64)]
    pub broadcast_capacity: usize,

    /// 洗牌用的固定种子
    #[arg(long, env = "SHEDHOUSE_SEED")]
    pub seed: Option<u64>,
}

impl ServerConfig {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            tick_interval: Duration::from_millis(self.tick_ms.max(1)),
            broadcast_capacity: self.broadcast_capacity,
            seed: self.seed,
            ..SessionConfig::default()
        }
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}
