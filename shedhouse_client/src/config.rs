use std::time::Duration;

use clap::Parser;
use url::Url;

#[derive(Debug, Clone, Parser)]
#[command(name = "shedhouse_client", version, about = "出牌游戏的终端客户端")]
pub struct ClientConfig {
    /// 服务器地址
    #[arg(long, env = "SHEDHOUSE_URL", default_value = "ws://127.0.0.1:25917/ws")]
    pub url: Url,

    /// 重同步请求的超时（毫秒），超时后重试
    #[arg(long, env = "SHEDHOUSE_RESYNC_TIMEOUT_MS", default_value_t = 3000)]
    pub resync_timeout_ms: u64,

    /// 等待指令结果的超时（毫秒），超时后请求重同步
    #[arg(long, env = "SHEDHOUSE_ACK_TIMEOUT_MS", default_value_t = 2000)]
    pub ack_timeout_ms: u64,
}

impl ClientConfig {
    pub fn resync_timeout(&self) -> Duration {
        Duration::from_millis(self.resync_timeout_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}
