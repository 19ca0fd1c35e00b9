use std::io::Write;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use shedhouse_core::ServerMessage;

mod command;
mod config;
mod error;
mod session;
mod view;

use command::{parse_command, HELP};
use config::ClientConfig;
use session::{ClientSession, Effect};

/// 检查超时的间隔
const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志写到 stderr，和游戏输出分开
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let config = ClientConfig::parse();

    println!("正在连接到: {}", config.url);
    let (ws_stream, _) = connect_async(config.url.as_str())
        .await
        .with_context(|| format!("无法连接到 {}", config.url))?;
    println!("连接成功!");

    let (mut write, mut read) = ws_stream.split();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut session = ClientSession::new(config.ack_timeout(), config.resync_timeout());
    let mut ticker = tokio::time::interval(POLL_INTERVAL);

    println!("--- 出牌游戏客户端 ---");
    println!("{}", HELP);
    prompt();

    loop {
        let effects = tokio::select! {
            line = stdin.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    prompt();
                    continue;
                }
                match parse_command(&line).and_then(|cmd| session.command(cmd, Instant::now())) {
                    Ok(effects) => effects,
                    Err(e) => vec![Effect::Print(e.to_string())],
                }
            }
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(server_msg) => session.on_server_message(server_msg, Instant::now()),
                    Err(e) => {
                        warn!("解析服务器消息失败: {}", e);
                        continue;
                    }
                },
                Some(Ok(Message::Close(_))) | None => {
                    println!("\n服务器关闭了连接");
                    break;
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    eprintln!("接收消息时出错: {}", e);
                    break;
                }
            },
            _ = ticker.tick() => session.poll(Instant::now()),
        };

        if effects.is_empty() {
            continue;
        }
        let mut exit = false;
        for effect in effects {
            match effect {
                Effect::Send(msg) => {
                    debug!("发送 {:?}", msg);
                    let payload = serde_json::to_string(&msg)?;
                    write.send(Message::Text(payload.into())).await?;
                }
                Effect::Print(text) => println!("\n{}", text),
                Effect::Exit => exit = true,
            }
        }
        if exit {
            if let (Some(session_id), Some(me), Some(token)) =
                (session.session_id(), session.me(), session.rejoin_token())
            {
                println!("重连命令: join {} <昵称> {} {}", session_id, me, token);
            }
            println!("正在断开连接...");
            break;
        }
        prompt();
    }

    let _ = write.close().await;
    Ok(())
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}
