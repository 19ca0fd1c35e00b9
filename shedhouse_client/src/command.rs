use shedhouse_core::{Color, PlayerId, RejoinToken, SessionId};

use crate::error::ClientError;

/// 终端里输入的一条命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Create { nickname: String },
    /// 带着玩家ID和凭证就是重连
    Join { session_id: SessionId, nickname: String, rejoin: Option<(PlayerId, RejoinToken)> },
    Start,
    /// 按手牌的显示序号出牌（从 1 开始）
    Play { index: usize, color: Option<Color> },
    Draw,
    Pass,
    Again,
    Resync,
    End,
    Show,
    Help,
    Exit,
}

pub const HELP: &str = "\
可用命令:
  create <昵称>                     - 创建一个新会话
  join <会话ID> <昵称> [玩家ID 凭证] - 加入会话，带上玩家ID和凭证表示重连
  start                             - 开始游戏 (仅房主)
  play <序号> [颜色]                - 出牌，万能牌需要指定颜色 (red/yellow/green/blue)
  draw                              - 摸一张牌
  pass                              - 不出刚摸到的牌
  again                             - 再来一局 (仅房主)
  resync                            - 向服务器请求完整状态
  end                               - 结束会话 (仅房主)
  show                              - 重新显示当前状态
  exit                              - 退出";

pub fn parse_command(line: &str) -> Result<Command, ClientError> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let Some(&name) = parts.first() else {
        return Err(ClientError::UnknownCommand(String::new()));
    };

    match name {
        "create" => {
            let nickname = parts.get(1).copied().unwrap_or("新玩家").to_string();
            Ok(Command::Create { nickname })
        }
        "join" => {
            const USAGE: &str = "join <会话ID> <昵称> [玩家ID 凭证]";
            if parts.len() != 3 && parts.len() != 5 {
                return Err(ClientError::Usage(USAGE));
            }
            let session_id = parts[1]
                .parse()
                .map_err(|_| ClientError::InvalidSessionId(parts[1].to_string()))?;
            let rejoin = match (parts.get(3), parts.get(4)) {
                (Some(player), Some(token)) => Some((
                    player.parse().map_err(|_| ClientError::InvalidSessionId(player.to_string()))?,
                    token.parse().map_err(|_| ClientError::InvalidSessionId(token.to_string()))?,
                )),
                _ => None,
            };
            Ok(Command::Join { session_id, nickname: parts[2].to_string(), rejoin })
        }
        "start" => Ok(Command::Start),
        "play" => {
            let raw = parts.get(1).ok_or(ClientError::Usage("play <序号> [颜色]"))?;
            let index: usize = raw.parse().map_err(|_| ClientError::InvalidCardIndex(raw.to_string()))?;
            if index == 0 {
                return Err(ClientError::InvalidCardIndex(raw.to_string()));
            }
            let color = match parts.get(2) {
                Some(raw) => Some(raw.parse().map_err(|_| ClientError::InvalidColor(raw.to_string()))?),
                None => None,
            };
            Ok(Command::Play { index, color })
        }
        "draw" => Ok(Command::Draw),
        "pass" => Ok(Command::Pass),
        "again" => Ok(Command::Again),
        "resync" => Ok(Command::Resync),
        "end" => Ok(Command::End),
        "show" => Ok(Command::Show),
        "help" => Ok(Command::Help),
        "exit" | "quit" => Ok(Command::Exit),
        other => Err(ClientError::UnknownCommand(other.to_string())),
    }
}
