//! Line commands typed at the terminal

use relaychat_core::{Command, Peer};

use crate::error::{CliError, Result};

pub const HELP: &str = "\
Commands:
  <text>               post to the public channel
  /invite <user>       invite a user to a private chat
  /accept <user>       accept a private chat invite
  /decline <user>      decline a private chat invite
  /pm <user> <text>    send an encrypted private message
  /disconnect <user>   leave a private chat
  /close <user>        close a disconnected private chat
  /focus <user>        open a private chat tab
  /min                 minimize the focused private chat
  /help                show this help
  /quit                exit";

/// One parsed line of input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineInput {
    Command(Command),
    Help,
    Quit,
    Empty,
}

/// Parse one line typed by the user
pub fn parse_line(line: &str) -> Result<LineInput> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(LineInput::Empty);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(LineInput::Command(Command::SendChat {
            message: line.to_string(),
        }));
    };

    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };

    let command = match name {
        "invite" => Command::InvitePeer {
            peer: peer_arg(name, args)?,
        },
        "accept" => Command::AcceptInvite {
            peer: peer_arg(name, args)?,
        },
        "decline" => Command::DeclineInvite {
            peer: peer_arg(name, args)?,
        },
        "disconnect" => Command::DisconnectPm {
            peer: peer_arg(name, args)?,
        },
        "close" => Command::ClosePm {
            peer: peer_arg(name, args)?,
        },
        "focus" => Command::FocusPm {
            peer: peer_arg(name, args)?,
        },
        "pm" => {
            let (peer, text) = args
                .split_once(char::is_whitespace)
                .map(|(peer, text)| (peer, text.trim()))
                .filter(|(_, text)| !text.is_empty())
                .ok_or_else(|| CliError::usage("usage: /pm <user> <text>"))?;
            Command::SendPrivate {
                peer: Peer::new(peer),
                text: text.to_string(),
            }
        }
        "min" | "minimize" => Command::MinimizePm,
        "help" => return Ok(LineInput::Help),
        "quit" | "exit" => return Ok(LineInput::Quit),
        other => return Err(CliError::usage(format!("unknown command /{} (try /help)", other))),
    };
    Ok(LineInput::Command(command))
}

fn peer_arg(name: &str, args: &str) -> Result<Peer> {
    match args.split_whitespace().collect::<Vec<_>>().as_slice() {
        [peer] => Ok(Peer::new(*peer)),
        _ => Err(CliError::usage(format!("usage: /{} <user>", name))),
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
