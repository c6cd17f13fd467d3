//! Line-oriented command protocol.
//!
//! One command per line, `\r\n` or `\n` terminated, one reply line each.

use std::fmt;

use contracts::{ControllerState, DistanceReading};

/// Parsed client command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ping,
    Start,
    Stop,
    Distance,
    /// `MODE <n>`; `None` when the argument is missing or not a number
    Mode(Option<u32>),
    Status,
    Exit,
    Shutdown,
    Unknown,
}

impl Command {
    /// Parse one line, tolerating a trailing `\r` and surrounding blanks
    pub fn parse(line: &str) -> Self {
        let mut words = line.trim_end_matches(['\r', '\n']).split_whitespace();
        let Some(verb) = words.next() else {
            return Self::Unknown;
        };

        let command = match verb {
            "PING" => Self::Ping,
            "START" => Self::Start,
            "STOP" => Self::Stop,
            "DISTANCE" => Self::Distance,
            "STATUS" => Self::Status,
            "EXIT" => Self::Exit,
            "SHUTDOWN" => Self::Shutdown,
            "MODE" => {
                let mask = words.next().and_then(parse_mask);
                return match words.next() {
                    Some(_) => Self::Mode(None),
                    None => Self::Mode(mask),
                };
            }
            _ => return Self::Unknown,
        };

        if words.next().is_some() {
            Self::Unknown
        } else {
            command
        }
    }
}

/// Decimal or `0x`-prefixed hexadecimal mask
fn parse_mask(arg: &str) -> Option<u32> {
    match arg.strip_prefix("0x").or_else(|| arg.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => arg.parse().ok(),
    }
}

/// Reply line sent back to the client (without newline)
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Pong,
    Started,
    StartFailed,
    Stopped,
    StopFailed,
    Distance(DistanceReading),
    Ok,
    Err,
    State(ControllerState),
    Bye,
    ShuttingDown,
    UnknownCommand,
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pong => f.write_str("PONG"),
            Self::Started => f.write_str("OK STARTED"),
            Self::StartFailed => f.write_str("ERR START"),
            Self::Stopped => f.write_str("OK STOPPED"),
            Self::StopFailed => f.write_str("ERR STOP"),
            Self::Distance(reading) => match reading.value() {
                Some(d) => write!(f, "{d:.6}"),
                None => f.write_str("UNKNOWN"),
            },
            Self::Ok => f.write_str("OK"),
            Self::Err => f.write_str("ERR"),
            Self::State(state) => write!(f, "STATE {state}"),
            Self::Bye => f.write_str("BYE"),
            Self::ShuttingDown => f.write_str("SHUTTING DOWN"),
            Self::UnknownCommand => f.write_str("ERR UNKNOWN COMMAND"),
        }
    }
}
