//! Text commands: `party create|join|leave|info`
//!
//! Parses a chat-style command line and runs it against a [`PartyManager`],
//! returning the lines to show the user.

use thiserror::Error;
use tracing::{info, warn};

use crate::party::PartyManager;

const PARTY_USAGE: &str = "Usage: /spotify party <create|join|leave|info>";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("{0}")]
    Usage(String),

    #[error("Unknown command. Usage: /spotify party <create|join|leave|info>")]
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartyCommand {
    Create { name: String },
    Join { code: String },
    Leave,
    Info,
}

impl PartyCommand {
    /// Parse `[/spotify] party <sub> [args...]`
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let mut words = line.split_whitespace().peekable();
        if words.peek().is_some_and(|w| w.eq_ignore_ascii_case("/spotify")) {
            words.next();
        }
        if words.peek().is_some_and(|w| w.eq_ignore_ascii_case("party")) {
            words.next();
        }

        let Some(sub) = words.next() else {
            return Err(CommandError::Usage(PARTY_USAGE.to_string()));
        };

        match sub.to_ascii_lowercase().as_str() {
            "create" => {
                let name = words.collect::<Vec<_>>().join(" ");
                if name.is_empty() {
                    return Err(CommandError::Usage(
                        "Usage: /spotify party create <name>".to_string(),
                    ));
                }
                Ok(Self::Create { name })
            }
            "join" => match words.next() {
                Some(code) => Ok(Self::Join {
                    code: code.to_ascii_uppercase(),
                }),
                None => Err(CommandError::Usage(
                    "Usage: /spotify party join <code>".to_string(),
                )),
            },
            "leave" => Ok(Self::Leave),
            "info" => Ok(Self::Info),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }

    pub fn execute(&self, party: &PartyManager) -> Vec<String> {
        match self {
            Self::Create { name } => match party.create_party(name) {
                Some(created) => {
                    info!("Party created name={} id={}", created.name, created.code);
                    vec![
                        format!("Party created: {}", created.name),
                        format!("Party Code: {}", created.code),
                        "Share this code with friends to join!".to_string(),
                    ]
                }
                None => {
                    warn!("Party creation failed");
                    vec!["Failed to create party. Check your active profile.".to_string()]
                }
            },

            Self::Join { code } => {
                if !party.join_party(code) {
                    warn!("Failed to join party id={}", code);
                    return vec!["Failed to join party. Check the code.".to_string()];
                }
                info!("Joined party id={}", code);
                let name = party.current_party().map(|p| p.name).unwrap_or_default();
                vec![
                    format!("Joined party: {}", name),
                    "Your playback will sync with the host.".to_string(),
                ]
            }

            Self::Leave => {
                party.forget_disbanded();
                let Some(current) = party.current_party() else {
                    return vec!["You are not in a party.".to_string()];
                };
                party.leave_current_party();
                info!("Left party name={}", current.name);
                vec![format!("Left party: {}", current.name)]
            }

            Self::Info => {
                party.forget_disbanded();
                let Some(current) = party.current_party() else {
                    return vec!["You are not in a party.".to_string()];
                };

                let mut lines = vec![
                    "Party Info".to_string(),
                    format!("Name: {}", current.name),
                    format!("Code: {}", current.code),
                    format!("Members: {}/{}", current.member_count(), current.max_members),
                ];
                if party.is_host() {
                    lines.push("You are the host".to_string());
                } else {
                    lines.push("Syncing with host...".to_string());
                }
                lines.push("Members".to_string());
                for member in current.members() {
                    if member.is_host {
                        lines.push(format!("• {} [HOST]", member.display_name));
                    } else {
                        lines.push(format!("• {}", member.display_name));
                    }
                }
                lines
            }
        }
    }
}

/// Parse and run a command line; errors come back as a single usage line
pub fn run(line: &str, party: &PartyManager) -> Vec<String> {
    match PartyCommand::parse(line) {
        Ok(command) => command.execute(party),
        Err(e) => vec![e.to_string()],
    }
}
