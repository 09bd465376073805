use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Server part of a 1:1 chat JID.
pub const USER_SERVER: &str = "s.whatsapp.net";

/// Server part of a group chat JID.
pub const GROUP_SERVER: &str = "g.us";

/// Server part of a broadcast-list JID.
pub const BROADCAST_SERVER: &str = "broadcast";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum JidError {
    #[error("malformed JID: {0:?}")]
    Malformed(String),

    #[error("recipient {0:?} contains no digits")]
    NoDigits(String),
}

/// A WhatsApp identifier of the form `<user>@<server>`.
///
/// JIDs are stable across sessions and are the primary key space for chats.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Jid {
    pub user: String,
    pub server: String,
}

impl Jid {
    pub fn new(user: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            server: server.into(),
        }
    }

    /// Parse a full `<user>@<server>` string.
    pub fn parse(s: &str) -> Result<Self, JidError> {
        let (user, server) = s
            .split_once('@')
            .ok_or_else(|| JidError::Malformed(s.to_string()))?;
        if user.is_empty() || server.is_empty() {
            return Err(JidError::Malformed(s.to_string()));
        }
        Ok(Self::new(user, server))
    }

    pub fn is_group(&self) -> bool {
        self.server == GROUP_SERVER
    }
}

impl std::fmt::Display for Jid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.user, self.server)
    }
}

impl std::str::FromStr for Jid {
    type Err = JidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Normalize a send recipient into a JID.
///
/// A string containing `@` is parsed as a full JID; anything else is treated
/// as a phone number, stripped to its digits and given the 1:1 server.
pub fn normalize_recipient(recipient: &str) -> Result<Jid, JidError> {
    let recipient = recipient.trim();
    if recipient.contains('@') {
        return Jid::parse(recipient);
    }

    let digits: String = recipient.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Err(JidError::NoDigits(recipient.to_string()));
    }
    Ok(Jid::new(digits, USER_SERVER))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trip() {
        let jid = Jid::parse("15551234567@s.whatsapp.net").unwrap();
        assert_eq!(jid.user, "15551234567");
        assert_eq!(jid.server, USER_SERVER);
        assert_eq!(jid.to_string(), "15551234567@s.whatsapp.net");
        assert!(!jid.is_group());
    }

    #[test]
    fn parse_group() {
        let jid = Jid::parse("120363041234567890@g.us").unwrap();
        assert!(jid.is_group());
    }

    #[test]
    fn parse_rejects_missing_parts() {
        assert!(Jid::parse("no-at-sign").is_err());
        assert!(Jid::parse("@g.us").is_err());
        assert!(Jid::parse("user@").is_err());
    }

    #[test]
    fn normalize_bare_number() {
        let jid = normalize_recipient("+1 (555) 123-4567").unwrap();
        assert_eq!(jid.to_string(), "15551234567@s.whatsapp.net");
    }

    #[test]
    fn normalize_passes_through_jid() {
        let jid = normalize_recipient("room@g.us").unwrap();
        assert_eq!(jid.to_string(), "room@g.us");
    }

    #[test]
    fn normalize_rejects_empty() {
        assert!(normalize_recipient("   ").is_err());
        assert!(normalize_recipient("abc").is_err());
    }
}
