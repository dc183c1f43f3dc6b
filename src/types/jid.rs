//! WhatsApp JID (Jabber ID) types.
//!
//! JIDs identify users, groups and linked devices. The paired device's JID
//! doubles as its [`DeviceIdentity`](crate::store::DeviceIdentity).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Known JID servers on WhatsApp
pub mod servers {
    pub const DEFAULT_USER: &str = "s.whatsapp.net";
    pub const GROUP: &str = "g.us";
}

/// JID represents a WhatsApp user, group or device address.
///
/// Device JIDs carry a non-zero `device` number (`user:device@server`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct JID {
    pub user: String,
    pub device: u16,
    pub server: String,
}

impl JID {
    /// Creates a new regular JID.
    pub fn new(user: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            server: server.into(),
            device: 0,
        }
    }

    /// Creates a device JID on the default user server.
    pub fn new_device(user: impl Into<String>, device: u16) -> Self {
        Self {
            user: user.into(),
            device,
            server: servers::DEFAULT_USER.to_string(),
        }
    }

    /// Returns the user as an integer (only meaningful for phone-number users).
    pub fn user_int(&self) -> Option<u64> {
        self.user.parse().ok()
    }

    /// Whether this JID addresses a group chat.
    pub fn is_group(&self) -> bool {
        self.server == servers::GROUP
    }

    /// Returns true if the JID is empty (no server).
    pub fn is_empty(&self) -> bool {
        self.server.is_empty()
    }
}

impl fmt::Display for JID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.device > 0 {
            write!(f, "{}:{}@{}", self.user, self.device, self.server)
        } else if !self.user.is_empty() {
            write!(f, "{}@{}", self.user, self.server)
        } else {
            write!(f, "{}", self.server)
        }
    }
}

/// Error type for JID parsing
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("failed to parse JID: {0}")]
pub struct ParseJIDError(pub String);

impl FromStr for JID {
    type Err = ParseJIDError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((user_part, server)) = s.split_once('@') else {
            return Ok(JID::new("", s));
        };
        if server.contains('@') {
            return Err(ParseJIDError("unexpected number of @ in JID".to_string()));
        }

        // user.agent:device is accepted; the agent byte is not tracked.
        let user_part = match user_part.split_once('.') {
            Some((user, ad)) if server != servers::GROUP => {
                let device = ad.split_once(':').map(|(_, d)| d).unwrap_or("0");
                return Ok(JID {
                    user: user.to_string(),
                    device: device
                        .parse()
                        .map_err(|_| ParseJIDError("failed to parse device from JID".to_string()))?,
                    server: server.to_string(),
                });
            }
            _ => user_part,
        };

        match user_part.split_once(':') {
            Some((user, device)) => Ok(JID {
                user: user.to_string(),
                device: device
                    .parse()
                    .map_err(|_| ParseJIDError("failed to parse device from JID".to_string()))?,
                server: server.to_string(),
            }),
            None => Ok(JID::new(user_part, server)),
        }
    }
}

impl Serialize for JID {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for JID {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_jid() {
        let jid: JID = "1234567890@s.whatsapp.net".parse().unwrap();
        assert_eq!(jid.user, "1234567890");
        assert_eq!(jid.server, servers::DEFAULT_USER);
        assert_eq!(jid.device, 0);
    }

    #[test]
    fn test_parse_device_jid() {
        let jid: JID = "1234567890:2@s.whatsapp.net".parse().unwrap();
        assert_eq!(jid.user, "1234567890");
        assert_eq!(jid.device, 2);
        assert_eq!(jid.to_string(), "1234567890:2@s.whatsapp.net");
    }

    #[test]
    fn test_parse_ad_jid() {
        let jid: JID = "1234567890.0:7@s.whatsapp.net".parse().unwrap();
        assert_eq!(jid.user, "1234567890");
        assert_eq!(jid.device, 7);
    }

    #[test]
    fn test_group_jid() {
        let jid: JID = "123456789-1234567890@g.us".parse().unwrap();
        assert_eq!(jid.user, "123456789-1234567890");
        assert!(jid.is_group());
    }

    #[test]
    fn test_bad_device_rejected() {
        assert!("123:abc@s.whatsapp.net".parse::<JID>().is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let jid = JID::new_device("4915112345678", 3);
        let json = serde_json::to_string(&jid).unwrap();
        assert_eq!(json, "\"4915112345678:3@s.whatsapp.net\"");
        let back: JID = serde_json::from_str(&json).unwrap();
        assert_eq!(back, jid);
    }
}
