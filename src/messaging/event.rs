use crate::types::constants::{CONNECT_EVENT, commands};
use serde::{Deserialize, Serialize};

/// Event names handlers can be registered under
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BusEvent {
    /// Synthetic event fired once logical connectivity is established
    Connect,

    /// Application event delivered by the bus
    Named(String),
}

impl BusEvent {
    /// Parse a string into a BusEvent
    pub fn parse(s: &str) -> Self {
        match s {
            CONNECT_EVENT => Self::Connect,
            _ => Self::Named(s.to_string()),
        }
    }

    /// Convert event to string representation
    pub fn as_str(&self) -> &str {
        match self {
            Self::Connect => CONNECT_EVENT,
            Self::Named(s) => s,
        }
    }

    pub fn is_connect(&self) -> bool {
        matches!(self, Self::Connect)
    }
}

impl From<&str> for BusEvent {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<String> for BusEvent {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<BusEvent> for String {
    fn from(event: BusEvent) -> Self {
        event.as_str().to_string()
    }
}

impl std::fmt::Display for BusEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Commands understood by the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Authenticate,
    SetPage,
    SetGroups,
    SetPresence,
    Message,
}

impl CommandKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            commands::AUTHENTICATE => Some(Self::Authenticate),
            commands::SET_PAGE => Some(Self::SetPage),
            commands::SET_GROUPS => Some(Self::SetGroups),
            commands::SET_PRESENCE => Some(Self::SetPresence),
            commands::MESSAGE => Some(Self::Message),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authenticate => commands::AUTHENTICATE,
            Self::SetPage => commands::SET_PAGE,
            Self::SetGroups => commands::SET_GROUPS,
            Self::SetPresence => commands::SET_PRESENCE,
            Self::Message => commands::MESSAGE,
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
