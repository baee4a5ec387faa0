use crate::messaging::CommandKind;
use crate::types::constants::fields;
use crate::types::{IncusError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Outgoing wire frame.
///
/// `command` holds the command name under the `command` key plus the routing
/// fields (`user`, `page`, `groups`, ...), all as strings. `message` holds the
/// payload and always carries `time` once encoded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandMessage {
    pub command: BTreeMap<String, String>,
    #[serde(default)]
    pub message: Map<String, Value>,
}

impl CommandMessage {
    pub fn new(kind: CommandKind) -> Self {
        let mut command = BTreeMap::new();
        command.insert(fields::COMMAND.to_string(), kind.as_str().to_string());
        Self {
            command,
            message: Map::new(),
        }
    }

    pub fn with_field(mut self, key: &str, value: impl Into<String>) -> Self {
        self.command.insert(key.to_string(), value.into());
        self
    }

    pub fn with_message(mut self, key: &str, value: Value) -> Self {
        self.message.insert(key.to_string(), value);
        self
    }

    /// Command kind, if present and known
    pub fn kind(&self) -> Option<CommandKind> {
        self.command
            .get(fields::COMMAND)
            .and_then(|name| CommandKind::parse(name))
    }

    /// Send timestamp stamped by [`encode`](Self::encode)
    pub fn time(&self) -> Option<i64> {
        self.message.get(fields::TIME).and_then(Value::as_i64)
    }

    /// Stamps the current time into the payload and serializes the frame.
    pub fn encode(mut self) -> Result<String> {
        self.message
            .insert(fields::TIME.to_string(), Value::from(unix_time()));
        Ok(serde_json::to_string(&self)?)
    }
}

/// Seconds since the Unix epoch
pub fn unix_time() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or_default()
}

/// Recipients of a `message` command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    User(String),
    Users(Vec<String>),
    Page(String),
    Groups(Vec<String>),
    All,
}

/// Commands a client can issue to the bus
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Authenticate { user: String },
    SetPage { page: String },
    SetGroups { groups: Vec<String> },
    SetPresence { active: bool },
    Message {
        target: Target,
        event: String,
        data: Value,
    },
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Authenticate { .. } => CommandKind::Authenticate,
            Self::SetPage { .. } => CommandKind::SetPage,
            Self::SetGroups { .. } => CommandKind::SetGroups,
            Self::SetPresence { .. } => CommandKind::SetPresence,
            Self::Message { .. } => CommandKind::Message,
        }
    }

    /// Builds the unstamped wire frame for this command
    pub fn to_message(&self) -> CommandMessage {
        let frame = CommandMessage::new(self.kind());
        match self {
            Self::Authenticate { user } => frame.with_field(fields::USER, user.as_str()),
            Self::SetPage { page } => frame.with_field(fields::PAGE, page.as_str()),
            Self::SetGroups { groups } => frame.with_field(fields::GROUPS, groups.join(",")),
            Self::SetPresence { active } => {
                frame.with_message(fields::PRESENCE, Value::Bool(*active))
            }
            Self::Message {
                target,
                event,
                data,
            } => {
                let frame = match target {
                    Target::User(user) => frame.with_field(fields::USER, user.as_str()),
                    Target::Users(users) => frame.with_field(fields::USERS, users.join(",")),
                    Target::Page(page) => frame.with_field(fields::PAGE, page.as_str()),
                    Target::Groups(groups) => frame.with_field(fields::GROUPS, groups.join(",")),
                    Target::All => frame,
                };
                frame
                    .with_message(fields::EVENT, Value::String(event.clone()))
                    .with_message(fields::DATA, data.clone())
            }
        }
    }

    /// Encodes the command into wire text, stamping the send time.
    pub fn encode(&self) -> Result<String> {
        self.to_message().encode()
    }
}

/// Inbound event envelope.
///
/// Accepts both the lower-case `{event, data, time}` shape and the older
/// `{Event, Body, Time}` shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    #[serde(alias = "Event")]
    pub event: String,
    #[serde(default, alias = "Body")]
    pub data: Value,
    #[serde(default, alias = "Time", skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_url: Option<String>,
}

/// Result of decoding one inbound transmission
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Empty body: the request completed with nothing new
    KeepAlive,
    Event(Envelope),
}

/// Decodes inbound wire text.
///
/// # Errors
///
/// Returns [`IncusError::Protocol`] if non-empty text is not a valid envelope.
pub fn decode(text: &str) -> Result<Inbound> {
    if text.trim().is_empty() {
        return Ok(Inbound::KeepAlive);
    }

    serde_json::from_str::<Envelope>(text)
        .map(Inbound::Event)
        .map_err(|e| IncusError::Protocol {
            reason: e.to_string(),
        })
}
