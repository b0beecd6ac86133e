//! Chat-side domain types and the seam between the exporter and Telegram
//!
//! The exporter only sees these platform-neutral types; `crate::telegram`
//! fills them from grammers.

use async_trait::async_trait;

use crate::error::Result;
use crate::session::Session;

/// Fallback used whenever no name can be resolved.
pub const UNKNOWN_NAME: &str = "Unknown";

/// Dialog identifier as reported by Telegram.
pub type ConversationId = i64;

/// The account a session is logged into.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Account {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl Account {
    /// Display key: username, then first name, then last name, then "Unknown".
    pub fn display_name(&self) -> &str {
        first_present([&self.username, &self.first_name, &self.last_name]).unwrap_or(UNKNOWN_NAME)
    }
}

/// One dialog of the account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    pub is_group: bool,
    pub is_channel: bool,
}

impl Conversation {
    /// A one-to-one conversation: not a group, not a channel, titled.
    pub fn is_direct(&self) -> bool {
        !self.is_group && !self.is_channel && !self.title.is_empty()
    }
}

/// The other side of a conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerProfile {
    pub username: Option<String>,
    pub phone: Option<String>,
}

/// Author of a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sender {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl Sender {
    pub fn display_name(&self) -> &str {
        first_present([&self.username, &self.first_name, &self.last_name]).unwrap_or(UNKNOWN_NAME)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub sender: Option<Sender>,
    pub text: Option<String>,
}

impl Message {
    pub fn sender_name(&self) -> &str {
        self.sender
            .as_ref()
            .map(Sender::display_name)
            .unwrap_or(UNKNOWN_NAME)
    }
}

fn first_present<'a>(candidates: [&'a Option<String>; 3]) -> Option<&'a str> {
    candidates
        .into_iter()
        .filter_map(|c| c.as_deref())
        .find(|s| !s.is_empty())
}

/// One authenticated connection to the chat platform.
#[async_trait]
pub trait ChatAccount: Send {
    /// The logged-in account.
    async fn me(&mut self) -> Result<Account>;

    /// Every dialog visible to the account, in platform order.
    async fn list_conversations(&mut self) -> Result<Vec<Conversation>>;

    /// Full history of a conversation, in platform order.
    async fn list_messages(&mut self, conversation: ConversationId) -> Result<Vec<Message>>;

    /// Username and phone of the conversation's peer.
    async fn resolve_peer(&mut self, conversation: ConversationId) -> Result<PeerProfile>;

    /// Close the connection; the account must not be used afterwards.
    async fn disconnect(&mut self) -> Result<()>;
}

/// Opens authenticated connections for sessions.
#[async_trait]
pub trait ChatConnector: Send + Sync {
    async fn connect(&self, session: &Session) -> Result<Box<dyn ChatAccount>>;
}
