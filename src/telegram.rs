//! Telegram account client built on grammers
//!
//! Maps dialogs, peers and messages into the platform-neutral types of
//! `crate::chat`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use grammers_client::client::updates::UpdatesLike;
use grammers_client::types::peer::Peer;
use grammers_client::types::User;
use grammers_client::{Client, SignInError};
use grammers_mtsender::{SenderPool, SenderPoolHandle};
use grammers_tl_types as tl;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::chat::{
    Account, ChatAccount, ChatConnector, Conversation, ConversationId, Message, PeerProfile,
    Sender,
};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::prompt::Prompt;
use crate::session::{open_session, Session, SessionLock};

/// Connects sessions to Telegram, logging in through the prompt when needed.
pub struct TelegramConnector {
    api_id: i32,
    api_hash: String,
    prompt: Arc<dyn Prompt>,
}

impl TelegramConnector {
    pub fn new(config: &Config, prompt: Arc<dyn Prompt>) -> Self {
        Self {
            api_id: config.api_id,
            api_hash: config.api_hash.clone(),
            prompt,
        }
    }
}

#[async_trait]
impl ChatConnector for TelegramConnector {
    async fn connect(&self, session: &Session) -> Result<Box<dyn ChatAccount>> {
        let account = TelegramAccount::connect(session, self.api_id).await?;
        if !account.client.is_authorized().await? {
            info!(session = %session.name, "Session is not authorized, logging in");
            login(&account.client, &self.api_hash, self.prompt.as_ref()).await?;
        }
        info!(session = %session.name, "Connected to Telegram");
        Ok(Box::new(account))
    }
}

/// Phone number + code login, with the two-step password when required.
async fn login(client: &Client, api_hash: &str, prompt: &dyn Prompt) -> Result<User> {
    let phone = prompt.ask("Enter phone number: ")?;
    let token = client
        .request_login_code(&phone, api_hash)
        .await
        .map_err(|e| Error::AuthorizationFailed(format!("Failed to request code: {}", e)))?;

    let code = prompt.ask("Enter the code: ")?;
    match client.sign_in(&token, &code).await {
        Ok(user) => Ok(user),
        Err(SignInError::PasswordRequired(password_token)) => {
            let hint = password_token.hint().unwrap_or("none").to_string();
            let password = prompt.ask(&format!("Enter the 2FA password (hint: {}): ", hint))?;
            client
                .check_password(password_token, password.trim())
                .await
                .map_err(|e| Error::AuthorizationFailed(format!("Failed to check password: {}", e)))
        }
        Err(e) => Err(Error::AuthorizationFailed(format!("Failed to sign in: {}", e))),
    }
}

/// One connected Telegram account.
pub struct TelegramAccount {
    client: Client,
    handle: SenderPoolHandle,
    runner: Option<JoinHandle<()>>,
    _updates: mpsc::UnboundedReceiver<UpdatesLike>,
    peers: HashMap<ConversationId, Peer>,
    _lock: SessionLock,
}

impl TelegramAccount {
    async fn connect(session: &Session, api_id: i32) -> Result<Self> {
        let lock = SessionLock::acquire(session)?;
        let storage = open_session(session)?;
        let pool = SenderPool::new(storage, api_id);

        let client = Client::new(&pool);

        let SenderPool {
            runner,
            updates,
            handle,
        } = pool;

        let runner = tokio::spawn(async move {
            runner.run().await;
        });

        Ok(Self {
            client,
            handle,
            runner: Some(runner),
            _updates: updates,
            peers: HashMap::new(),
            _lock: lock,
        })
    }

    fn peer(&self, id: ConversationId) -> Result<&Peer> {
        self.peers
            .get(&id)
            .ok_or_else(|| Error::ChatNotFound(format!("conversation {} is not in dialogs", id)))
    }
}

#[async_trait]
impl ChatAccount for TelegramAccount {
    async fn me(&mut self) -> Result<Account> {
        let me = self.client.get_me().await?;
        Ok(account_from_user(&me))
    }

    async fn list_conversations(&mut self) -> Result<Vec<Conversation>> {
        let mut conversations = Vec::new();
        let mut dialogs = self.client.iter_dialogs();

        while let Some(dialog) = dialogs.next().await? {
            let peer = dialog.peer.clone();
            let conversation = conversation_from_peer(&peer);
            self.peers.insert(conversation.id, peer);
            conversations.push(conversation);
        }

        debug!(count = conversations.len(), "Fetched dialogs");
        Ok(conversations)
    }

    async fn list_messages(&mut self, conversation: ConversationId) -> Result<Vec<Message>> {
        let peer = self.peer(conversation)?.clone();
        let mut messages = Vec::new();
        let mut iter = self.client.iter_messages(&peer);

        while let Some(msg) = iter.next().await? {
            messages.push(Message {
                sender: msg.sender().map(sender_from_peer),
                text: message_text(&msg.raw),
            });
        }

        Ok(messages)
    }

    async fn resolve_peer(&mut self, conversation: ConversationId) -> Result<PeerProfile> {
        Ok(profile_from_peer(self.peer(conversation)?))
    }

    async fn disconnect(&mut self) -> Result<()> {
        if !self.handle.quit() {
            debug!("Sender pool already stopped");
        }
        if let Some(runner) = self.runner.take() {
            runner
                .await
                .map_err(|e| Error::TelegramError(format!("Sender pool task failed: {}", e)))?;
        }
        self.peers.clear();
        Ok(())
    }
}

impl Drop for TelegramAccount {
    fn drop(&mut self) {
        if let Some(runner) = self.runner.take() {
            runner.abort();
        }
    }
}

fn owned(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

fn account_from_user(user: &User) -> Account {
    Account {
        username: owned(user.username()),
        first_name: owned(user.first_name()),
        last_name: owned(user.last_name()),
    }
}

/// Service and empty messages have no text; an uncaptioned media message
/// has empty text.
fn message_text(raw: &tl::enums::Message) -> Option<String> {
    match raw {
        tl::enums::Message::Message(message) => Some(message.message.clone()),
        tl::enums::Message::Service(_) | tl::enums::Message::Empty(_) => None,
    }
}

fn sender_from_peer(peer: &Peer) -> Sender {
    match peer {
        Peer::User(u) => Sender {
            username: owned(u.username()),
            first_name: owned(u.first_name()),
            last_name: owned(u.last_name()),
        },
        Peer::Group(g) => Sender {
            username: owned(g.username()),
            first_name: owned(g.title()),
            last_name: None,
        },
        Peer::Channel(c) => Sender {
            username: owned(c.username()),
            first_name: owned(Some(c.title())),
            last_name: None,
        },
    }
}

fn profile_from_peer(peer: &Peer) -> PeerProfile {
    match peer {
        Peer::User(u) => PeerProfile {
            username: owned(u.username()),
            phone: owned(u.phone()),
        },
        Peer::Group(g) => PeerProfile {
            username: owned(g.username()),
            phone: None,
        },
        Peer::Channel(c) => PeerProfile {
            username: owned(c.username()),
            phone: None,
        },
    }
}

/// Users, basic groups and channels number their ids independently, so the
/// key is the dialog id, which tells them apart.
fn conversation_id(peer: &Peer) -> ConversationId {
    peer.id().bot_api_dialog_id()
}

/// Megagroups are both group and channel; broadcast channels are channels
/// and basic groups are groups.
fn conversation_from_peer(peer: &Peer) -> Conversation {
    let id = conversation_id(peer);
    match peer {
        Peer::User(u) => Conversation {
            id,
            title: u.full_name(),
            is_group: false,
            is_channel: false,
        },
        Peer::Group(g) => Conversation {
            id,
            title: g.title().unwrap_or_default().to_string(),
            is_group: true,
            is_channel: matches!(
                g.raw,
                tl::enums::Chat::Channel(_) | tl::enums::Chat::ChannelForbidden(_)
            ),
        },
        Peer::Channel(c) => Conversation {
            id,
            title: c.title().to_string(),
            is_group: c.raw.megagroup,
            is_channel: true,
        },
    }
}
