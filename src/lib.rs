//! Telegram to Google Drive backup
//!
//! This library provides tools to:
//! - Log into one or more Telegram sessions
//! - Export each account's direct conversations as plain text
//! - Upload them to Google Drive, one folder per account
//! - Keep a per-run log file and upload it at the end

pub mod chat;
pub mod config;
pub mod drive;
pub mod error;
pub mod export;
pub mod metrics;
pub mod prompt;
pub mod run_log;
pub mod session;
pub mod telegram;

// Re-export common types
pub use chat::{Account, ChatAccount, ChatConnector, Conversation, Message, PeerProfile, Sender};
pub use config::Config;
pub use drive::{CloudStorage, DriveClient};
pub use error::{Error, Result};
pub use prompt::{Prompt, ScriptedPrompt, StdinPrompt};
pub use run_log::RunLog;
pub use session::{discover_sessions, Session, SessionLock};
pub use telegram::TelegramConnector;

pub mod commands;
