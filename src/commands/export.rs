//! Export every direct conversation of every session to Google Drive.

use std::path::Path;
use std::time::Instant;

use tracing::{info, warn};

use crate::chat::{ChatAccount, ChatConnector};
use crate::drive::CloudStorage;
use crate::error::Result;
use crate::export::{export_file_name, is_empty_history, render_transcript};
use crate::metrics::{self, ConversationOutcome};
use crate::session::Session;

/// Totals of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub sessions: usize,
    pub exported: usize,
    pub skipped: usize,
    /// Drive id of the uploaded run log.
    pub log_file_id: Option<String>,
}

/// Totals of one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionReport {
    pub account: String,
    pub folder_id: String,
    pub exported: usize,
    pub skipped: usize,
}

/// Drives sessions through the chat client and into storage, one at a time.
pub struct Exporter<'a> {
    connector: &'a dyn ChatConnector,
    storage: &'a dyn CloudStorage,
    parent_folder_id: String,
}

impl<'a> Exporter<'a> {
    pub fn new(
        connector: &'a dyn ChatConnector,
        storage: &'a dyn CloudStorage,
        parent_folder_id: impl Into<String>,
    ) -> Self {
        Self {
            connector,
            storage,
            parent_folder_id: parent_folder_id.into(),
        }
    }

    /// Export all sessions in order, then upload the run log.
    ///
    /// The first error aborts the run; files uploaded before it stay.
    pub async fn run(&self, sessions: &[Session], run_log: &Path) -> Result<ExportSummary> {
        info!(sessions = sessions.len(), "Starting chat export");
        let mut summary = ExportSummary::default();

        for session in sessions {
            let report = self.export_session(session).await?;
            summary.sessions += 1;
            summary.exported += report.exported;
            summary.skipped += report.skipped;
        }

        info!(
            sessions = summary.sessions,
            exported = summary.exported,
            skipped = summary.skipped,
            "Export completed"
        );

        summary.log_file_id = Some(self.upload_run_log(run_log).await?);
        Ok(summary)
    }

    /// Connect, export, and always disconnect one session.
    pub async fn export_session(&self, session: &Session) -> Result<SessionReport> {
        let started = Instant::now();
        let outcome = self.connect_and_export(session).await;
        metrics::record_session_result(&session.name, started.elapsed(), outcome.is_ok());
        outcome
    }

    async fn connect_and_export(&self, session: &Session) -> Result<SessionReport> {
        info!(session = %session.name, "Connecting to Telegram...");
        let mut account = self.connector.connect(session).await?;

        let exported = self.export_account(session, account.as_mut()).await;
        let closed = account.disconnect().await;
        if let Err(err) = &closed {
            warn!(session = %session.name, "Failed to disconnect: {}", err);
        }

        let report = exported?;
        closed?;
        info!("Chats for session '{}' saved to Google Drive", session.name);
        Ok(report)
    }

    async fn export_account(
        &self,
        session: &Session,
        account: &mut dyn ChatAccount,
    ) -> Result<SessionReport> {
        let conversations = account.list_conversations().await?;
        let me = account.me().await?;
        let account_name = me.display_name().to_string();
        info!("Session: {} - Account: {}", session.name, account_name);

        let folder_id = self
            .storage
            .get_or_create_folder(&account_name, &self.parent_folder_id)
            .await?;

        let mut report = SessionReport {
            account: account_name,
            folder_id,
            ..SessionReport::default()
        };

        for conversation in conversations.iter().filter(|c| c.is_direct()) {
            let peer = account.resolve_peer(conversation.id).await?;
            let messages = account.list_messages(conversation.id).await?;

            if is_empty_history(&messages) {
                info!("No messages to save for chat '{}'", conversation.title);
                metrics::record_conversation(&session.name, ConversationOutcome::Skipped);
                report.skipped += 1;
                continue;
            }

            info!(
                messages = messages.len(),
                "Processing and saving messages for chat '{}'", conversation.title
            );
            let file_name = export_file_name(conversation, &peer);
            self.storage
                .upload_text_file(&file_name, &render_transcript(&messages), &report.folder_id)
                .await?;
            metrics::record_upload("transcript");
            metrics::record_conversation(&session.name, ConversationOutcome::Exported);
            report.exported += 1;
            info!("File for chat '{}' saved to Google Drive", conversation.title);
        }

        Ok(report)
    }

    async fn upload_run_log(&self, run_log: &Path) -> Result<String> {
        let name = run_log
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| run_log.display().to_string());
        info!("Uploading log file '{}' to Google Drive...", name);

        let id = self
            .storage
            .upload_file_from_path(run_log, &name, &self.parent_folder_id)
            .await?;
        metrics::record_upload("run_log");
        Ok(id)
    }
}
