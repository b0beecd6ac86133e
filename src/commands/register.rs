//! Interactive session registration (`--ask-phones`)
//!
//! Asks for session names one by one, logs each of them in (the connector
//! prompts for phone, code, and password as needed) and returns the
//! registered sessions in entry order.

use std::path::Path;

use tracing::{info, warn};

use crate::chat::ChatConnector;
use crate::error::Result;
use crate::prompt::Prompt;
use crate::session::Session;

pub const SESSION_NAME_PROMPT: &str = "Enter session name: ";
pub const CONTINUE_PROMPT: &str = "Continue? (y/n): ";

pub async fn run(
    sessions_dir: &Path,
    connector: &dyn ChatConnector,
    prompt: &dyn Prompt,
) -> Result<Vec<Session>> {
    let mut sessions: Vec<Session> = Vec::new();

    loop {
        let name = prompt.ask(SESSION_NAME_PROMPT)?;
        if !is_valid_session_name(&name) {
            warn!("Invalid session name '{}', try again", name);
            continue;
        }

        let session = Session::new(&name, sessions_dir);
        if session.exists() {
            info!(session = %session.name, "Reusing existing session file");
        } else {
            info!(session = %session.name, "Creating new session file");
        }
        let mut account = connector.connect(&session).await?;
        let me = account.me().await;
        let closed = account.disconnect().await;
        let me = me?;
        closed?;

        info!("Account: {} Status: added", me.display_name());
        if sessions.iter().any(|s| s.name == session.name) {
            warn!("Session '{}' was already registered in this run", session.name);
        } else {
            sessions.push(session);
        }

        if !prompt.confirm(CONTINUE_PROMPT)? {
            break;
        }
    }

    Ok(sessions)
}

/// Session names become file names inside the sessions directory.
fn is_valid_session_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
}
