//! Plain-text rendering of conversations for upload

use crate::chat::{Conversation, Message, PeerProfile};

/// Shown instead of a missing phone number.
pub const NO_PHONE: &str = "NA";

/// Shown instead of a missing peer username in file names.
pub const NO_USERNAME: &str = "None";

/// `+<digits>` for a present phone number, `NA` otherwise.
pub fn format_phone(phone: Option<&str>) -> String {
    match phone.map(str::trim).filter(|p| !p.is_empty()) {
        Some(p) if p.starts_with('+') => p.to_string(),
        Some(p) => format!("+{}", p),
        None => NO_PHONE.to_string(),
    }
}

/// `"<title> - <peer username> - <phone>.txt"`
pub fn export_file_name(conversation: &Conversation, peer: &PeerProfile) -> String {
    format!(
        "{} - {} - {}.txt",
        conversation.title,
        peer.username.as_deref().unwrap_or(NO_USERNAME),
        format_phone(peer.phone.as_deref())
    )
}

/// Whether a fetched history has nothing worth uploading: no messages at
/// all, or a single message without text.
pub fn is_empty_history(messages: &[Message]) -> bool {
    match messages {
        [] => true,
        [only] => only.text.is_none(),
        _ => false,
    }
}

/// One `"<sender>: <text>\n"` line per message, in the given order.
pub fn render_transcript(messages: &[Message]) -> String {
    let mut content = String::new();
    for message in messages {
        content.push_str(message.sender_name());
        content.push_str(": ");
        content.push_str(message.text.as_deref().unwrap_or_default());
        content.push('\n');
    }
    content
}
