//! Tests for interactive session registration

use tg_drive_backup::commands::register::{self, CONTINUE_PROMPT, SESSION_NAME_PROMPT};
use tg_drive_backup::{Error, ScriptedPrompt};

use super::fakes::{account, AccountScript, FakeConnector};

fn connector() -> FakeConnector {
    FakeConnector::new()
        .with_account("alice", AccountScript::new(account(Some("alice_tg"), None)))
        .with_account("bob", AccountScript::new(account(None, Some("Bob"))))
}

#[tokio::test]
async fn test_register_until_operator_declines() {
    let dir = tempfile::tempdir().unwrap();
    let connector = connector();
    let prompt = ScriptedPrompt::new(["alice", "y", "bob", "n"]);

    let sessions = register::run(dir.path(), &connector, &prompt).await.unwrap();

    let names: Vec<&str> = sessions.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["alice", "bob"]);
    assert_eq!(sessions[0].path, dir.path().join("alice.session"));
    assert_eq!(
        prompt.asked(),
        vec![
            SESSION_NAME_PROMPT,
            CONTINUE_PROMPT,
            SESSION_NAME_PROMPT,
            CONTINUE_PROMPT
        ]
    );
    assert_eq!(
        connector.events(),
        vec![
            "connect:alice",
            "me:alice",
            "disconnect:alice",
            "connect:bob",
            "me:bob",
            "disconnect:bob"
        ]
    );
}

#[tokio::test]
async fn test_register_reasks_invalid_names() {
    let dir = tempfile::tempdir().unwrap();
    let connector = connector();
    let prompt = ScriptedPrompt::new(["", "../alice", "alice", "N"]);

    let sessions = register::run(dir.path(), &connector, &prompt).await.unwrap();

    assert_eq!(sessions.len(), 1);
    assert_eq!(
        prompt
            .asked()
            .iter()
            .filter(|q| q.as_str() == SESSION_NAME_PROMPT)
            .count(),
        3
    );
}

#[tokio::test]
async fn test_register_keeps_duplicate_once() {
    let dir = tempfile::tempdir().unwrap();
    let connector = connector();
    let prompt = ScriptedPrompt::new(["alice", "", "alice", "n"]);

    let sessions = register::run(dir.path(), &connector, &prompt).await.unwrap();

    assert_eq!(sessions.len(), 1);
    assert_eq!(
        connector
            .events()
            .iter()
            .filter(|e| e.as_str() == "connect:alice")
            .count(),
        2
    );
}

#[tokio::test]
async fn test_register_propagates_login_failure() {
    let dir = tempfile::tempdir().unwrap();
    let connector = connector();
    let prompt = ScriptedPrompt::new(["mallory", "n"]);

    let result = register::run(dir.path(), &connector, &prompt).await;

    assert!(matches!(result, Err(Error::SessionNotFound(_))));
}

#[tokio::test]
async fn test_register_fails_when_input_ends() {
    let dir = tempfile::tempdir().unwrap();
    let connector = connector();
    let prompt = ScriptedPrompt::new(["alice", "y"]);

    let result = register::run(dir.path(), &connector, &prompt).await;

    assert!(matches!(result, Err(Error::InvalidArgument(_))));
}
