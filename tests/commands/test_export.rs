//! Tests for the export command

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;
use tg_drive_backup::chat::PeerProfile;
use tg_drive_backup::commands::Exporter;
use tg_drive_backup::{discover_sessions, Error, Session};

use super::fakes::{
    account, conversation, service, text, uncaptioned, AccountScript, FakeConnector, FakeStorage,
};

const PARENT: &str = "root-folder";

fn peer(username: Option<&str>, phone: Option<&str>) -> PeerProfile {
    PeerProfile {
        username: username.map(String::from),
        phone: phone.map(String::from),
    }
}

/// A sessions directory holding `<name>.session` for each name, plus a run log.
fn workspace(names: &[&str]) -> (TempDir, PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let sessions = temp.path().join("sessions");
    fs::create_dir_all(&sessions).unwrap();
    for name in names {
        fs::write(sessions.join(format!("{}.session", name)), b"").unwrap();
    }
    let log = temp.path().join("log_2024-05-01_10-30.txt");
    fs::write(&log, "INFO Starting chat export\n").unwrap();
    (temp, log)
}

fn alice() -> AccountScript {
    AccountScript::new(account(Some("alice_tg"), Some("Alice")))
        .with_conversation(
            conversation(1, "Bob Builder", false, false),
            peer(Some("bob"), Some("111")),
            vec![text("bob", "hi"), text("alice_tg", "hello")],
        )
        .with_conversation(
            conversation(2, "Team", true, false),
            peer(None, None),
            vec![text("carol", "standup?")],
        )
}

#[tokio::test]
async fn test_export_only_direct_conversations() {
    let script = AccountScript::new(account(Some("alice_tg"), None))
        .with_conversation(
            conversation(1, "Bob", false, false),
            peer(Some("bob"), Some("111")),
            vec![text("bob", "hi")],
        )
        .with_conversation(
            conversation(2, "Team", true, false),
            peer(None, None),
            vec![text("carol", "hi")],
        )
        .with_conversation(
            conversation(3, "News", false, true),
            peer(None, None),
            vec![text("news", "hi")],
        )
        .with_conversation(
            conversation(4, "Supergroup", true, true),
            peer(None, None),
            vec![text("dave", "hi")],
        )
        .with_conversation(
            conversation(5, "", false, false),
            peer(None, None),
            vec![text("ghost", "hi")],
        );
    let connector = FakeConnector::new().with_account("alice", script);
    let storage = FakeStorage::new();
    let (temp, _log) = workspace(&[]);

    let exporter = Exporter::new(&connector, &storage, PARENT);
    let session = Session::new("alice", temp.path());
    let report = exporter.export_session(&session).await.unwrap();

    assert_eq!(report.exported, 1);
    assert_eq!(storage.file_names(&report.folder_id), vec!["Bob - bob - +111.txt"]);

    let events = connector.events();
    assert!(events.contains(&"messages:alice:1".to_string()));
    for id in 2..=5 {
        assert!(!events.contains(&format!("messages:alice:{}", id)));
        assert!(!events.contains(&format!("peer:alice:{}", id)));
    }
}

#[tokio::test]
async fn test_export_skips_histories_without_text() {
    let script = AccountScript::new(account(None, Some("Alice")))
        .with_conversation(
            conversation(1, "New Contact", false, false),
            peer(Some("newbie"), None),
            vec![service("newbie")],
        )
        .with_conversation(conversation(2, "Silent", false, false), peer(None, None), vec![])
        .with_conversation(
            conversation(3, "Pinned", false, false),
            peer(None, Some("+222")),
            vec![service("pins"), service("pins")],
        );
    let connector = FakeConnector::new().with_account("alice", script);
    let storage = FakeStorage::new();
    let (temp, _log) = workspace(&[]);

    let exporter = Exporter::new(&connector, &storage, PARENT);
    let report = exporter
        .export_session(&Session::new("alice", temp.path()))
        .await
        .unwrap();

    assert_eq!(report.account, "Alice");
    assert_eq!(report.skipped, 2);
    assert_eq!(report.exported, 1);
    assert_eq!(storage.file_names(&report.folder_id), vec!["Pinned - None - +222.txt"]);

    let pinned = storage
        .children(&report.folder_id)
        .into_iter()
        .next()
        .unwrap();
    assert_eq!(pinned.content.as_deref(), Some("pins: \npins: \n"));
}

#[tokio::test]
async fn test_export_single_session_mixed_conversations() {
    let script = AccountScript::new(account(Some("alice_tg"), None))
        .with_conversation(
            conversation(1, "Mario Rossi", false, false),
            peer(Some("mrossi"), Some("393331112222")),
            vec![
                text("mrossi", "first"),
                text("alice_tg", "second"),
                text("mrossi", "third"),
            ],
        )
        .with_conversation(
            conversation(2, "Joined", false, false),
            peer(Some("joined"), None),
            vec![service("joined")],
        )
        .with_conversation(
            conversation(3, "Family", true, false),
            peer(None, None),
            vec![text("mum", "dinner?")],
        );
    let connector = FakeConnector::new().with_account("alice", script);
    let storage = FakeStorage::new();
    let (temp, log) = workspace(&["alice"]);
    let sessions = discover_sessions(&temp.path().join("sessions")).unwrap();

    let summary = Exporter::new(&connector, &storage, PARENT)
        .run(&sessions, &log)
        .await
        .unwrap();

    assert_eq!(summary.exported, 1);
    assert_eq!(summary.skipped, 1);

    let folder = storage.folder(PARENT, "alice_tg").unwrap();
    let files = storage.children(&folder.id);
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].name, "Mario Rossi - mrossi - +393331112222.txt");

    let content = files[0].content.clone().unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines, vec!["mrossi: first", "alice_tg: second", "mrossi: third"]);
}

#[tokio::test]
async fn test_export_two_sessions_end_to_end() {
    let bob = AccountScript::new(account(None, Some("Bob"))).with_conversation(
        conversation(9, "Alice", false, false),
        peer(Some("alice_tg"), Some("333")),
        vec![text("alice_tg", "ping")],
    );
    let connector = FakeConnector::new()
        .with_account("alice", alice())
        .with_account("bob", bob);
    let storage = FakeStorage::new();
    let (temp, log) = workspace(&["bob", "alice"]);
    fs::write(temp.path().join("sessions").join("notes.txt"), b"").unwrap();

    let sessions = discover_sessions(&temp.path().join("sessions")).unwrap();
    let exporter = Exporter::new(&connector, &storage, PARENT);
    let summary = exporter.run(&sessions, &log).await.unwrap();

    assert_eq!(summary.sessions, 2);
    assert_eq!(summary.exported, 2);
    assert_eq!(summary.skipped, 0);

    let alice_folder = storage.folder(PARENT, "alice_tg").unwrap();
    let bob_folder = storage.folder(PARENT, "Bob").unwrap();
    assert_eq!(
        storage.file_names(&alice_folder.id),
        vec!["Bob Builder - bob - +111.txt"]
    );
    assert_eq!(storage.file_names(&bob_folder.id), vec!["Alice - alice_tg - +333.txt"]);

    let transcript = storage.children(&alice_folder.id).remove(0);
    assert_eq!(transcript.content.as_deref(), Some("bob: hi\nalice_tg: hello\n"));

    assert_eq!(storage.file_names(PARENT), vec!["log_2024-05-01_10-30.txt"]);
    let uploaded_log = storage
        .children(PARENT)
        .into_iter()
        .find(|f| !f.is_folder)
        .unwrap();
    assert_eq!(summary.log_file_id.as_deref(), Some(uploaded_log.id.as_str()));
    assert!(uploaded_log
        .content
        .unwrap()
        .contains("Starting chat export"));

    let connects: Vec<String> = connector
        .events()
        .into_iter()
        .filter(|e| e.starts_with("connect:") || e.starts_with("disconnect:"))
        .collect();
    assert_eq!(
        connects,
        vec!["connect:alice", "disconnect:alice", "connect:bob", "disconnect:bob"]
    );
}

#[tokio::test]
async fn test_export_without_sessions_uploads_only_log() {
    let connector = FakeConnector::new();
    let storage = FakeStorage::new();
    let (temp, log) = workspace(&[]);

    let sessions = discover_sessions(&temp.path().join("sessions")).unwrap();
    assert!(sessions.is_empty());

    let summary = Exporter::new(&connector, &storage, PARENT)
        .run(&sessions, &log)
        .await
        .unwrap();

    assert_eq!(summary.sessions, 0);
    assert!(connector.events().is_empty());
    assert_eq!(storage.children(PARENT).len(), 1);
    assert_eq!(storage.file_names(PARENT), vec!["log_2024-05-01_10-30.txt"]);
}

#[tokio::test]
async fn test_export_rerun_replaces_folder_contents() {
    let connector = FakeConnector::new().with_account("alice", alice());
    let storage = FakeStorage::new();
    let (temp, log) = workspace(&["alice"]);
    let sessions = discover_sessions(&temp.path().join("sessions")).unwrap();
    let exporter = Exporter::new(&connector, &storage, PARENT);

    exporter.run(&sessions, &log).await.unwrap();
    let first = storage.folder(PARENT, "alice_tg").unwrap();
    exporter.run(&sessions, &log).await.unwrap();
    let second = storage.folder(PARENT, "alice_tg").unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(storage.file_names(&second.id), vec!["Bob Builder - bob - +111.txt"]);
    let folders = storage
        .children(PARENT)
        .into_iter()
        .filter(|f| f.is_folder)
        .count();
    assert_eq!(folders, 1);
}

#[tokio::test]
async fn test_export_disconnects_when_upload_fails() {
    let connector = FakeConnector::new().with_account("alice", alice());
    let storage = FakeStorage::failing_uploads();
    let (temp, log) = workspace(&["alice"]);
    let sessions = discover_sessions(&temp.path().join("sessions")).unwrap();

    let result = Exporter::new(&connector, &storage, PARENT)
        .run(&sessions, &log)
        .await;

    assert!(matches!(result, Err(Error::DriveError(_))));
    assert!(connector.events().contains(&"disconnect:alice".to_string()));
    assert!(storage.file_names(PARENT).is_empty());
}

#[tokio::test]
async fn test_export_stops_at_unusable_session() {
    let connector = FakeConnector::new().with_account("zed", alice());
    let storage = FakeStorage::new();
    let (temp, log) = workspace(&["broken", "zed"]);
    let sessions = discover_sessions(&temp.path().join("sessions")).unwrap();

    let result = Exporter::new(&connector, &storage, PARENT)
        .run(&sessions, &log)
        .await;

    assert!(matches!(result, Err(Error::SessionNotFound(ref name)) if name == "broken"));
    assert_eq!(connector.events(), vec!["connect:broken"]);
    assert!(storage.children(PARENT).is_empty());
}

#[tokio::test]
async fn test_export_keeps_single_uncaptioned_media_message() {
    let script = AccountScript::new(account(Some("alice_tg"), None))
        .with_conversation(
            conversation(1, "Photographer", false, false),
            peer(Some("lens"), Some("555")),
            vec![uncaptioned("lens")],
        )
        .with_conversation(
            conversation(2, "Joined", false, false),
            peer(Some("joined"), None),
            vec![service("joined")],
        );
    let connector = FakeConnector::new().with_account("alice", script);
    let storage = FakeStorage::new();
    let (temp, _log) = workspace(&[]);

    let report = Exporter::new(&connector, &storage, PARENT)
        .export_session(&Session::new("alice", temp.path()))
        .await
        .unwrap();

    assert_eq!(report.exported, 1);
    assert_eq!(report.skipped, 1);
    let files = storage.children(&report.folder_id);
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].name, "Photographer - lens - +555.txt");
    assert_eq!(files[0].content.as_deref(), Some("lens: \n"));
}
