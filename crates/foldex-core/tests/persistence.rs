//! Summaries saved to an on-disk database and loaded back.

use chrono::{TimeZone, Utc};
use foldex_core::summary::SUMMARY_VERSION;
use foldex_core::{
    CancellationToken, Counters, Error, Folder, MailFolder, MessageRecord, RecordBackend,
    SqliteBackend, SummaryHeader, SystemFlags,
};

fn database(dir: &tempfile::TempDir) -> String {
    dir.path().join("index.db").to_string_lossy().into_owned()
}

fn populated() -> Folder {
    let folder = Folder::new("INBOX");
    let sent = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
    folder.insert(
        MessageRecord::new("1")
            .with_flags(SystemFlags::SEEN)
            .with_subject("Quarterly report")
            .with_from("alice@example.com")
            .with_size(4096)
            .with_dates(sent, sent)
            .with_thread("<a@example.com>", Vec::new()),
    );
    folder.insert(
        MessageRecord::new("2")
            .with_subject("Re: Quarterly report")
            .with_thread("<b@example.com>", vec!["<a@example.com>".to_string()]),
    );
    folder.insert(MessageRecord::new("3").with_flags(SystemFlags::JUNK));
    folder.set_user_flag("2", "work", true);
    folder.set_user_tag("2", "follow-up", Some("friday"));
    folder
}

#[tokio::test]
async fn roundtrip_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = database(&dir);

    {
        let backend = SqliteBackend::new(&path).await.unwrap();
        let folder = populated();
        folder.summary().set_extra("high=3;low=1");
        assert_eq!(folder.save(&backend).await.unwrap(), 3);
        assert!(!folder.summary().is_dirty());
    }

    let backend = SqliteBackend::new(&path).await.unwrap();
    let loaded = Folder::new("INBOX");
    loaded.load(&backend).await.unwrap();

    let original = populated();
    assert_eq!(loaded.uids(), original.uids());
    assert_eq!(loaded.counters(), original.counters());
    for uid in original.uids() {
        assert_eq!(loaded.get(&uid), original.get(&uid), "record {uid}");
    }
    assert_eq!(loaded.summary().extra(), "high=3;low=1");

    let cancel = CancellationToken::new();
    let replies = loaded
        .search(r#"(match-threads "replies" (uid "1"))"#, None, &cancel)
        .unwrap();
    assert_eq!(replies, vec!["1", "2"]);
}

#[tokio::test]
async fn incremental_save_writes_only_changes() {
    let dir = tempfile::tempdir().unwrap();
    let backend = SqliteBackend::new(&database(&dir)).await.unwrap();

    let folder = populated();
    folder.save(&backend).await.unwrap();
    assert_eq!(folder.save(&backend).await.unwrap(), 0);

    folder.set_flags("2", SystemFlags::SEEN, SystemFlags::SEEN);
    folder.remove("3");
    assert_eq!(folder.save(&backend).await.unwrap(), 2);

    let loaded = Folder::new("INBOX");
    loaded.load(&backend).await.unwrap();
    assert_eq!(loaded.uids(), vec!["1", "2"]);
    assert_eq!(loaded.counters().unread, 0);
}

#[tokio::test]
async fn newer_format_is_rejected_without_partial_state() {
    let dir = tempfile::tempdir().unwrap();
    let backend = SqliteBackend::new(&database(&dir)).await.unwrap();

    populated().save(&backend).await.unwrap();
    backend
        .set_header(
            "INBOX",
            &SummaryHeader {
                version: SUMMARY_VERSION + 1,
                saved_at: Utc::now(),
                counters: Counters::default(),
                extra: String::new(),
            },
        )
        .await
        .unwrap();

    let folder = Folder::new("INBOX");
    folder.insert(MessageRecord::new("42"));
    let err = folder.load(&backend).await.unwrap_err();
    assert!(matches!(
        err,
        Error::IncompatibleFormat { found, supported }
            if found == SUMMARY_VERSION + 1 && supported == SUMMARY_VERSION
    ));
    assert_eq!(folder.uids(), vec!["42"]);
}

#[tokio::test]
async fn folders_share_one_database() {
    let backend = SqliteBackend::in_memory().await.unwrap();

    let inbox = populated();
    let archive = Folder::new("Archive");
    archive.insert(MessageRecord::new("1").with_subject("old"));
    inbox.save(&backend).await.unwrap();
    archive.save(&backend).await.unwrap();

    let loaded = Folder::new("Archive");
    loaded.load(&backend).await.unwrap();
    assert_eq!(loaded.uids(), vec!["1"]);
    assert_eq!(loaded.get("1").unwrap().subject, "old");

    let never_saved = Folder::new("Drafts");
    never_saved.load(&backend).await.unwrap();
    assert!(never_saved.uids().is_empty());
}
