use parley_db::Database;
use parley_db::models::NewMessageRow;

fn open_temp() -> (tempfile::TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(&dir.path().join("archive.db")).unwrap();
    (dir, db)
}

fn row(from: &str, to: &str, sent_at_ms: i64, body: &str) -> NewMessageRow {
    NewMessageRow {
        from_jid: from.into(),
        to_jid: to.into(),
        sent_at_ms,
        message_type: 1,
        body: Some(body.into()),
        media_name: None,
        media_location: None,
        file_name: None,
        file_location: None,
    }
}

#[test]
fn conversation_is_symmetric_and_ordered() {
    let (_dir, db) = open_temp();
    let alice = "alice@example.com";
    let bob = "bob@example.com";

    db.append_message(&row(bob, alice, 300, "third")).unwrap();
    db.append_message(&row(alice, bob, 100, "first")).unwrap();
    db.append_message(&row(alice, "carol@example.com", 150, "other")).unwrap();
    db.append_message(&row(bob, alice, 200, "second")).unwrap();

    let ab: Vec<_> = db
        .conversation(alice, bob)
        .unwrap()
        .into_iter()
        .map(|r| r.body.unwrap())
        .collect();
    let ba: Vec<_> = db
        .conversation(bob, alice)
        .unwrap()
        .into_iter()
        .map(|r| r.body.unwrap())
        .collect();

    assert_eq!(ab, vec!["first", "second", "third"]);
    assert_eq!(ab, ba);
}

#[test]
fn equal_timestamps_keep_insertion_order() {
    let (_dir, db) = open_temp();
    for body in ["a", "b", "c"] {
        db.append_message(&row("x@d", "y@d", 42, body)).unwrap();
    }

    let bodies: Vec<_> = db
        .conversation("y@d", "x@d")
        .unwrap()
        .into_iter()
        .map(|r| r.body.unwrap())
        .collect();
    assert_eq!(bodies, vec!["a", "b", "c"]);
}

#[test]
fn append_returns_increasing_ids_and_keeps_attachments() {
    let (_dir, db) = open_temp();
    let first = db.append_message(&row("x@d", "y@d", 1, "hi")).unwrap();

    let mut with_file = row("x@d", "y@d", 2, "see attached");
    with_file.message_type = 6;
    with_file.file_name = Some("f.pdf".into());
    with_file.file_location = Some("/srv/files/f.pdf".into());
    let second = db.append_message(&with_file).unwrap();
    assert!(second > first);

    let rows = db.conversation("x@d", "y@d").unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].id, second);
    assert_eq!(rows[1].message_type, 6);
    assert_eq!(rows[1].file_location.as_deref(), Some("/srv/files/f.pdf"));
    assert!(rows[1].media_name.is_none());
}

#[test]
fn empty_conversation_is_not_an_error() {
    let (_dir, db) = open_temp();
    assert!(db.conversation("a@d", "b@d").unwrap().is_empty());
}

#[test]
fn reopening_keeps_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("archive.db");
    {
        let db = Database::open(&path).unwrap();
        db.append_message(&row("x@d", "y@d", 1, "persisted")).unwrap();
    }
    let db = Database::open(&path).unwrap();
    assert_eq!(db.conversation("x@d", "y@d").unwrap().len(), 1);
}
