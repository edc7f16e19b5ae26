use hearth_db::{time, Database};
use uuid::Uuid;

fn uid() -> String {
    Uuid::new_v4().to_string()
}

fn add_profile(db: &Database, name: &str, child: bool) -> String {
    let id = uid();
    db.create_profile(&id, name, "argon2-hash", child).unwrap();
    id
}

fn add_member(db: &Database, profile: &str, family: &str, role: &str) {
    db.upsert_membership(profile, family, role, false, false).unwrap();
}

struct Family {
    id: String,
    parent_a: String,
    parent_b: String,
}

fn family(db: &Database) -> Family {
    let id = uid();
    let parent_a = add_profile(db, &format!("ana-{}", &id[..8]), false);
    let parent_b = add_profile(db, &format!("ben-{}", &id[..8]), false);
    add_member(db, &parent_a, &id, "parent");
    add_member(db, &parent_b, &id, "parent");
    Family { id, parent_a, parent_b }
}

#[test]
fn direct_thread_identity_is_order_independent() {
    let db = Database::open_in_memory().unwrap();
    let f = family(&db);

    let t1 = db
        .get_or_create_direct_thread(&uid(), &f.id, &f.parent_a, &f.parent_b)
        .unwrap();
    let t2 = db
        .get_or_create_direct_thread(&uid(), &f.id, &f.parent_b, &f.parent_a)
        .unwrap();

    assert_eq!(t1.id, t2.id);
}

#[test]
fn losing_a_direct_thread_race_reuses_the_winner() {
    let db = Database::open_in_memory().unwrap();
    let f = family(&db);

    // Two callers race with different candidate ids; the unique index makes
    // the second insert a no-op and the re-select returns the first row.
    let winner_id = uid();
    let loser_id = uid();
    let winner = db
        .get_or_create_direct_thread(&winner_id, &f.id, &f.parent_a, &f.parent_b)
        .unwrap();
    let loser = db
        .get_or_create_direct_thread(&loser_id, &f.id, &f.parent_b, &f.parent_a)
        .unwrap();

    assert_eq!(winner.id, winner_id);
    assert_eq!(loser.id, winner_id);
    assert_ne!(loser.id, loser_id);
}

#[test]
fn family_channel_is_a_singleton() {
    let db = Database::open_in_memory().unwrap();
    let f = family(&db);

    let c1 = db.get_or_create_family_channel(&uid(), &f.id).unwrap();
    let c2 = db.get_or_create_family_channel(&uid(), &f.id).unwrap();
    assert_eq!(c1.id, c2.id);

    // A different family gets its own channel.
    let g = family(&db);
    let other = db.get_or_create_family_channel(&uid(), &g.id).unwrap();
    assert_ne!(other.id, c1.id);
}

#[test]
fn group_chat_creation_writes_thread_and_participants_together() {
    let db = Database::open_in_memory().unwrap();
    let f = family(&db);
    let kid = add_profile(&db, "cleo", true);
    db.upsert_membership(&kid, &f.id, "child", true, true).unwrap();

    let participants = vec![f.parent_a.clone(), f.parent_b.clone(), kid.clone()];
    let thread = db
        .create_group_chat(&uid(), &f.id, "School run", &participants)
        .unwrap();

    for p in &participants {
        assert!(db.is_thread_participant(&thread, p).unwrap());
    }
    let outsider = add_profile(&db, "dora", false);
    assert!(!db.is_thread_participant(&thread, &outsider).unwrap());
}

#[test]
fn thread_listing_covers_all_three_kinds() {
    let db = Database::open_in_memory().unwrap();
    let f = family(&db);

    db.get_or_create_family_channel(&uid(), &f.id).unwrap();
    let dm = db
        .get_or_create_direct_thread(&uid(), &f.id, &f.parent_a, &f.parent_b)
        .unwrap();
    let group = db
        .create_group_chat(&uid(), &f.id, "Dinner", &[f.parent_a.clone()])
        .unwrap();

    let threads = db.list_threads_for_user(&f.parent_a, &f.id).unwrap();
    let ids: Vec<&str> = threads.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(threads.len(), 3);
    assert!(ids.contains(&dm.id.as_str()));
    assert!(ids.contains(&group.id.as_str()));

    // parent_b is not in the group chat, so they see two threads.
    let threads_b = db.list_threads_for_user(&f.parent_b, &f.id).unwrap();
    assert_eq!(threads_b.len(), 2);
}

#[test]
fn history_preserves_append_order_even_with_equal_timestamps() {
    let db = Database::open_in_memory().unwrap();
    let f = family(&db);
    let thread = db.get_or_create_family_channel(&uid(), &f.id).unwrap();

    let ts = time::now_ts();
    let mut expected = Vec::new();
    for i in 0..5 {
        let id = uid();
        db.insert_message(&id, &thread.id, &f.parent_a, "parent", &format!("m{}", i), &ts)
            .unwrap();
        expected.push(id);
    }

    let history = db.get_history(&thread.id).unwrap();
    let got: Vec<String> = history.into_iter().map(|m| m.id).collect();
    assert_eq!(got, expected);
}

#[test]
fn mark_read_is_idempotent_and_skips_the_sender() {
    let db = Database::open_in_memory().unwrap();
    let f = family(&db);
    let thread = db.get_or_create_family_channel(&uid(), &f.id).unwrap();

    let msg = uid();
    db.insert_message(&msg, &thread.id, &f.parent_a, "parent", "hi", &time::now_ts())
        .unwrap();

    // First read creates the row, repeats are no-ops.
    assert!(db.insert_receipt(&msg, &f.parent_b, &time::now_ts()).unwrap());
    assert!(!db.insert_receipt(&msg, &f.parent_b, &time::now_ts()).unwrap());
    assert!(!db.insert_receipt(&msg, &f.parent_b, &time::now_ts()).unwrap());

    // The sender never receipts their own message.
    assert!(!db.insert_receipt(&msg, &f.parent_a, &time::now_ts()).unwrap());

    let receipts = db.receipts_for_messages(&[msg.clone()]).unwrap();
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0].reader_id, f.parent_b);
}

#[test]
fn unread_counts_follow_messages_and_receipts() {
    let db = Database::open_in_memory().unwrap();
    let f = family(&db);
    let channel = db.get_or_create_family_channel(&uid(), &f.id).unwrap();
    let dm = db
        .get_or_create_direct_thread(&uid(), &f.id, &f.parent_a, &f.parent_b)
        .unwrap();

    let m1 = uid();
    db.insert_message(&m1, &channel.id, &f.parent_a, "parent", "Pickup at 6pm", &time::now_ts())
        .unwrap();
    let m2 = uid();
    db.insert_message(&m2, &dm.id, &f.parent_a, "parent", "Also milk", &time::now_ts())
        .unwrap();
    // parent_b's own message never counts against them
    let m3 = uid();
    db.insert_message(&m3, &dm.id, &f.parent_b, "parent", "ok", &time::now_ts())
        .unwrap();

    let unread = db.unread_by_thread(&f.parent_b, &f.id).unwrap();
    let total: u64 = unread.iter().map(|u| u.count).sum();
    assert_eq!(total, 2);
    assert!(unread.iter().any(|u| u.thread_id == channel.id && u.count == 1));
    assert!(unread.iter().any(|u| u.thread_id == dm.id && u.count == 1));

    // Reading everything drives the aggregate to zero.
    db.insert_receipt(&m1, &f.parent_b, &time::now_ts()).unwrap();
    db.insert_receipt(&m2, &f.parent_b, &time::now_ts()).unwrap();
    assert!(db.unread_by_thread(&f.parent_b, &f.id).unwrap().is_empty());
}

#[test]
fn unread_recency_uses_newest_unread_message() {
    let db = Database::open_in_memory().unwrap();
    let f = family(&db);
    let channel = db.get_or_create_family_channel(&uid(), &f.id).unwrap();

    db.insert_message(&uid(), &channel.id, &f.parent_a, "parent", "old", "2025-03-01T08:00:00.000Z")
        .unwrap();
    db.insert_message(&uid(), &channel.id, &f.parent_a, "parent", "new", "2025-03-02T09:30:00.000Z")
        .unwrap();

    let unread = db.unread_by_thread(&f.parent_b, &f.id).unwrap();
    assert_eq!(unread.len(), 1);
    assert_eq!(unread[0].count, 2);
    assert_eq!(unread[0].last_message_at, "2025-03-02T09:30:00.000Z");
}

#[test]
fn unread_ignores_other_peoples_direct_threads() {
    let db = Database::open_in_memory().unwrap();
    let f = family(&db);
    let third = add_profile(&db, "cleo-adult", false);
    add_member(&db, &third, &f.id, "third_party");

    let dm = db
        .get_or_create_direct_thread(&uid(), &f.id, &f.parent_a, &f.parent_b)
        .unwrap();
    db.insert_message(&uid(), &dm.id, &f.parent_a, "parent", "private", &time::now_ts())
        .unwrap();

    // The third party is not a participant of that direct thread.
    assert!(db.unread_by_thread(&third, &f.id).unwrap().is_empty());
}

#[test]
fn typing_is_throttled_filtered_and_clearable() {
    let db = Database::open_in_memory().unwrap();
    let f = family(&db);
    let thread = db.get_or_create_family_channel(&uid(), &f.id).unwrap();

    // First write lands, an immediate refresh is throttled.
    assert!(db.set_typing(&thread.id, &f.parent_a).unwrap());
    assert!(!db.set_typing(&thread.id, &f.parent_a).unwrap());

    // Readers never see their own indicator.
    assert!(db.list_typing(&thread.id, &f.parent_a).unwrap().is_empty());
    let seen_by_b = db.list_typing(&thread.id, &f.parent_b).unwrap();
    assert_eq!(seen_by_b.len(), 1);
    assert_eq!(seen_by_b[0].profile_id, f.parent_a);

    // Send path: explicit clear removes the indicator immediately.
    assert!(db.clear_typing(&thread.id, &f.parent_a).unwrap());
    assert!(db.list_typing(&thread.id, &f.parent_b).unwrap().is_empty());
    assert!(!db.clear_typing(&thread.id, &f.parent_a).unwrap());
}

#[test]
fn stale_typing_rows_disappear_without_a_cleanup_write() {
    let db = Database::open_in_memory().unwrap();
    let f = family(&db);
    let thread = db.get_or_create_family_channel(&uid(), &f.id).unwrap();

    // Simulate a crashed client: a row whose owner never cleaned up.
    db.with_conn_mut(|conn| {
        conn.execute(
            "INSERT INTO typing_indicators (thread_id, profile_id, started_at)
             VALUES (?1, ?2, '2020-01-01T00:00:00.000Z')",
            rusqlite::params![thread.id, f.parent_a],
        )?;
        Ok(())
    })
    .unwrap();

    assert!(db.list_typing(&thread.id, &f.parent_b).unwrap().is_empty());
}

#[test]
fn membership_roles_are_scoped_per_family() {
    let db = Database::open_in_memory().unwrap();
    let f = family(&db);
    let g = family(&db);

    // Same profile, different role in another family.
    add_member(&db, &f.parent_a, &g.id, "third_party");

    let in_f = db.membership_for(&f.parent_a, &f.id).unwrap().unwrap();
    let in_g = db.membership_for(&f.parent_a, &g.id).unwrap().unwrap();
    assert_eq!(in_f.role, "parent");
    assert_eq!(in_g.role, "third_party");

    // No membership at all -> None, not an error.
    let stranger = add_profile(&db, "nobody", false);
    assert!(db.membership_for(&stranger, &f.id).unwrap().is_none());
}

#[test]
fn recipients_exclude_the_sender() {
    let db = Database::open_in_memory().unwrap();
    let f = family(&db);
    let channel = db.get_or_create_family_channel(&uid(), &f.id).unwrap();

    let recipients = db.thread_recipient_ids(&channel, &f.parent_a).unwrap();
    assert_eq!(recipients, vec![f.parent_b.clone()]);

    let dm = db
        .get_or_create_direct_thread(&uid(), &f.id, &f.parent_a, &f.parent_b)
        .unwrap();
    let recipients = db.thread_recipient_ids(&dm, &f.parent_b).unwrap();
    assert_eq!(recipients, vec![f.parent_a.clone()]);
}
