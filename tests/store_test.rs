// Tests for the persistence store

use taskbot_core::db::models::{Assignment, EmojiAction, TaskStatus, TaskUpdate};
use taskbot_core::db::PersistenceStore;
use taskbot_core::Error;
use tempfile::TempDir;

async fn create_test_store() -> (PersistenceStore, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let store = PersistenceStore::open(db_path).await.unwrap();
    (store, temp_dir)
}

#[tokio::test]
async fn test_store_initialization() {
    let (store, _temp) = create_test_store().await;
    assert!(store.db().path().contains("test.db"));
    assert!(store.db().health_check().await.unwrap());
}

#[tokio::test]
async fn test_store_from_existing_database() {
    let temp_dir = TempDir::new().unwrap();
    let db = taskbot_core::Database::new(temp_dir.path().join("test.db")).unwrap();

    let store = PersistenceStore::new(db.clone());
    store.startup().await.unwrap();

    let project = store.add_project("a", "A", "", 1).await.unwrap();
    assert_eq!(project.id, 1);
    assert!(db.health_check().await.unwrap());
}

#[tokio::test]
async fn test_project_ids_are_monotonic() {
    let (store, _temp) = create_test_store().await;

    for n in 1..=4i64 {
        let project = store
            .add_project(&format!("p{n}"), &format!("Project {n}"), "desc", 1000 + n)
            .await
            .unwrap();
        assert_eq!(project.id, n);
    }
}

#[tokio::test]
async fn test_project_ids_survive_restart() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");

    {
        let store = PersistenceStore::open(&db_path).await.unwrap();
        assert_eq!(store.add_project("a", "A", "", 1).await.unwrap().id, 1);
        assert_eq!(store.add_project("b", "B", "", 2).await.unwrap().id, 2);
    }

    // Reopen: counters are reseeded from storage, not from any snapshot
    let store = PersistenceStore::open(&db_path).await.unwrap();
    assert_eq!(store.add_project("c", "C", "", 3).await.unwrap().id, 3);
}

#[tokio::test]
async fn test_task_numbers_are_per_project() {
    let (store, _temp) = create_test_store().await;

    let a = store.add_project("a", "A", "", 1).await.unwrap();
    let b = store.add_project("b", "B", "", 2).await.unwrap();

    // Interleave creation across the two projects
    let a1 = store.add_task(a.id, "a1", "").await.unwrap();
    let b1 = store.add_task(b.id, "b1", "").await.unwrap();
    let a2 = store.add_task(a.id, "a2", "").await.unwrap();
    let b2 = store.add_task(b.id, "b2", "").await.unwrap();

    assert_eq!((a1.number, a2.number), (1, 2));
    assert_eq!((b1.number, b2.number), (1, 2));

    // Global task ids are still unique
    let mut ids = vec![a1.id, b1.id, a2.id, b2.id];
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 4);
}

#[tokio::test]
async fn test_task_numbers_survive_restart() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");

    let project_id = {
        let store = PersistenceStore::open(&db_path).await.unwrap();
        let project = store.add_project("a", "A", "", 1).await.unwrap();
        store.add_task(project.id, "first", "").await.unwrap();
        project.id
    };

    let store = PersistenceStore::open(&db_path).await.unwrap();
    let task = store.add_task(project_id, "second", "").await.unwrap();
    assert_eq!(task.number, 2);
}

#[tokio::test]
async fn test_add_task_round_trip() {
    let (store, _temp) = create_test_store().await;
    let project = store.add_project("a", "A", "", 1).await.unwrap();

    let created = store
        .add_task(project.id, "Fix the login flow", "Session expires too early")
        .await
        .unwrap();

    assert_eq!(created.status, TaskStatus::Pending);
    assert_eq!(created.assigned_to, None);
    assert_eq!(created.message_id, None);
    assert!(!created.has_thread);

    let fetched = store.get_task_by_id(created.id).await.unwrap().unwrap();
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn test_add_task_for_unknown_project_fails() {
    let (store, _temp) = create_test_store().await;

    let err = store.add_task(99, "t", "").await.unwrap_err();
    assert!(matches!(err, Error::UnknownCacheKey(_)));
}

#[tokio::test]
async fn test_channel_exclusivity() {
    let (store, _temp) = create_test_store().await;
    store.add_project("a", "A", "", 42).await.unwrap();

    let err = store.add_project("b", "B", "", 42).await.unwrap_err();
    assert!(matches!(err, Error::ChannelAlreadyInUse(42)));

    // No row was created and no project id was consumed
    assert!(store.get_project_by_tag("b").await.unwrap().is_none());
    let c = store.add_project("c", "C", "", 43).await.unwrap();
    assert_eq!(c.id, 2);
}

#[tokio::test]
async fn test_tag_collision_rolls_back_counter() {
    let (store, _temp) = create_test_store().await;
    store.add_project("a", "A", "", 1).await.unwrap();

    // Same tag, different channel: the UNIQUE violation surfaces unwrapped
    let err = store.add_project("a", "A again", "", 2).await.unwrap_err();
    assert!(matches!(err, Error::Sqlite(_)));

    // The transaction rolled back, so the next project still gets id 2
    let b = store.add_project("b", "B", "", 2).await.unwrap();
    assert_eq!(b.id, 2);
}

#[tokio::test]
async fn test_is_channel_in_use() {
    let (store, _temp) = create_test_store().await;
    store.add_project("a", "A", "", 7).await.unwrap();

    assert!(store.is_channel_in_use(7).await.unwrap());
    assert!(!store.is_channel_in_use(8).await.unwrap());
}

#[tokio::test]
async fn test_get_project_lookups() {
    let (store, _temp) = create_test_store().await;
    let created = store.add_project("a", "A", "desc", 7).await.unwrap();

    let by_tag = store.get_project_by_tag("a").await.unwrap().unwrap();
    let by_id = store.get_project_by_id(created.id).await.unwrap().unwrap();
    let by_channel = store.get_project_by_channel(7).await.unwrap().unwrap();

    assert_eq!(by_tag, created);
    assert_eq!(by_id, created);
    assert_eq!(by_channel, created);

    assert!(store.get_project_by_tag("missing").await.unwrap().is_none());
    assert!(store.get_project_by_id(99).await.unwrap().is_none());
    assert!(store.get_project_by_channel(99).await.unwrap().is_none());
}

#[tokio::test]
async fn test_update_project() {
    let (store, _temp) = create_test_store().await;
    store.add_project("a", "A", "old desc", 1).await.unwrap();

    let updated = store
        .update_project("a", Some("New Name"), None)
        .await
        .unwrap();
    assert_eq!(updated.display_name, "New Name");
    assert_eq!(updated.description, "old desc");

    // Empty strings leave fields untouched
    let unchanged = store.update_project("a", Some(""), Some("")).await.unwrap();
    assert_eq!(unchanged.display_name, "New Name");
    assert_eq!(unchanged.description, "old desc");
}

#[tokio::test]
async fn test_update_unknown_project_fails() {
    let (store, _temp) = create_test_store().await;
    let err = store.update_project("ghost", Some("x"), None).await.unwrap_err();
    assert!(matches!(err, Error::ProjectDoesNotExist(_)));
}

#[tokio::test]
async fn test_update_unknown_task_fails() {
    let (store, _temp) = create_test_store().await;
    let err = store.update_task(99, TaskUpdate::default()).await.unwrap_err();
    assert!(matches!(err, Error::TaskDoesNotExist(99)));
}

#[tokio::test]
async fn test_partial_update_no_ops() {
    let (store, _temp) = create_test_store().await;
    let project = store.add_project("a", "A", "", 1).await.unwrap();
    let task = store.add_task(project.id, "title", "desc").await.unwrap();

    // Empty title leaves the task unchanged
    let after_empty = store
        .update_task(
            task.id,
            TaskUpdate {
                title: Some(String::new()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(after_empty, task);

    // Bogus status is silently ignored, not an error
    let after_bogus = store
        .update_task(
            task.id,
            TaskUpdate {
                status: Some("bogus".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(after_bogus.status, TaskStatus::Pending);

    let stored = store.get_task_by_id(task.id).await.unwrap().unwrap();
    assert_eq!(stored, task);
}

#[tokio::test]
async fn test_status_updates_are_unordered() {
    let (store, _temp) = create_test_store().await;
    let project = store.add_project("a", "A", "", 1).await.unwrap();
    let task = store.add_task(project.id, "t", "").await.unwrap();

    // Any of the four values may be set at any time
    for status in ["done", "in_progress", "pending_merge", "pending"] {
        let updated = store
            .update_task(
                task.id,
                TaskUpdate {
                    status: Some(status.to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status.as_str(), status);
    }
}

#[tokio::test]
async fn test_assignment() {
    let (store, _temp) = create_test_store().await;
    let project = store.add_project("a", "A", "", 1).await.unwrap();
    let task = store.add_task(project.id, "t", "").await.unwrap();

    let assigned = store
        .update_task(
            task.id,
            TaskUpdate {
                assigned_to: Some(Assignment::To(777)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(assigned.assigned_to, Some(777));

    let cleared = store
        .update_task(
            task.id,
            TaskUpdate {
                assigned_to: Some(Assignment::Unassigned),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(cleared.assigned_to, None);
}

#[tokio::test]
async fn test_message_id_is_write_once() {
    let (store, _temp) = create_test_store().await;
    let project = store.add_project("a", "A", "", 1).await.unwrap();
    let task = store.add_task(project.id, "t", "").await.unwrap();

    store
        .update_task(
            task.id,
            TaskUpdate {
                message_id: Some(555),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let err = store
        .update_task(
            task.id,
            TaskUpdate {
                message_id: Some(556),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CannotBeUpdated("message_id")));

    let stored = store.get_task_by_id(task.id).await.unwrap().unwrap();
    assert_eq!(stored.message_id, Some(555));
}

#[tokio::test]
async fn test_thread_flag_is_write_once() {
    let (store, _temp) = create_test_store().await;
    let project = store.add_project("a", "A", "", 1).await.unwrap();
    let task = store.add_task(project.id, "t", "").await.unwrap();

    store
        .update_task(
            task.id,
            TaskUpdate {
                has_thread: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let err = store
        .update_task(
            task.id,
            TaskUpdate {
                has_thread: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CannotBeUpdated("has_thread")));

    let stored = store.get_task_by_id(task.id).await.unwrap().unwrap();
    assert!(stored.has_thread);
}

#[tokio::test]
async fn test_get_task_by_message_and_thread() {
    let (store, _temp) = create_test_store().await;
    let project = store.add_project("a", "A", "", 1).await.unwrap();
    let task = store.add_task(project.id, "t", "").await.unwrap();

    store
        .update_task(
            task.id,
            TaskUpdate {
                message_id: Some(900),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let by_message = store.get_task_by_message(900).await.unwrap().unwrap();
    assert_eq!(by_message.id, task.id);

    // No thread yet: the thread lookup misses even though the message
    // id matches
    assert!(store.get_task_by_thread(900).await.unwrap().is_none());

    store
        .update_task(
            task.id,
            TaskUpdate {
                has_thread: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let by_thread = store.get_task_by_thread(900).await.unwrap().unwrap();
    assert_eq!(by_thread.id, task.id);
}

#[tokio::test]
async fn test_emoji_seeding_and_order() {
    let (store, _temp) = create_test_store().await;

    let emojis = store.get_emojis().await.unwrap();
    assert_eq!(emojis.len(), EmojiAction::ALL.len());
    for (position, emoji) in emojis.iter().enumerate() {
        assert_eq!(emoji.action, EmojiAction::ALL[position]);
        assert_eq!(emoji.position, position as i64);
        assert_eq!(emoji.emoji, emoji.action.default_glyph());
    }

    let mapping = store.get_task_action_emoji_mapping().await.unwrap();
    assert_eq!(mapping[0], (EmojiAction::Pending, "🔴".to_string()));
    assert_eq!(mapping[7], (EmojiAction::Done, "✅".to_string()));
}

#[tokio::test]
async fn test_emoji_reconciliation_is_idempotent() {
    let (store, _temp) = create_test_store().await;

    let first = store.get_emojis().await.unwrap();
    store.startup().await.unwrap();
    let second = store.get_emojis().await.unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_emoji_customization_survives_reconciliation() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");

    {
        let store = PersistenceStore::open(&db_path).await.unwrap();
        store
            .update_task_action_emoji(EmojiAction::Done, "🎉")
            .await
            .unwrap();
    }

    let store = PersistenceStore::open(&db_path).await.unwrap();
    let done = store
        .get_emoji_by_action(EmojiAction::Done)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(done.emoji, "🎉");
    assert_eq!(done.position, 7);

    // Every other action still carries its default glyph
    let pending = store
        .get_emoji_by_action(EmojiAction::Pending)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pending.emoji, "🔴");
}

#[tokio::test]
async fn test_get_emoji_by_glyph() {
    let (store, _temp) = create_test_store().await;

    let emoji = store.get_emoji_by_glyph("✅").await.unwrap().unwrap();
    assert_eq!(emoji.action, EmojiAction::Done);

    assert!(store.get_emoji_by_glyph("🤖").await.unwrap().is_none());
}

#[tokio::test]
async fn test_update_task_action_emoji_glyph_uniqueness_backstop() {
    let (store, _temp) = create_test_store().await;

    // Reusing a glyph already held by another action trips the storage
    // UNIQUE constraint, surfaced unwrapped
    let err = store
        .update_task_action_emoji(EmojiAction::Pending, "✅")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Sqlite(_)));

    let pending = store
        .get_emoji_by_action(EmojiAction::Pending)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pending.emoji, "🔴");
}
