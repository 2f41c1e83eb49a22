//! Persistence store
//!
//! Owns the database handle and the counter cache, and implements every
//! durable operation: project/task CRUD, id and number generation, emoji
//! reconciliation, and the startup protocol.
//!
//! Counter discipline: an allocation reads the cached counter, writes the
//! incremented value to storage inside the operation's transaction, and
//! updates the cache only after the commit succeeds. A rolled-back
//! transaction therefore leaves both sides unchanged, and a crash between
//! commit and cache write leaves the cache stale, which startup repairs by
//! re-mirroring from storage. Both locks (connection, cache) are held for
//! the whole allocation, so concurrent calls cannot interleave the
//! read-increment-write sequence.

use std::collections::HashMap;
use std::path::Path;

use rusqlite::{params, Connection};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::{CacheValue, CounterCache};
use crate::error::{Error, Result};

use super::connection::Database;
use super::models::{Assignment, Emoji, EmojiAction, Project, Task, TaskStatus, TaskUpdate};

/// Name of the counter row backing global project id allocation. Every
/// other counter row is keyed by a stringified project id.
const PROJECT_ID_COUNT: &str = "PROJECT_ID_COUNT";

const PROJECT_COLUMNS: &str = "tag, id, display_name, description, channel_id";
const TASK_COLUMNS: &str =
    "id, related_project_id, number, title, description, status, assigned_to, message_id, has_thread";

pub struct PersistenceStore {
    db: Database,
    cache: Mutex<CounterCache>,
}

impl PersistenceStore {
    /// Wrap an already-opened database. The store is not usable for
    /// counter allocation until [`startup`](Self::startup) has run.
    pub fn new(db: Database) -> Self {
        Self {
            db,
            cache: Mutex::new(CounterCache::new()),
        }
    }

    /// Open (or create) the database at `path` and run the startup
    /// protocol.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let store = Self::new(Database::new(path)?);
        store.startup().await?;
        Ok(store)
    }

    /// Get the database reference
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Startup self-healing. Idempotent; safe to re-run.
    ///
    /// Seeds the project id counter, ensures a per-project task counter row
    /// exists for every project, reconciles the emoji table against the
    /// canonical action set, then mirrors all counter rows into the cache.
    pub async fn startup(&self) -> Result<()> {
        let mut conn = self.db.lock().await;
        let mut cache = self.cache.lock().await;
        let tx = conn.transaction()?;

        let mut counters: Vec<(String, i64)> = Vec::new();

        let project_count = match read_value(&tx, PROJECT_ID_COUNT)? {
            Some(raw) => parse_counter(PROJECT_ID_COUNT, &raw)?,
            None => {
                tx.execute(
                    r#"INSERT INTO "values" (name, value) VALUES (?1, '0')"#,
                    [PROJECT_ID_COUNT],
                )?;
                0
            }
        };
        counters.push((PROJECT_ID_COUNT.to_string(), project_count));

        // Per-project task counters. A missing row means the process died
        // between creating a project and seeding its counter, or the row
        // predates this schema; either way it restarts at 0.
        let project_ids: Vec<i64> = {
            let mut stmt = tx.prepare("SELECT id FROM projects")?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<i64>>>()?;
            ids
        };
        for project_id in project_ids {
            let key = project_id.to_string();
            let count = match read_value(&tx, &key)? {
                Some(raw) => parse_counter(&key, &raw)?,
                None => {
                    tx.execute(
                        r#"INSERT INTO "values" (name, value) VALUES (?1, '0')"#,
                        [&key],
                    )?;
                    0
                }
            };
            counters.push((key, count));
        }

        // Emoji reconciliation: replace-all-then-reinsert. Customized
        // glyphs survive, missing actions get their default glyph, and
        // positions are reassigned from the canonical order.
        let stored_glyphs: HashMap<String, String> = {
            let mut stmt = tx.prepare("SELECT id, emoji FROM emojis")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<Vec<(String, String)>>>()?;
            rows.into_iter().collect()
        };
        tx.execute("DELETE FROM emojis", [])?;
        for (position, action) in EmojiAction::ALL.iter().enumerate() {
            let glyph = stored_glyphs
                .get(action.as_str())
                .cloned()
                .unwrap_or_else(|| action.default_glyph().to_string());
            tx.execute(
                "INSERT INTO emojis (id, emoji, position) VALUES (?1, ?2, ?3)",
                params![action.as_str(), glyph, position as i64],
            )?;
        }

        tx.commit()?;

        // Cache is mirrored only after the commit. remove-then-add keeps
        // repeated in-process runs idempotent.
        for (key, value) in counters {
            cache.remove(&key);
            cache.add(&key, CacheValue::Int(value))?;
        }

        info!(
            "Persistence store ready, {} counter(s) mirrored",
            cache.len()
        );
        Ok(())
    }

    /// Create a new project bound to `channel_id`.
    ///
    /// The channel binding is pre-checked so the caller gets a descriptive
    /// error before any id is consumed. A tag collision surfaces the
    /// storage uniqueness violation unwrapped and rolls the counter back
    /// with the transaction.
    pub async fn add_project(
        &self,
        tag: &str,
        display_name: &str,
        description: &str,
        channel_id: i64,
    ) -> Result<Project> {
        let mut conn = self.db.lock().await;
        let mut cache = self.cache.lock().await;

        let in_use: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM projects WHERE channel_id = ?1)",
            [channel_id],
            |row| row.get(0),
        )?;
        if in_use {
            return Err(Error::ChannelAlreadyInUse(channel_id));
        }

        let id = counter_value(&cache, PROJECT_ID_COUNT)? + 1;

        let tx = conn.transaction()?;
        tx.execute(
            r#"UPDATE "values" SET value = ?1 WHERE name = ?2"#,
            params![id.to_string(), PROJECT_ID_COUNT],
        )?;
        tx.execute(
            "INSERT INTO projects (tag, id, display_name, description, channel_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![tag, id, display_name, description, channel_id],
        )?;
        tx.execute(
            r#"INSERT INTO "values" (name, value) VALUES (?1, '0')"#,
            [id.to_string()],
        )?;
        tx.commit()?;

        cache.update(PROJECT_ID_COUNT, CacheValue::Int(id))?;
        cache.add(&id.to_string(), CacheValue::Int(0))?;

        debug!("Created project '{}' (id {})", tag, id);
        Ok(Project {
            tag: tag.to_string(),
            id,
            display_name: display_name.to_string(),
            description: description.to_string(),
            channel_id,
        })
    }

    /// Update a project's display name and/or description. `None` or empty
    /// fields leave the stored value untouched.
    pub async fn update_project(
        &self,
        tag: &str,
        display_name: Option<&str>,
        description: Option<&str>,
    ) -> Result<Project> {
        let mut conn = self.db.lock().await;
        let tx = conn.transaction()?;

        let mut project = query_project(&tx, "tag = ?1", params![tag])?
            .ok_or_else(|| Error::ProjectDoesNotExist(tag.to_string()))?;

        if let Some(name) = display_name.filter(|s| !s.is_empty()) {
            project.display_name = name.to_string();
        }
        if let Some(desc) = description.filter(|s| !s.is_empty()) {
            project.description = desc.to_string();
        }

        tx.execute(
            "UPDATE projects SET display_name = ?1, description = ?2 WHERE tag = ?3",
            params![project.display_name, project.description, tag],
        )?;
        tx.commit()?;

        debug!("Updated project '{}'", tag);
        Ok(project)
    }

    pub async fn get_project_by_tag(&self, tag: &str) -> Result<Option<Project>> {
        let conn = self.db.lock().await;
        query_project(&conn, "tag = ?1", params![tag])
    }

    pub async fn get_project_by_id(&self, id: i64) -> Result<Option<Project>> {
        let conn = self.db.lock().await;
        query_project(&conn, "id = ?1", params![id])
    }

    pub async fn get_project_by_channel(&self, channel_id: i64) -> Result<Option<Project>> {
        let conn = self.db.lock().await;
        query_project(&conn, "channel_id = ?1", params![channel_id])
    }

    pub async fn is_channel_in_use(&self, channel_id: i64) -> Result<bool> {
        let conn = self.db.lock().await;
        let in_use = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM projects WHERE channel_id = ?1)",
            [channel_id],
            |row| row.get(0),
        )?;
        Ok(in_use)
    }

    /// Create a new task in `project_id`, numbered from the project's own
    /// counter. Status starts at pending, message unset, no thread.
    ///
    /// The project id is not validated against the projects table; an
    /// unknown id shows up as a missing counter key.
    pub async fn add_task(&self, project_id: i64, title: &str, description: &str) -> Result<Task> {
        let mut conn = self.db.lock().await;
        let mut cache = self.cache.lock().await;

        let key = project_id.to_string();
        let number = counter_value(&cache, &key)? + 1;

        let tx = conn.transaction()?;
        tx.execute(
            r#"UPDATE "values" SET value = ?1 WHERE name = ?2"#,
            params![number.to_string(), key],
        )?;
        tx.execute(
            "INSERT INTO tasks (related_project_id, number, title, description, status)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![project_id, number, title, description, TaskStatus::Pending.as_str()],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        cache.update(&key, CacheValue::Int(number))?;

        debug!("Created task {} (#{} in project {})", id, number, project_id);
        Ok(Task {
            id,
            related_project_id: project_id,
            number,
            title: title.to_string(),
            description: description.to_string(),
            status: TaskStatus::Pending,
            assigned_to: None,
            message_id: None,
            has_thread: false,
        })
    }

    /// Apply a partial update to a task. See [`TaskUpdate`] for field
    /// conventions; `message_id` and `has_thread` are write-once.
    pub async fn update_task(&self, task_id: i64, update: TaskUpdate) -> Result<Task> {
        let mut conn = self.db.lock().await;
        let tx = conn.transaction()?;

        let mut task = query_task(&tx, "id = ?1", params![task_id])?
            .ok_or(Error::TaskDoesNotExist(task_id))?;

        if let Some(title) = update.title.filter(|s| !s.is_empty()) {
            task.title = title;
        }
        if let Some(description) = update.description.filter(|s| !s.is_empty()) {
            task.description = description;
        }
        if let Some(status) = update.status {
            // Invalid values are a policy no-op, not an error. Status
            // ordering is the caller's concern.
            match TaskStatus::from_str(&status) {
                Some(parsed) => task.status = parsed,
                None => warn!("Ignoring invalid status '{}' for task {}", status, task_id),
            }
        }
        match update.assigned_to {
            Some(Assignment::To(user)) => task.assigned_to = Some(user),
            Some(Assignment::Unassigned) => task.assigned_to = None,
            None => {}
        }
        if let Some(message_id) = update.message_id {
            if task.message_id.is_some() {
                return Err(Error::CannotBeUpdated("message_id"));
            }
            task.message_id = Some(message_id);
        }
        if let Some(has_thread) = update.has_thread {
            if task.has_thread {
                return Err(Error::CannotBeUpdated("has_thread"));
            }
            task.has_thread = has_thread;
        }

        tx.execute(
            "UPDATE tasks SET title = ?1, description = ?2, status = ?3,
                    assigned_to = ?4, message_id = ?5, has_thread = ?6
             WHERE id = ?7",
            params![
                task.title,
                task.description,
                task.status.as_str(),
                task.assigned_to,
                task.message_id,
                task.has_thread,
                task.id,
            ],
        )?;
        tx.commit()?;

        debug!("Updated task {}", task_id);
        Ok(task)
    }

    pub async fn get_task_by_id(&self, task_id: i64) -> Result<Option<Task>> {
        let conn = self.db.lock().await;
        query_task(&conn, "id = ?1", params![task_id])
    }

    pub async fn get_task_by_message(&self, message_id: i64) -> Result<Option<Task>> {
        let conn = self.db.lock().await;
        query_task(&conn, "message_id = ?1", params![message_id])
    }

    /// A thread's channel id equals its origin message id, so thread lookup
    /// goes through `message_id` plus the thread flag.
    pub async fn get_task_by_thread(&self, thread_id: i64) -> Result<Option<Task>> {
        let conn = self.db.lock().await;
        query_task(&conn, "message_id = ?1 AND has_thread = 1", params![thread_id])
    }

    /// All task action emojis, ordered by position ascending.
    pub async fn get_emojis(&self) -> Result<Vec<Emoji>> {
        let conn = self.db.lock().await;
        let mut stmt =
            conn.prepare("SELECT id, emoji, position FROM emojis ORDER BY position ASC")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(id, emoji, position)| {
                Ok(Emoji {
                    action: EmojiAction::from_str(&id)?,
                    emoji,
                    position,
                })
            })
            .collect()
    }

    /// Ordered action→glyph mapping, as rendered onto a task message.
    pub async fn get_task_action_emoji_mapping(&self) -> Result<Vec<(EmojiAction, String)>> {
        let emojis = self.get_emojis().await?;
        Ok(emojis.into_iter().map(|e| (e.action, e.emoji)).collect())
    }

    pub async fn get_emoji_by_action(&self, action: EmojiAction) -> Result<Option<Emoji>> {
        let conn = self.db.lock().await;
        query_emoji(&conn, "id = ?1", params![action.as_str()])
    }

    pub async fn get_emoji_by_glyph(&self, glyph: &str) -> Result<Option<Emoji>> {
        let conn = self.db.lock().await;
        query_emoji(&conn, "emoji = ?1", params![glyph])
    }

    /// Replace the glyph for one task action.
    ///
    /// Glyph uniqueness is not pre-checked here; the UNIQUE constraint on
    /// the emoji column is the backstop and surfaces unwrapped.
    pub async fn update_task_action_emoji(
        &self,
        action: EmojiAction,
        glyph: &str,
    ) -> Result<Emoji> {
        let mut conn = self.db.lock().await;
        let tx = conn.transaction()?;

        let existing = query_emoji(&tx, "id = ?1", params![action.as_str()])?
            .ok_or_else(|| Error::EmojiDoesNotExist(action.as_str().to_string()))?;

        tx.execute(
            "UPDATE emojis SET emoji = ?1 WHERE id = ?2",
            params![glyph, action.as_str()],
        )?;
        tx.commit()?;

        debug!("Updated emoji '{}' to {}", action.as_str(), glyph);
        Ok(Emoji {
            action,
            emoji: glyph.to_string(),
            position: existing.position,
        })
    }
}

fn counter_value(cache: &CounterCache, key: &str) -> Result<i64> {
    cache
        .get(key)
        .and_then(CacheValue::as_int)
        .ok_or_else(|| Error::UnknownCacheKey(key.to_string()))
}

fn read_value(conn: &Connection, name: &str) -> Result<Option<String>> {
    let result = conn.query_row(
        r#"SELECT value FROM "values" WHERE name = ?1"#,
        [name],
        |row| row.get(0),
    );
    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn parse_counter(name: &str, raw: &str) -> Result<i64> {
    raw.parse().map_err(|_| Error::InvalidCounterValue {
        name: name.to_string(),
        value: raw.to_string(),
    })
}

fn query_project(
    conn: &Connection,
    filter: &str,
    params: impl rusqlite::Params,
) -> Result<Option<Project>> {
    let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE {filter}");
    let mut stmt = conn.prepare(&sql)?;
    let result = stmt.query_row(params, |row| {
        Ok(Project {
            tag: row.get(0)?,
            id: row.get(1)?,
            display_name: row.get(2)?,
            description: row.get(3)?,
            channel_id: row.get(4)?,
        })
    });

    match result {
        Ok(project) => Ok(Some(project)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn query_task(
    conn: &Connection,
    filter: &str,
    params: impl rusqlite::Params,
) -> Result<Option<Task>> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE {filter}");
    let mut stmt = conn.prepare(&sql)?;
    let result = stmt.query_row(params, |row| {
        Ok(Task {
            id: row.get(0)?,
            related_project_id: row.get(1)?,
            number: row.get(2)?,
            title: row.get(3)?,
            description: row.get(4)?,
            // Stored statuses are always valid; fall back to pending for
            // anything hand-edited out from under us.
            status: TaskStatus::from_str(&row.get::<_, String>(5)?).unwrap_or(TaskStatus::Pending),
            assigned_to: row.get(6)?,
            message_id: row.get(7)?,
            has_thread: row.get(8)?,
        })
    });

    match result {
        Ok(task) => Ok(Some(task)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn query_emoji(
    conn: &Connection,
    filter: &str,
    params: impl rusqlite::Params,
) -> Result<Option<Emoji>> {
    let sql = format!("SELECT id, emoji, position FROM emojis WHERE {filter}");
    let mut stmt = conn.prepare(&sql)?;
    let result = stmt.query_row(params, |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
        ))
    });

    match result {
        Ok((id, emoji, position)) => Ok(Some(Emoji {
            action: EmojiAction::from_str(&id)?,
            emoji,
            position,
        })),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
