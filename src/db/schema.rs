//! SQL schema definitions

// "values" is quoted because VALUES is a SQL keyword.
pub const SCHEMA: &str = r#"
-- Projects table
CREATE TABLE IF NOT EXISTS projects (
    tag TEXT PRIMARY KEY,
    id INTEGER NOT NULL UNIQUE,
    display_name TEXT NOT NULL,
    description TEXT NOT NULL,
    channel_id INTEGER NOT NULL UNIQUE
);

-- Tasks table
CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY,
    related_project_id INTEGER NOT NULL,
    number INTEGER NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    assigned_to INTEGER,
    message_id INTEGER,
    has_thread INTEGER NOT NULL DEFAULT 0
);

-- Named counter rows backing id/number generation
CREATE TABLE IF NOT EXISTS "values" (
    name TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Task action reaction emojis
CREATE TABLE IF NOT EXISTS emojis (
    id TEXT PRIMARY KEY,
    emoji TEXT NOT NULL UNIQUE,
    position INTEGER NOT NULL
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_tasks_related_project_id ON tasks(related_project_id);
CREATE INDEX IF NOT EXISTS idx_tasks_message_id ON tasks(message_id);
"#;
