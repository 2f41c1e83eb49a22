//! Row snapshot types and the enums constraining them.
//!
//! Everything here is a detached copy of storage state. Callers never hold
//! a live handle into the database; mutating a snapshot has no effect on
//! the stored row.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A project bound to a single chat channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Unique human-readable key, the primary identity.
    pub tag: String,
    /// Numeric id, monotonically allocated at creation.
    pub id: i64,
    pub display_name: String,
    pub description: String,
    /// Chat channel this project lives in. At most one project per channel.
    pub channel_id: i64,
}

/// A task, rendered in chat as a persistent message with reaction controls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub related_project_id: i64,
    /// Monotonic within the owning project, starting at 1.
    pub number: i64,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    /// Chat user id, or `None` when unassigned.
    pub assigned_to: Option<i64>,
    /// Id of the rendered chat message. `None` until the message is sent,
    /// then write-once.
    pub message_id: Option<i64>,
    /// Whether a discussion thread has been opened. Write-once after it
    /// becomes true. The thread's channel id equals the origin message id.
    pub has_thread: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    PendingMerge,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::PendingMerge => "pending_merge",
            TaskStatus::Done => "done",
        }
    }

    /// Parse a stored or user-supplied status. Returns `None` for anything
    /// outside the four valid values; `update_task` treats that as
    /// "leave unchanged" rather than an error.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "in_progress" => Some(TaskStatus::InProgress),
            "pending_merge" => Some(TaskStatus::PendingMerge),
            "done" => Some(TaskStatus::Done),
            _ => None,
        }
    }
}

/// Assignment change requested through [`TaskUpdate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    To(i64),
    Unassigned,
}

/// Partial update for a task. `None` fields are left untouched; empty
/// strings count as absent, so there is no way to blank a field.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    /// Raw status string from the event layer. Invalid values are ignored.
    pub status: Option<String>,
    pub assigned_to: Option<Assignment>,
    /// Write-once.
    pub message_id: Option<i64>,
    /// Write-once after the flag becomes true.
    pub has_thread: Option<bool>,
}

/// The fixed set of task actions, in canonical display order.
///
/// The two `Empty` slots are spacers between reaction groups on the
/// rendered message; they carry an emoji but no action.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmojiAction {
    Pending,
    InProgress,
    PendingMerge,
    Empty01,
    SelfAssign,
    OpenDiscussion,
    Empty02,
    Done,
}

impl EmojiAction {
    /// Canonical enumeration order; positions are assigned from it on
    /// every startup reconciliation.
    pub const ALL: [EmojiAction; 8] = [
        EmojiAction::Pending,
        EmojiAction::InProgress,
        EmojiAction::PendingMerge,
        EmojiAction::Empty01,
        EmojiAction::SelfAssign,
        EmojiAction::OpenDiscussion,
        EmojiAction::Empty02,
        EmojiAction::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmojiAction::Pending => "pending",
            EmojiAction::InProgress => "in_progress",
            EmojiAction::PendingMerge => "pending_merge",
            EmojiAction::Empty01 => "empty_01",
            EmojiAction::SelfAssign => "self_assign",
            EmojiAction::OpenDiscussion => "open_discussion",
            EmojiAction::Empty02 => "empty_02",
            EmojiAction::Done => "done",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(EmojiAction::Pending),
            "in_progress" => Ok(EmojiAction::InProgress),
            "pending_merge" => Ok(EmojiAction::PendingMerge),
            "empty_01" => Ok(EmojiAction::Empty01),
            "self_assign" => Ok(EmojiAction::SelfAssign),
            "open_discussion" => Ok(EmojiAction::OpenDiscussion),
            "empty_02" => Ok(EmojiAction::Empty02),
            "done" => Ok(EmojiAction::Done),
            _ => Err(Error::EmojiDoesNotExist(s.to_string())),
        }
    }

    /// Fallback glyph used when storage has no customized one.
    pub fn default_glyph(&self) -> &'static str {
        match self {
            EmojiAction::Pending => "🔴",
            EmojiAction::InProgress => "🟠",
            EmojiAction::PendingMerge => "🟣",
            EmojiAction::Empty01 => "〰",
            EmojiAction::SelfAssign => "🖐🏼",
            EmojiAction::OpenDiscussion => "📰",
            EmojiAction::Empty02 => "➖",
            EmojiAction::Done => "✅",
        }
    }
}

/// A task action emoji row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Emoji {
    pub action: EmojiAction,
    /// The glyph itself, or a platform identifier for a custom emoji.
    pub emoji: String,
    /// Display order on the rendered message, ascending.
    pub position: i64,
}
