//! Error types shared across the crate.

/// Failure kinds surfaced by the persistence store and counter cache.
///
/// Storage-level uniqueness violations (project tag, channel id, emoji
/// glyph) that are not pre-checked arrive as [`Error::Sqlite`], unwrapped.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("channel {0} is already bound to a project")]
    ChannelAlreadyInUse(i64),

    #[error("project '{0}' does not exist")]
    ProjectDoesNotExist(String),

    #[error("task {0} does not exist")]
    TaskDoesNotExist(i64),

    #[error("task action emoji '{0}' does not exist")]
    EmojiDoesNotExist(String),

    #[error("field '{0}' has already been set and cannot be updated")]
    CannotBeUpdated(&'static str),

    #[error("cache key '{0}' already exists, use update() to change it")]
    DuplicateCacheKey(String),

    #[error("cache key '{0}' does not exist, add it before updating")]
    UnknownCacheKey(String),

    #[error("counter row '{name}' holds non-numeric value '{value}'")]
    InvalidCounterValue { name: String, value: String },

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
