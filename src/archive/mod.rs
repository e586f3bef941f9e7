//! Per-day Markdown archive.
//!
//! Posts are grouped by local calendar day and each day is written once to
//! `YYYY/MM/YYYY-MM-DD.md`. A day whose document already exists is never
//! touched again, which keeps incremental runs cheap and idempotent.

mod day;
mod writer;

use anyhow::Result;
use async_trait::async_trait;

pub use day::{group_by_day, DayKey};
pub use writer::{ArchiveWriter, DayOutcome, DayReport};

/// Removes a post from the source blog once it has been archived.
#[async_trait]
pub trait PostDeleter: Send + Sync {
    /// Delete one post.
    ///
    /// # Errors
    ///
    /// Returns an error if the post could not be deleted.
    async fn delete_post(&self, post_id: &str) -> Result<()>;
}
