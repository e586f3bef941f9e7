use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{Datelike, NaiveDate};
use chrono_tz::Tz;

use crate::constants::ATTACHMENTS_DIR_NAME;
use crate::post::Post;

/// A calendar day in the archive's time zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DayKey(NaiveDate);

impl DayKey {
    #[must_use]
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// The local day a post belongs to.
    #[must_use]
    pub fn for_post(post: &Post, tz: Tz) -> Self {
        Self(post.local_datetime(tz).date_naive())
    }

    /// Directory holding the day's document, relative to the archive root.
    #[must_use]
    pub fn month_dir(&self) -> PathBuf {
        PathBuf::from(format!("{:04}", self.0.year())).join(format!("{:02}", self.0.month()))
    }

    /// Day document path relative to the archive root: `YYYY/MM/YYYY-MM-DD.md`.
    #[must_use]
    pub fn document_path(&self) -> PathBuf {
        self.month_dir().join(format!("{self}.md"))
    }

    /// Attachments directory relative to the archive root, a sibling of the document.
    #[must_use]
    pub fn attachments_dir(&self) -> PathBuf {
        self.month_dir().join(ATTACHMENTS_DIR_NAME)
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

/// Group posts by local calendar day.
///
/// Each group is sorted by ascending timestamp; posts with equal
/// timestamps keep their input order.
#[must_use]
pub fn group_by_day(posts: Vec<Post>, tz: Tz) -> BTreeMap<DayKey, Vec<Post>> {
    let mut days: BTreeMap<DayKey, Vec<Post>> = BTreeMap::new();
    for post in posts {
        days.entry(DayKey::for_post(&post, tz)).or_default().push(post);
    }
    for posts in days.values_mut() {
        posts.sort_by_key(|p| p.timestamp);
    }
    days
}
