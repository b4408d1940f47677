use crate::{models::Change, Result};

/// Default look-back window for the trending query
pub const DEFAULT_WINDOW_HOURS: u32 = 36;

/// Default number of changes requested per page
pub const DEFAULT_PAGE_SIZE: u32 = 75;

/// Which changes are candidates for trending, and how to page through them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrendingQuery {
    pub window_hours: u32,
    pub page_size: u32,
}

impl TrendingQuery {
    /// Open changes updated within the window
    pub fn expression(&self) -> String {
        format!("status:open -age:{}h", self.window_hours)
    }
}

impl Default for TrendingQuery {
    fn default() -> Self {
        Self {
            window_hours: DEFAULT_WINDOW_HOURS,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// A paged search over the review server
///
/// The Gerrit provider is the real implementation; tests substitute their own.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ChangeSource: Send + Sync {
    async fn fetch_page(&self, query: &str, page_size: u32, offset: u32) -> Result<Vec<Change>>;
}
