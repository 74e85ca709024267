//! Common API utilities and shared types

use serde::{Deserialize, Serialize};

use crate::models::{ListParams, PagedResult, DEFAULT_PER_PAGE};

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    DEFAULT_PER_PAGE
}

/// `?page=&per_page=` on list endpoints
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

impl From<PageQuery> for ListParams {
    fn from(query: PageQuery) -> Self {
        ListParams::new(query.page, query.per_page)
    }
}

/// Paginated list body
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

impl<T> From<PagedResult<T>> for Page<T> {
    fn from(result: PagedResult<T>) -> Self {
        let total_pages = result.total_pages();
        Self {
            items: result.items,
            total: result.total,
            page: result.page,
            per_page: result.per_page,
            total_pages,
        }
    }
}

/// `{"detail": "..."}` acknowledgement
#[derive(Debug, Serialize)]
pub struct Detail {
    pub detail: String,
}

impl Detail {
    pub fn new(detail: impl Into<String>) -> Self {
        Self { detail: detail.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_query_clamps() {
        let params: ListParams = PageQuery { page: 0, per_page: 500 }.into();
        assert_eq!(params.page, 1);
        assert_eq!(params.per_page, 100);
    }

    #[test]
    fn test_page_counts_pages() {
        let result = PagedResult::new(vec![1, 2], 45, &ListParams::new(1, 20));
        let page: Page<i32> = result.into();
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.items, vec![1, 2]);
    }
}
