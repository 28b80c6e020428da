//! Page/size query parameters for record, template and audit listings.

use serde::{Deserialize, Serialize};

/// `?page=&per_page=` on list endpoints. Both are 1-based and clamped.
#[derive(Debug, Clone, Deserialize)]
pub struct Pagination {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl Pagination {
    const MAX_PER_PAGE: i64 = 100;
    const DEFAULT_PER_PAGE: i64 = 25;
    /// Pages past this are clamped; keeps `OFFSET` well inside `i64`.
    const MAX_PAGE: i64 = 1_000_000;

    pub fn limit(&self) -> i64 {
        self.per_page
            .unwrap_or(Self::DEFAULT_PER_PAGE)
            .clamp(1, Self::MAX_PER_PAGE)
    }

    pub fn current_page(&self) -> i64 {
        self.page.unwrap_or(1).clamp(1, Self::MAX_PAGE)
    }

    pub fn offset(&self) -> i64 {
        (self.current_page() - 1).saturating_mul(self.limit())
    }
}

/// A page of rows plus the totals the UI needs for its pager.
#[derive(Debug, Clone, Serialize)]
pub struct PagedResult<T: Serialize> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl<T: Serialize> PagedResult<T> {
    pub fn new(items: Vec<T>, total: i64, pagination: &Pagination) -> Self {
        let per_page = pagination.limit();
        Self {
            items,
            total,
            page: pagination.current_page(),
            per_page,
            total_pages: (total.max(0) + per_page - 1) / per_page,
        }
    }
}
