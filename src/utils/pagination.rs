use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Pagination metadata returned with list responses.
#[derive(Debug, Serialize, ToSchema)]
pub struct PaginationMeta {
    pub total: i64,
    pub limit: i64,
    pub page: i64,
    pub has_more: bool,
}

/// Query parameters for paginated listings.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct PaginationParams {
    pub limit: Option<i64>,
    pub page: Option<i64>,
}

impl PaginationParams {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(20).clamp(1, 100)
    }

    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1) * self.limit()
    }
}
