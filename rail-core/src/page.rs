use serde::{Deserialize, Serialize};

use crate::CoreError;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 10;

/// Raw pagination input as received from a caller.
#[derive(Debug, Clone, Copy, Deserialize, Default)]
pub struct PageRequest {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Validated pagination window.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Page {
    /// Both values must be at least 1; `limit` is capped at `max_limit`.
    pub fn new(page: i64, limit: i64, max_limit: u32) -> Result<Self, CoreError> {
        if page < 1 {
            return Err(CoreError::Validation(format!("page must be at least 1, got {}", page)));
        }
        if limit < 1 {
            return Err(CoreError::Validation(format!("limit must be at least 1, got {}", limit)));
        }

        let page = u32::try_from(page)
            .map_err(|_| CoreError::Validation(format!("page out of range: {}", page)))?;
        let limit = u32::try_from(limit).unwrap_or(u32::MAX).min(max_limit.max(1));

        Ok(Self { page, limit })
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

impl PageRequest {
    pub fn resolve(&self, max_limit: u32) -> Result<Page, CoreError> {
        Page::new(
            self.page.unwrap_or(i64::from(DEFAULT_PAGE)),
            self.limit.unwrap_or(i64::from(DEFAULT_LIMIT)),
            max_limit,
        )
    }
}
