// src/pagination.rs
//! Page-based pagination shared by every list endpoint

use serde::{Deserialize, Serialize};

pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;

#[derive(Debug, Default, Clone, Copy, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    #[serde(alias = "per_page")]
    pub limit: Option<i64>,
}

impl PageQuery {
    pub fn new(page: i64, limit: i64) -> Self {
        Self { page: Some(page), limit: Some(limit) }
    }

    /// Returns (page, limit, offset) clamped to sane bounds.
    pub fn normalize(&self) -> (i64, i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let offset = (page - 1).saturating_mul(limit);
        (page, limit, offset)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaginationInfo {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    #[serde(rename = "totalPages")]
    pub total_pages: i64,
}

impl PaginationInfo {
    pub fn new(total: i64, page: i64, limit: i64) -> Self {
        let total_pages = if total == 0 { 0 } else { (total + limit - 1) / limit };
        Self { page, limit, total, total_pages }
    }
}

/// A page of rows together with its pagination block.
#[derive(Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: PaginationInfo,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, page: i64, limit: i64) -> Self {
        Self { items, pagination: PaginationInfo::new(total, page, limit) }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            pagination: self.pagination,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_defaults() {
        assert_eq!(PageQuery::default().normalize(), (1, DEFAULT_LIMIT, 0));
    }

    #[test]
    fn test_normalize_clamps() {
        assert_eq!(PageQuery::new(0, 0).normalize(), (1, 1, 0));
        assert_eq!(PageQuery::new(3, 500).normalize(), (3, MAX_LIMIT, 200));
        assert_eq!(PageQuery::new(-2, 10).normalize(), (1, 10, 0));
    }

    #[test]
    fn test_huge_page_does_not_overflow() {
        let (page, limit, offset) = PageQuery::new(i64::MAX, 10).normalize();
        assert_eq!((page, limit), (i64::MAX, 10));
        assert_eq!(offset, i64::MAX);
    }

    #[test]
    fn test_total_pages() {
        assert_eq!(PaginationInfo::new(0, 1, 10).total_pages, 0);
        assert_eq!(PaginationInfo::new(10, 1, 10).total_pages, 1);
        assert_eq!(PaginationInfo::new(11, 1, 10).total_pages, 2);
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(PaginationInfo::new(25, 2, 10)).unwrap();
        assert_eq!(json, serde_json::json!({"page": 2, "limit": 10, "total": 25, "totalPages": 3}));
    }
}
