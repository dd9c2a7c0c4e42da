// src/handlers.rs
use serde::Serialize;

use crate::pagination::{Page, PaginationInfo};

// ==================== COMMON STRUCTURES ====================

/// Uniform response envelope. `status` mirrors `success` for older clients.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub status: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationInfo>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self::success_with_message(data, "OK".to_string())
    }

    pub fn success_with_message(data: T, message: String) -> Self {
        Self {
            success: true,
            status: true,
            message,
            data: Some(data),
            pagination: None,
        }
    }

    pub fn paginated(data: T, pagination: PaginationInfo) -> Self {
        Self {
            success: true,
            status: true,
            message: "OK".to_string(),
            data: Some(data),
            pagination: Some(pagination),
        }
    }
}

impl<T> ApiResponse<Vec<T>> {
    pub fn page(page: Page<T>) -> Self {
        Self::paginated(page.items, page.pagination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shape() {
        let json = serde_json::to_value(ApiResponse::success(42)).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["status"], true);
        assert_eq!(json["data"], 42);
        assert!(json.get("pagination").is_none());
    }

    #[test]
    fn test_paginated_envelope() {
        let page = Page::new(vec!["a", "b"], 12, 2, 2);
        let json = serde_json::to_value(ApiResponse::page(page)).unwrap();
        assert_eq!(json["data"], serde_json::json!(["a", "b"]));
        assert_eq!(json["pagination"]["totalPages"], 6);
        assert_eq!(json["pagination"]["page"], 2);
    }
}
