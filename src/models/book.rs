// src/models/book.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::pagination::PageQuery;

/// Catalog row as stored.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Book {
    pub id: i64,
    #[serde(rename = "judul")]
    pub title: String,
    #[serde(rename = "id_penerbit")]
    pub publisher_id: Option<i64>,
    #[serde(rename = "tahun_terbit")]
    pub year: i64,
    pub isbn: Option<String>,
    #[serde(rename = "total_stok")]
    pub total_stock: i64,
    #[serde(rename = "stok")]
    pub available_stock: i64,
    pub synopsis: Option<String>,
    pub cover_image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Book joined with its publisher and authors, as the catalog endpoints return it.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BookListing {
    pub id: i64,
    #[serde(rename = "judul")]
    pub title: String,
    #[serde(rename = "id_penerbit")]
    pub publisher_id: Option<i64>,
    #[serde(rename = "tahun_terbit")]
    pub year: i64,
    pub isbn: Option<String>,
    #[serde(rename = "total_stok")]
    pub total_stock: i64,
    #[serde(rename = "stok")]
    pub available_stock: i64,
    #[serde(rename = "tersedia")]
    pub available: bool,
    pub synopsis: Option<String>,
    pub cover_image: Option<String>,
    #[serde(rename = "penerbit_nama")]
    pub publisher_name: Option<String>,
    #[serde(rename = "pengarang")]
    pub authors: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Publisher {
    pub id: i64,
    #[serde(rename = "nama")]
    pub name: String,
    #[serde(rename = "alamat_jalan")]
    pub street: Option<String>,
    #[serde(rename = "kota")]
    pub city: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Author {
    pub id: i64,
    #[serde(rename = "nama_depan")]
    pub first_name: String,
    #[serde(rename = "nama_belakang")]
    pub last_name: Option<String>,
    #[serde(rename = "kewarganegaraan")]
    pub nationality: Option<String>,
}

// ==================== QUERIES & BODIES ====================

#[derive(Debug, Default, Deserialize)]
pub struct BookQuery {
    pub search: Option<String>,
    #[serde(alias = "available")]
    pub tersedia: Option<bool>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl BookQuery {
    pub fn page_query(&self) -> PageQuery {
        PageQuery { page: self.page, limit: self.limit }
    }

    pub fn search_term(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBookRequest {
    #[serde(alias = "judul")]
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: String,
    #[serde(alias = "id_penerbit")]
    pub publisher_id: Option<i64>,
    #[serde(alias = "tahun_terbit")]
    #[validate(range(min = 1000, max = 2100, message = "Year must be between 1000 and 2100"))]
    pub year: i64,
    pub isbn: Option<String>,
    #[serde(alias = "stok")]
    #[validate(range(min = 0, max = 10000, message = "Stock must be between 0 and 10000"))]
    pub total_stock: i64,
    #[validate(length(max = 2000, message = "Synopsis cannot exceed 2000 characters"))]
    pub synopsis: Option<String>,
    #[validate(length(max = 500, message = "Cover image URL cannot exceed 500 characters"))]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub author_ids: Vec<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateStockRequest {
    #[serde(alias = "stok")]
    #[validate(range(min = 0, max = 10000, message = "Stock must be between 0 and 10000"))]
    pub total_stock: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePublisherRequest {
    #[serde(alias = "nama")]
    #[validate(length(min = 1, max = 255, message = "Publisher name must be 1-255 characters"))]
    pub name: String,
    #[serde(alias = "alamat_jalan")]
    #[validate(length(max = 255))]
    pub street: Option<String>,
    #[serde(alias = "kota")]
    #[validate(length(max = 100))]
    pub city: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAuthorRequest {
    #[serde(alias = "nama_depan")]
    #[validate(length(min = 1, max = 100, message = "First name must be 1-100 characters"))]
    pub first_name: String,
    #[serde(alias = "nama_belakang")]
    #[validate(length(max = 100))]
    pub last_name: Option<String>,
    #[serde(alias = "kewarganegaraan")]
    #[validate(length(max = 100))]
    pub nationality: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_book_validation() {
        let request = CreateBookRequest {
            title: "Laskar Pelangi".to_string(),
            publisher_id: None,
            year: 2005,
            isbn: None,
            total_stock: 3,
            synopsis: None,
            cover_image: None,
            author_ids: vec![],
        };
        assert!(request.validate().is_ok());

        let request = CreateBookRequest { title: String::new(), ..request };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_book_query_aliases() {
        let query: BookQuery =
            serde_json::from_value(serde_json::json!({"available": true, "search": "  "})).unwrap();
        assert_eq!(query.tersedia, Some(true));
        assert_eq!(query.search_term(), None);
    }

    #[test]
    fn test_create_book_accepts_legacy_names() {
        let request: CreateBookRequest = serde_json::from_value(serde_json::json!({
            "judul": "Bumi Manusia",
            "tahun_terbit": 1980,
            "stok": 2
        }))
        .unwrap();
        assert_eq!(request.title, "Bumi Manusia");
        assert_eq!(request.total_stock, 2);
        assert!(request.author_ids.is_empty());
    }
}
