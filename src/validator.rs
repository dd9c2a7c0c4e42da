// src/validator.rs - Field and business validation shared by handlers and the engine
use std::collections::{BTreeSet, HashMap};

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::auth::RegisterRequest;
use crate::error::ApiError;
use crate::models::CreateBookRequest;

lazy_static! {
    static ref ISBN_REGEX: Regex = Regex::new(r"^(\d{9}[\dX]|\d{13})$").unwrap();
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap();
    static ref NO_INDUK_REGEX: Regex = Regex::new(r"^[0-9A-Za-z.]{5,30}$").unwrap();
    static ref USERNAME_REGEX: Regex = Regex::new(r"^[a-zA-Z0-9_.]{3,50}$").unwrap();
}

// ==================== VALIDATION RESULT ====================

#[derive(Debug, Default, Serialize)]
pub struct ValidationResult {
    pub errors: HashMap<String, Vec<String>>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.entry(field.into()).or_default().push(message.into());
    }

    pub fn check(&mut self, field: &str, outcome: Result<(), String>) {
        if let Err(message) = outcome {
            self.add_error(field, message);
        }
    }

    pub fn to_api_error(&self) -> ApiError {
        let mut fields: Vec<_> = self.errors.iter().collect();
        fields.sort_by(|a, b| a.0.cmp(b.0));
        let message = fields
            .iter()
            .map(|(field, errors)| format!("{}: {}", field, errors.join(", ")))
            .collect::<Vec<_>>()
            .join("; ");

        ApiError::ValidationError(message)
    }

    pub fn into_result(self) -> Result<(), ApiError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(self.to_api_error())
        }
    }
}

// ==================== FIELD VALIDATORS ====================

pub struct FieldValidator;

impl FieldValidator {
    pub fn not_empty(value: &str, field: &str) -> Result<(), String> {
        if value.trim().is_empty() {
            Err(format!("{} cannot be empty", field))
        } else {
            Ok(())
        }
    }

    /// ISBN-10 or ISBN-13 with a valid check digit; hyphens and spaces are ignored.
    pub fn isbn(value: &str) -> Result<(), String> {
        let digits: String = value
            .chars()
            .filter(|c| !matches!(c, '-' | ' '))
            .map(|c| c.to_ascii_uppercase())
            .collect();

        if !ISBN_REGEX.is_match(&digits) {
            return Err("Invalid ISBN format (expected 10 or 13 digits)".to_string());
        }

        let valid = if digits.len() == 10 {
            let sum: u32 = digits
                .chars()
                .enumerate()
                .map(|(i, c)| {
                    let value = if c == 'X' { 10 } else { c.to_digit(10).unwrap_or(0) };
                    value * (10 - i as u32)
                })
                .sum();
            sum % 11 == 0
        } else {
            let sum: u32 = digits
                .chars()
                .enumerate()
                .map(|(i, c)| {
                    let value = c.to_digit(10).unwrap_or(0);
                    if i % 2 == 0 { value } else { value * 3 }
                })
                .sum();
            sum % 10 == 0
        };

        if valid {
            Ok(())
        } else {
            Err("Invalid ISBN check digit".to_string())
        }
    }

    pub fn email(value: &str) -> Result<(), String> {
        if EMAIL_REGEX.is_match(value) {
            Ok(())
        } else {
            Err("Invalid email format".to_string())
        }
    }

    pub fn username(value: &str) -> Result<(), String> {
        if USERNAME_REGEX.is_match(value) {
            Ok(())
        } else {
            Err("Username may only contain letters, digits, '_' and '.'".to_string())
        }
    }

    /// Student or staff registration number (NIM / NIP).
    pub fn no_induk(value: &str) -> Result<(), String> {
        if NO_INDUK_REGEX.is_match(value) {
            Ok(())
        } else {
            Err("Registration number must be 5-30 letters, digits or dots".to_string())
        }
    }

    pub fn password_strength(password: &str) -> Result<(), String> {
        if password.len() < 8 {
            return Err("Password must be at least 8 characters".to_string());
        }
        if !password.chars().any(|c| c.is_ascii_uppercase()) {
            return Err("Password must contain at least one uppercase letter".to_string());
        }
        if !password.chars().any(|c| c.is_ascii_lowercase()) {
            return Err("Password must contain at least one lowercase letter".to_string());
        }
        if !password.chars().any(|c| c.is_ascii_digit()) {
            return Err("Password must contain at least one digit".to_string());
        }
        Ok(())
    }
}

// ==================== CUSTOM VALIDATION ====================

pub trait CustomValidate {
    fn custom_validate(&self) -> ValidationResult;
}

impl CustomValidate for CreateBookRequest {
    fn custom_validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();

        result.check("title", FieldValidator::not_empty(&self.title, "Title"));
        if let Some(ref isbn) = self.isbn {
            result.check("isbn", FieldValidator::isbn(isbn));
        }
        if self.author_ids.iter().collect::<BTreeSet<_>>().len() != self.author_ids.len() {
            result.add_error("author_ids", "Author list contains duplicates");
        }

        result
    }
}

impl CustomValidate for RegisterRequest {
    fn custom_validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();

        result.check("nama", FieldValidator::not_empty(&self.nama, "Name"));
        result.check("username", FieldValidator::username(&self.username));
        result.check("email", FieldValidator::email(&self.email));
        result.check("password", FieldValidator::password_strength(&self.password));
        if let Some(ref no_induk) = self.no_induk {
            result.check("no_induk", FieldValidator::no_induk(no_induk));
        }

        result
    }
}

// ==================== BUSINESS VALIDATORS ====================

pub struct BusinessValidator;

impl BusinessValidator {
    /// Checks the book list of a borrow request and returns it sorted ascending.
    pub fn book_set(book_ids: &[i64], max_books: usize) -> Result<Vec<i64>, ApiError> {
        if book_ids.is_empty() {
            return Err(ApiError::InvalidBookSet(
                "A borrow request must contain at least one book".to_string(),
            ));
        }

        if book_ids.len() > max_books {
            return Err(ApiError::InvalidBookSet(format!(
                "A borrow request may contain at most {} books (got {})",
                max_books,
                book_ids.len()
            )));
        }

        let unique: BTreeSet<i64> = book_ids.iter().copied().collect();
        if unique.len() != book_ids.len() {
            return Err(ApiError::InvalidBookSet(
                "The same book cannot be requested twice".to_string(),
            ));
        }

        if let Some(bad) = unique.iter().find(|id| **id <= 0) {
            return Err(ApiError::InvalidBookSet(format!("Invalid book id {}", bad)));
        }

        Ok(unique.into_iter().collect())
    }

    /// New total stock must still cover every copy currently on loan.
    pub fn stock_change(new_total: i64, on_loan: i64) -> ValidationResult {
        let mut result = ValidationResult::new();
        if new_total < on_loan {
            result.add_error(
                "total_stock",
                format!("Cannot set total stock to {}: {} copies are on loan", new_total, on_loan),
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isbn_checksums() {
        assert!(FieldValidator::isbn("978-0-306-40615-7").is_ok());
        assert!(FieldValidator::isbn("9786020332956").is_ok());
        assert!(FieldValidator::isbn("0-306-40615-2").is_ok());
        assert!(FieldValidator::isbn("080442957X").is_ok());

        assert!(FieldValidator::isbn("978-0-306-40615-8").is_err());
        assert!(FieldValidator::isbn("0-306-40615-3").is_err());
        assert!(FieldValidator::isbn("12345").is_err());
    }

    #[test]
    fn test_password_strength() {
        assert!(FieldValidator::password_strength("Perpus2024").is_ok());
        assert!(FieldValidator::password_strength("short1A").is_err());
        assert!(FieldValidator::password_strength("alllowercase1").is_err());
        assert!(FieldValidator::password_strength("NoDigitsHere").is_err());
    }

    #[test]
    fn test_book_set_rules() {
        assert_eq!(BusinessValidator::book_set(&[7, 3], 5).unwrap(), vec![3, 7]);

        let empty = BusinessValidator::book_set(&[], 5).unwrap_err();
        assert!(matches!(empty, ApiError::InvalidBookSet(_)));

        let duplicate = BusinessValidator::book_set(&[3, 3], 5).unwrap_err();
        assert!(matches!(duplicate, ApiError::InvalidBookSet(_)));

        let too_many = BusinessValidator::book_set(&[1, 2, 3], 2).unwrap_err();
        assert!(matches!(too_many, ApiError::InvalidBookSet(_)));
    }

    #[test]
    fn test_stock_change_guard() {
        assert!(BusinessValidator::stock_change(3, 3).is_valid());
        assert!(!BusinessValidator::stock_change(2, 3).is_valid());
    }

    #[test]
    fn test_create_book_custom_validation() {
        let request = CreateBookRequest {
            title: "Negeri 5 Menara".to_string(),
            publisher_id: None,
            year: 2009,
            isbn: Some("978-0-306-40615-8".to_string()),
            total_stock: 1,
            synopsis: None,
            cover_image: None,
            author_ids: vec![1, 1],
        };
        let result = request.custom_validate();
        assert!(result.errors.contains_key("isbn"));
        assert!(result.errors.contains_key("author_ids"));
        assert!(matches!(result.into_result(), Err(ApiError::ValidationError(_))));
    }
}
