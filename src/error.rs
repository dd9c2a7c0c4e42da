// src/error.rs
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use std::fmt;

use crate::models::RequestStatus;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Unauthorized(String),
    Forbidden(String),
    InternalServerError(String),
    ValidationError(String),
    DatabaseError(sqlx::Error),
    AuthError(String),
    InvalidTransition(String),
    OutOfStock(String),
    InvalidBookSet(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    status: bool,
    message: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::InternalServerError(msg) => write!(f, "Internal Server Error: {}", msg),
            ApiError::ValidationError(msg) => write!(f, "Validation Error: {}", msg),
            ApiError::DatabaseError(err) => write!(f, "Database Error: {}", err),
            ApiError::AuthError(msg) => write!(f, "Auth Error: {}", msg),
            ApiError::InvalidTransition(msg) => write!(f, "Invalid Transition: {}", msg),
            ApiError::OutOfStock(msg) => write!(f, "Out Of Stock: {}", msg),
            ApiError::InvalidBookSet(msg) => write!(f, "Invalid Book Set: {}", msg),
        }
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        // sqlx messages can carry schema details, keep them in the log only
        let message = match self {
            ApiError::DatabaseError(err) => {
                log::error!("Database error: {}", err);
                "Database Error: the operation could not be completed".to_string()
            }
            other => other.to_string(),
        };

        let error_response = ErrorResponse {
            success: false,
            status: false,
            message,
        };

        match self {
            ApiError::BadRequest(_) => HttpResponse::BadRequest().json(error_response),
            ApiError::NotFound(_) => HttpResponse::NotFound().json(error_response),
            ApiError::Unauthorized(_) => HttpResponse::Unauthorized().json(error_response),
            ApiError::Forbidden(_) => HttpResponse::Forbidden().json(error_response),
            ApiError::ValidationError(_) => HttpResponse::UnprocessableEntity().json(error_response),
            ApiError::DatabaseError(_) => HttpResponse::InternalServerError().json(error_response),
            ApiError::AuthError(_) => HttpResponse::Unauthorized().json(error_response),
            ApiError::InternalServerError(_) => HttpResponse::InternalServerError().json(error_response),
            ApiError::InvalidTransition(_) => HttpResponse::Conflict().json(error_response),
            ApiError::OutOfStock(_) => HttpResponse::Conflict().json(error_response),
            ApiError::InvalidBookSet(_) => HttpResponse::BadRequest().json(error_response),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::DatabaseError(err)
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::ValidationError(err.to_string())
    }
}

impl ApiError {
    pub fn not_found(entity: &str) -> Self {
        ApiError::NotFound(format!("{} not found", entity))
    }

    pub fn bad_request(msg: &str) -> Self {
        ApiError::BadRequest(msg.to_string())
    }

    pub fn book_not_found(id: i64) -> Self {
        ApiError::NotFound(format!("Book with ID {} not found", id))
    }

    pub fn request_not_found(id: i64) -> Self {
        ApiError::NotFound(format!("Borrow request with ID {} not found", id))
    }

    pub fn member_not_found(id: i64) -> Self {
        ApiError::NotFound(format!("Member with ID {} not found", id))
    }

    pub fn illegal_transition(current: RequestStatus, action: &str) -> Self {
        if current.is_terminal() {
            return ApiError::InvalidTransition(format!(
                "Cannot {} a request that is already closed as '{}'",
                action,
                current.label()
            ));
        }
        ApiError::InvalidTransition(format!(
            "Cannot {} a request that is '{}'",
            action,
            current.label()
        ))
    }

    pub fn out_of_stock(title: &str) -> Self {
        ApiError::OutOfStock(format!("'{}' has no available copies", title))
    }

    pub fn admin_required() -> Self {
        ApiError::Forbidden("Admin access required".to_string())
    }

    pub fn not_owner() -> Self {
        ApiError::Forbidden("This borrow request belongs to another member".to_string())
    }
}
