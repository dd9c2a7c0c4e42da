// src/borrow_handlers.rs - Member side of the borrow/return lifecycle

use actix_web::{web, HttpRequest, HttpResponse};
use std::sync::Arc;

use crate::auth::{get_current_user, require_member};
use crate::error::ApiResult;
use crate::handlers::ApiResponse;
use crate::models::SubmitBorrowRequest;
use crate::AppState;

pub async fn submit_borrow_request(
    app_state: web::Data<Arc<AppState>>,
    body: web::Json<SubmitBorrowRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_member(&http_request)?;

    let detail = app_state
        .circulation
        .submit_borrow_request(claims.sub, &body.book_ids)
        .await?;

    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
        detail,
        "Borrow request submitted, waiting for approval".to_string(),
    )))
}

/// Ownership is checked by the engine against the token subject.
pub async fn submit_return(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<i64>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;

    let detail = app_state
        .circulation
        .submit_return(path.into_inner(), claims.sub)
        .await?;

    let fine = detail.return_record.as_ref().map(|r| r.fine).unwrap_or(0);
    let message = if fine > 0 {
        format!("Return submitted, waiting for approval. Fine due: {}", fine)
    } else {
        "Return submitted, waiting for approval".to_string()
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(detail, message)))
}
