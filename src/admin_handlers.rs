// src/admin_handlers.rs - Admin ledger views and lifecycle decisions

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use crate::audit::audit;
use crate::auth::{require_admin, require_decider};
use crate::error::ApiResult;
use crate::handlers::ApiResponse;
use crate::models::{DecisionRequest, StatusFilter};
use crate::pagination::PageQuery;
use crate::repositories::{LedgerRepository, LedgerScope};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct RequestListQuery {
    /// Status label, `all` or `overdue`.
    #[serde(rename = "type", alias = "status")]
    pub status: Option<String>,
    pub page: Option<i64>,
    #[serde(alias = "per_page")]
    pub limit: Option<i64>,
}

impl RequestListQuery {
    pub fn filter(&self) -> ApiResult<StatusFilter> {
        StatusFilter::parse(self.status.as_deref())
    }

    pub fn page_query(&self) -> PageQuery {
        PageQuery { page: self.page, limit: self.limit }
    }
}

// ==================== LEDGER ====================

pub async fn get_requests(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<RequestListQuery>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    require_admin(&http_request)?;
    let filter = query.filter()?;

    let page = LedgerRepository::new()
        .list_entries(
            &app_state.db_pool,
            LedgerScope::All,
            filter,
            query.page_query(),
            app_state.circulation.now(),
            app_state.circulation.policy(),
        )
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::page(page)))
}

pub async fn get_statistics(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    require_admin(&http_request)?;

    let stats = LedgerRepository::new()
        .statistics(&app_state.db_pool, LedgerScope::All, app_state.circulation.now())
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(stats)))
}

// ==================== DECISIONS ====================

pub async fn approve_borrow(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<i64>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_decider(&http_request)?;
    let request_id = path.into_inner();

    let detail = app_state.circulation.approve_borrow(request_id, claims.sub).await?;
    audit(
        &app_state.db_pool,
        claims.sub,
        "approve_borrow",
        "borrow_request",
        request_id,
        &format!("{} book(s) checked out", detail.lines.len()),
        &http_request,
    )
    .await;

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        detail,
        "Borrow request approved".to_string(),
    )))
}

pub async fn reject_borrow(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<i64>,
    body: Option<web::Json<DecisionRequest>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_decider(&http_request)?;
    let decision = body.map(|b| b.into_inner()).unwrap_or_default();
    decision.validate()?;
    let request_id = path.into_inner();

    let detail = app_state
        .circulation
        .reject_borrow(request_id, claims.sub, decision.reason())
        .await?;
    audit(
        &app_state.db_pool,
        claims.sub,
        "reject_borrow",
        "borrow_request",
        request_id,
        decision.reason().unwrap_or("no reason given"),
        &http_request,
    )
    .await;

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        detail,
        "Borrow request rejected".to_string(),
    )))
}

pub async fn approve_return(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<i64>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_decider(&http_request)?;
    let request_id = path.into_inner();

    let detail = app_state.circulation.approve_return(request_id, claims.sub).await?;
    let fine = detail.return_record.as_ref().map(|r| r.fine).unwrap_or(0);
    audit(
        &app_state.db_pool,
        claims.sub,
        "approve_return",
        "borrow_request",
        request_id,
        &format!("Return accepted, fine {}", fine),
        &http_request,
    )
    .await;

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        detail,
        "Return approved".to_string(),
    )))
}

pub async fn reject_return(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<i64>,
    body: Option<web::Json<DecisionRequest>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_decider(&http_request)?;
    let decision = body.map(|b| b.into_inner()).unwrap_or_default();
    decision.validate()?;
    let request_id = path.into_inner();

    let detail = app_state
        .circulation
        .reject_return(request_id, claims.sub, decision.reason())
        .await?;
    audit(
        &app_state.db_pool,
        claims.sub,
        "reject_return",
        "borrow_request",
        request_id,
        decision.reason().unwrap_or("no reason given"),
        &http_request,
    )
    .await;

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        detail,
        "Return rejected".to_string(),
    )))
}
