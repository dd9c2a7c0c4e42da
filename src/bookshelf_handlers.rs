// src/bookshelf_handlers.rs - A member's own view of their loans

use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::require_self_or_admin;
use crate::error::ApiResult;
use crate::handlers::ApiResponse;
use crate::models::{MemberProfile, StatusFilter};
use crate::pagination::PageQuery;
use crate::repositories::ledger::{LedgerEntry, LedgerStatistics};
use crate::repositories::{LedgerRepository, LedgerScope};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct BookshelfQuery {
    #[serde(alias = "type")]
    pub status: Option<String>,
    pub page: Option<i64>,
    #[serde(alias = "per_page")]
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct Bookshelf {
    pub member: MemberProfile,
    pub summary: LedgerStatistics,
    pub requests: Vec<LedgerEntry>,
}

pub async fn get_bookshelf(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<i64>,
    query: web::Query<BookshelfQuery>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let member_id = path.into_inner();
    require_self_or_admin(&http_request, member_id)?;
    let filter = StatusFilter::parse(query.status.as_deref())?;

    let repo = LedgerRepository::new();
    let pool = &app_state.db_pool;
    let now = app_state.circulation.now();

    let member = repo.member_profile(pool, member_id).await?;
    let summary = repo.statistics(pool, LedgerScope::Member(member_id), now).await?;
    let page = repo
        .list_entries(
            pool,
            LedgerScope::Member(member_id),
            filter,
            PageQuery { page: query.page, limit: query.limit },
            now,
            app_state.circulation.policy(),
        )
        .await?;

    let shelf = Bookshelf { member, summary, requests: page.items };
    Ok(HttpResponse::Ok().json(ApiResponse::paginated(shelf, page.pagination)))
}

pub async fn get_bookshelf_statistics(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<i64>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let member_id = path.into_inner();
    require_self_or_admin(&http_request, member_id)?;

    let repo = LedgerRepository::new();
    // 404 for unknown members rather than an all-zero summary
    repo.member_profile(&app_state.db_pool, member_id).await?;
    let stats = repo
        .statistics(&app_state.db_pool, LedgerScope::Member(member_id), app_state.circulation.now())
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(stats)))
}

pub async fn get_bookshelf_history(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<i64>,
    query: web::Query<PageQuery>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let member_id = path.into_inner();
    require_self_or_admin(&http_request, member_id)?;

    let repo = LedgerRepository::new();
    repo.member_profile(&app_state.db_pool, member_id).await?;
    let page = repo
        .member_history(&app_state.db_pool, member_id, query.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::page(page)))
}
