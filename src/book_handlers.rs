// src/book_handlers.rs - Catalog browsing and administration

use actix_web::{web, HttpRequest, HttpResponse};
use std::sync::Arc;
use validator::Validate;

use crate::audit::audit;
use crate::auth::require_catalog_manager;
use crate::error::ApiResult;
use crate::handlers::ApiResponse;
use crate::models::{
    BookQuery, CreateAuthorRequest, CreateBookRequest, CreatePublisherRequest, UpdateStockRequest,
};
use crate::repositories::BookRepository;
use crate::validator::CustomValidate;
use crate::AppState;

// ==================== PUBLIC ====================

pub async fn get_books(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<BookQuery>,
) -> ApiResult<HttpResponse> {
    let page = BookRepository::new().list(&app_state.db_pool, &query).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::page(page)))
}

pub async fn get_book(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<i64>,
) -> ApiResult<HttpResponse> {
    let book = BookRepository::new()
        .get_listing(&app_state.db_pool, path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(book)))
}

pub async fn get_publishers(app_state: web::Data<Arc<AppState>>) -> ApiResult<HttpResponse> {
    let publishers = BookRepository::new().list_publishers(&app_state.db_pool).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(publishers)))
}

pub async fn get_authors(app_state: web::Data<Arc<AppState>>) -> ApiResult<HttpResponse> {
    let authors = BookRepository::new().list_authors(&app_state.db_pool).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(authors)))
}

// ==================== ADMIN ====================

pub async fn create_book(
    app_state: web::Data<Arc<AppState>>,
    body: web::Json<CreateBookRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_catalog_manager(&http_request)?;
    body.validate()?;
    body.custom_validate().into_result()?;

    let now = app_state.circulation.now();
    let book = BookRepository::new().create(&app_state.db_pool, &body, now).await?;

    log::info!("Admin {} added book {} ({})", claims.username, book.title, book.id);
    audit(
        &app_state.db_pool,
        claims.sub,
        "create_book",
        "book",
        book.id,
        &format!("Added '{}' with {} copies", book.title, book.total_stock),
        &http_request,
    )
    .await;

    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
        book,
        "Book created successfully".to_string(),
    )))
}

pub async fn update_book_stock(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<i64>,
    body: web::Json<UpdateStockRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_catalog_manager(&http_request)?;
    body.validate()?;
    let book_id = path.into_inner();

    let now = app_state.circulation.now();
    let book = BookRepository::new()
        .update_total_stock(&app_state.db_pool, book_id, body.total_stock, now)
        .await?;

    audit(
        &app_state.db_pool,
        claims.sub,
        "update_stock",
        "book",
        book_id,
        &format!("Total stock set to {}", body.total_stock),
        &http_request,
    )
    .await;

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        book,
        "Stock updated successfully".to_string(),
    )))
}

pub async fn create_publisher(
    app_state: web::Data<Arc<AppState>>,
    body: web::Json<CreatePublisherRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_catalog_manager(&http_request)?;
    body.validate()?;

    let publisher = BookRepository::new().create_publisher(&app_state.db_pool, &body).await?;
    audit(
        &app_state.db_pool,
        claims.sub,
        "create_publisher",
        "publisher",
        publisher.id,
        &publisher.name,
        &http_request,
    )
    .await;

    Ok(HttpResponse::Created().json(ApiResponse::success(publisher)))
}

pub async fn create_author(
    app_state: web::Data<Arc<AppState>>,
    body: web::Json<CreateAuthorRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_catalog_manager(&http_request)?;
    body.validate()?;

    let author = BookRepository::new().create_author(&app_state.db_pool, &body).await?;
    audit(
        &app_state.db_pool,
        claims.sub,
        "create_author",
        "author",
        author.id,
        &author.first_name,
        &http_request,
    )
    .await;

    Ok(HttpResponse::Created().json(ApiResponse::success(author)))
}
