// src/report_handlers.rs
//! Circulation reports for library staff

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::auth::require_admin;
use crate::error::ApiResult;
use crate::fines::{days_late, LatenessCategory};
use crate::handlers::ApiResponse;
use crate::models::RequestStatus;
use crate::pagination::{Page, PageQuery};
use crate::AppState;

const DEFAULT_POPULAR_LIMIT: i64 = 10;
const MAX_POPULAR_LIMIT: i64 = 50;

// ==================== POPULAR BOOKS ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PopularityBand {
    #[serde(rename = "very popular")]
    VeryPopular,
    #[serde(rename = "popular")]
    Popular,
    #[serde(rename = "fairly popular")]
    FairlyPopular,
    #[serde(rename = "rarely borrowed")]
    RarelyBorrowed,
}

impl PopularityBand {
    pub fn from_borrows(times_borrowed: i64) -> Self {
        match times_borrowed {
            n if n >= 10 => PopularityBand::VeryPopular,
            n if n >= 5 => PopularityBand::Popular,
            n if n >= 2 => PopularityBand::FairlyPopular,
            _ => PopularityBand::RarelyBorrowed,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PopularBookRow {
    id: i64,
    title: String,
    authors: Option<String>,
    publisher: Option<String>,
    year: i64,
    available_stock: i64,
    times_borrowed: i64,
    unique_borrowers: i64,
    currently_on_loan: i64,
}

#[derive(Debug, Serialize)]
pub struct PopularBook {
    pub id: i64,
    #[serde(rename = "judul")]
    pub title: String,
    #[serde(rename = "pengarang")]
    pub authors: Option<String>,
    #[serde(rename = "penerbit")]
    pub publisher: Option<String>,
    #[serde(rename = "tahun_terbit")]
    pub year: i64,
    #[serde(rename = "stok")]
    pub available_stock: i64,
    pub times_borrowed: i64,
    pub unique_borrowers: i64,
    pub currently_on_loan: i64,
    pub percentage: f64,
    pub popularity: PopularityBand,
}

#[derive(Debug, Default, Deserialize)]
pub struct PopularBooksQuery {
    pub limit: Option<i64>,
}

/// Counts every request that was ever approved, i.e. reached `borrowed`.
pub async fn popular_books(pool: &SqlitePool, limit: i64) -> ApiResult<Vec<PopularBook>> {
    let limit = limit.clamp(1, MAX_POPULAR_LIMIT);

    let total_borrows: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM request_lines rl
           JOIN borrow_requests br ON br.id = rl.request_id
           WHERE br.status IN ('borrowed', 'waiting_for_return_approval', 'returned', 'completed')"#,
    )
    .fetch_one(pool)
    .await?;

    let rows = sqlx::query_as::<_, PopularBookRow>(
        r#"SELECT
               b.id, b.title, b.year, b.available_stock,
               (SELECT GROUP_CONCAT(a.nama_depan || COALESCE(' ' || a.nama_belakang, ''), ', ')
                  FROM book_authors ba JOIN authors a ON a.id = ba.author_id
                 WHERE ba.book_id = b.id) AS authors,
               p.nama AS publisher,
               COUNT(br.id) AS times_borrowed,
               COUNT(DISTINCT br.member_id) AS unique_borrowers,
               COALESCE(SUM(CASE WHEN br.status IN ('borrowed', 'waiting_for_return_approval', 'returned')
                                 THEN 1 ELSE 0 END), 0) AS currently_on_loan
           FROM books b
           JOIN request_lines rl ON rl.book_id = b.id
           JOIN borrow_requests br ON br.id = rl.request_id
           LEFT JOIN publishers p ON p.id = b.publisher_id
           WHERE br.status IN ('borrowed', 'waiting_for_return_approval', 'returned', 'completed')
           GROUP BY b.id
           ORDER BY times_borrowed DESC, b.title ASC
           LIMIT ?"#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let percentage = if total_borrows > 0 {
                (row.times_borrowed as f64 * 10_000.0 / total_borrows as f64).round() / 100.0
            } else {
                0.0
            };
            PopularBook {
                id: row.id,
                title: row.title,
                authors: row.authors,
                publisher: row.publisher,
                year: row.year,
                available_stock: row.available_stock,
                times_borrowed: row.times_borrowed,
                unique_borrowers: row.unique_borrowers,
                currently_on_loan: row.currently_on_loan,
                percentage,
                popularity: PopularityBand::from_borrows(row.times_borrowed),
            }
        })
        .collect())
}

// ==================== RETURNS ====================

#[derive(Debug, sqlx::FromRow)]
struct ReturnRow {
    request_id: i64,
    status: RequestStatus,
    member_name: String,
    no_induk: Option<String>,
    borrow_date: DateTime<Utc>,
    due_date: Option<DateTime<Utc>>,
    returned_on: DateTime<Utc>,
    fine: i64,
    approved_at: Option<DateTime<Utc>>,
    approved_by: Option<String>,
    book_titles: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReturnReportEntry {
    pub request_id: i64,
    pub status: RequestStatus,
    pub nama: String,
    pub no_induk: Option<String>,
    pub tanggal_pinjam: DateTime<Utc>,
    pub tenggat_pengembalian: Option<DateTime<Utc>>,
    pub tanggal_dikembalikan: DateTime<Utc>,
    pub denda: i64,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    pub book_titles: Option<String>,
    pub days_late: i64,
    pub lateness: &'static str,
}

impl From<ReturnRow> for ReturnReportEntry {
    fn from(row: ReturnRow) -> Self {
        let late = row.due_date.map(|due| days_late(due, row.returned_on)).unwrap_or(0);
        Self {
            request_id: row.request_id,
            status: row.status,
            nama: row.member_name,
            no_induk: row.no_induk,
            tanggal_pinjam: row.borrow_date,
            tenggat_pengembalian: row.due_date,
            tanggal_dikembalikan: row.returned_on,
            denda: row.fine,
            approved_at: row.approved_at,
            approved_by: row.approved_by,
            book_titles: row.book_titles,
            days_late: late,
            lateness: LatenessCategory::from_days(late).label(),
        }
    }
}

/// Completed and pending returns, most recent first.
pub async fn returns_report(pool: &SqlitePool, page_query: PageQuery) -> ApiResult<Page<ReturnReportEntry>> {
    let (page, limit, offset) = page_query.normalize();

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM return_records")
        .fetch_one(pool)
        .await?;

    let rows = sqlx::query_as::<_, ReturnRow>(
        r#"SELECT
               br.id AS request_id, br.status, br.borrow_date, br.due_date,
               m.nama AS member_name, m.no_induk,
               rr.returned_on, rr.fine, rr.approved_at,
               a.nama AS approved_by,
               (SELECT GROUP_CONCAT(b.title, ', ')
                  FROM request_lines rl JOIN books b ON b.id = rl.book_id
                 WHERE rl.request_id = br.id) AS book_titles
           FROM return_records rr
           JOIN borrow_requests br ON br.id = rr.request_id
           JOIN users m ON m.id = br.member_id
           LEFT JOIN users a ON a.id = rr.admin_id
           ORDER BY rr.returned_on DESC, rr.id DESC
           LIMIT ? OFFSET ?"#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(Page::new(rows, total, page, limit).map(ReturnReportEntry::from))
}

// ==================== LIBRARY STATISTICS ====================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRow {
    pub metric: &'static str,
    pub value: i64,
    pub unit: &'static str,
}

#[derive(Debug, sqlx::FromRow)]
struct LibraryTotals {
    books: i64,
    copies: i64,
    available_copies: i64,
    members: i64,
    active_loans: i64,
    overdue_loans: i64,
    fines_collected: i64,
}

pub async fn library_statistics(pool: &SqlitePool, now: DateTime<Utc>) -> ApiResult<Vec<MetricRow>> {
    let totals = sqlx::query_as::<_, LibraryTotals>(
        r#"SELECT
               (SELECT COUNT(*) FROM books) AS books,
               (SELECT COALESCE(SUM(total_stock), 0) FROM books) AS copies,
               (SELECT COALESCE(SUM(available_stock), 0) FROM books) AS available_copies,
               (SELECT COUNT(*) FROM users WHERE role = 'member' AND is_active = 1) AS members,
               (SELECT COUNT(*) FROM borrow_requests
                 WHERE status IN ('borrowed', 'waiting_for_return_approval', 'returned')) AS active_loans,
               (SELECT COUNT(*) FROM borrow_requests
                 WHERE status IN ('borrowed', 'waiting_for_return_approval', 'returned')
                   AND due_date IS NOT NULL AND due_date < ?) AS overdue_loans,
               (SELECT COALESCE(SUM(fine), 0) FROM return_records
                 WHERE approved_at IS NOT NULL) AS fines_collected"#,
    )
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(vec![
        MetricRow { metric: "Titles in catalog", value: totals.books, unit: "titles" },
        MetricRow { metric: "Total copies", value: totals.copies, unit: "copies" },
        MetricRow { metric: "Available copies", value: totals.available_copies, unit: "copies" },
        MetricRow { metric: "Active members", value: totals.members, unit: "members" },
        MetricRow { metric: "Active loans", value: totals.active_loans, unit: "requests" },
        MetricRow { metric: "Overdue loans", value: totals.overdue_loans, unit: "requests" },
        MetricRow { metric: "Fines collected", value: totals.fines_collected, unit: "rupiah" },
    ])
}

// ==================== HANDLERS ====================

pub async fn get_popular_books(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<PopularBooksQuery>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    require_admin(&http_request)?;
    let books = popular_books(&app_state.db_pool, query.limit.unwrap_or(DEFAULT_POPULAR_LIMIT)).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(books)))
}

pub async fn get_returns_report(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<PageQuery>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    require_admin(&http_request)?;
    let page = returns_report(&app_state.db_pool, query.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::page(page)))
}

pub async fn get_library_statistics(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    require_admin(&http_request)?;
    let rows = library_statistics(&app_state.db_pool, app_state.circulation.now()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(rows)))
}
