// src/circulation/mod.rs
//! Borrow/return lifecycle engine.
//!
//! The engine is the only writer of request status and available stock.
//! Every operation is a single SQLite transaction whose first statement is a
//! write, so the transaction holds the database write lock before it reads
//! anything it depends on. Status changes are guarded updates
//! (`WHERE id = ? AND status = ?`) and stock decrements are guarded by
//! `available_stock > 0`; a guard that matches no row aborts the transaction.

pub mod locks;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use crate::auth::UserRole;
use crate::clock::Clock;
use crate::error::{ApiError, ApiResult};
use crate::fines::LoanPolicy;
use crate::models::{BorrowRequest, BorrowRequestDetail, RequestLine, RequestStatus, ReturnRecord};
use crate::repositories::{LedgerRepository, Repository};
use crate::validator::BusinessValidator;

pub use locks::BookLocks;

#[derive(Clone)]
pub struct CirculationEngine {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    policy: LoanPolicy,
    locks: BookLocks,
    ledger: LedgerRepository,
}

impl CirculationEngine {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>, policy: LoanPolicy) -> Self {
        Self {
            pool,
            clock,
            policy,
            locks: BookLocks::new(),
            ledger: LedgerRepository::new(),
        }
    }

    pub fn policy(&self) -> &LoanPolicy {
        &self.policy
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ==================== BORROW ====================

    /// Files a new request in `waiting_for_approval`. Stock is checked, not reserved.
    #[tracing::instrument(skip(self))]
    pub async fn submit_borrow_request(
        &self,
        member_id: i64,
        book_ids: &[i64],
    ) -> ApiResult<BorrowRequestDetail> {
        let book_ids = BusinessValidator::book_set(book_ids, self.policy.max_books_per_request)?;

        let role: Option<UserRole> =
            sqlx::query_scalar("SELECT role FROM users WHERE id = ? AND is_active = 1")
                .bind(member_id)
                .fetch_optional(&self.pool)
                .await?;
        match role {
            None => return Err(ApiError::member_not_found(member_id)),
            Some(UserRole::Admin) => {
                return Err(ApiError::Forbidden("Only library members can borrow books".to_string()))
            }
            Some(UserRole::Member) => {}
        }

        let now = self.clock.now();
        let mut tx = self.pool.begin().await?;

        let request_id = sqlx::query(
            r#"INSERT INTO borrow_requests (member_id, status, created_at, borrow_date, updated_at)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(member_id)
        .bind(RequestStatus::WaitingForApproval)
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for book_id in &book_ids {
            let book: Option<(String, i64)> =
                sqlx::query_as("SELECT title, available_stock FROM books WHERE id = ?")
                    .bind(book_id)
                    .fetch_optional(&mut *tx)
                    .await?;

            match book {
                None => {
                    return Err(ApiError::InvalidBookSet(format!(
                        "Book with ID {} does not exist",
                        book_id
                    )))
                }
                Some((title, available)) if available <= 0 => {
                    return Err(ApiError::out_of_stock(&title))
                }
                Some(_) => {}
            }

            sqlx::query("INSERT INTO request_lines (request_id, book_id) VALUES (?, ?)")
                .bind(request_id)
                .bind(book_id)
                .execute(&mut *tx)
                .await?;
        }

        record_event(&mut tx, request_id, None, RequestStatus::WaitingForApproval, member_id, None, now)
            .await?;
        let detail = load_detail(&mut tx, request_id).await?;
        tx.commit().await?;

        log::info!(
            "Member {} submitted borrow request {} for {} book(s)",
            member_id,
            request_id,
            book_ids.len()
        );

        Ok(detail)
    }

    /// Checks out one copy of every requested book and fixes the due date.
    #[tracing::instrument(skip(self))]
    pub async fn approve_borrow(&self, request_id: i64, admin_id: i64) -> ApiResult<BorrowRequestDetail> {
        let request = self.ledger.require(&self.pool, request_id).await?;
        ensure_from(&request, RequestStatus::WaitingForApproval, "approve")?;

        let book_ids = line_book_ids(&self.pool, request_id).await?;
        let _held = self.locks.acquire(&book_ids).await;

        let now = self.clock.now();
        let due_date = self.policy.due_date(request.borrow_date);
        let mut tx = self.pool.begin().await?;

        transition(&mut tx, request_id, RequestStatus::WaitingForApproval, RequestStatus::Borrowed, "approve", now)
            .await?;

        for book_id in &book_ids {
            let result = sqlx::query(
                r#"UPDATE books SET available_stock = available_stock - 1, updated_at = ?
                   WHERE id = ? AND available_stock > 0"#,
            )
            .bind(now)
            .bind(book_id)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                let title: Option<String> = sqlx::query_scalar("SELECT title FROM books WHERE id = ?")
                    .bind(book_id)
                    .fetch_optional(&mut *tx)
                    .await?;
                log::warn!(
                    "Approval of request {} failed: book {} has no available copies",
                    request_id,
                    book_id
                );
                return Err(ApiError::out_of_stock(title.as_deref().unwrap_or("unknown book")));
            }
        }

        sqlx::query(
            "UPDATE borrow_requests SET due_date = ?, decided_by = ?, decided_at = ? WHERE id = ?",
        )
        .bind(due_date)
        .bind(admin_id)
        .bind(now)
        .bind(request_id)
        .execute(&mut *tx)
        .await?;

        record_event(
            &mut tx,
            request_id,
            Some(RequestStatus::WaitingForApproval),
            RequestStatus::Borrowed,
            admin_id,
            None,
            now,
        )
        .await?;
        let detail = load_detail(&mut tx, request_id).await?;
        tx.commit().await?;

        log::info!(
            "Admin {} approved borrow request {} (due {})",
            admin_id,
            request_id,
            due_date.format("%Y-%m-%d")
        );

        Ok(detail)
    }

    #[tracing::instrument(skip(self))]
    pub async fn reject_borrow(
        &self,
        request_id: i64,
        admin_id: i64,
        reason: Option<&str>,
    ) -> ApiResult<BorrowRequestDetail> {
        let now = self.clock.now();
        let mut tx = self.pool.begin().await?;

        transition(&mut tx, request_id, RequestStatus::WaitingForApproval, RequestStatus::Rejected, "reject", now)
            .await?;

        sqlx::query(
            "UPDATE borrow_requests SET rejection_reason = ?, decided_by = ?, decided_at = ? WHERE id = ?",
        )
        .bind(reason)
        .bind(admin_id)
        .bind(now)
        .bind(request_id)
        .execute(&mut *tx)
        .await?;

        record_event(
            &mut tx,
            request_id,
            Some(RequestStatus::WaitingForApproval),
            RequestStatus::Rejected,
            admin_id,
            reason,
            now,
        )
        .await?;
        let detail = load_detail(&mut tx, request_id).await?;
        tx.commit().await?;

        log::info!("Admin {} rejected borrow request {}", admin_id, request_id);

        Ok(detail)
    }

    // ==================== RETURN ====================

    /// Records the return and the fine owed as of now; stock moves only on approval.
    #[tracing::instrument(skip(self))]
    pub async fn submit_return(&self, request_id: i64, member_id: i64) -> ApiResult<BorrowRequestDetail> {
        let request = self.ledger.require(&self.pool, request_id).await?;
        if request.member_id != member_id {
            return Err(ApiError::not_owner());
        }
        if !matches!(request.status, RequestStatus::Borrowed | RequestStatus::Returned) {
            return Err(ApiError::illegal_transition(request.status, "return"));
        }
        let due_date = request.due_date.ok_or_else(|| {
            ApiError::InternalServerError(format!("Borrow request {} is on loan without a due date", request_id))
        })?;

        let now = self.clock.now();
        let fine = self.policy.fine(due_date, now);
        let mut tx = self.pool.begin().await?;

        transition(&mut tx, request_id, request.status, RequestStatus::WaitingForReturnApproval, "return", now)
            .await?;

        sqlx::query(
            r#"INSERT INTO return_records (request_id, returned_on, fine, admin_id, approved_at)
               VALUES (?, ?, ?, NULL, NULL)
               ON CONFLICT(request_id) DO UPDATE SET
                   returned_on = excluded.returned_on,
                   fine = excluded.fine,
                   admin_id = NULL,
                   approved_at = NULL"#,
        )
        .bind(request_id)
        .bind(now)
        .bind(fine)
        .execute(&mut *tx)
        .await?;

        record_event(
            &mut tx,
            request_id,
            Some(request.status),
            RequestStatus::WaitingForReturnApproval,
            member_id,
            None,
            now,
        )
        .await?;
        let detail = load_detail(&mut tx, request_id).await?;
        tx.commit().await?;

        log::info!(
            "Member {} submitted return for request {} (fine {})",
            member_id,
            request_id,
            fine
        );

        Ok(detail)
    }

    /// Puts every copy back on the shelf and closes the request.
    #[tracing::instrument(skip(self))]
    pub async fn approve_return(&self, request_id: i64, admin_id: i64) -> ApiResult<BorrowRequestDetail> {
        let request = self.ledger.require(&self.pool, request_id).await?;
        ensure_from(&request, RequestStatus::WaitingForReturnApproval, "approve the return of")?;

        let book_ids = line_book_ids(&self.pool, request_id).await?;
        let _held = self.locks.acquire(&book_ids).await;

        let now = self.clock.now();
        let mut tx = self.pool.begin().await?;

        transition(
            &mut tx,
            request_id,
            RequestStatus::WaitingForReturnApproval,
            RequestStatus::Completed,
            "approve the return of",
            now,
        )
        .await?;

        for book_id in &book_ids {
            let result = sqlx::query(
                r#"UPDATE books SET available_stock = available_stock + 1, updated_at = ?
                   WHERE id = ? AND available_stock < total_stock"#,
            )
            .bind(now)
            .bind(book_id)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                log::error!(
                    "Stock of book {} is already full while completing request {}",
                    book_id,
                    request_id
                );
                return Err(ApiError::InternalServerError(format!(
                    "Stock of book {} cannot be restored",
                    book_id
                )));
            }
        }

        let stamped = sqlx::query("UPDATE return_records SET admin_id = ?, approved_at = ? WHERE request_id = ?")
            .bind(admin_id)
            .bind(now)
            .bind(request_id)
            .execute(&mut *tx)
            .await?;
        if stamped.rows_affected() == 0 {
            return Err(ApiError::InternalServerError(format!(
                "Borrow request {} has no return record",
                request_id
            )));
        }

        record_event(
            &mut tx,
            request_id,
            Some(RequestStatus::WaitingForReturnApproval),
            RequestStatus::Completed,
            admin_id,
            None,
            now,
        )
        .await?;
        let detail = load_detail(&mut tx, request_id).await?;
        tx.commit().await?;

        log::info!("Admin {} approved return of request {}", admin_id, request_id);

        Ok(detail)
    }

    /// Sends the request back to `returned`; the member may submit the return again.
    #[tracing::instrument(skip(self))]
    pub async fn reject_return(
        &self,
        request_id: i64,
        admin_id: i64,
        reason: Option<&str>,
    ) -> ApiResult<BorrowRequestDetail> {
        let now = self.clock.now();
        let mut tx = self.pool.begin().await?;

        transition(
            &mut tx,
            request_id,
            RequestStatus::WaitingForReturnApproval,
            RequestStatus::Returned,
            "reject the return of",
            now,
        )
        .await?;

        sqlx::query("DELETE FROM return_records WHERE request_id = ?")
            .bind(request_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE borrow_requests SET rejection_reason = ? WHERE id = ?")
            .bind(reason)
            .bind(request_id)
            .execute(&mut *tx)
            .await?;

        record_event(
            &mut tx,
            request_id,
            Some(RequestStatus::WaitingForReturnApproval),
            RequestStatus::Returned,
            admin_id,
            reason,
            now,
        )
        .await?;
        let detail = load_detail(&mut tx, request_id).await?;
        tx.commit().await?;

        log::info!("Admin {} rejected return of request {}", admin_id, request_id);

        Ok(detail)
    }
}

// ==================== TRANSACTION HELPERS ====================

fn ensure_from(request: &BorrowRequest, expected: RequestStatus, action: &str) -> ApiResult<()> {
    if request.status == expected {
        Ok(())
    } else {
        Err(ApiError::illegal_transition(request.status, action))
    }
}

async fn line_book_ids(pool: &SqlitePool, request_id: i64) -> ApiResult<Vec<i64>> {
    let ids = sqlx::query_scalar("SELECT book_id FROM request_lines WHERE request_id = ? ORDER BY book_id")
        .bind(request_id)
        .fetch_all(pool)
        .await?;
    Ok(ids)
}

/// Guarded status change; zero matched rows means another caller got there first.
async fn transition(
    conn: &mut SqliteConnection,
    request_id: i64,
    from: RequestStatus,
    to: RequestStatus,
    action: &str,
    now: DateTime<Utc>,
) -> ApiResult<()> {
    debug_assert!(from.can_transition_to(to), "{:?} -> {:?} is not a legal transition", from, to);

    let result = sqlx::query("UPDATE borrow_requests SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
        .bind(to)
        .bind(now)
        .bind(request_id)
        .bind(from)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        let current: Option<RequestStatus> =
            sqlx::query_scalar("SELECT status FROM borrow_requests WHERE id = ?")
                .bind(request_id)
                .fetch_optional(&mut *conn)
                .await?;
        return Err(match current {
            None => ApiError::request_not_found(request_id),
            Some(current) => ApiError::illegal_transition(current, action),
        });
    }

    Ok(())
}

async fn record_event(
    conn: &mut SqliteConnection,
    request_id: i64,
    from: Option<RequestStatus>,
    to: RequestStatus,
    actor_id: i64,
    note: Option<&str>,
    now: DateTime<Utc>,
) -> ApiResult<()> {
    sqlx::query(
        r#"INSERT INTO request_events (request_id, from_status, to_status, actor_id, note, created_at)
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(request_id)
    .bind(from)
    .bind(to)
    .bind(actor_id)
    .bind(note)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn load_detail(conn: &mut SqliteConnection, request_id: i64) -> ApiResult<BorrowRequestDetail> {
    let request: BorrowRequest = sqlx::query_as("SELECT * FROM borrow_requests WHERE id = ?")
        .bind(request_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ApiError::request_not_found(request_id))?;

    let lines: Vec<RequestLine> =
        sqlx::query_as("SELECT * FROM request_lines WHERE request_id = ? ORDER BY book_id")
            .bind(request_id)
            .fetch_all(&mut *conn)
            .await?;

    let return_record: Option<ReturnRecord> =
        sqlx::query_as("SELECT * FROM return_records WHERE request_id = ?")
            .bind(request_id)
            .fetch_optional(&mut *conn)
            .await?;

    Ok(BorrowRequestDetail { request, lines, return_record })
}
