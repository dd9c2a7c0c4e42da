// src/repositories/ledger.rs
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::Repository;
use crate::error::{ApiError, ApiResult};
use crate::fines::{days_late, days_remaining, LoanPolicy};
use crate::models::{
    AcademicRole, BorrowRequest, BorrowRequestDetail, MemberProfile, RequestEvent, RequestLine,
    RequestStatus, ReturnRecord, StatusFilter,
};
use crate::pagination::{Page, PageQuery};

const ON_LOAN_STATUSES: &str = "('borrowed', 'waiting_for_return_approval', 'returned')";

/// Whose requests a ledger query covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerScope {
    All,
    Member(i64),
}

impl LedgerScope {
    fn member_id(&self) -> Option<i64> {
        match self {
            LedgerScope::All => None,
            LedgerScope::Member(id) => Some(*id),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LedgerRow {
    id: i64,
    member_id: i64,
    status: RequestStatus,
    created_at: DateTime<Utc>,
    borrow_date: DateTime<Utc>,
    due_date: Option<DateTime<Utc>>,
    rejection_reason: Option<String>,
    member_name: String,
    member_username: String,
    member_email: String,
    academic_role: Option<AcademicRole>,
    no_induk: Option<String>,
    total_books: i64,
    book_titles: Option<String>,
    book_authors: Option<String>,
    publishers: Option<String>,
    return_date: Option<DateTime<Utc>>,
    recorded_fine: Option<i64>,
}

/// One borrow request as the admin ledger and the bookshelf present it.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub user_id: i64,
    pub status: RequestStatus,
    pub status_detail: String,
    pub created_at: DateTime<Utc>,
    pub tanggal_pinjam: DateTime<Utc>,
    pub tenggat_pengembalian: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub nama: String,
    pub username: String,
    pub email: String,
    pub academic_role: Option<AcademicRole>,
    pub no_induk: Option<String>,
    pub total_books: i64,
    pub book_titles: Option<String>,
    pub book_authors: Option<String>,
    pub publishers: Option<String>,
    pub return_date: Option<DateTime<Utc>>,
    pub days_overdue: i64,
    pub days_remaining: i64,
    pub total_fine: i64,
}

impl LedgerEntry {
    fn from_row(row: LedgerRow, now: DateTime<Utc>, policy: &LoanPolicy) -> Self {
        let on_loan = row.status.is_on_loan();
        let (days_overdue, remaining) = match (on_loan, row.due_date) {
            (true, Some(due)) => (days_late(due, now), days_remaining(due, now)),
            _ => (0, 0),
        };

        let status_detail = if days_overdue > 0 {
            "overdue".to_string()
        } else {
            row.status.label().to_string()
        };

        // Fine accrued so far while the books are still out
        let total_fine = match (row.recorded_fine, on_loan, row.due_date) {
            (Some(fine), _, _) => fine,
            (None, true, Some(due)) => policy.fine(due, now),
            _ => 0,
        };

        Self {
            id: row.id,
            user_id: row.member_id,
            status: row.status,
            status_detail,
            created_at: row.created_at,
            tanggal_pinjam: row.borrow_date,
            tenggat_pengembalian: row.due_date,
            rejection_reason: row.rejection_reason,
            nama: row.member_name,
            username: row.member_username,
            email: row.member_email,
            academic_role: row.academic_role,
            no_induk: row.no_induk,
            total_books: row.total_books,
            book_titles: row.book_titles,
            book_authors: row.book_authors,
            publishers: row.publishers,
            return_date: row.return_date,
            days_overdue,
            days_remaining: remaining,
            total_fine,
        }
    }
}

/// Per-status counts taken in a single statement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct LedgerStatistics {
    pub total: i64,
    pub waiting_approval: i64,
    pub borrowed: i64,
    pub returned: i64,
    pub waiting_return_approval: i64,
    pub completed: i64,
    pub rejected: i64,
    pub overdue: i64,
    pub total_fines: i64,
}

const ENTRY_SELECT: &str = r#"
    SELECT
        br.id, br.member_id, br.status, br.created_at, br.borrow_date, br.due_date,
        br.rejection_reason,
        u.nama AS member_name, u.username AS member_username, u.email AS member_email,
        u.academic_role, u.no_induk,
        (SELECT COUNT(*) FROM request_lines rl WHERE rl.request_id = br.id) AS total_books,
        (SELECT GROUP_CONCAT(b.title, ', ')
           FROM request_lines rl JOIN books b ON b.id = rl.book_id
          WHERE rl.request_id = br.id) AS book_titles,
        (SELECT GROUP_CONCAT(DISTINCT a.nama_depan || COALESCE(' ' || a.nama_belakang, ''))
           FROM request_lines rl
           JOIN book_authors ba ON ba.book_id = rl.book_id
           JOIN authors a ON a.id = ba.author_id
          WHERE rl.request_id = br.id) AS book_authors,
        (SELECT GROUP_CONCAT(DISTINCT p.nama)
           FROM request_lines rl
           JOIN books b ON b.id = rl.book_id
           JOIN publishers p ON p.id = b.publisher_id
          WHERE rl.request_id = br.id) AS publishers,
        rr.returned_on AS return_date,
        rr.fine AS recorded_fine
    FROM borrow_requests br
    JOIN users u ON u.id = br.member_id
    LEFT JOIN return_records rr ON rr.request_id = br.id
    WHERE 1 = 1"#;

#[derive(Debug, Default, Clone, Copy)]
pub struct LedgerRepository;

#[async_trait::async_trait]
impl Repository<BorrowRequest> for LedgerRepository {
    fn table_name(&self) -> &'static str {
        "borrow_requests"
    }

    fn not_found(&self, id: i64) -> ApiError {
        ApiError::request_not_found(id)
    }
}

impl LedgerRepository {
    pub fn new() -> Self {
        Self
    }

    fn push_filters(
        builder: &mut QueryBuilder<'_, Sqlite>,
        scope: LedgerScope,
        filter: StatusFilter,
        now: DateTime<Utc>,
    ) {
        if let Some(member_id) = scope.member_id() {
            builder.push(" AND br.member_id = ").push_bind(member_id);
        }

        match filter {
            StatusFilter::All => {}
            StatusFilter::Only(status) => {
                builder.push(" AND br.status = ").push_bind(status);
            }
            StatusFilter::Overdue => {
                builder
                    .push(" AND br.status IN ")
                    .push(ON_LOAN_STATUSES)
                    .push(" AND br.due_date IS NOT NULL AND br.due_date < ")
                    .push_bind(now);
            }
        }
    }

    pub async fn list_entries(
        &self,
        pool: &SqlitePool,
        scope: LedgerScope,
        filter: StatusFilter,
        page_query: PageQuery,
        now: DateTime<Utc>,
        policy: &LoanPolicy,
    ) -> ApiResult<Page<LedgerEntry>> {
        let (page, limit, offset) = page_query.normalize();

        let mut count_builder =
            QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM borrow_requests br WHERE 1 = 1");
        Self::push_filters(&mut count_builder, scope, filter, now);
        let total: i64 = count_builder.build_query_scalar().fetch_one(pool).await?;

        let mut builder = QueryBuilder::<Sqlite>::new(ENTRY_SELECT);
        Self::push_filters(&mut builder, scope, filter, now);
        builder
            .push(" ORDER BY br.created_at DESC, br.id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows: Vec<LedgerRow> = builder.build_query_as().fetch_all(pool).await?;

        Ok(Page::new(rows, total, page, limit).map(|row| LedgerEntry::from_row(row, now, policy)))
    }

    pub async fn statistics(
        &self,
        pool: &SqlitePool,
        scope: LedgerScope,
        now: DateTime<Utc>,
    ) -> ApiResult<LedgerStatistics> {
        let sql = format!(
            r#"SELECT
                COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN br.status = 'waiting_for_approval' THEN 1 ELSE 0 END), 0) AS waiting_approval,
                COALESCE(SUM(CASE WHEN br.status = 'borrowed' THEN 1 ELSE 0 END), 0) AS borrowed,
                COALESCE(SUM(CASE WHEN br.status = 'returned' THEN 1 ELSE 0 END), 0) AS returned,
                COALESCE(SUM(CASE WHEN br.status = 'waiting_for_return_approval' THEN 1 ELSE 0 END), 0) AS waiting_return_approval,
                COALESCE(SUM(CASE WHEN br.status = 'completed' THEN 1 ELSE 0 END), 0) AS completed,
                COALESCE(SUM(CASE WHEN br.status = 'rejected' THEN 1 ELSE 0 END), 0) AS rejected,
                COALESCE(SUM(CASE WHEN br.status IN {on_loan}
                                   AND br.due_date IS NOT NULL AND br.due_date < ?
                                  THEN 1 ELSE 0 END), 0) AS overdue,
                COALESCE(SUM(rr.fine), 0) AS total_fines
               FROM borrow_requests br
               LEFT JOIN return_records rr ON rr.request_id = br.id
               WHERE (? IS NULL OR br.member_id = ?)"#,
            on_loan = ON_LOAN_STATUSES
        );

        let member_id = scope.member_id();
        let stats = sqlx::query_as::<_, LedgerStatistics>(&sql)
            .bind(now)
            .bind(member_id)
            .bind(member_id)
            .fetch_one(pool)
            .await?;

        Ok(stats)
    }

    pub async fn detail(&self, pool: &SqlitePool, request_id: i64) -> ApiResult<BorrowRequestDetail> {
        let request = self.require(pool, request_id).await?;

        let lines: Vec<RequestLine> =
            sqlx::query_as("SELECT * FROM request_lines WHERE request_id = ? ORDER BY book_id")
                .bind(request_id)
                .fetch_all(pool)
                .await?;

        let return_record: Option<ReturnRecord> =
            sqlx::query_as("SELECT * FROM return_records WHERE request_id = ?")
                .bind(request_id)
                .fetch_optional(pool)
                .await?;

        Ok(BorrowRequestDetail { request, lines, return_record })
    }

    pub async fn events(&self, pool: &SqlitePool, request_id: i64) -> ApiResult<Vec<RequestEvent>> {
        let events = sqlx::query_as::<_, RequestEvent>(
            "SELECT * FROM request_events WHERE request_id = ? ORDER BY id ASC",
        )
        .bind(request_id)
        .fetch_all(pool)
        .await?;
        Ok(events)
    }

    /// The member's transition log, newest first.
    pub async fn member_history(
        &self,
        pool: &SqlitePool,
        member_id: i64,
        page_query: PageQuery,
    ) -> ApiResult<Page<RequestEvent>> {
        let (page, limit, offset) = page_query.normalize();

        let total: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM request_events e
               JOIN borrow_requests br ON br.id = e.request_id
               WHERE br.member_id = ?"#,
        )
        .bind(member_id)
        .fetch_one(pool)
        .await?;

        let events = sqlx::query_as::<_, RequestEvent>(
            r#"SELECT e.* FROM request_events e
               JOIN borrow_requests br ON br.id = e.request_id
               WHERE br.member_id = ?
               ORDER BY e.created_at DESC, e.id DESC
               LIMIT ? OFFSET ?"#,
        )
        .bind(member_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        Ok(Page::new(events, total, page, limit))
    }

    pub async fn member_profile(&self, pool: &SqlitePool, member_id: i64) -> ApiResult<MemberProfile> {
        sqlx::query_as::<_, MemberProfile>(
            r#"SELECT id, nama, username, email, academic_role, no_induk
               FROM users WHERE id = ? AND role = 'member'"#,
        )
        .bind(member_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::member_not_found(member_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circulation::testing::{fixture, start_time};
    use crate::clock::Clock;
    use crate::db::testing::insert_book;
    use chrono::Duration;

    #[actix_rt::test]
    async fn test_list_filters_and_overdue() {
        let f = fixture().await;
        let book = insert_book(&f.pool, "Negeri 5 Menara", 5).await;
        let repo = LedgerRepository::new();
        let policy = LoanPolicy::default();

        let pending = f.engine.submit_borrow_request(f.member, &[book]).await.unwrap().request.id;
        let on_loan = f.engine.submit_borrow_request(f.member, &[book]).await.unwrap().request.id;
        let theirs = f.engine.submit_borrow_request(f.other_member, &[book]).await.unwrap().request.id;
        f.engine.approve_borrow(on_loan, f.admin).await.unwrap();
        f.engine.reject_borrow(theirs, f.admin, None).await.unwrap();

        let now = start_time() + Duration::days(20);
        let all = repo
            .list_entries(&f.pool, LedgerScope::All, StatusFilter::All, PageQuery::default(), now, &policy)
            .await
            .unwrap();
        assert_eq!(all.pagination.total, 3);

        let mine = repo
            .list_entries(&f.pool, LedgerScope::Member(f.member), StatusFilter::All, PageQuery::default(), now, &policy)
            .await
            .unwrap();
        assert_eq!(mine.pagination.total, 2);
        assert!(mine.items.iter().all(|e| e.user_id == f.member));

        let waiting = repo
            .list_entries(
                &f.pool,
                LedgerScope::All,
                StatusFilter::Only(RequestStatus::WaitingForApproval),
                PageQuery::default(),
                now,
                &policy,
            )
            .await
            .unwrap();
        assert_eq!(waiting.items.len(), 1);
        assert_eq!(waiting.items[0].id, pending);

        let overdue = repo
            .list_entries(&f.pool, LedgerScope::All, StatusFilter::Overdue, PageQuery::default(), now, &policy)
            .await
            .unwrap();
        assert_eq!(overdue.items.len(), 1);
        let entry = &overdue.items[0];
        assert_eq!(entry.id, on_loan);
        assert_eq!(entry.status_detail, "overdue");
        assert_eq!(entry.days_overdue, 6);
        assert_eq!(entry.days_remaining, 0);
        assert_eq!(entry.total_fine, 6000);
        assert_eq!(entry.book_titles.as_deref(), Some("Negeri 5 Menara"));

        // Before the due date nothing is overdue
        let early = start_time() + Duration::days(10);
        let overdue = repo
            .list_entries(&f.pool, LedgerScope::All, StatusFilter::Overdue, PageQuery::default(), early, &policy)
            .await
            .unwrap();
        assert!(overdue.items.is_empty());
        let current = repo
            .list_entries(
                &f.pool,
                LedgerScope::All,
                StatusFilter::Only(RequestStatus::Borrowed),
                PageQuery::default(),
                early,
                &policy,
            )
            .await
            .unwrap();
        assert_eq!(current.items[0].status_detail, "borrowed");
        assert_eq!(current.items[0].days_remaining, 4);
        assert_eq!(current.items[0].total_fine, 0);
    }

    #[actix_rt::test]
    async fn test_moment_past_due_is_overdue_everywhere() {
        let f = fixture().await;
        let book = insert_book(&f.pool, "Ronggeng Dukuh Paruk", 1).await;
        let repo = LedgerRepository::new();
        let policy = LoanPolicy::default();

        let id = f.engine.submit_borrow_request(f.member, &[book]).await.unwrap().request.id;
        f.engine.approve_borrow(id, f.admin).await.unwrap();

        let now = policy.due_date(start_time()) + Duration::milliseconds(500);
        let overdue = repo
            .list_entries(&f.pool, LedgerScope::All, StatusFilter::Overdue, PageQuery::default(), now, &policy)
            .await
            .unwrap();
        assert_eq!(overdue.items.len(), 1);
        let entry = &overdue.items[0];
        assert_eq!(entry.status_detail, "overdue");
        assert_eq!(entry.days_overdue, 1);
        assert_eq!(entry.total_fine, 1000);
    }

    #[actix_rt::test]
    async fn test_pagination_newest_first() {
        let f = fixture().await;
        let book = insert_book(&f.pool, "Sang Pemimpi", 10).await;
        let mut ids = Vec::new();
        for _ in 0..5 {
            f.clock.advance(Duration::minutes(1));
            ids.push(f.engine.submit_borrow_request(f.member, &[book]).await.unwrap().request.id);
        }

        let page = LedgerRepository::new()
            .list_entries(
                &f.pool,
                LedgerScope::All,
                StatusFilter::All,
                PageQuery::new(2, 2),
                f.clock.now(),
                &LoanPolicy::default(),
            )
            .await
            .unwrap();
        assert_eq!(page.pagination.total, 5);
        assert_eq!(page.pagination.total_pages, 3);
        let listed: Vec<i64> = page.items.iter().map(|e| e.id).collect();
        assert_eq!(listed, vec![ids[2], ids[1]]);
    }

    #[actix_rt::test]
    async fn test_statistics_counts_and_fines() {
        let f = fixture().await;
        let book = insert_book(&f.pool, "Supernova", 5).await;
        let repo = LedgerRepository::new();

        let late = f.engine.submit_borrow_request(f.member, &[book]).await.unwrap().request.id;
        let kept = f.engine.submit_borrow_request(f.member, &[book]).await.unwrap().request.id;
        f.engine.submit_borrow_request(f.other_member, &[book]).await.unwrap();
        f.engine.approve_borrow(late, f.admin).await.unwrap();
        f.engine.approve_borrow(kept, f.admin).await.unwrap();

        f.clock.advance(Duration::days(16));
        f.engine.submit_return(late, f.member).await.unwrap();
        f.engine.approve_return(late, f.admin).await.unwrap();

        let now = f.clock.now();
        let stats = repo.statistics(&f.pool, LedgerScope::All, now).await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.waiting_approval, 1);
        assert_eq!(stats.borrowed, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.overdue, 1);
        assert_eq!(stats.total_fines, 2000);

        let theirs = repo.statistics(&f.pool, LedgerScope::Member(f.other_member), now).await.unwrap();
        assert_eq!(theirs.total, 1);
        assert_eq!(theirs.waiting_approval, 1);
        assert_eq!(theirs.total_fines, 0);
    }

    #[actix_rt::test]
    async fn test_member_history_and_profile() {
        let f = fixture().await;
        let book = insert_book(&f.pool, "Rumah Kaca", 1).await;
        let repo = LedgerRepository::new();

        let id = f.engine.submit_borrow_request(f.member, &[book]).await.unwrap().request.id;
        f.clock.advance(Duration::hours(1));
        f.engine.approve_borrow(id, f.admin).await.unwrap();

        let history = repo.member_history(&f.pool, f.member, PageQuery::default()).await.unwrap();
        assert_eq!(history.pagination.total, 2);
        assert_eq!(history.items[0].to_status, RequestStatus::Borrowed);
        assert_eq!(history.items[0].actor_id, f.admin);
        assert_eq!(history.items[1].to_status, RequestStatus::WaitingForApproval);

        let empty = repo.member_history(&f.pool, f.other_member, PageQuery::default()).await.unwrap();
        assert_eq!(empty.pagination.total, 0);

        let profile = repo.member_profile(&f.pool, f.member).await.unwrap();
        assert_eq!(profile.username, "andi");
        assert_eq!(profile.academic_role, Some(AcademicRole::Mahasiswa));
        assert!(matches!(repo.member_profile(&f.pool, f.admin).await, Err(ApiError::NotFound(_))));
    }
}
