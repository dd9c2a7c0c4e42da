// src/models/borrow.rs
//! Borrow request ledger types and the request status machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{AsRefStr, Display, EnumString};
use validator::Validate;

use crate::error::{ApiError, ApiResult};

// ==================== STATUS ====================

/// Status of a borrow request.
///
/// Stored in the database in snake_case (`waiting_for_approval`), sent over
/// the wire with the human label the front end filters on
/// (`waiting for approval`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash,
    Serialize, Deserialize, EnumString, Display, AsRefStr, sqlx::Type,
)]
#[strum(serialize_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum RequestStatus {
    #[serde(rename = "waiting for approval", alias = "waiting_for_approval")]
    WaitingForApproval,
    #[serde(rename = "borrowed")]
    Borrowed,
    #[serde(rename = "rejected")]
    Rejected,
    #[serde(rename = "waiting for return approval", alias = "waiting_for_return_approval")]
    WaitingForReturnApproval,
    /// A return that the admin rejected; the member may submit it again.
    #[serde(rename = "returned")]
    Returned,
    #[serde(rename = "completed")]
    Completed,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 6] = [
        RequestStatus::WaitingForApproval,
        RequestStatus::Borrowed,
        RequestStatus::Rejected,
        RequestStatus::WaitingForReturnApproval,
        RequestStatus::Returned,
        RequestStatus::Completed,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            RequestStatus::WaitingForApproval => "waiting for approval",
            RequestStatus::Borrowed => "borrowed",
            RequestStatus::Rejected => "rejected",
            RequestStatus::WaitingForReturnApproval => "waiting for return approval",
            RequestStatus::Returned => "returned",
            RequestStatus::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Rejected | RequestStatus::Completed)
    }

    /// The member holds the books: stock for every line is checked out.
    pub fn is_on_loan(&self) -> bool {
        matches!(
            self,
            RequestStatus::Borrowed | RequestStatus::WaitingForReturnApproval | RequestStatus::Returned
        )
    }

    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        use RequestStatus::*;
        matches!(
            (self, next),
            (WaitingForApproval, Borrowed)
                | (WaitingForApproval, Rejected)
                | (Borrowed, WaitingForReturnApproval)
                | (Returned, WaitingForReturnApproval)
                | (WaitingForReturnApproval, Completed)
                | (WaitingForReturnApproval, Returned)
        )
    }

    /// Parses a wire label, a snake_case name, or one of the legacy labels
    /// (`pending`, `approved`, `dipinjam`, `selesai`).
    pub fn parse_label(value: &str) -> Option<Self> {
        let normalized = value.trim().to_lowercase();
        if let Some(status) = Self::ALL.iter().find(|s| s.label() == normalized) {
            return Some(*status);
        }
        if let Ok(status) = RequestStatus::from_str(&normalized.replace(' ', "_")) {
            return Some(status);
        }
        match normalized.as_str() {
            "pending" => Some(RequestStatus::WaitingForApproval),
            "approved" | "dipinjam" => Some(RequestStatus::Borrowed),
            "selesai" => Some(RequestStatus::Completed),
            _ => None,
        }
    }
}

/// Status predicate of the ledger list views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    All,
    Only(RequestStatus),
    /// On-loan requests whose due date has passed.
    Overdue,
}

impl StatusFilter {
    pub fn parse(value: Option<&str>) -> ApiResult<Self> {
        let raw = match value.map(str::trim) {
            None | Some("") => return Ok(StatusFilter::All),
            Some(raw) => raw,
        };

        match raw.to_lowercase().as_str() {
            "all" => Ok(StatusFilter::All),
            "overdue" | "terlambat" => Ok(StatusFilter::Overdue),
            _ => RequestStatus::parse_label(raw)
                .map(StatusFilter::Only)
                .ok_or_else(|| ApiError::BadRequest(format!("Unknown status filter '{}'", raw))),
        }
    }
}

// ==================== LEDGER ROWS ====================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BorrowRequest {
    pub id: i64,
    #[serde(rename = "user_id")]
    pub member_id: i64,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "tanggal_pinjam")]
    pub borrow_date: DateTime<Utc>,
    #[serde(rename = "tenggat_pengembalian")]
    pub due_date: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub decided_by: Option<i64>,
    pub decided_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RequestLine {
    pub id: i64,
    #[serde(rename = "peminjaman_id")]
    pub request_id: i64,
    #[serde(rename = "buku_id")]
    pub book_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReturnRecord {
    pub id: i64,
    #[serde(rename = "peminjaman_id")]
    pub request_id: i64,
    #[serde(rename = "tanggal_dikembalikan")]
    pub returned_on: DateTime<Utc>,
    #[serde(rename = "denda")]
    pub fine: i64,
    pub admin_id: Option<i64>,
    pub approved_at: Option<DateTime<Utc>>,
}

/// One transition of a borrow request, written together with the change.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RequestEvent {
    pub id: i64,
    #[serde(rename = "peminjaman_id")]
    pub request_id: i64,
    pub from_status: Option<RequestStatus>,
    pub to_status: RequestStatus,
    pub actor_id: i64,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A borrow request together with its lines and return record.
#[derive(Debug, Clone, Serialize)]
pub struct BorrowRequestDetail {
    #[serde(flatten)]
    pub request: BorrowRequest,
    pub lines: Vec<RequestLine>,
    pub return_record: Option<ReturnRecord>,
}

// ==================== REQUEST BODIES ====================

#[derive(Debug, Deserialize)]
pub struct SubmitBorrowRequest {
    #[serde(rename = "bookIds", alias = "book_ids")]
    pub book_ids: Vec<i64>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct DecisionRequest {
    #[validate(length(max = 500, message = "Reason cannot exceed 500 characters"))]
    pub reason: Option<String>,
}

impl DecisionRequest {
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref().map(str::trim).filter(|r| !r.is_empty())
    }
}
