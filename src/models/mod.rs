// src/models/mod.rs
//! Domain types of the catalog and the borrow ledger

pub mod book;
pub mod borrow;
pub mod member;

pub use book::{
    Author, Book, BookListing, BookQuery, CreateAuthorRequest, CreateBookRequest,
    CreatePublisherRequest, Publisher, UpdateStockRequest,
};
pub use borrow::{
    BorrowRequest, BorrowRequestDetail, DecisionRequest, RequestEvent, RequestLine,
    RequestStatus, ReturnRecord, StatusFilter, SubmitBorrowRequest,
};
pub use member::{AcademicRole, MemberProfile};
