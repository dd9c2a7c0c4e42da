// src/routes.rs - URL layout of the service

use actix_web::web;
use actix_web_httpauth::middleware::HttpAuthentication;

use crate::admin_handlers;
use crate::auth::jwt_middleware;
use crate::auth_handlers;
use crate::book_handlers;
use crate::bookshelf_handlers;
use crate::borrow_handlers;
use crate::monitoring;
use crate::report_handlers;

/// Public scopes are registered before the protected `/api` scope so they match first.
pub fn configure(cfg: &mut web::ServiceConfig) {
    let auth_middleware = HttpAuthentication::bearer(jwt_middleware);

    cfg
        // Health check and metrics (no auth)
        .service(
            web::scope("/health")
                .route("", web::get().to(monitoring::health_check))
                .route("/ready", web::get().to(monitoring::readiness_check))
                .route("/metrics", web::get().to(monitoring::metrics_endpoint)),
        )
        .service(
            web::scope("/api/auth")
                .route("/register", web::post().to(auth_handlers::register))
                .route("/login", web::post().to(auth_handlers::login)),
        )
        .service(
            web::scope("/api/books")
                .route("", web::get().to(book_handlers::get_books))
                .route("/{id}", web::get().to(book_handlers::get_book)),
        )
        // Protected API endpoints
        .service(
            web::scope("/api")
                .wrap(auth_middleware)
                .route("/profile", web::get().to(auth_handlers::get_profile))
                .service(
                    web::scope("/borrow")
                        .route("/request", web::post().to(borrow_handlers::submit_borrow_request))
                        .route("/return/{id}", web::post().to(borrow_handlers::submit_return)),
                )
                .service(
                    web::scope("/bookshelf/{member_id}")
                        .route("", web::get().to(bookshelf_handlers::get_bookshelf))
                        .route("/statistics", web::get().to(bookshelf_handlers::get_bookshelf_statistics))
                        .route("/summary", web::get().to(bookshelf_handlers::get_bookshelf_statistics))
                        .route("/history", web::get().to(bookshelf_handlers::get_bookshelf_history)),
                )
                .service(
                    web::scope("/admin")
                        .route("/requests", web::get().to(admin_handlers::get_requests))
                        .route("/statistics", web::get().to(admin_handlers::get_statistics))
                        .route("/requests/{id}/approve", web::post().to(admin_handlers::approve_borrow))
                        .route("/requests/{id}/reject", web::post().to(admin_handlers::reject_borrow))
                        .route("/returns/{id}/approve", web::post().to(admin_handlers::approve_return))
                        .route("/returns/{id}/reject", web::post().to(admin_handlers::reject_return))
                        // Catalog
                        .route("/books", web::post().to(book_handlers::create_book))
                        .route("/books/{id}/stock", web::put().to(book_handlers::update_book_stock))
                        .route("/publishers", web::get().to(book_handlers::get_publishers))
                        .route("/publishers", web::post().to(book_handlers::create_publisher))
                        .route("/authors", web::get().to(book_handlers::get_authors))
                        .route("/authors", web::post().to(book_handlers::create_author))
                        // Reports
                        .route("/reports/popular-books", web::get().to(report_handlers::get_popular_books))
                        .route("/reports/returns", web::get().to(report_handlers::get_returns_report))
                        .route("/reports/statistics", web::get().to(report_handlers::get_library_statistics)),
                ),
        );
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::test::{call_service, init_service, read_body_json, TestRequest};
    use actix_web::App;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::{json, Value};
    use std::sync::Arc;

    use crate::auth::{test_auth_service, AuthService, User};
    use crate::clock::ManualClock;
    use crate::config::Config;
    use crate::db::testing::{available_stock, insert_book, memory_pool};
    use crate::monitoring::Metrics;
    use crate::AppState;

    struct Harness {
        state: Arc<AppState>,
        auth: Arc<AuthService>,
        clock: ManualClock,
    }

    async fn harness() -> Harness {
        let pool = memory_pool().await;
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap());
        let state = Arc::new(AppState::new(pool, Config::default(), Arc::new(clock.clone())));
        Harness { state, auth: Arc::new(test_auth_service()), clock }
    }

    macro_rules! app {
        ($h:expr) => {
            init_service(
                App::new()
                    .app_data(web::Data::new($h.state.clone()))
                    .app_data(web::Data::new($h.auth.clone()))
                    .app_data(web::Data::new(Arc::new(Metrics::new())))
                    .configure(configure),
            )
            .await
        };
    }

    fn bearer(token: &str) -> (&'static str, String) {
        ("Authorization", format!("Bearer {}", token))
    }

    #[actix_rt::test]
    async fn test_full_loan_over_http() {
        let h = harness().await;
        let app = app!(h);
        let book = insert_book(&h.state.db_pool, "Laskar Pelangi", 1).await;

        User::create_admin(&h.state.db_pool, "pustakawan", "pustaka@univ.ac.id", "Admin2024", &h.auth)
            .await
            .unwrap();
        let resp = call_service(
            &app,
            TestRequest::post()
                .uri("/api/auth/login")
                .set_json(json!({"username": "pustakawan", "password": "Admin2024"}))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = read_body_json(resp).await;
        let admin_token = body["data"]["token"].as_str().unwrap().to_string();

        let resp = call_service(
            &app,
            TestRequest::post()
                .uri("/api/auth/register")
                .set_json(json!({
                    "nama": "Ikal",
                    "username": "ikal",
                    "email": "ikal@univ.ac.id",
                    "password": "Belitong2024",
                    "academic_role": "mahasiswa",
                    "no_induk": "2021001"
                }))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = read_body_json(resp).await;
        let member_token = body["data"]["token"].as_str().unwrap().to_string();
        let member_id = body["data"]["user"]["id"].as_i64().unwrap();

        // Submit
        let resp = call_service(
            &app,
            TestRequest::post()
                .uri("/api/borrow/request")
                .insert_header(bearer(&member_token))
                .set_json(json!({"bookIds": [book]}))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = read_body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["status"], "waiting for approval");
        let request_id = body["data"]["id"].as_i64().unwrap();

        // Members cannot decide
        let resp = call_service(
            &app,
            TestRequest::post()
                .uri(&format!("/api/admin/requests/{}/approve", request_id))
                .insert_header(bearer(&member_token))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = call_service(
            &app,
            TestRequest::post()
                .uri(&format!("/api/admin/requests/{}/approve", request_id))
                .insert_header(bearer(&admin_token))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(available_stock(&h.state.db_pool, book).await, 0);

        let resp = call_service(
            &app,
            TestRequest::post()
                .uri(&format!("/api/admin/requests/{}/approve", request_id))
                .insert_header(bearer(&admin_token))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body: Value = read_body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["status"], false);

        // Overdue on the bookshelf after the loan period
        h.clock.advance(Duration::days(16));
        let resp = call_service(
            &app,
            TestRequest::get()
                .uri(&format!("/api/bookshelf/{}?status=overdue", member_id))
                .insert_header(bearer(&member_token))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = read_body_json(resp).await;
        assert_eq!(body["data"]["member"]["username"], "ikal");
        assert_eq!(body["data"]["summary"]["overdue"], 1);
        assert_eq!(body["data"]["requests"][0]["status_detail"], "overdue");
        assert_eq!(body["data"]["requests"][0]["days_overdue"], 2);
        assert_eq!(body["pagination"]["total"], 1);

        let resp = call_service(
            &app,
            TestRequest::post()
                .uri(&format!("/api/borrow/return/{}", request_id))
                .insert_header(bearer(&member_token))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = read_body_json(resp).await;
        assert_eq!(body["data"]["status"], "waiting for return approval");
        assert_eq!(body["data"]["return_record"]["denda"], 2000);

        let resp = call_service(
            &app,
            TestRequest::post()
                .uri(&format!("/api/admin/returns/{}/approve", request_id))
                .insert_header(bearer(&admin_token))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(available_stock(&h.state.db_pool, book).await, 1);

        let resp = call_service(
            &app,
            TestRequest::get()
                .uri("/api/admin/requests?type=completed")
                .insert_header(bearer(&admin_token))
                .to_request(),
        )
        .await;
        let body: Value = read_body_json(resp).await;
        assert_eq!(body["pagination"]["total"], 1);
        assert_eq!(body["data"][0]["total_fine"], 2000);
        assert_eq!(body["data"][0]["nama"], "Ikal");

        let resp = call_service(
            &app,
            TestRequest::get()
                .uri(&format!("/api/bookshelf/{}/history", member_id))
                .insert_header(bearer(&member_token))
                .to_request(),
        )
        .await;
        let body: Value = read_body_json(resp).await;
        assert_eq!(body["pagination"]["total"], 4);
        assert_eq!(body["data"][0]["to_status"], "completed");
    }

    #[actix_rt::test]
    async fn test_access_rules() {
        let h = harness().await;
        let app = app!(h);
        insert_book(&h.state.db_pool, "Sang Pemimpi", 2).await;

        let admin = User::create_admin(&h.state.db_pool, "pustakawan", "pustaka@univ.ac.id", "Admin2024", &h.auth)
            .await
            .unwrap();
        let admin_token = h.auth.generate_token(&admin).unwrap();

        // Catalog is public
        let resp = call_service(&app, TestRequest::get().uri("/api/books?tersedia=true").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = read_body_json(resp).await;
        assert_eq!(body["pagination"]["total"], 1);
        assert_eq!(body["data"][0]["tersedia"], true);

        let resp = call_service(&app, TestRequest::get().uri("/api/books/999").to_request()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        // Everything else needs a token
        let resp = call_service(&app, TestRequest::get().uri("/api/profile").to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = call_service(
            &app,
            TestRequest::get()
                .uri("/api/profile")
                .insert_header(bearer("not-a-token"))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        // Admins do not borrow
        let resp = call_service(
            &app,
            TestRequest::post()
                .uri("/api/borrow/request")
                .insert_header(bearer(&admin_token))
                .set_json(json!({"bookIds": [1]}))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = call_service(
            &app,
            TestRequest::get()
                .uri("/api/admin/requests?type=lost")
                .insert_header(bearer(&admin_token))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = call_service(
            &app,
            TestRequest::get()
                .uri("/api/admin/reports/statistics")
                .insert_header(bearer(&admin_token))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = read_body_json(resp).await;
        assert_eq!(body["data"][0]["metric"], "Titles in catalog");
        assert_eq!(body["data"][0]["value"], 1);

        let resp = call_service(&app, TestRequest::get().uri("/health/ready").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_rt::test]
    async fn test_members_only_see_their_own_bookshelf() {
        let h = harness().await;
        let app = app!(h);

        let mut tokens = Vec::new();
        for username in ["ikal", "lintang"] {
            let resp = call_service(
                &app,
                TestRequest::post()
                    .uri("/api/auth/register")
                    .set_json(json!({
                        "nama": username,
                        "username": username,
                        "email": format!("{}@univ.ac.id", username),
                        "password": "Belitong2024",
                        "academic_role": "mahasiswa"
                    }))
                    .to_request(),
            )
            .await;
            let body: Value = read_body_json(resp).await;
            tokens.push((
                body["data"]["token"].as_str().unwrap().to_string(),
                body["data"]["user"]["id"].as_i64().unwrap(),
            ));
        }
        let (ikal_token, ikal_id) = &tokens[0];
        let (_, lintang_id) = &tokens[1];

        let resp = call_service(
            &app,
            TestRequest::get()
                .uri(&format!("/api/bookshelf/{}/summary", ikal_id))
                .insert_header(bearer(ikal_token))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = call_service(
            &app,
            TestRequest::get()
                .uri(&format!("/api/bookshelf/{}", lintang_id))
                .insert_header(bearer(ikal_token))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = call_service(
            &app,
            TestRequest::post()
                .uri("/api/borrow/request")
                .insert_header(bearer(ikal_token))
                .set_json(json!({"bookIds": []}))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
