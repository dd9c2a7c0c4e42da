// src/audit.rs - Append-only audit trail of administrative actions

use actix_web::HttpRequest;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Write one entry to `audit_logs`.
pub async fn log_activity(
    pool: &SqlitePool,
    user_id: Option<i64>,
    action: &str,
    entity_type: &str,
    entity_id: Option<&str>,
    description: Option<&str>,
    request: Option<&HttpRequest>,
) -> Result<(), sqlx::Error> {
    let id = Uuid::new_v4().to_string();

    let ip_address = request.and_then(|req| {
        req.connection_info()
            .realip_remote_addr()
            .map(|s| s.to_string())
    });

    let user_agent = request.and_then(|req| {
        req.headers()
            .get("User-Agent")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    });

    sqlx::query(
        r#"INSERT INTO audit_logs
           (id, user_id, action, entity_type, entity_id, description, ip_address, user_agent, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(user_id)
    .bind(action)
    .bind(entity_type)
    .bind(entity_id)
    .bind(description)
    .bind(&ip_address)
    .bind(&user_agent)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}

/// Short form for handlers; a failed write is logged and never fails the request.
pub async fn audit(
    pool: &SqlitePool,
    user_id: i64,
    action: &str,
    entity_type: &str,
    entity_id: impl ToString,
    description: &str,
    request: &HttpRequest,
) {
    let entity_id = entity_id.to_string();
    if let Err(e) = log_activity(
        pool,
        Some(user_id),
        action,
        entity_type,
        Some(&entity_id),
        Some(description),
        Some(request),
    )
    .await
    {
        log::error!("Failed to write audit log: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::{insert_user, memory_pool};
    use actix_web::test::TestRequest;

    #[actix_rt::test]
    async fn test_audit_records_request_metadata() {
        let pool = memory_pool().await;
        let admin = insert_user(&pool, "pustakawan", "admin").await;
        let request = TestRequest::default()
            .insert_header(("User-Agent", "digilib-tests"))
            .to_http_request();

        audit(&pool, admin, "approve_borrow", "borrow_request", 12, "Approved borrow request", &request).await;

        let row: (String, String, Option<String>) =
            sqlx::query_as("SELECT action, entity_id, user_agent FROM audit_logs")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(row.0, "approve_borrow");
        assert_eq!(row.1, "12");
        assert_eq!(row.2.as_deref(), Some("digilib-tests"));
    }
}
