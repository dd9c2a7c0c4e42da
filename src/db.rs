// src/db.rs - Connection pool and schema setup

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;

use crate::config::DatabaseConfig;

pub async fn create_pool(db_config: &DatabaseConfig) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&db_config.url)
        .with_context(|| format!("Invalid database url: {}", db_config.url))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(db_config.busy_timeout_ms))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(db_config.max_connections)
        .min_connections(db_config.min_connections)
        .acquire_timeout(Duration::from_secs(db_config.connect_timeout))
        .idle_timeout(Duration::from_secs(db_config.idle_timeout))
        .connect_with(options)
        .await
        .context("Failed to open database pool")?;

    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            nama TEXT NOT NULL CHECK(length(nama) > 0 AND length(nama) <= 255),
            username TEXT NOT NULL UNIQUE CHECK(length(username) >= 3 AND length(username) <= 50),
            email TEXT NOT NULL UNIQUE CHECK(length(email) >= 5 AND length(email) <= 255),
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'member' CHECK(role IN ('admin', 'member')),
            academic_role TEXT CHECK(
                academic_role IS NULL OR academic_role IN ('mahasiswa', 'dosen', 'tendik')
            ),
            no_induk TEXT UNIQUE,
            is_active INTEGER NOT NULL DEFAULT 1 CHECK(is_active IN (0, 1)),
            last_login DATETIME,
            failed_login_attempts INTEGER NOT NULL DEFAULT 0,
            locked_until DATETIME,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS publishers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            nama TEXT NOT NULL UNIQUE CHECK(length(nama) > 0 AND length(nama) <= 255),
            alamat_jalan TEXT,
            kota TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS authors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            nama_depan TEXT NOT NULL CHECK(length(nama_depan) > 0),
            nama_belakang TEXT,
            kewarganegaraan TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS books (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL CHECK(length(title) > 0 AND length(title) <= 255),
            publisher_id INTEGER,
            year INTEGER NOT NULL,
            isbn TEXT UNIQUE,
            total_stock INTEGER NOT NULL CHECK(total_stock >= 0),
            available_stock INTEGER NOT NULL CHECK(
                available_stock >= 0 AND available_stock <= total_stock
            ),
            synopsis TEXT,
            cover_image TEXT,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (publisher_id) REFERENCES publishers (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS book_authors (
            book_id INTEGER NOT NULL,
            author_id INTEGER NOT NULL,
            PRIMARY KEY (book_id, author_id),
            FOREIGN KEY (book_id) REFERENCES books (id) ON DELETE CASCADE,
            FOREIGN KEY (author_id) REFERENCES authors (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS borrow_requests (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            member_id INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'waiting_for_approval' CHECK(
                status IN ('waiting_for_approval', 'borrowed', 'rejected',
                           'waiting_for_return_approval', 'returned', 'completed')
            ),
            created_at DATETIME NOT NULL,
            borrow_date DATETIME NOT NULL,
            due_date DATETIME,
            rejection_reason TEXT CHECK(rejection_reason IS NULL OR length(rejection_reason) <= 500),
            decided_by INTEGER,
            decided_at DATETIME,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (member_id) REFERENCES users (id),
            FOREIGN KEY (decided_by) REFERENCES users (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS request_lines (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            request_id INTEGER NOT NULL,
            book_id INTEGER NOT NULL,
            FOREIGN KEY (request_id) REFERENCES borrow_requests (id),
            FOREIGN KEY (book_id) REFERENCES books (id),
            UNIQUE(request_id, book_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS return_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            request_id INTEGER NOT NULL UNIQUE,
            returned_on DATETIME NOT NULL,
            fine INTEGER NOT NULL DEFAULT 0 CHECK(fine >= 0),
            admin_id INTEGER,
            approved_at DATETIME,
            FOREIGN KEY (request_id) REFERENCES borrow_requests (id),
            FOREIGN KEY (admin_id) REFERENCES users (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS request_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            request_id INTEGER NOT NULL,
            from_status TEXT,
            to_status TEXT NOT NULL,
            actor_id INTEGER NOT NULL,
            note TEXT,
            created_at DATETIME NOT NULL,
            FOREIGN KEY (request_id) REFERENCES borrow_requests (id),
            FOREIGN KEY (actor_id) REFERENCES users (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS audit_logs (
            id TEXT PRIMARY KEY,
            user_id INTEGER,
            action TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT,
            description TEXT,
            ip_address TEXT,
            user_agent TEXT,
            created_at DATETIME NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // ==================== CREATE INDEXES ====================

    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_books_title ON books(title)",
        "CREATE INDEX IF NOT EXISTS idx_books_publisher ON books(publisher_id)",
        "CREATE INDEX IF NOT EXISTS idx_requests_member ON borrow_requests(member_id)",
        "CREATE INDEX IF NOT EXISTS idx_requests_status ON borrow_requests(status)",
        "CREATE INDEX IF NOT EXISTS idx_requests_created ON borrow_requests(created_at)",
        "CREATE INDEX IF NOT EXISTS idx_lines_request ON request_lines(request_id)",
        "CREATE INDEX IF NOT EXISTS idx_lines_book ON request_lines(book_id)",
        "CREATE INDEX IF NOT EXISTS idx_events_request ON request_events(request_id)",
        "CREATE INDEX IF NOT EXISTS idx_audit_entity ON audit_logs(entity_type, entity_id)",
    ];
    for statement in indexes {
        sqlx::query(statement).execute(pool).await?;
    }

    log::info!("Database migrations completed");
    Ok(())
}
