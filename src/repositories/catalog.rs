// src/repositories/catalog.rs
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::{like_pattern, Repository};
use crate::error::{ApiError, ApiResult};
use crate::models::{
    Author, Book, BookListing, BookQuery, CreateAuthorRequest, CreateBookRequest,
    CreatePublisherRequest, Publisher,
};
use crate::pagination::Page;
use crate::validator::BusinessValidator;

const LISTING_SELECT: &str = r#"
    SELECT
        b.id, b.title, b.publisher_id, b.year, b.isbn,
        b.total_stock, b.available_stock,
        (b.available_stock > 0) AS available,
        b.synopsis, b.cover_image,
        p.nama AS publisher_name,
        (SELECT GROUP_CONCAT(a.nama_depan || COALESCE(' ' || a.nama_belakang, ''), ', ')
           FROM book_authors ba JOIN authors a ON a.id = ba.author_id
          WHERE ba.book_id = b.id) AS authors
    FROM books b
    LEFT JOIN publishers p ON p.id = b.publisher_id
    WHERE 1 = 1"#;

#[derive(Debug, Default, Clone, Copy)]
pub struct BookRepository;

#[async_trait::async_trait]
impl Repository<Book> for BookRepository {
    fn table_name(&self) -> &'static str {
        "books"
    }

    fn not_found(&self, id: i64) -> ApiError {
        ApiError::book_not_found(id)
    }
}

impl BookRepository {
    pub fn new() -> Self {
        Self
    }

    fn push_filters<'a>(builder: &mut QueryBuilder<'a, Sqlite>, query: &'a BookQuery) {
        if let Some(term) = query.search_term() {
            let pattern = like_pattern(term);
            builder
                .push(" AND (b.title LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR b.isbn LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR p.nama LIKE ")
                .push_bind(pattern.clone())
                .push(
                    " ESCAPE '\\' OR EXISTS (SELECT 1 FROM book_authors ba \
                     JOIN authors a ON a.id = ba.author_id WHERE ba.book_id = b.id \
                     AND (a.nama_depan || COALESCE(' ' || a.nama_belakang, '')) LIKE ",
                )
                .push_bind(pattern)
                .push(" ESCAPE '\\'))");
        }

        match query.tersedia {
            Some(true) => {
                builder.push(" AND b.available_stock > 0");
            }
            Some(false) => {
                builder.push(" AND b.available_stock = 0");
            }
            None => {}
        }
    }

    pub async fn list(&self, pool: &SqlitePool, query: &BookQuery) -> ApiResult<Page<BookListing>> {
        let (page, limit, offset) = query.page_query().normalize();

        let mut count_builder = QueryBuilder::<Sqlite>::new(
            "SELECT COUNT(*) FROM books b LEFT JOIN publishers p ON p.id = b.publisher_id WHERE 1 = 1",
        );
        Self::push_filters(&mut count_builder, query);
        let total: i64 = count_builder.build_query_scalar().fetch_one(pool).await?;

        let mut builder = QueryBuilder::<Sqlite>::new(LISTING_SELECT);
        Self::push_filters(&mut builder, query);
        builder
            .push(" ORDER BY b.title ASC, b.id ASC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let books: Vec<BookListing> = builder.build_query_as().fetch_all(pool).await?;

        Ok(Page::new(books, total, page, limit))
    }

    pub async fn get_listing(&self, pool: &SqlitePool, id: i64) -> ApiResult<BookListing> {
        let sql = format!("{} AND b.id = ?", LISTING_SELECT);
        sqlx::query_as::<_, BookListing>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ApiError::book_not_found(id))
    }

    pub async fn create(
        &self,
        pool: &SqlitePool,
        request: &CreateBookRequest,
        now: DateTime<Utc>,
    ) -> ApiResult<BookListing> {
        let mut tx = pool.begin().await?;

        if let Some(publisher_id) = request.publisher_id {
            let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM publishers WHERE id = ?")
                .bind(publisher_id)
                .fetch_optional(&mut *tx)
                .await?;
            if exists.is_none() {
                return Err(ApiError::NotFound(format!("Publisher with ID {} not found", publisher_id)));
            }
        }

        let isbn = request
            .isbn
            .as_deref()
            .map(|s| s.chars().filter(|c| !matches!(c, '-' | ' ')).collect::<String>());

        let book_id = sqlx::query(
            r#"INSERT INTO books (
                title, publisher_id, year, isbn, total_stock, available_stock,
                synopsis, cover_image, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(request.title.trim())
        .bind(request.publisher_id)
        .bind(request.year)
        .bind(&isbn)
        .bind(request.total_stock)
        .bind(request.total_stock)
        .bind(&request.synopsis)
        .bind(&request.cover_image)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.message().contains("UNIQUE") => {
                ApiError::ValidationError("A book with this ISBN already exists".to_string())
            }
            other => ApiError::DatabaseError(other),
        })?
        .last_insert_rowid();

        for author_id in &request.author_ids {
            let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM authors WHERE id = ?")
                .bind(author_id)
                .fetch_optional(&mut *tx)
                .await?;
            if exists.is_none() {
                return Err(ApiError::NotFound(format!("Author with ID {} not found", author_id)));
            }

            sqlx::query("INSERT INTO book_authors (book_id, author_id) VALUES (?, ?)")
                .bind(book_id)
                .bind(author_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        self.get_listing(pool, book_id).await
    }

    /// Copies of the book held by requests that are currently on loan.
    pub async fn on_loan_count(&self, pool: &SqlitePool, book_id: i64) -> ApiResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM request_lines rl
               JOIN borrow_requests br ON br.id = rl.request_id
               WHERE rl.book_id = ?
                 AND br.status IN ('borrowed', 'waiting_for_return_approval', 'returned')"#,
        )
        .bind(book_id)
        .fetch_one(pool)
        .await?;
        Ok(count)
    }

    /// Sets the total copy count and moves available stock by the same delta.
    pub async fn update_total_stock(
        &self,
        pool: &SqlitePool,
        book_id: i64,
        new_total: i64,
        now: DateTime<Utc>,
    ) -> ApiResult<BookListing> {
        let mut tx = pool.begin().await?;

        // Write first so the transaction holds the write lock before reading
        sqlx::query("UPDATE books SET updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(book_id)
            .execute(&mut *tx)
            .await?;

        let book: Book = sqlx::query_as("SELECT * FROM books WHERE id = ?")
            .bind(book_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| ApiError::book_not_found(book_id))?;

        let on_loan = book.total_stock - book.available_stock;
        BusinessValidator::stock_change(new_total, on_loan).into_result()?;

        sqlx::query("UPDATE books SET total_stock = ?, available_stock = ? WHERE id = ?")
            .bind(new_total)
            .bind(new_total - on_loan)
            .bind(book_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        log::info!(
            "Book {} stock changed from {} to {} ({} on loan)",
            book_id,
            book.total_stock,
            new_total,
            on_loan
        );

        self.get_listing(pool, book_id).await
    }

    // ==================== PUBLISHERS & AUTHORS ====================

    pub async fn list_publishers(&self, pool: &SqlitePool) -> ApiResult<Vec<Publisher>> {
        let publishers = sqlx::query_as::<_, Publisher>(
            "SELECT id, nama AS name, alamat_jalan AS street, kota AS city FROM publishers ORDER BY nama",
        )
        .fetch_all(pool)
        .await?;
        Ok(publishers)
    }

    pub async fn create_publisher(
        &self,
        pool: &SqlitePool,
        request: &CreatePublisherRequest,
    ) -> ApiResult<Publisher> {
        let id = sqlx::query("INSERT INTO publishers (nama, alamat_jalan, kota) VALUES (?, ?, ?)")
            .bind(request.name.trim())
            .bind(&request.street)
            .bind(&request.city)
            .execute(pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.message().contains("UNIQUE") => {
                    ApiError::ValidationError("Publisher already exists".to_string())
                }
                other => ApiError::DatabaseError(other),
            })?
            .last_insert_rowid();

        Ok(Publisher {
            id,
            name: request.name.trim().to_string(),
            street: request.street.clone(),
            city: request.city.clone(),
        })
    }

    pub async fn list_authors(&self, pool: &SqlitePool) -> ApiResult<Vec<Author>> {
        let authors = sqlx::query_as::<_, Author>(
            r#"SELECT id, nama_depan AS first_name, nama_belakang AS last_name,
                      kewarganegaraan AS nationality
               FROM authors ORDER BY nama_depan, nama_belakang"#,
        )
        .fetch_all(pool)
        .await?;
        Ok(authors)
    }

    pub async fn create_author(&self, pool: &SqlitePool, request: &CreateAuthorRequest) -> ApiResult<Author> {
        let id = sqlx::query("INSERT INTO authors (nama_depan, nama_belakang, kewarganegaraan) VALUES (?, ?, ?)")
            .bind(request.first_name.trim())
            .bind(&request.last_name)
            .bind(&request.nationality)
            .execute(pool)
            .await?
            .last_insert_rowid();

        Ok(Author {
            id,
            first_name: request.first_name.trim().to_string(),
            last_name: request.last_name.clone(),
            nationality: request.nationality.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::{insert_book, memory_pool};

    fn book_request(title: &str, stock: i64) -> CreateBookRequest {
        CreateBookRequest {
            title: title.to_string(),
            publisher_id: None,
            year: 2015,
            isbn: None,
            total_stock: stock,
            synopsis: None,
            cover_image: None,
            author_ids: vec![],
        }
    }

    #[actix_rt::test]
    async fn test_create_book_with_publisher_and_author() {
        let pool = memory_pool().await;
        let repo = BookRepository::new();

        let publisher = repo
            .create_publisher(&pool, &CreatePublisherRequest {
                name: "Gramedia".to_string(),
                street: None,
                city: Some("Jakarta".to_string()),
            })
            .await
            .unwrap();
        let author = repo
            .create_author(&pool, &CreateAuthorRequest {
                first_name: "Pramoedya".to_string(),
                last_name: Some("Ananta Toer".to_string()),
                nationality: Some("Indonesia".to_string()),
            })
            .await
            .unwrap();

        let mut request = book_request("Bumi Manusia", 3);
        request.publisher_id = Some(publisher.id);
        request.author_ids = vec![author.id];
        request.isbn = Some("978-0-306-40615-7".to_string());

        let book = repo.create(&pool, &request, Utc::now()).await.unwrap();
        assert_eq!(book.available_stock, 3);
        assert!(book.available);
        assert_eq!(book.isbn.as_deref(), Some("9780306406157"));
        assert_eq!(book.publisher_name.as_deref(), Some("Gramedia"));
        assert_eq!(book.authors.as_deref(), Some("Pramoedya Ananta Toer"));
    }

    #[actix_rt::test]
    async fn test_unknown_author_rolls_back() {
        let pool = memory_pool().await;
        let repo = BookRepository::new();
        let mut request = book_request("Orphan", 1);
        request.author_ids = vec![99];

        let err = repo.create(&pool, &request, Utc::now()).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        assert_eq!(repo.count(&pool).await.unwrap(), 0);
    }

    #[actix_rt::test]
    async fn test_list_search_and_availability() {
        let pool = memory_pool().await;
        let repo = BookRepository::new();
        insert_book(&pool, "Laskar Pelangi", 2).await;
        insert_book(&pool, "Sang Pemimpi", 0).await;
        insert_book(&pool, "Edensor", 1).await;

        let all = repo.list(&pool, &BookQuery::default()).await.unwrap();
        assert_eq!(all.pagination.total, 3);
        assert_eq!(all.items[0].title, "Edensor");

        let available = repo
            .list(&pool, &BookQuery { tersedia: Some(true), ..BookQuery::default() })
            .await
            .unwrap();
        assert_eq!(available.pagination.total, 2);
        assert!(available.items.iter().all(|b| b.available_stock > 0));

        let search = repo
            .list(&pool, &BookQuery { search: Some("pelangi".to_string()), ..BookQuery::default() })
            .await
            .unwrap();
        assert_eq!(search.items.len(), 1);
        assert_eq!(search.items[0].title, "Laskar Pelangi");

        let paged = repo
            .list(&pool, &BookQuery { page: Some(2), limit: Some(2), ..BookQuery::default() })
            .await
            .unwrap();
        assert_eq!(paged.items.len(), 1);
        assert_eq!(paged.pagination.total_pages, 2);
    }

    #[actix_rt::test]
    async fn test_stock_update_respects_copies_on_loan() {
        let pool = memory_pool().await;
        let repo = BookRepository::new();
        let book_id = insert_book(&pool, "Ayat-Ayat Cinta", 3).await;
        sqlx::query("UPDATE books SET available_stock = 1 WHERE id = ?")
            .bind(book_id)
            .execute(&pool)
            .await
            .unwrap();

        let err = repo.update_total_stock(&pool, book_id, 1, Utc::now()).await.unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));

        let book = repo.update_total_stock(&pool, book_id, 5, Utc::now()).await.unwrap();
        assert_eq!(book.total_stock, 5);
        assert_eq!(book.available_stock, 3);

        let err = repo.update_total_stock(&pool, 404, 5, Utc::now()).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
