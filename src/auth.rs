use actix_web::web;
use actix_web::HttpMessage;
use actix_web::{dev::ServiceRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use bcrypt::{hash, verify};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use strum::{AsRefStr, Display, EnumString};
use validator::Validate;

use crate::config::AuthConfig;
use crate::error::{ApiError, ApiResult};
use crate::models::AcademicRole;
use crate::validator::FieldValidator;

// ======== USER MODEL ========

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub nama: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub academic_role: Option<AcademicRole>,
    pub no_induk: Option<String>,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub failed_login_attempts: i64,
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ======== USER ROLE ========

#[derive(
    Debug, Clone, Copy, PartialEq, Eq,
    Serialize, Deserialize, EnumString, Display, AsRefStr, sqlx::Type,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Member,
}

impl UserRole {
    pub fn display_name(&self) -> &'static str {
        match self {
            UserRole::Admin => "Administrator",
            UserRole::Member => "Library member",
        }
    }

    pub fn can_decide_requests(&self) -> bool {
        matches!(self, UserRole::Admin)
    }

    pub fn can_manage_catalog(&self) -> bool {
        matches!(self, UserRole::Admin)
    }

    pub fn can_borrow(&self) -> bool {
        matches!(self, UserRole::Member)
    }
}

// ======== REQUEST/RESPONSE STRUCTS ========

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub nama: String,
    #[validate(length(min = 3, max = 50, message = "Username must be 3-50 characters"))]
    pub username: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    pub academic_role: AcademicRole,
    pub no_induk: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in: i64,
    pub user: UserInfo,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UserInfo {
    pub id: i64,
    pub nama: String,
    pub username: String,
    pub email: String,
    pub role: UserRole,
    pub academic_role: Option<AcademicRole>,
    pub no_induk: Option<String>,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<User> for UserInfo {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            nama: user.nama,
            username: user.username,
            email: user.email,
            role: user.role,
            academic_role: user.academic_role,
            no_induk: user.no_induk,
            last_login: user.last_login,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub username: String,
    pub role: UserRole,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

// ======== AUTH SERVICE ========

pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_expiration_hours: i64,
    bcrypt_cost: u32,
}

impl AuthService {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            token_expiration_hours: config.token_expiration_hours,
            bcrypt_cost: config.bcrypt_cost,
        }
    }

    pub fn token_lifetime_seconds(&self) -> i64 {
        self.token_expiration_hours * 3600
    }

    pub fn hash_password(&self, password: &str) -> ApiResult<String> {
        FieldValidator::password_strength(password).map_err(ApiError::ValidationError)?;
        hash(password, self.bcrypt_cost)
            .map_err(|_| ApiError::InternalServerError("Failed to hash password".to_string()))
    }

    pub fn verify_password(&self, password: &str, hash: &str) -> ApiResult<bool> {
        verify(password, hash)
            .map_err(|_| ApiError::InternalServerError("Password verification failed".to_string()))
    }

    pub fn generate_token(&self, user: &User) -> ApiResult<String> {
        let now = Utc::now();
        let exp = now + Duration::hours(self.token_expiration_hours);

        let claims = Claims {
            sub: user.id,
            username: user.username.clone(),
            role: user.role,
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|_| ApiError::AuthError("Failed to generate token".to_string()))
    }

    pub fn verify_token(&self, token: &str) -> ApiResult<Claims> {
        let validation = Validation::default();
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    ApiError::AuthError("Token expired".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidToken => {
                    ApiError::AuthError("Invalid token".to_string())
                }
                _ => ApiError::AuthError("Token verification failed".to_string()),
            })
    }
}

// ======== USER METHODS ========

impl User {
    pub async fn find_by_username(pool: &SqlitePool, username: &str) -> ApiResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
    }

    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> ApiResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
    }

    pub async fn exists(pool: &SqlitePool, username: &str, email: &str) -> ApiResult<bool> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE username = ? OR email = ?")
            .bind(username)
            .bind(email)
            .fetch_one(pool)
            .await?;
        Ok(count.0 > 0)
    }

    /// Self-registration always yields a member account.
    pub async fn create_member(
        pool: &SqlitePool,
        request: RegisterRequest,
        auth_service: &AuthService,
    ) -> ApiResult<User> {
        let password_hash = auth_service.hash_password(&request.password)?;
        let now = Utc::now();

        let id = sqlx::query(
            r#"INSERT INTO users (
                nama, username, email, password_hash, role, academic_role, no_induk,
                is_active, failed_login_attempts, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, 1, 0, ?, ?)"#,
        )
        .bind(request.nama.trim())
        .bind(&request.username)
        .bind(&request.email)
        .bind(&password_hash)
        .bind(UserRole::Member)
        .bind(request.academic_role)
        .bind(&request.no_induk)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?
        .last_insert_rowid();

        Self::find_by_id(pool, id).await
    }

    pub async fn create_admin(
        pool: &SqlitePool,
        username: &str,
        email: &str,
        password: &str,
        auth_service: &AuthService,
    ) -> ApiResult<User> {
        let password_hash = auth_service.hash_password(password)?;
        let now = Utc::now();

        let id = sqlx::query(
            r#"INSERT INTO users (
                nama, username, email, password_hash, role, is_active,
                failed_login_attempts, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, 1, 0, ?, ?)"#,
        )
        .bind("Administrator")
        .bind(username)
        .bind(email)
        .bind(&password_hash)
        .bind(UserRole::Admin)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?
        .last_insert_rowid();

        Self::find_by_id(pool, id).await
    }

    pub async fn update_last_login(&self, pool: &SqlitePool) -> ApiResult<()> {
        sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(self.id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.map_or(false, |until| now < until)
    }

    pub async fn increment_failed_attempts(&mut self, pool: &SqlitePool) -> ApiResult<()> {
        self.failed_login_attempts += 1;
        sqlx::query("UPDATE users SET failed_login_attempts = ? WHERE id = ?")
            .bind(self.failed_login_attempts)
            .bind(self.id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn lock_for_duration(&mut self, pool: &SqlitePool, duration: Duration) -> ApiResult<()> {
        self.locked_until = Some(Utc::now() + duration);
        sqlx::query("UPDATE users SET locked_until = ? WHERE id = ?")
            .bind(self.locked_until)
            .bind(self.id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn reset_failed_attempts(&mut self, pool: &SqlitePool) -> ApiResult<()> {
        self.failed_login_attempts = 0;
        self.locked_until = None;
        sqlx::query("UPDATE users SET failed_login_attempts = 0, locked_until = NULL WHERE id = ?")
            .bind(self.id)
            .execute(pool)
            .await?;
        Ok(())
    }
}

// ======== HELPER FUNCTIONS ========

pub fn get_current_user(req: &HttpRequest) -> ApiResult<Claims> {
    req.extensions()
        .get::<Claims>()
        .cloned()
        .ok_or_else(|| ApiError::Unauthorized("No user information found".to_string()))
}

pub fn check_permission<F>(claims: &Claims, check: F) -> ApiResult<()>
where
    F: Fn(&UserRole) -> bool,
{
    if check(&claims.role) {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Insufficient permissions".to_string()))
    }
}

pub fn require_admin(req: &HttpRequest) -> ApiResult<Claims> {
    let claims = get_current_user(req)?;
    if !claims.is_admin() {
        return Err(ApiError::admin_required());
    }
    Ok(claims)
}

pub fn require_member(req: &HttpRequest) -> ApiResult<Claims> {
    let claims = get_current_user(req)?;
    check_permission(&claims, UserRole::can_borrow)
        .map_err(|_| ApiError::Forbidden("Only library members can borrow books".to_string()))?;
    Ok(claims)
}

pub fn require_decider(req: &HttpRequest) -> ApiResult<Claims> {
    let claims = get_current_user(req)?;
    check_permission(&claims, UserRole::can_decide_requests).map_err(|_| ApiError::admin_required())?;
    Ok(claims)
}

pub fn require_catalog_manager(req: &HttpRequest) -> ApiResult<Claims> {
    let claims = get_current_user(req)?;
    check_permission(&claims, UserRole::can_manage_catalog).map_err(|_| ApiError::admin_required())?;
    Ok(claims)
}

/// Members may only read their own data; admins may read anyone's.
pub fn require_self_or_admin(req: &HttpRequest, member_id: i64) -> ApiResult<Claims> {
    let claims = get_current_user(req)?;
    if claims.is_admin() || claims.sub == member_id {
        Ok(claims)
    } else {
        Err(ApiError::Forbidden("You can only view your own bookshelf".to_string()))
    }
}

// ======== JWT MIDDLEWARE ========

pub async fn jwt_middleware(
    req: ServiceRequest,
    credentials: BearerAuth,
) -> Result<ServiceRequest, (actix_web::Error, ServiceRequest)> {
    let token = credentials.token();

    let auth_service = match req.app_data::<web::Data<std::sync::Arc<AuthService>>>() {
        Some(svc) => svc,
        None => {
            log::error!("AuthService not found in app data");
            return Err((
                ApiError::InternalServerError("Auth service not available".to_string()).into(),
                req,
            ));
        }
    };

    match auth_service.verify_token(token) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            Ok(req)
        }
        Err(err) => {
            log::warn!("JWT verification failed: {}", err);
            Err((err.into(), req))
        }
    }
}

/// Cheap bcrypt cost so tests stay fast.
#[cfg(test)]
pub fn test_auth_service() -> AuthService {
    let config = AuthConfig { bcrypt_cost: 4, ..AuthConfig::default() };
    AuthService::new(&config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::memory_pool;

    fn register_request(username: &str) -> RegisterRequest {
        RegisterRequest {
            nama: "Dewi Lestari".to_string(),
            username: username.to_string(),
            email: format!("{}@univ.ac.id", username),
            password: "Perpus2024".to_string(),
            academic_role: AcademicRole::Mahasiswa,
            no_induk: Some("2021.001".to_string()),
        }
    }

    #[actix_rt::test]
    async fn test_register_creates_member_and_token_round_trips() {
        let pool = memory_pool().await;
        let auth = test_auth_service();

        let user = User::create_member(&pool, register_request("dewi"), &auth).await.unwrap();
        assert_eq!(user.role, UserRole::Member);
        assert_eq!(user.academic_role, Some(AcademicRole::Mahasiswa));
        assert!(auth.verify_password("Perpus2024", &user.password_hash).unwrap());

        let token = auth.generate_token(&user).unwrap();
        let claims = auth.verify_token(&token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.role, UserRole::Member);
        assert!(!claims.is_admin());
    }

    #[actix_rt::test]
    async fn test_weak_password_rejected() {
        let pool = memory_pool().await;
        let auth = test_auth_service();
        let mut request = register_request("budi");
        request.password = "password".to_string();

        let err = User::create_member(&pool, request, &auth).await.unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));
    }

    fn request_as(role: UserRole) -> HttpRequest {
        let req = actix_web::test::TestRequest::default().to_http_request();
        req.extensions_mut().insert(Claims {
            sub: 7,
            username: "siti".to_string(),
            role,
            exp: 0,
            iat: 0,
        });
        req
    }

    #[test]
    fn test_role_guards() {
        let member = request_as(UserRole::Member);
        assert!(matches!(require_decider(&member), Err(ApiError::Forbidden(_))));
        assert!(matches!(require_catalog_manager(&member), Err(ApiError::Forbidden(_))));
        assert!(require_member(&member).is_ok());

        let admin = request_as(UserRole::Admin);
        assert_eq!(require_decider(&admin).unwrap().sub, 7);
        assert!(require_catalog_manager(&admin).is_ok());
        assert!(matches!(require_member(&admin), Err(ApiError::Forbidden(_))));

        let anonymous = actix_web::test::TestRequest::default().to_http_request();
        assert!(matches!(require_decider(&anonymous), Err(ApiError::Unauthorized(_))));
    }

    #[actix_rt::test]
    async fn test_lockout_bookkeeping() {
        let pool = memory_pool().await;
        let auth = test_auth_service();
        let mut user = User::create_member(&pool, register_request("rina"), &auth).await.unwrap();

        user.increment_failed_attempts(&pool).await.unwrap();
        user.lock_for_duration(&pool, Duration::minutes(15)).await.unwrap();
        let stored = User::find_by_id(&pool, user.id).await.unwrap();
        assert_eq!(stored.failed_login_attempts, 1);
        assert!(stored.is_locked(Utc::now()));
        assert!(!stored.is_locked(Utc::now() + Duration::minutes(16)));

        user.reset_failed_attempts(&pool).await.unwrap();
        let stored = User::find_by_id(&pool, user.id).await.unwrap();
        assert_eq!(stored.failed_login_attempts, 0);
        assert!(stored.locked_until.is_none());
    }

    #[test]
    fn test_tampered_token_rejected() {
        let auth = test_auth_service();
        let other = AuthService::new(&AuthConfig {
            jwt_secret: "another_secret_that_is_long_enough_123456".to_string(),
            ..AuthConfig::default()
        });
        let claims = Claims {
            sub: 1,
            username: "x".to_string(),
            role: UserRole::Admin,
            exp: (Utc::now() + Duration::hours(1)).timestamp(),
            iat: Utc::now().timestamp(),
        };
        let token = encode(&Header::default(), &claims, &other.encoding_key).unwrap();
        assert!(matches!(auth.verify_token(&token), Err(ApiError::AuthError(_))));
    }
}
