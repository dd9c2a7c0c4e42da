// src/auth_handlers.rs - Registration, login and profile handlers

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{Duration, Utc};
use std::sync::Arc;
use validator::Validate;

use crate::auth::{
    get_current_user, AuthService, LoginRequest, LoginResponse, RegisterRequest, User, UserInfo,
};
use crate::error::{ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::validator::CustomValidate;
use crate::AppState;

const INVALID_CREDENTIALS: &str = "Invalid username or password";

pub async fn login(
    app_state: web::Data<Arc<AppState>>,
    auth_service: web::Data<Arc<AuthService>>,
    request: web::Json<LoginRequest>,
) -> ApiResult<HttpResponse> {
    request.validate()?;
    let pool = &app_state.db_pool;
    let auth_config = &app_state.config.auth;

    let mut user = User::find_by_username(pool, request.username.trim())
        .await
        .map_err(|_| ApiError::AuthError(INVALID_CREDENTIALS.to_string()))?;

    if !user.is_active {
        return Err(ApiError::AuthError("Account is disabled".to_string()));
    }

    let now = Utc::now();
    if user.is_locked(now) {
        return Err(ApiError::AuthError(
            "Account is temporarily locked. Try again later.".to_string(),
        ));
    }

    // An expired lock starts a fresh attempt window
    if user.locked_until.is_some() {
        user.reset_failed_attempts(pool).await?;
    }

    if !auth_service.verify_password(&request.password, &user.password_hash)? {
        user.increment_failed_attempts(pool).await?;

        if user.failed_login_attempts >= auth_config.max_login_attempts as i64 {
            let minutes = auth_config.lockout_duration_minutes as i64;
            user.lock_for_duration(pool, Duration::minutes(minutes)).await?;
            log::warn!(
                "Account {} locked after {} failed login attempts",
                user.username,
                user.failed_login_attempts
            );
            return Err(ApiError::AuthError(format!(
                "Account locked due to too many failed attempts. Try again in {} minutes.",
                minutes
            )));
        }

        return Err(ApiError::AuthError(INVALID_CREDENTIALS.to_string()));
    }

    user.reset_failed_attempts(pool).await?;
    user.update_last_login(pool).await?;

    let token = auth_service.generate_token(&user)?;
    let response = LoginResponse {
        token,
        expires_in: auth_service.token_lifetime_seconds(),
        user: user.into(),
    };

    log::info!("User {} logged in successfully", response.user.username);

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        response,
        "Login successful".to_string(),
    )))
}

pub async fn register(
    app_state: web::Data<Arc<AppState>>,
    auth_service: web::Data<Arc<AuthService>>,
    request: web::Json<RegisterRequest>,
) -> ApiResult<HttpResponse> {
    if !app_state.config.auth.allow_self_registration {
        return Err(ApiError::Forbidden("Self-registration is disabled".to_string()));
    }

    request.validate()?;
    request.custom_validate().into_result()?;

    if User::exists(&app_state.db_pool, &request.username, &request.email).await? {
        return Err(ApiError::ValidationError(
            "Username or email is already registered".to_string(),
        ));
    }

    let user = User::create_member(&app_state.db_pool, request.into_inner(), &auth_service).await?;
    let token = auth_service.generate_token(&user)?;

    let response = LoginResponse {
        token,
        expires_in: auth_service.token_lifetime_seconds(),
        user: user.into(),
    };

    log::info!("New member registered: {}", response.user.username);

    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
        response,
        "Registration successful".to_string(),
    )))
}

pub async fn get_profile(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    let user = User::find_by_id(&app_state.db_pool, claims.sub).await?;

    #[derive(serde::Serialize)]
    struct ProfileResponse {
        #[serde(flatten)]
        user: UserInfo,
        role_name: &'static str,
    }

    let role_name = user.role.display_name();
    let response = ProfileResponse { user: user.into(), role_name };

    Ok(HttpResponse::Ok().json(ApiResponse::success(response)))
}
