//! Auth API Handlers
//! /api/auth エンドポイント - サインアップ / ログイン / ログアウト

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::{cart_token, clear_cart_token_cookie, hash_password, verify_password};
use crate::cart;
use crate::error::{ApiError, ApiJson, ApiResult};
use crate::models::{CartResponse, LoginRequest, Role, SignupRequest, User, UserResponse};
use crate::AppState;

const MIN_PASSWORD_LEN: usize = 6;
pub(crate) const EMAIL_TAKEN: &str = "Email is already registered";

#[derive(Serialize)]
pub struct AuthResponse {
    pub ok: bool,
    pub user: UserResponse,
    pub cart: CartResponse,
}

/// POST /api/auth/signup - ユーザー登録
pub async fn signup(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<SignupRequest>,
) -> ApiResult<Response> {
    let firstname = req.firstname.trim();
    let lastname = req.lastname.trim();
    let email = req.email.trim().to_lowercase();

    if firstname.is_empty() || lastname.is_empty() {
        return Err(ApiError::validation("First and last name are required"));
    }
    if !is_valid_email(&email) {
        return Err(ApiError::validation("Invalid email address"));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation("Password must be at least 6 characters"));
    }

    let existing: Option<(String,)> = sqlx::query_as("SELECT user_id FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(&state.db)
        .await?;
    if existing.is_some() {
        return Err(ApiError::validation(EMAIL_TAKEN));
    }

    let password = req.password.clone();
    let cost = state.config.bcrypt_cost;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password, cost))
        .await
        .map_err(|e| ApiError::Internal(format!("Password hash task failed: {}", e)))??;

    let now_ms = chrono::Utc::now().timestamp_millis();
    let user = User {
        user_id: Uuid::new_v4().to_string(),
        firstname: firstname.to_string(),
        lastname: lastname.to_string(),
        email,
        password_hash,
        role: Role::Customer.as_str().to_string(),
        shipping_address: None,
        billing_address: None,
        created_at_ms: now_ms,
        updated_at_ms: now_ms,
    };

    sqlx::query(r#"
        INSERT INTO users (user_id, firstname, lastname, email, password_hash, role, created_at_ms, updated_at_ms)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
    "#)
    .bind(&user.user_id)
    .bind(&user.firstname)
    .bind(&user.lastname)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.role)
    .bind(user.created_at_ms)
    .bind(user.updated_at_ms)
    .execute(&state.db)
    .await
    // 同時登録で事前チェックをすり抜けた場合
    .map_err(|e| ApiError::from_unique_violation(e, EMAIL_TAKEN))?;

    info!("User registered: user_id={}, email={}", user.user_id, user.email);

    authenticated_response(&state, &headers, &user, StatusCode::CREATED).await
}

/// POST /api/auth/login - ログイン
pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<Response> {
    let email = req.email.trim().to_lowercase();

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(&state.db)
        .await?;

    let user = match user {
        Some(u) => u,
        None => return Err(ApiError::unauthenticated("Invalid email or password")),
    };

    let password = req.password.clone();
    let stored = user.password_hash.clone();
    let verified = tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .map_err(|e| ApiError::Internal(format!("Password verify task failed: {}", e)))?;
    if !verified {
        return Err(ApiError::unauthenticated("Invalid email or password"));
    }

    info!("User logged in: user_id={}", user.user_id);

    authenticated_response(&state, &headers, &user, StatusCode::OK).await
}

/// POST /api/auth/logout - ログアウト（ゲストトークン cookie を削除）
pub async fn logout(State(state): State<Arc<AppState>>) -> Response {
    (
        [(header::SET_COOKIE, clear_cart_token_cookie(state.config.is_production()))],
        Json(serde_json::json!({ "ok": true })),
    )
        .into_response()
}

/// ゲストカートをマージして `{ ok, user, cart }` を返す
async fn authenticated_response(
    state: &AppState,
    headers: &HeaderMap,
    user: &User,
    status: StatusCode,
) -> ApiResult<Response> {
    let user_cart = cart::get_or_create_user_cart(&state.db, &user.user_id).await?;

    // トークンが送られてきたら、カートの有無にかかわらず cookie は削除する
    let guest_token = cart_token(headers);
    if let Some(token) = &guest_token {
        if let Some(guest_cart) = cart::active_guest_cart(&state.db, token).await? {
            cart::merge_guest_cart(&state.db, &user_cart, &guest_cart).await?;
        }
    }

    let user_cart = cart::get_cart(&state.db, &user_cart.cart_id).await?;
    let body = AuthResponse {
        ok: true,
        user: UserResponse::summary(user),
        cart: cart::to_response(&state.db, &user_cart).await?,
    };

    if guest_token.is_some() {
        let cookie = clear_cart_token_cookie(state.config.is_production());
        Ok((status, [(header::SET_COOKIE, cookie)], Json(body)).into_response())
    } else {
        Ok((status, Json(body)).into_response())
    }
}

/// local@domain.tld 形式の簡易チェック
pub(crate) fn is_valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !email.contains(char::is_whitespace)
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .map_or(false, |(host, tld)| !host.is_empty() && !tld.is_empty())
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_format() {
        assert!(is_valid_email("ada@example.com"));
        assert!(is_valid_email("a.b@mail.example.org"));
        assert!(!is_valid_email("ada.example.com"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("ada@example"));
        assert!(!is_valid_email("ada@@example.com"));
        assert!(!is_valid_email("ada lovelace@example.com"));
    }
}
