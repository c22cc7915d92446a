//! Authentication
//! パスワードハッシュ（bcrypt）、ゲストカートトークン、`x-user-id` ヘッダー認証

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Path},
    http::{header, request::Parts, HeaderMap, HeaderValue},
};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::db::DbPool;
use crate::error::ApiError;
use crate::models::User;
use crate::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const CART_TOKEN_HEADER: &str = "x-cart-token";
pub const CART_TOKEN_COOKIE: &str = "cart_token";
/// 30 日
const CART_TOKEN_MAX_AGE: i64 = 30 * 24 * 60 * 60;

// ========================================
// Password / Token
// ========================================

/// bcrypt でハッシュ化（CPU を使うので呼び出し側で spawn_blocking する）
pub fn hash_password(password: &str, cost: u32) -> Result<String, ApiError> {
    bcrypt::hash(password, cost).map_err(|e| ApiError::Internal(format!("Password hash error: {}", e)))
}

/// 不正な形式のハッシュは不一致として扱う
pub fn verify_password(password: &str, stored: &str) -> bool {
    bcrypt::verify(password, stored).unwrap_or(false)
}

/// ゲストトークンは SHA-256 のみ DB に保存する
pub fn hash_cart_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// ゲストカート用トークン（32 byte hex）
pub fn generate_cart_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

// ========================================
// Cart Token Cookie
// ========================================

/// `x-cart-token` ヘッダー、なければ `cart_token` cookie
pub fn cart_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = headers
        .get(CART_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == CART_TOKEN_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// ゲストトークンの Set-Cookie
pub fn set_cart_token_cookie(token: &str, production: bool) -> HeaderValue {
    cookie_value(token, CART_TOKEN_MAX_AGE, production)
}

/// ゲストトークン削除用の Set-Cookie
pub fn clear_cart_token_cookie(production: bool) -> HeaderValue {
    cookie_value("", 0, production)
}

fn cookie_value(token: &str, max_age: i64, production: bool) -> HeaderValue {
    let attrs = if production {
        "; Secure; SameSite=None"
    } else {
        "; SameSite=Lax"
    };
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; Max-Age={}{}",
        CART_TOKEN_COOKIE, token, max_age, attrs
    );
    // token は hex のみなので常に有効なヘッダー値
    HeaderValue::from_str(&cookie).unwrap_or_else(|_| HeaderValue::from_static(""))
}

// ========================================
// Extractors
// ========================================

pub async fn find_user(db: &DbPool, user_id: &str) -> Result<Option<User>, ApiError> {
    let user = sqlx::query_as("SELECT * FROM users WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(db)
        .await?;
    Ok(user)
}

fn header_user_id(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

async fn resolve_user(state: &AppState, user_id: &str) -> Result<User, ApiError> {
    find_user(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::unauthenticated("Invalid user"))
}

/// 認証済みユーザー
///
/// `x-user-id` ヘッダー、なければパスの `userId` を存在するユーザーとして解決する。
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user_id = match header_user_id(parts) {
            Some(id) => Some(id),
            None => Path::<HashMap<String, String>>::from_request_parts(parts, state)
                .await
                .ok()
                .and_then(|Path(params)| params.get("userId").cloned()),
        };

        let user_id = user_id.ok_or_else(|| ApiError::unauthenticated("Authentication required"))?;
        resolve_user(state, &user_id).await.map(AuthUser)
    }
}

/// 管理者ユーザー（role = admin 以外は 403）
///
/// パスの `userId` は操作対象なので、`x-user-id` ヘッダーのみで解決する。
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user_id = header_user_id(parts)
            .ok_or_else(|| ApiError::unauthenticated("Authentication required"))?;
        let user = resolve_user(state, &user_id).await?;
        if !user.is_admin() {
            return Err(ApiError::Forbidden);
        }
        Ok(AdminUser(user))
    }
}

impl AuthUser {
    /// 本人または管理者のみ許可
    pub fn ensure_self_or_admin(&self, user_id: &str) -> Result<(), ApiError> {
        if self.0.user_id == user_id || self.0.is_admin() {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_verifies_only_the_original() {
        let stored = hash_password("hunter22", 4).unwrap();
        assert!(stored.starts_with("$2"));
        assert!(verify_password("hunter22", &stored));
        assert!(!verify_password("hunter23", &stored));
        assert!(!verify_password("hunter22", "no-separator"));
    }

    #[test]
    fn password_hashes_are_salted() {
        assert_ne!(hash_password("same", 4).unwrap(), hash_password("same", 4).unwrap());
    }

    #[test]
    fn cart_token_hash_is_stable_and_hides_the_token() {
        let token = generate_cart_token();
        let hashed = hash_cart_token(&token);
        assert_eq!(hashed, hash_cart_token(&token));
        assert_ne!(hashed, token);
        assert_eq!(hashed.len(), 64);
    }

    #[test]
    fn cart_token_is_64_hex_chars() {
        let token = generate_cart_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn cart_token_read_from_header_or_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; cart_token=abc123"));
        assert_eq!(cart_token(&headers).as_deref(), Some("abc123"));

        headers.insert(CART_TOKEN_HEADER, HeaderValue::from_static("fromheader"));
        assert_eq!(cart_token(&headers).as_deref(), Some("fromheader"));

        assert_eq!(cart_token(&HeaderMap::new()), None);
    }

    #[test]
    fn clear_cookie_expires_immediately() {
        let cookie = clear_cart_token_cookie(false);
        let text = cookie.to_str().unwrap();
        assert!(text.starts_with("cart_token=;"));
        assert!(text.contains("Max-Age=0"));
    }
}
