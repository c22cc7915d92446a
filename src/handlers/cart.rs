//! Cart API Handlers
//! /api/cart エンドポイント - ユーザーカート / ゲストカート

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;

use crate::auth::{
    cart_token, find_user, generate_cart_token, hash_cart_token, set_cart_token_cookie, AuthUser,
};
use crate::cart;
use crate::error::{ApiError, ApiJson, ApiPath, ApiResult};
use crate::models::{AddCartItemRequest, Cart, CartResponse, CreateCartRequest, SetCartItemRequest};
use crate::AppState;

/// パスの userId がゲストを表す値
const GUEST: &str = "guest";

#[derive(Serialize)]
pub struct CartEnvelope {
    pub ok: bool,
    pub cart: CartResponse,
}

// ========================================
// Handlers
// ========================================

/// GET /api/cart/:userId - カート取得（`guest` はトークンから解決、なければ作成）
pub async fn get_cart(
    State(state): State<Arc<AppState>>,
    ApiPath(user_id): ApiPath<String>,
    headers: HeaderMap,
    auth: Option<AuthUser>,
) -> ApiResult<Response> {
    if user_id == GUEST {
        return guest_cart_response(&state, &headers).await;
    }

    // ルートのパラメータ名は cartId なので、ヘッダーがなければパスの値をユーザーとして解決する
    let auth = match auth {
        Some(auth) => auth,
        None => find_user(&state.db, &user_id)
            .await?
            .map(AuthUser)
            .ok_or_else(|| ApiError::unauthenticated("Authentication required"))?,
    };
    auth.ensure_self_or_admin(&user_id)?;

    let cart = cart::get_or_create_user_cart(&state.db, &user_id).await?;
    envelope(&state, &cart).await
}

/// POST /api/cart - カート作成（userId 省略時はゲストカート）
pub async fn create_cart(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    auth: Option<AuthUser>,
    ApiJson(req): ApiJson<CreateCartRequest>,
) -> ApiResult<Response> {
    match req.user_id.as_deref().map(str::trim) {
        Some(user_id) if !user_id.is_empty() && user_id != GUEST => {
            let auth = auth.ok_or_else(|| ApiError::unauthenticated("Authentication required"))?;
            auth.ensure_self_or_admin(user_id)?;

            let cart = cart::get_or_create_user_cart(&state.db, user_id).await?;
            envelope(&state, &cart).await
        }
        _ => guest_cart_response(&state, &headers).await,
    }
}

/// PUT /api/cart/:cartId/items - 商品追加（同じ商品は数量加算）
pub async fn add_item(
    State(state): State<Arc<AppState>>,
    ApiPath(cart_id): ApiPath<String>,
    headers: HeaderMap,
    auth: Option<AuthUser>,
    ApiJson(req): ApiJson<AddCartItemRequest>,
) -> ApiResult<Response> {
    let cart = owned_cart(&state, &cart_id, auth.as_ref(), &headers).await?;
    cart::add_item(&state.db, &cart, &req.product_id, req.quantity).await?;
    envelope(&state, &cart).await
}

/// PATCH /api/cart/:cartId/items/:productId - 数量変更
pub async fn set_item_quantity(
    State(state): State<Arc<AppState>>,
    ApiPath((cart_id, product_id)): ApiPath<(String, String)>,
    headers: HeaderMap,
    auth: Option<AuthUser>,
    ApiJson(req): ApiJson<SetCartItemRequest>,
) -> ApiResult<Response> {
    let cart = owned_cart(&state, &cart_id, auth.as_ref(), &headers).await?;
    cart::set_item_quantity(&state.db, &cart, &product_id, req.quantity).await?;
    envelope(&state, &cart).await
}

/// DELETE /api/cart/:cartId/items/:productId - 明細削除
pub async fn remove_item(
    State(state): State<Arc<AppState>>,
    ApiPath((cart_id, product_id)): ApiPath<(String, String)>,
    headers: HeaderMap,
    auth: Option<AuthUser>,
) -> ApiResult<Response> {
    let cart = owned_cart(&state, &cart_id, auth.as_ref(), &headers).await?;
    cart::remove_item(&state.db, &cart, &product_id).await?;
    envelope(&state, &cart).await
}

/// DELETE /api/cart/:cartId - カートを空にする
pub async fn clear_cart(
    State(state): State<Arc<AppState>>,
    ApiPath(cart_id): ApiPath<String>,
    headers: HeaderMap,
    auth: Option<AuthUser>,
) -> ApiResult<Response> {
    let cart = owned_cart(&state, &cart_id, auth.as_ref(), &headers).await?;
    cart::clear(&state.db, &cart).await?;
    envelope(&state, &cart).await
}

// ========================================
// Helpers
// ========================================

/// ゲストカートを解決し、新規トークンなら cookie を発行
async fn guest_cart_response(state: &AppState, headers: &HeaderMap) -> ApiResult<Response> {
    let (token, issued) = match cart_token(headers) {
        Some(token) => (token, false),
        None => (generate_cart_token(), true),
    };

    let cart = cart::get_or_create_guest_cart(&state.db, &token).await?;
    let body = CartEnvelope {
        ok: true,
        cart: cart::to_response(&state.db, &cart).await?,
    };

    if issued {
        let cookie = set_cart_token_cookie(&token, state.config.is_production());
        Ok(([(header::SET_COOKIE, cookie)], Json(body)).into_response())
    } else {
        Ok(Json(body).into_response())
    }
}

/// カートの所有者チェック
///
/// ユーザーカートは本人か管理者、ゲストカートはトークン一致のみ。
/// 他人のゲストカートは存在自体を返さない。
async fn owned_cart(
    state: &AppState,
    cart_id: &str,
    auth: Option<&AuthUser>,
    headers: &HeaderMap,
) -> ApiResult<Cart> {
    let cart = cart::get_cart(&state.db, cart_id).await?;

    match (&cart.user_id, &cart.guest_token_hash) {
        (Some(owner), _) => {
            let auth = auth.ok_or_else(|| ApiError::unauthenticated("Authentication required"))?;
            auth.ensure_self_or_admin(owner)?;
        }
        (None, Some(token_hash)) => {
            let presented = cart_token(headers).map(|t| hash_cart_token(&t));
            if presented.as_deref() != Some(token_hash.as_str()) {
                return Err(ApiError::NotFound("Cart"));
            }
        }
        (None, None) => return Err(ApiError::NotFound("Cart")),
    }

    Ok(cart)
}

/// 最新状態を読み直して `{ ok, cart }` を返す
async fn envelope(state: &AppState, cart: &Cart) -> ApiResult<Response> {
    let cart = cart::get_cart(&state.db, &cart.cart_id).await?;
    Ok(Json(CartEnvelope {
        ok: true,
        cart: cart::to_response(&state.db, &cart).await?,
    })
    .into_response())
}
