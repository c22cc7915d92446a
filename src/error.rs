//! API error model
//! すべてのハンドラはこのエラー型を返し、`{ ok: false, error }` 形式でレスポンスする

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::models::PaymentDetails;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthenticated(String),

    #[error("Admin access required")]
    Forbidden,

    #[error("Cart is empty")]
    EmptyCart,

    #[error("{message}")]
    InsufficientStock { product: String, message: String },

    #[error("Product not found")]
    ProductNotFound,

    #[error("Credit Card Authorization Failed")]
    PaymentDeclined(PaymentDetails),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Not Found")]
    RouteNotFound,

    #[error("{0}")]
    Validation(String),

    #[error("Internal server error")]
    Internal(String),
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        Self::Unauthenticated(msg.into())
    }

    /// 在庫不足（商品名をメッセージに含める）
    pub fn insufficient_stock(product: impl Into<String>) -> Self {
        let product = product.into();
        let message = format!("Insufficient stock for {}", product);
        Self::InsufficientStock { product, message }
    }

    /// UNIQUE 制約違反は ValidationError、それ以外は DB エラー
    pub fn from_unique_violation(e: sqlx::Error, msg: &str) -> Self {
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() {
                return Self::validation(msg);
            }
        }
        e.into()
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::EmptyCart | Self::InsufficientStock { .. } | Self::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::PaymentDeclined(_) => StatusCode::PAYMENT_REQUIRED,
            Self::ProductNotFound | Self::NotFound(_) | Self::RouteNotFound => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        Self::Internal(format!("DB error: {}", e))
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(format!("JSON error: {}", e))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    ok: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    payment_details: Option<PaymentDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    product: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = self.to_string();

        let mut body = ErrorBody {
            ok: false,
            error,
            payment_details: None,
            product: None,
            detail: None,
        };

        match self {
            Self::PaymentDeclined(details) => {
                warn!("API Error: {} ({})", body.error, status);
                body.payment_details = Some(details);
            }
            Self::InsufficientStock { product, .. } => {
                warn!("API Error: {} ({})", body.error, status);
                body.product = Some(product);
            }
            Self::Internal(detail) => {
                error!("API Error: {}", detail);
                // リリースビルドでは内部詳細を返さない
                body.detail = cfg!(debug_assertions).then_some(detail);
            }
            _ => warn!("API Error: {} ({})", body.error, status),
        }

        (status, Json(body)).into_response()
    }
}

/// JSON ボディ extractor（パース失敗は ValidationError として返す）
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// クエリ文字列 extractor
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

/// パスパラメータ extractor
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

/// 未定義ルート
pub async fn route_not_found() -> ApiError {
    ApiError::RouteNotFound
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_category() {
        assert_eq!(ApiError::EmptyCart.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::insufficient_stock("P1").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::unauthenticated("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::ProductNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::NotFound("Order").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Internal("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn insufficient_stock_names_the_product() {
        let err = ApiError::insufficient_stock("ThinkPad X1");
        assert_eq!(err.to_string(), "Insufficient stock for ThinkPad X1");
    }

    #[test]
    fn not_found_message_names_the_resource() {
        assert_eq!(ApiError::NotFound("Order").to_string(), "Order not found");
        assert_eq!(ApiError::RouteNotFound.to_string(), "Not Found");
        assert_eq!(ApiError::RouteNotFound.status(), StatusCode::NOT_FOUND);
    }
}
