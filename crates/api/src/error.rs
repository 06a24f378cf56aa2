//! API error types with HTTP response mapping.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use cart::CartError;
use inventory::LedgerError;
use orders::{OrderError, PaymentError};

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Missing or malformed identity headers.
    Unauthorized(String),
    /// Failure the client cannot act on. The message is shown as is.
    Internal(String),
    /// Cart operation error.
    Cart(CartError),
    /// Order workflow error.
    Order(OrderError),
    /// Inventory ledger error.
    Ledger(LedgerError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut order_number = None;
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            ApiError::Cart(err) => cart_error_to_response(err),
            ApiError::Order(OrderError::GatewayFailure {
                message,
                order_number: number,
            }) => {
                order_number = Some(number);
                (StatusCode::BAD_REQUEST, message)
            }
            ApiError::Order(err) => order_error_to_response(err),
            ApiError::Ledger(err) => ledger_error_to_response(err),
        };

        if status.is_server_error() {
            tracing::error!(error = %message, "internal server error");
        }

        let body = match order_number {
            Some(number) => serde_json::json!({ "error": message, "order_number": number }),
            None => serde_json::json!({ "error": message }),
        };
        (status, axum::Json(body)).into_response()
    }
}

fn ledger_error_to_response(err: LedgerError) -> (StatusCode, String) {
    match &err {
        LedgerError::ProductNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        LedgerError::InsufficientStock { .. }
        | LedgerError::InvalidQuantity { .. }
        | LedgerError::InvalidPrice { .. } => (StatusCode::BAD_REQUEST, err.to_string()),
        LedgerError::LockTimeout => (StatusCode::CONFLICT, err.to_string()),
        LedgerError::Database(_) | LedgerError::Migration(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

fn cart_error_to_response(err: CartError) -> (StatusCode, String) {
    match err {
        CartError::CartNotFound(_)
        | CartError::UserCartNotFound(_)
        | CartError::ItemNotFound(_)
        | CartError::ProductUnavailable(_) => (StatusCode::NOT_FOUND, err.to_string()),
        CartError::InvalidQuantity { .. } | CartError::InsufficientStock { .. } => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        CartError::Forbidden(_) => (StatusCode::FORBIDDEN, err.to_string()),
        CartError::Ledger(err) => ledger_error_to_response(err),
    }
}

fn order_error_to_response(err: OrderError) -> (StatusCode, String) {
    match err {
        OrderError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        OrderError::Validation(_)
        | OrderError::InsufficientStock { .. }
        | OrderError::GatewayFailure { .. } => (StatusCode::BAD_REQUEST, err.to_string()),
        OrderError::Forbidden(_) => (StatusCode::FORBIDDEN, err.to_string()),
        OrderError::Payment(PaymentError::PaymentNotFound(_)) => {
            (StatusCode::NOT_FOUND, err.to_string())
        }
        OrderError::Payment(PaymentError::DuplicatePayment(_)) => {
            (StatusCode::CONFLICT, err.to_string())
        }
        OrderError::Cart(err) => cart_error_to_response(err),
        OrderError::Ledger(err) => ledger_error_to_response(err),
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<CartError> for ApiError {
    fn from(err: CartError) -> Self {
        ApiError::Cart(err)
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        ApiError::Order(err)
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Ledger(err)
    }
}
