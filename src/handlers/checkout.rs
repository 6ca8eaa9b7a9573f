use crate::handlers::common::{created_response, map_service_error, validate_input};
use crate::{
    auth::AuthenticatedUser,
    errors::ApiError,
    services::checkout::{CheckoutRequest, CheckoutResponse},
    AppState,
};
use axum::{
    extract::{Json, State},
    routing::post,
    Router,
};

/// Creates the router for checkout endpoints
pub fn checkout_routes() -> Router<AppState> {
    Router::new().route("/", post(checkout))
}

/// Convert selected cart lines into one order per seller
#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    summary = "Checkout selected cart items",
    description = "Splits the selected cart lines into one order per seller, decrements stock and applies an optional discount code, all in a single transaction",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Orders created", body = CheckoutResponse,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Selected items do not belong to the requesting user", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product or discount code not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Concurrent update detected, retry the checkout", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock or unusable discount", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "checkout"
)]
pub async fn checkout(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CheckoutRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    let response = state
        .services
        .checkout
        .checkout(user.user_id, payload)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(response))
}
