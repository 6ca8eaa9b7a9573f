use crate::handlers::common::{map_service_error, success_response};
use crate::{
    auth::AuthenticatedUser, errors::ApiError, services::discounts::DiscountPreview, AppState,
};
use axum::{
    extract::{Path, State},
    routing::get,
    Router,
};

/// Creates the router for discount endpoints
pub fn discount_routes() -> Router<AppState> {
    Router::new().route("/:code/validate", get(validate_discount))
}

/// Check whether a discount code could be applied right now
#[utoipa::path(
    get,
    path = "/api/v1/discounts/{code}/validate",
    summary = "Validate discount code",
    description = "Check a discount code before checkout. Reports the same failure checkout would, in the same order: unknown, inactive, not started, expired, exhausted budget.",
    params(("code" = String, Path, description = "Discount code, case-insensitive")),
    responses(
        (status = 200, description = "Discount code is usable", body = DiscountPreview),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Discount code not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Discount code exists but cannot be used", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "discounts"
)]
pub async fn validate_discount(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(code): Path<String>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let preview = state
        .services
        .discount
        .validate_for_checkout(&code)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(preview))
}
