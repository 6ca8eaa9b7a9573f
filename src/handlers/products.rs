use crate::handlers::common::{map_service_error, success_response};
use crate::{errors::ApiError, services::products::ProductView, AppState};
use axum::{
    extract::{Path, State},
    routing::get,
    Router,
};
use uuid::Uuid;

/// Creates the router for product endpoints
pub fn product_routes() -> Router<AppState> {
    Router::new().route("/:id", get(get_product))
}

/// Get a product with its seller and category names
#[utoipa::path(
    get,
    path = "/api/v1/products/{id}",
    summary = "Get product",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product retrieved", body = ProductView),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let product = state
        .services
        .product
        .get_product(id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(product))
}
