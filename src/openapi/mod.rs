use axum::{response::Json, routing::get, Router};
use utoipa::OpenApi;

use crate::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Marketplace API",
        version = "1.0.0",
        description = r#"
# Multi-seller Marketplace Checkout API

Carts, checkout and order management for a marketplace where one purchase
can span several sellers.

## Checkout splitting

Checkout takes a set of cart lines and produces one order per seller in a
single transaction. Stock is decremented per line, and an optional discount
code is applied once against the whole checkout, then divided between the
seller orders in proportion to their subtotals.

## Identity

Requests carry the caller's identity in headers set by the gateway:

- `x-user-id`: UUID of the requesting user (required)
- `x-user-role`: `customer` (default), `seller` or `admin`
- `x-seller-id`: UUID of the seller's shop, required when the role is `seller`

## Error handling

Errors use a consistent response format with appropriate HTTP status codes:

```json
{
  "error": "Unprocessable Entity",
  "message": "Insufficient stock: requested 3 of \"Mechanical Keyboard\", only 1 available",
  "request_id": "2b7c...",
  "timestamp": "2024-01-01T00:00:00Z"
}
```

A `409 Conflict` response means a concurrent update won; the request can be
retried as-is.
        "#
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "checkout", description = "Cart-to-orders conversion"),
        (name = "carts", description = "Cart management endpoints"),
        (name = "orders", description = "Order queries and status transitions"),
        (name = "discounts", description = "Discount code validation"),
        (name = "products", description = "Product catalog reads"),
        (name = "health", description = "Health check endpoints")
    ),
    paths(
        crate::handlers::checkout::checkout,
        crate::handlers::carts::get_cart,
        crate::handlers::carts::add_item,
        crate::handlers::carts::update_item,
        crate::handlers::carts::remove_item,
        crate::handlers::carts::clear_cart,
        crate::handlers::orders::list_my_orders,
        crate::handlers::orders::list_all_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::update_order_status,
        crate::handlers::discounts::validate_discount,
        crate::handlers::products::get_product,
    ),
    components(
        schemas(
            crate::ApiResponse<serde_json::Value>,

            crate::services::checkout::CheckoutRequest,
            crate::services::checkout::CheckoutResponse,
            crate::services::checkout::CreatedOrder,
            crate::services::checkout::CreatedOrderLine,

            crate::services::carts::AddCartItemRequest,
            crate::services::carts::UpdateCartItemRequest,
            crate::services::carts::CartView,
            crate::services::carts::CartLineView,

            crate::services::orders::UpdateOrderStatusRequest,
            crate::services::orders::OrderDetails,
            crate::services::orders::OrderLineDetails,
            crate::services::orders::OrderSummary,
            crate::services::orders::OrderList,
            crate::entities::order::OrderStatus,

            crate::services::discounts::DiscountPreview,
            crate::services::products::ProductView,

            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDoc;

/// Serves the generated document under the path Swagger UIs conventionally
/// load it from.
pub fn openapi_routes() -> Router<AppState> {
    Router::new().route("/api-docs/openapi.json", get(serve_openapi))
}

async fn serve_openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_document_covers_the_api() {
        let openapi = ApiDoc::openapi();
        let json = serde_json::to_string_pretty(&openapi).unwrap();
        assert!(json.contains("Marketplace API"));
        assert!(json.contains("/api/v1/checkout"));
        assert!(json.contains("/api/v1/cart/items/{item_id}"));
        assert!(json.contains("/api/v1/orders/{id}/status"));
        assert!(json.contains("/api/v1/discounts/{code}/validate"));
    }
}
