use crate::handlers::common::{map_service_error, success_response};
use crate::{
    auth::AuthenticatedUser,
    errors::ApiError,
    services::orders::{OrderDetails, OrderList, OrderListFilter, UpdateOrderStatusRequest},
    AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    routing::{get, put},
    Router,
};
use uuid::Uuid;

/// Creates the router for order endpoints
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_my_orders))
        .route("/all", get(list_all_orders))
        .route("/:id", get(get_order))
        .route("/:id/status", put(update_order_status))
}

/// List the requesting user's own orders
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    summary = "List my orders",
    description = "List the requesting user's own orders, newest first",
    params(
        ("status" = Option<String>, Query, description = "Filter by order status"),
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("per_page" = Option<u64>, Query, description = "Items per page (default: 20, max: 100)"),
    ),
    responses(
        (status = 200, description = "Orders retrieved", body = OrderList),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn list_my_orders(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(filter): Query<OrderListFilter>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let orders = state
        .services
        .order
        .list_orders_for_user(user.user_id, filter)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(orders))
}

/// List orders across users for sellers and admins
#[utoipa::path(
    get,
    path = "/api/v1/orders/all",
    summary = "List orders",
    description = "List orders across users. Sellers see their own shop's orders, admins see everything and may filter by seller.",
    params(
        ("status" = Option<String>, Query, description = "Filter by order status"),
        ("seller_id" = Option<Uuid>, Query, description = "Filter by seller (admin only)"),
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("per_page" = Option<u64>, Query, description = "Items per page (default: 20, max: 100)"),
    ),
    responses(
        (status = 200, description = "Orders retrieved", body = OrderList),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Requires a seller or admin role", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn list_all_orders(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(filter): Query<OrderListFilter>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let orders = state
        .services
        .order
        .list_orders(&user, filter)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(orders))
}

/// Get a single order with its lines
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    summary = "Get order",
    description = "Get an order with its lines. Customers see their own orders, sellers their shop's, admins any.",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order retrieved", body = OrderDetails),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Order is not visible to the requesting user", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let order = state
        .services
        .order
        .get_order(&user, id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(order))
}

/// Move an order to a new status
#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}/status",
    summary = "Update order status",
    description = "Move an order along the status state machine. Cancelling or refunding restores stock. Customers may only cancel their own pending orders.",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Order updated", body = OrderDetails,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Transition not allowed from the current status", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Requesting user may not drive this order", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order was modified concurrently, retry", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let order = state
        .services
        .order
        .update_order_status(&user, id, payload.status)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(order))
}
