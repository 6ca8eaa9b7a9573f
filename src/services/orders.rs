use crate::{
    auth::{AuthenticatedUser, RequesterRole},
    db::DbPool,
    entities::{
        order::{self, Entity as Order, OrderStatus},
        order_item::{self, Entity as OrderItem},
        product::{self, Entity as Product},
        seller::Entity as Seller,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct OrderListFilter {
    pub status: Option<OrderStatus>,
    pub seller_id: Option<Uuid>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderLineDetails {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub image_url: Option<String>,
    pub quantity: i32,
    /// Price at checkout time, not the product's current price.
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderDetails {
    pub id: Uuid,
    pub user_id: Uuid,
    pub seller_id: Uuid,
    pub shop_name: String,
    pub discount_id: Option<Uuid>,
    pub order_date: DateTime<Utc>,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub discount_amount: Decimal,
    pub total_payment: Decimal,
    pub shipping_address: String,
    pub items: Vec<OrderLineDetails>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderSummary {
    pub id: Uuid,
    pub user_id: Uuid,
    pub seller_id: Uuid,
    pub status: OrderStatus,
    pub order_date: DateTime<Utc>,
    pub total_amount: Decimal,
    pub discount_amount: Decimal,
    pub total_payment: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub orders: Vec<OrderSummary>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Order reads and the status state machine. Orders are only ever created
/// by checkout; everything here operates on existing rows.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl OrderService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Fetches one order with its lines, applying role-based visibility:
    /// customers see their own orders, sellers the orders addressed to
    /// their shop, admins everything.
    #[instrument(skip(self, requester), fields(user_id = %requester.user_id))]
    pub async fn get_order(
        &self,
        requester: &AuthenticatedUser,
        order_id: Uuid,
    ) -> Result<OrderDetails, ServiceError> {
        let db = &*self.db;

        let order = Order::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        ensure_can_view(requester, &order)?;
        load_order_details(db, order).await
    }

    /// A customer's own orders, newest first.
    #[instrument(skip(self))]
    pub async fn list_orders_for_user(
        &self,
        user_id: Uuid,
        filter: OrderListFilter,
    ) -> Result<OrderList, ServiceError> {
        let (page, per_page) = normalize_pagination(&filter);

        let mut query = Order::find().filter(order::Column::UserId.eq(user_id));
        if let Some(status) = filter.status {
            query = query.filter(order::Column::Status.eq(status));
        }

        self.page_of_orders(query, page, per_page).await
    }

    /// Cross-user listing for back offices. Sellers are always scoped to
    /// their own shop regardless of the filter they pass.
    #[instrument(skip(self, requester), fields(user_id = %requester.user_id))]
    pub async fn list_orders(
        &self,
        requester: &AuthenticatedUser,
        filter: OrderListFilter,
    ) -> Result<OrderList, ServiceError> {
        let seller_scope = match requester.role {
            RequesterRole::Admin => filter.seller_id,
            RequesterRole::Seller(shop) => Some(shop),
            RequesterRole::Customer => {
                return Err(ServiceError::Forbidden(
                    "listing orders across users requires a seller or admin role".to_string(),
                ))
            }
        };

        let (page, per_page) = normalize_pagination(&filter);

        let mut query = Order::find();
        if let Some(seller_id) = seller_scope {
            query = query.filter(order::Column::SellerId.eq(seller_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(order::Column::Status.eq(status));
        }

        self.page_of_orders(query, page, per_page).await
    }

    /// Drives the order state machine. Transitioning into `cancelled` or
    /// `refunded` puts every line's quantity back onto product stock in the
    /// same transaction as the status write.
    #[instrument(skip(self, requester), fields(user_id = %requester.user_id, new_status = %new_status))]
    pub async fn update_order_status(
        &self,
        requester: &AuthenticatedUser,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<OrderDetails, ServiceError> {
        let txn = self.db.begin().await?;
        let now = Utc::now();

        let current = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        ensure_can_drive(requester, &current, new_status)?;

        if !current.status.can_transition_to(new_status) {
            return Err(ServiceError::InvalidOperation(format!(
                "cannot transition order {} from {} to {}",
                order_id, current.status, new_status
            )));
        }

        // Guarded write: whoever saw the old status first wins, the loser
        // surfaces a retryable conflict instead of restocking twice.
        let patch = order::ActiveModel {
            status: Set(new_status),
            updated_at: Set(Some(now)),
            ..Default::default()
        };

        let res = Order::update_many()
            .set(patch)
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(current.status))
            .exec(&txn)
            .await?;

        if res.rows_affected == 0 {
            warn!(order_id = %order_id, "order status moved underneath this update");
            return Err(ServiceError::ConcurrencyConflict(format!(
                "order {} was modified concurrently",
                order_id
            )));
        }

        if new_status.restocks_on_entry() {
            restock_order_lines(&txn, order_id, now).await?;
        }

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: current.status.to_string(),
                new_status: new_status.to_string(),
            })
            .await;

        info!(order_id = %order_id, from = %current.status, to = %new_status, "order status updated");
        self.get_order(requester, order_id).await
    }

    async fn page_of_orders(
        &self,
        query: sea_orm::Select<Order>,
        page: u64,
        per_page: u64,
    ) -> Result<OrderList, ServiceError> {
        let paginator = query
            .order_by_desc(order::Column::OrderDate)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let orders = paginator
            .fetch_page(page.saturating_sub(1))
            .await?
            .into_iter()
            .map(|o| OrderSummary {
                id: o.id,
                user_id: o.user_id,
                seller_id: o.seller_id,
                status: o.status,
                order_date: o.order_date,
                total_amount: o.total_amount,
                discount_amount: o.discount_amount,
                total_payment: o.total_payment,
            })
            .collect();

        Ok(OrderList {
            orders,
            total,
            page,
            per_page,
        })
    }
}

fn normalize_pagination(filter: &OrderListFilter) -> (u64, u64) {
    let page = filter.page.unwrap_or(1).max(1);
    let per_page = filter.per_page.unwrap_or(20).clamp(1, 100);
    (page, per_page)
}

fn ensure_can_view(
    requester: &AuthenticatedUser,
    order: &order::Model,
) -> Result<(), ServiceError> {
    let allowed = match requester.role {
        RequesterRole::Admin => true,
        RequesterRole::Seller(shop) => order.seller_id == shop,
        RequesterRole::Customer => order.user_id == requester.user_id,
    };

    if allowed {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(format!(
            "order {} is not visible to the requesting user",
            order.id
        )))
    }
}

fn ensure_can_drive(
    requester: &AuthenticatedUser,
    order: &order::Model,
    new_status: OrderStatus,
) -> Result<(), ServiceError> {
    match requester.role {
        RequesterRole::Admin => Ok(()),
        RequesterRole::Seller(shop) => {
            if order.seller_id == shop {
                Ok(())
            } else {
                Err(ServiceError::Forbidden(format!(
                    "order {} belongs to another shop",
                    order.id
                )))
            }
        }
        RequesterRole::Customer => {
            if order.user_id != requester.user_id {
                return Err(ServiceError::Forbidden(format!(
                    "order {} is not visible to the requesting user",
                    order.id
                )));
            }
            if order.status == OrderStatus::Pending && new_status == OrderStatus::Cancelled {
                Ok(())
            } else {
                Err(ServiceError::Forbidden(
                    "customers may only cancel their own pending orders".to_string(),
                ))
            }
        }
    }
}

/// Stock restoration is a plain additive update. Unlike the checkout
/// decrement there is no lower bound to guard, stock only grows here.
async fn restock_order_lines<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    let lines = OrderItem::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .all(conn)
        .await?;

    for line in &lines {
        Product::update_many()
            .col_expr(
                product::Column::StockQuantity,
                Expr::col(product::Column::StockQuantity).add(line.quantity),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(now))
            .filter(product::Column::Id.eq(line.product_id))
            .exec(conn)
            .await?;
    }

    info!(order_id = %order_id, line_count = lines.len(), "restocked order lines");
    Ok(())
}

async fn load_order_details<C: ConnectionTrait>(
    conn: &C,
    order: order::Model,
) -> Result<OrderDetails, ServiceError> {
    let rows = OrderItem::find()
        .filter(order_item::Column::OrderId.eq(order.id))
        .find_also_related(Product)
        .all(conn)
        .await?;

    let shop_name = Seller::find_by_id(order.seller_id)
        .one(conn)
        .await?
        .map(|s| s.shop_name)
        .unwrap_or_default();

    let items = rows
        .into_iter()
        .map(|(line, product)| {
            let (product_name, image_url) =
                product.map(|p| (p.name, p.image_url)).unwrap_or_default();
            OrderLineDetails {
                id: line.id,
                product_id: line.product_id,
                product_name,
                image_url,
                quantity: line.quantity,
                unit_price: line.unit_price,
                line_total: line.unit_price * Decimal::from(line.quantity),
            }
        })
        .collect();

    Ok(OrderDetails {
        id: order.id,
        user_id: order.user_id,
        seller_id: order.seller_id,
        shop_name,
        discount_id: order.discount_id,
        order_date: order.order_date,
        status: order.status,
        total_amount: order.total_amount,
        discount_amount: order.discount_amount,
        total_payment: order.total_payment,
        shipping_address: order.shipping_address,
        items,
        created_at: order.created_at,
        updated_at: order.updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use test_case::test_case;

    fn requester(role: RequesterRole) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: Uuid::new_v4(),
            role,
        }
    }

    fn order_for(user_id: Uuid, seller_id: Uuid, status: OrderStatus) -> order::Model {
        order::Model {
            id: Uuid::new_v4(),
            user_id,
            seller_id,
            discount_id: None,
            order_date: Utc::now(),
            total_amount: dec!(100),
            discount_amount: Decimal::ZERO,
            total_payment: dec!(100),
            status,
            shipping_address: "12 Example Street".to_string(),
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn admin_sees_any_order() {
        let admin = requester(RequesterRole::Admin);
        let order = order_for(Uuid::new_v4(), Uuid::new_v4(), OrderStatus::Pending);
        assert!(ensure_can_view(&admin, &order).is_ok());
    }

    #[test]
    fn customer_sees_only_own_orders() {
        let customer = requester(RequesterRole::Customer);
        let own = order_for(customer.user_id, Uuid::new_v4(), OrderStatus::Pending);
        let foreign = order_for(Uuid::new_v4(), Uuid::new_v4(), OrderStatus::Pending);

        assert!(ensure_can_view(&customer, &own).is_ok());
        assert!(matches!(
            ensure_can_view(&customer, &foreign),
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[test]
    fn seller_sees_only_their_shop() {
        let shop = Uuid::new_v4();
        let seller = requester(RequesterRole::Seller(shop));
        let addressed = order_for(Uuid::new_v4(), shop, OrderStatus::Pending);
        let foreign = order_for(Uuid::new_v4(), Uuid::new_v4(), OrderStatus::Pending);

        assert!(ensure_can_view(&seller, &addressed).is_ok());
        assert!(matches!(
            ensure_can_view(&seller, &foreign),
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[test_case(OrderStatus::Pending, OrderStatus::Cancelled, true; "cancel own pending")]
    #[test_case(OrderStatus::Processing, OrderStatus::Cancelled, false; "cannot cancel processing")]
    #[test_case(OrderStatus::Pending, OrderStatus::Processing, false; "cannot confirm own order")]
    fn customer_drive_rules(from: OrderStatus, to: OrderStatus, allowed: bool) {
        let customer = requester(RequesterRole::Customer);
        let own = order_for(customer.user_id, Uuid::new_v4(), from);
        assert_eq!(ensure_can_drive(&customer, &own, to).is_ok(), allowed);
    }

    #[test]
    fn customer_cannot_cancel_foreign_order() {
        let customer = requester(RequesterRole::Customer);
        let foreign = order_for(Uuid::new_v4(), Uuid::new_v4(), OrderStatus::Pending);
        assert!(matches!(
            ensure_can_drive(&customer, &foreign, OrderStatus::Cancelled),
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[test]
    fn seller_drives_only_their_shop() {
        let shop = Uuid::new_v4();
        let seller = requester(RequesterRole::Seller(shop));
        let addressed = order_for(Uuid::new_v4(), shop, OrderStatus::Pending);
        let foreign = order_for(Uuid::new_v4(), Uuid::new_v4(), OrderStatus::Pending);

        assert!(ensure_can_drive(&seller, &addressed, OrderStatus::Processing).is_ok());
        assert!(matches!(
            ensure_can_drive(&seller, &foreign, OrderStatus::Processing),
            Err(ServiceError::Forbidden(_))
        ));
    }
}
