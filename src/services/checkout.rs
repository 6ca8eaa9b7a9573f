//! Checkout: turns a user's selected cart lines into one order per seller.
//!
//! The split, the stock decrements, the discount budget charge and the
//! removal of the consumed cart lines all happen inside one transaction.
//! Either every seller order exists afterwards or none does.

use crate::{
    db::DbPool,
    entities::{
        cart::{self, Entity as Cart},
        cart_item::{self, Entity as CartItem},
        discount::{self, Entity as Discount},
        order::{self, OrderStatus},
        order_item,
        product::{self, Entity as Product},
        seller::{self, Entity as Seller},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::discounts,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CheckoutRequest {
    /// Cart lines to check out; unselected lines stay in the cart.
    #[validate(length(min = 1, message = "at least one cart item must be selected"))]
    pub cart_item_ids: Vec<Uuid>,
    #[validate(length(min = 1, max = 500, message = "shipping address is required"))]
    pub shipping_address: String,
    /// Shared across all resulting seller orders, matched case-insensitively.
    pub discount_code: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub orders: Vec<CreatedOrder>,
    /// Sum over every selected line of quantity times current unit price.
    pub grand_total: Decimal,
    /// The discount actually applied across all orders, before rounding of
    /// the per-seller shares.
    pub discount_total: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreatedOrder {
    pub order_id: Uuid,
    pub seller_id: Uuid,
    pub shop_name: String,
    pub status: OrderStatus,
    pub order_date: DateTime<Utc>,
    pub total_amount: Decimal,
    pub discount_amount: Decimal,
    pub total_payment: Decimal,
    pub lines: Vec<CreatedOrderLine>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreatedOrderLine {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

/// `potential = grand_total * percent / 100`, clamped by the cap.
/// A non-positive cap means uncapped.
fn actual_discount(grand_total: Decimal, percent: Decimal, cap: Decimal) -> Decimal {
    let potential = grand_total * percent / Decimal::ONE_HUNDRED;
    if cap > Decimal::ZERO {
        potential.min(cap)
    } else {
        potential
    }
}

/// One seller's slice of the shared discount, proportional to their share
/// of the grand total. Half-to-even rounding to whole currency units; the
/// summed shares may drift from `actual` by a few units and that drift is
/// accepted, not reconciled.
fn seller_share(actual: Decimal, seller_subtotal: Decimal, grand_total: Decimal) -> Decimal {
    (actual * seller_subtotal / grand_total).round_dp(0)
}

#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl CheckoutService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Splits the selected cart lines into one pending order per seller.
    ///
    /// Any failure rolls the whole attempt back: no orders, no stock
    /// movement, no budget charge, cart untouched. Stock and budget writes
    /// are guarded so a concurrent checkout racing this one cannot
    /// oversell or overspend; the loser of such a race gets an error it
    /// can retry.
    #[instrument(skip(self, request), fields(user_id = %user_id, selected = request.cart_item_ids.len()))]
    pub async fn checkout(
        &self,
        user_id: Uuid,
        request: CheckoutRequest,
    ) -> Result<CheckoutResponse, ServiceError> {
        request.validate()?;

        let mut selected = request.cart_item_ids.clone();
        selected.sort_unstable();
        selected.dedup();

        let code = request
            .discount_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_uppercase);

        let now = Utc::now();

        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "failed to start checkout transaction");
            ServiceError::DatabaseError(e)
        })?;

        // Selected lines must all sit in the requesting user's cart.
        let user_cart = Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&txn)
            .await?;

        let rows = match &user_cart {
            Some(c) => {
                CartItem::find()
                    .filter(cart_item::Column::CartId.eq(c.id))
                    .filter(cart_item::Column::Id.is_in(selected.clone()))
                    .find_also_related(Product)
                    .all(&txn)
                    .await?
            }
            None => Vec::new(),
        };

        let found: HashSet<Uuid> = rows.iter().map(|(item, _)| item.id).collect();
        let missing: Vec<String> = selected
            .iter()
            .filter(|id| !found.contains(id))
            .map(Uuid::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(ServiceError::Forbidden(format!(
                "selected cart items are missing from the requesting user's cart: {}",
                missing.join(", ")
            )));
        }

        // Resolve every line's product up front so validation failures name
        // the product before anything is written.
        let mut lines: Vec<(cart_item::Model, product::Model)> = Vec::with_capacity(rows.len());
        for (item, maybe_product) in rows {
            let product = maybe_product.ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", item.product_id))
            })?;

            if !product.is_active {
                return Err(ServiceError::InvalidOperation(format!(
                    "Product {:?} is not available",
                    product.name
                )));
            }

            if product.stock_quantity < item.quantity {
                return Err(ServiceError::InsufficientStock(format!(
                    "requested {} of {:?}, only {} available",
                    item.quantity, product.name, product.stock_quantity
                )));
            }

            lines.push((item, product));
        }

        let grand_total: Decimal = lines
            .iter()
            .map(|(item, product)| product.price * Decimal::from(item.quantity))
            .sum();

        // The discount applies once per checkout against the grand total,
        // not per seller. A zero grand total skips discounting outright so
        // no proportion is ever computed against zero.
        let discount_ctx: Option<(discount::Model, Decimal)> = match &code {
            Some(code) if grand_total > Decimal::ZERO => {
                let d = discounts::find_usable(&txn, code, now).await?;
                let actual = actual_discount(grand_total, d.discount_percent, d.max_discount_amount);
                if actual > d.remaining_budget {
                    return Err(ServiceError::DiscountBudgetExceeded(format!(
                        "discount amount {} exceeds the remaining budget {} of code {}",
                        actual, d.remaining_budget, d.code
                    )));
                }
                Some((d, actual))
            }
            _ => None,
        };

        // Group lines by the product's owning seller. BTreeMap keeps the
        // seller order stable run to run.
        let mut groups: BTreeMap<Uuid, Vec<(cart_item::Model, product::Model)>> = BTreeMap::new();
        for (item, product) in lines {
            groups.entry(product.seller_id).or_default().push((item, product));
        }

        let mut created: Vec<(order::Model, Vec<CreatedOrderLine>)> =
            Vec::with_capacity(groups.len());

        for (seller_id, group) in &groups {
            let seller_subtotal: Decimal = group
                .iter()
                .map(|(item, product)| product.price * Decimal::from(item.quantity))
                .sum();

            let share = match &discount_ctx {
                Some((_, actual)) => seller_share(*actual, seller_subtotal, grand_total),
                None => Decimal::ZERO,
            };
            let net_payment = (seller_subtotal - share).max(Decimal::ZERO);

            for (item, product) in group {
                decrement_stock(&txn, product, item.quantity, now).await?;
            }

            let order_model = order::ActiveModel {
                id: Set(Uuid::new_v4()),
                user_id: Set(user_id),
                seller_id: Set(*seller_id),
                discount_id: Set(discount_ctx.as_ref().map(|(d, _)| d.id)),
                order_date: Set(now),
                total_amount: Set(seller_subtotal),
                discount_amount: Set(share),
                total_payment: Set(net_payment),
                status: Set(OrderStatus::Pending),
                shipping_address: Set(request.shipping_address.clone()),
                created_at: Set(now),
                updated_at: Set(None),
            }
            .insert(&txn)
            .await?;

            let mut order_lines = Vec::with_capacity(group.len());
            for (item, product) in group {
                // Unit price is frozen onto the order line; later catalog
                // price changes must not rewrite history.
                order_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    order_id: Set(order_model.id),
                    product_id: Set(product.id),
                    quantity: Set(item.quantity),
                    unit_price: Set(product.price),
                    created_at: Set(now),
                }
                .insert(&txn)
                .await?;

                order_lines.push(CreatedOrderLine {
                    product_id: product.id,
                    product_name: product.name.clone(),
                    quantity: item.quantity,
                    unit_price: product.price,
                    line_total: product.price * Decimal::from(item.quantity),
                });
            }

            created.push((order_model, order_lines));
        }

        if let Some((d, actual)) = &discount_ctx {
            charge_budget(&txn, d, *actual, now).await?;
        }

        // Consumed lines leave the cart in the same transaction, so a
        // failed checkout leaves the cart exactly as it was.
        CartItem::delete_many()
            .filter(cart_item::Column::Id.is_in(selected))
            .exec(&txn)
            .await?;

        if let Some(c) = &user_cart {
            let mut active: cart::ActiveModel = c.clone().into();
            active.updated_at = Set(Some(now));
            active.update(&txn).await?;
        }

        let shop_names: HashMap<Uuid, String> = Seller::find()
            .filter(seller::Column::Id.is_in(groups.keys().copied().collect::<Vec<_>>()))
            .all(&txn)
            .await?
            .into_iter()
            .map(|s| (s.id, s.shop_name))
            .collect();

        txn.commit().await.map_err(|e| {
            error!(error = %e, "failed to commit checkout transaction");
            ServiceError::DatabaseError(e)
        })?;

        let discount_total = discount_ctx
            .as_ref()
            .map(|(_, actual)| *actual)
            .unwrap_or(Decimal::ZERO);

        for (order_model, _) in &created {
            self.event_sender
                .send_or_log(Event::OrderCreated(order_model.id))
                .await;
        }
        if let Some((d, actual)) = &discount_ctx {
            self.event_sender
                .send_or_log(Event::DiscountApplied {
                    discount_id: d.id,
                    amount: *actual,
                    order_count: created.len(),
                })
                .await;
        }

        info!(
            user_id = %user_id,
            order_count = created.len(),
            grand_total = %grand_total,
            discount_total = %discount_total,
            "checkout split cart into seller orders"
        );

        let orders = created
            .into_iter()
            .map(|(order_model, order_lines)| CreatedOrder {
                order_id: order_model.id,
                seller_id: order_model.seller_id,
                shop_name: shop_names
                    .get(&order_model.seller_id)
                    .cloned()
                    .unwrap_or_default(),
                status: order_model.status,
                order_date: order_model.order_date,
                total_amount: order_model.total_amount,
                discount_amount: order_model.discount_amount,
                total_payment: order_model.total_payment,
                lines: order_lines,
            })
            .collect();

        Ok(CheckoutResponse {
            orders,
            grand_total,
            discount_total,
        })
    }
}

/// Conditional decrement: only succeeds while stock covers the quantity,
/// so two concurrent checkouts cannot both take the last unit. Zero rows
/// affected means the row moved underneath us; re-read for an exact reason.
async fn decrement_stock<C: ConnectionTrait>(
    conn: &C,
    product_row: &product::Model,
    quantity: i32,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    let res = Product::update_many()
        .col_expr(
            product::Column::StockQuantity,
            Expr::col(product::Column::StockQuantity).sub(quantity),
        )
        .col_expr(product::Column::UpdatedAt, Expr::value(now))
        .filter(product::Column::Id.eq(product_row.id))
        .filter(product::Column::StockQuantity.gte(quantity))
        .exec(conn)
        .await?;

    if res.rows_affected == 0 {
        let fresh = Product::find_by_id(product_row.id).one(conn).await?;
        return Err(match fresh {
            Some(p) => ServiceError::InsufficientStock(format!(
                "requested {} of {:?}, only {} available",
                quantity, p.name, p.stock_quantity
            )),
            None => ServiceError::NotFound(format!("Product {} not found", product_row.id)),
        });
    }

    Ok(())
}

/// Budget write, compare-and-set against the value read during validation.
/// The budget is charged `ceil(actual)` so it is never under-charged, and
/// clamped at zero. Losing the CAS means another checkout spent from this
/// code first; the caller may simply retry.
async fn charge_budget<C: ConnectionTrait>(
    conn: &C,
    d: &discount::Model,
    actual: Decimal,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    let new_remaining = (d.remaining_budget - actual.ceil()).max(Decimal::ZERO);

    let res = Discount::update_many()
        .col_expr(discount::Column::RemainingBudget, Expr::value(new_remaining))
        .col_expr(discount::Column::UpdatedAt, Expr::value(now))
        .filter(discount::Column::Id.eq(d.id))
        .filter(discount::Column::RemainingBudget.eq(d.remaining_budget))
        .exec(conn)
        .await?;

    if res.rows_affected == 0 {
        return Err(ServiceError::ConcurrencyConflict(format!(
            "budget of discount code {} changed during checkout",
            d.code
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use test_case::test_case;

    #[test_case(dec!(400), dec!(10), dec!(0), dec!(40); "ten percent uncapped")]
    #[test_case(dec!(400), dec!(10), dec!(25), dec!(25); "cap clamps")]
    #[test_case(dec!(400), dec!(10), dec!(-5), dec!(40); "negative cap means uncapped")]
    #[test_case(dec!(400), dec!(0), dec!(0), dec!(0); "zero percent")]
    #[test_case(dec!(1000), dec!(100), dec!(0), dec!(1000); "full discount")]
    fn actual_discount_cases(grand: Decimal, percent: Decimal, cap: Decimal, expected: Decimal) {
        assert_eq!(actual_discount(grand, percent, cap), expected);
    }

    #[test]
    fn shares_match_the_worked_example() {
        // Two sellers at 200 each, 10% of 400 = 40, split 20/20.
        let actual = actual_discount(dec!(400), dec!(10), Decimal::ZERO);
        assert_eq!(actual, dec!(40));
        assert_eq!(seller_share(actual, dec!(200), dec!(400)), dec!(20));
    }

    #[test]
    fn share_uses_half_to_even_rounding() {
        // 25 * 200 / 400 = 12.5, which rounds to the even 12.
        assert_eq!(seller_share(dec!(25), dec!(200), dec!(400)), dec!(12));
        // 27 * 200 / 400 = 13.5, which also rounds to the even 14.
        assert_eq!(seller_share(dec!(27), dec!(200), dec!(400)), dec!(14));
    }

    #[test]
    fn rounding_drift_is_not_reconciled() {
        // Three equal sellers, actual 100: each share rounds to 33 and the
        // orders sum to 99, one unit under the charged amount.
        let grand = dec!(300);
        let share = seller_share(dec!(100), dec!(100), grand);
        assert_eq!(share, dec!(33));
        assert_eq!(share * dec!(3), dec!(99));
    }

    #[test]
    fn budget_charge_rounds_up() {
        assert_eq!(dec!(40.3).ceil(), dec!(41));
        assert_eq!(dec!(40).ceil(), dec!(40));
    }

    proptest! {
        /// Every share stays proportional to its seller's slice of the
        /// grand total, within one whole unit of rounding.
        #[test]
        fn shares_stay_proportional(
            subtotals in prop::collection::vec(1i64..10_000, 1..6),
            percent in 0i64..=100,
            cap in 0i64..20_000,
        ) {
            let grand_total: Decimal = subtotals.iter().map(|s| Decimal::from(*s)).sum();
            let actual = actual_discount(grand_total, Decimal::from(percent), Decimal::from(cap));
            prop_assert!(actual <= grand_total);

            let mut share_sum = Decimal::ZERO;
            for s in &subtotals {
                let subtotal = Decimal::from(*s);
                let share = seller_share(actual, subtotal, grand_total);
                let exact = actual * subtotal / grand_total;

                prop_assert!(share >= Decimal::ZERO);
                prop_assert!(share <= subtotal);
                prop_assert!((share - exact).abs() <= Decimal::ONE);
                share_sum += share;
            }

            // Each group contributes at most half a unit of drift.
            let max_drift = Decimal::from(subtotals.len() as i64) / Decimal::TWO;
            prop_assert!((share_sum - actual).abs() <= max_drift);
        }

        /// The net payment never goes negative no matter the inputs.
        #[test]
        fn net_payment_is_never_negative(
            subtotal in 1i64..10_000,
            percent in 0i64..=100,
            cap in 0i64..20_000,
        ) {
            let subtotal = Decimal::from(subtotal);
            let actual = actual_discount(subtotal, Decimal::from(percent), Decimal::from(cap));
            let share = seller_share(actual, subtotal, subtotal);
            prop_assert!((subtotal - share).max(Decimal::ZERO) >= Decimal::ZERO);
            prop_assert!(share <= subtotal);
        }
    }
}
