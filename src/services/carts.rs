use crate::{
    db::DbPool,
    entities::{
        cart::{self, Entity as Cart},
        cart_item::{self, Entity as CartItem},
        product::Entity as Product,
        seller::{self, Entity as Seller},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddCartItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "quantity must be at least 1"))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateCartItemRequest {
    #[validate(range(min = 1, message = "quantity must be at least 1"))]
    pub quantity: i32,
}

/// A cart line enriched with the product display fields a storefront needs.
#[derive(Debug, Serialize, ToSchema)]
pub struct CartLineView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub image_url: Option<String>,
    pub seller_id: Uuid,
    pub shop_name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
    pub stock_quantity: i32,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartView {
    pub cart_id: Uuid,
    pub user_id: Uuid,
    pub items: Vec<CartLineView>,
    pub subtotal: Decimal,
}

/// One active cart per user, created lazily on first touch.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl CartService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Returns the user's cart, creating an empty one if none exists yet.
    #[instrument(skip(self))]
    pub async fn get_or_create_cart(&self, user_id: Uuid) -> Result<cart::Model, ServiceError> {
        find_or_create_cart(&*self.db, user_id).await
    }

    /// Adds a product to the cart, merging with an existing line for the
    /// same product. The merged quantity is validated against current stock.
    #[instrument(skip(self, request), fields(product_id = %request.product_id, quantity = request.quantity))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        request: AddCartItemRequest,
    ) -> Result<CartView, ServiceError> {
        request.validate()?;

        let txn = self.db.begin().await?;
        let now = Utc::now();

        let cart = find_or_create_cart(&txn, user_id).await?;

        let product = Product::find_by_id(request.product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", request.product_id))
            })?;

        if !product.is_active {
            return Err(ServiceError::InvalidOperation(format!(
                "Product {:?} is not available",
                product.name
            )));
        }

        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product.id))
            .one(&txn)
            .await?;

        let merged_quantity = match &existing {
            Some(item) => item.quantity + request.quantity,
            None => request.quantity,
        };

        if product.stock_quantity < merged_quantity {
            return Err(ServiceError::InsufficientStock(format!(
                "requested {} of {:?}, only {} available",
                merged_quantity, product.name, product.stock_quantity
            )));
        }

        match existing {
            Some(item) => {
                let mut item: cart_item::ActiveModel = item.into();
                item.quantity = Set(merged_quantity);
                item.update(&txn).await?;
            }
            None => {
                let item = cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    product_id: Set(product.id),
                    quantity: Set(request.quantity),
                    added_at: Set(now),
                };
                item.insert(&txn).await?;
            }
        }

        touch_cart(&txn, &cart, now).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id: cart.id,
                product_id: product.id,
            })
            .await;

        info!(cart_id = %cart.id, product_id = %product.id, "added item to cart");
        self.get_cart_with_items(user_id).await
    }

    /// Sets the quantity of a cart line, after checking the line belongs to
    /// the requesting user and the product still has that much stock.
    #[instrument(skip(self))]
    pub async fn update_item_quantity(
        &self,
        user_id: Uuid,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::ValidationError(
                "quantity must be at least 1".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        let now = Utc::now();

        let (item, cart) = owned_cart_item(&txn, user_id, item_id).await?;

        let product = Product::find_by_id(item.product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", item.product_id))
            })?;

        if product.stock_quantity < quantity {
            return Err(ServiceError::InsufficientStock(format!(
                "requested {} of {:?}, only {} available",
                quantity, product.name, product.stock_quantity
            )));
        }

        let mut item: cart_item::ActiveModel = item.into();
        item.quantity = Set(quantity);
        item.update(&txn).await?;

        touch_cart(&txn, &cart, now).await?;
        txn.commit().await?;

        self.get_cart_with_items(user_id).await
    }

    /// Removes a cart line after an ownership check.
    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        user_id: Uuid,
        item_id: Uuid,
    ) -> Result<CartView, ServiceError> {
        let txn = self.db.begin().await?;
        let now = Utc::now();

        let (item, cart) = owned_cart_item(&txn, user_id, item_id).await?;
        let product_id = item.product_id;

        CartItem::delete_by_id(item.id).exec(&txn).await?;
        touch_cart(&txn, &cart, now).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemRemoved {
                cart_id: cart.id,
                product_id,
            })
            .await;

        self.get_cart_with_items(user_id).await
    }

    /// The user's cart with lines enriched for display plus a subtotal.
    #[instrument(skip(self))]
    pub async fn get_cart_with_items(&self, user_id: Uuid) -> Result<CartView, ServiceError> {
        let cart = find_or_create_cart(&*self.db, user_id).await?;
        load_cart_view(&*self.db, &cart).await
    }

    /// Drops every line from the user's cart. A user without a cart has
    /// nothing to clear.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, user_id: Uuid) -> Result<(), ServiceError> {
        let cart = Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?;

        let Some(cart) = cart else {
            return Ok(());
        };

        let txn = self.db.begin().await?;

        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&txn)
            .await?;
        touch_cart(&txn, &cart, Utc::now()).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartCleared(cart.id))
            .await;

        info!(cart_id = %cart.id, "cleared cart");
        Ok(())
    }
}

async fn find_or_create_cart<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> Result<cart::Model, ServiceError> {
    let existing = Cart::find()
        .filter(cart::Column::UserId.eq(user_id))
        .one(conn)
        .await?;

    if let Some(cart) = existing {
        return Ok(cart);
    }

    let fresh = cart::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        created_at: Set(Utc::now()),
        updated_at: Set(None),
    };

    match fresh.insert(conn).await {
        Ok(cart) => Ok(cart),
        // Lost a create race on the unique user_id; the winner's row is ours
        Err(insert_err) => Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::DatabaseError(insert_err)),
    }
}

/// Loads an item and proves it sits in the requesting user's cart.
async fn owned_cart_item<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    item_id: Uuid,
) -> Result<(cart_item::Model, cart::Model), ServiceError> {
    let item = CartItem::find_by_id(item_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found", item_id)))?;

    let cart = Cart::find_by_id(item.cart_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", item.cart_id)))?;

    if cart.user_id != user_id {
        return Err(ServiceError::Forbidden(format!(
            "Cart item {} does not belong to the requesting user",
            item_id
        )));
    }

    Ok((item, cart))
}

async fn touch_cart<C: ConnectionTrait>(
    conn: &C,
    cart: &cart::Model,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    let mut active: cart::ActiveModel = cart.clone().into();
    active.updated_at = Set(Some(now));
    active.update(conn).await?;
    Ok(())
}

async fn load_cart_view<C: ConnectionTrait>(
    conn: &C,
    cart: &cart::Model,
) -> Result<CartView, ServiceError> {
    let rows = CartItem::find()
        .filter(cart_item::Column::CartId.eq(cart.id))
        .order_by_asc(cart_item::Column::AddedAt)
        .find_also_related(Product)
        .all(conn)
        .await?;

    let seller_ids: Vec<Uuid> = rows
        .iter()
        .filter_map(|(_, p)| p.as_ref().map(|p| p.seller_id))
        .collect();

    let shop_names: HashMap<Uuid, String> = Seller::find()
        .filter(seller::Column::Id.is_in(seller_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|s| (s.id, s.shop_name))
        .collect();

    let mut items = Vec::with_capacity(rows.len());
    let mut subtotal = Decimal::ZERO;

    for (item, product) in rows {
        let Some(product) = product else {
            continue;
        };
        let line_total = product.price * Decimal::from(item.quantity);
        subtotal += line_total;

        items.push(CartLineView {
            id: item.id,
            product_id: product.id,
            product_name: product.name,
            image_url: product.image_url,
            seller_id: product.seller_id,
            shop_name: shop_names
                .get(&product.seller_id)
                .cloned()
                .unwrap_or_default(),
            unit_price: product.price,
            quantity: item.quantity,
            line_total,
            stock_quantity: product.stock_quantity,
            added_at: item.added_at,
        });
    }

    Ok(CartView {
        cart_id: cart.id,
        user_id: cart.user_id,
        items,
        subtotal,
    })
}
