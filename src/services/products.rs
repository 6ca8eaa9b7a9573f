use crate::{
    db::DbPool,
    entities::{
        category::Entity as Category, product::Entity as Product, seller::Entity as Seller,
    },
    errors::ServiceError,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::EntityTrait;
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductView {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub shop_name: String,
    pub category_id: Uuid,
    pub category_name: String,
    pub name: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub price: Decimal,
    pub stock_quantity: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Catalog reads. Products are seeded and administered elsewhere; the
/// storefront only ever reads them.
#[derive(Clone)]
pub struct ProductService {
    db: Arc<DbPool>,
}

impl ProductService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn get_product(&self, product_id: Uuid) -> Result<ProductView, ServiceError> {
        let db = &*self.db;

        let product = Product::find_by_id(product_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let shop_name = Seller::find_by_id(product.seller_id)
            .one(db)
            .await?
            .map(|s| s.shop_name)
            .unwrap_or_default();

        let category_name = Category::find_by_id(product.category_id)
            .one(db)
            .await?
            .map(|c| c.name)
            .unwrap_or_default();

        Ok(ProductView {
            id: product.id,
            seller_id: product.seller_id,
            shop_name,
            category_id: product.category_id,
            category_name,
            name: product.name,
            description: product.description,
            image_url: product.image_url,
            price: product.price,
            stock_quantity: product.stock_quantity,
            is_active: product.is_active,
            created_at: product.created_at,
        })
    }
}
