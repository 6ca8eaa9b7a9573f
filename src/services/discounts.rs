use crate::{
    db::DbPool,
    entities::discount::{self, Entity as Discount},
    errors::ServiceError,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;

/// What a storefront needs to render a discount estimate before checkout.
#[derive(Debug, Serialize, ToSchema)]
pub struct DiscountPreview {
    pub code: String,
    pub discount_percent: Decimal,
    /// Absent when the discount is uncapped.
    pub max_discount_amount: Option<Decimal>,
    pub remaining_budget: Decimal,
}

/// Checks every usability rule in a fixed order and reports the first
/// failure, so a client always sees one stable reason for a rejected code.
pub(crate) fn check_usable(d: &discount::Model, now: DateTime<Utc>) -> Result<(), ServiceError> {
    if !d.is_active {
        return Err(ServiceError::InvalidDiscount(format!(
            "Discount code {} is not active",
            d.code
        )));
    }
    if now < d.starts_at {
        return Err(ServiceError::InvalidDiscount(format!(
            "Discount code {} is not valid yet",
            d.code
        )));
    }
    if now > d.ends_at {
        return Err(ServiceError::InvalidDiscount(format!(
            "Discount code {} has expired",
            d.code
        )));
    }
    if d.remaining_budget <= Decimal::ZERO {
        return Err(ServiceError::InvalidDiscount(format!(
            "Discount code {} has no remaining budget",
            d.code
        )));
    }
    Ok(())
}

/// Looks up a code (stored uppercase, matched case-insensitively) and runs
/// the usability rules against `now`. Shared by the preview endpoint and by
/// checkout, which calls it on its own transaction.
pub(crate) async fn find_usable<C: ConnectionTrait>(
    conn: &C,
    code: &str,
    now: DateTime<Utc>,
) -> Result<discount::Model, ServiceError> {
    let normalized = code.trim().to_uppercase();

    let d = Discount::find()
        .filter(discount::Column::Code.eq(normalized.clone()))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Discount code {} not found", normalized)))?;

    check_usable(&d, now)?;
    Ok(d)
}

/// Read-only discount checks for the storefront.
#[derive(Clone)]
pub struct DiscountService {
    db: Arc<DbPool>,
}

impl DiscountService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Validates a code without consuming anything, so a client can show
    /// the shopper an estimate before the real checkout runs.
    #[instrument(skip(self))]
    pub async fn validate_for_checkout(&self, code: &str) -> Result<DiscountPreview, ServiceError> {
        let d = find_usable(&*self.db, code, Utc::now()).await?;

        Ok(DiscountPreview {
            code: d.code,
            discount_percent: d.discount_percent,
            max_discount_amount: (d.max_discount_amount > Decimal::ZERO)
                .then_some(d.max_discount_amount),
            remaining_budget: d.remaining_budget,
        })
    }
}
