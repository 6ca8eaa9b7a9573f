use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, ActiveValue::Set, ConnectionTrait};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// A shared discount code with a finite spending budget.
///
/// `remaining_budget` only ever decreases through checkout (administrative
/// top-ups aside) and must never go negative. The budget is charged once per
/// checkout with the ceiling of the applied amount, regardless of how the
/// amount was split across seller orders.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, Validate)]
#[sea_orm(table_name = "discounts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Code customers type at checkout; stored uppercase, matched
    /// case-insensitively by normalizing the input.
    #[sea_orm(unique)]
    #[validate(length(
        min = 1,
        max = 50,
        message = "Discount code must be between 1 and 50 characters"
    ))]
    pub code: String,

    /// Percentage taken off the checkout grand total
    pub discount_percent: Decimal,

    /// Absolute cap on the discount amount; non-positive means uncapped
    pub max_discount_amount: Decimal,

    /// Total budget granted to this code
    pub budget: Decimal,

    /// Budget still available; never negative
    pub remaining_budget: Decimal,

    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,

    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order::Entity")]
    Orders,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Orders.def()
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;

        if insert {
            if let ActiveValue::NotSet = active_model.is_active {
                active_model.is_active = Set(true);
            }
            active_model.created_at = Set(Utc::now());
        }
        active_model.updated_at = Set(Some(Utc::now()));

        // Codes are stored in their canonical uppercase form.
        if let ActiveValue::Set(code) = &active_model.code {
            active_model.code = Set(code.trim().to_uppercase());
        }

        let model: Model = active_model.clone().try_into().map_err(|_| {
            DbErr::Custom("Failed to convert ActiveModel to Model for validation".to_string())
        })?;
        if let Err(err) = model.validate() {
            return Err(DbErr::Custom(format!("Validation error: {}", err)));
        }
        if model.remaining_budget < Decimal::ZERO {
            return Err(DbErr::Custom(
                "Validation error: remaining_budget cannot be negative".to_string(),
            ));
        }

        Ok(active_model)
    }
}
