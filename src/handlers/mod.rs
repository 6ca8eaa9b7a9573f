pub mod carts;
pub mod checkout;
pub mod common;
pub mod discounts;
pub mod orders;
pub mod products;

use crate::db::DbPool;
use crate::events::EventSender;
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub cart: Arc<crate::services::CartService>,
    pub checkout: Arc<crate::services::CheckoutService>,
    pub discount: Arc<crate::services::DiscountService>,
    pub order: Arc<crate::services::OrderService>,
    pub product: Arc<crate::services::ProductService>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        let cart = Arc::new(crate::services::CartService::new(
            db_pool.clone(),
            event_sender.clone(),
        ));
        let checkout = Arc::new(crate::services::CheckoutService::new(
            db_pool.clone(),
            event_sender.clone(),
        ));
        let discount = Arc::new(crate::services::DiscountService::new(db_pool.clone()));
        let order = Arc::new(crate::services::OrderService::new(
            db_pool.clone(),
            event_sender,
        ));
        let product = Arc::new(crate::services::ProductService::new(db_pool));

        Self {
            cart,
            checkout,
            discount,
            order,
            product,
        }
    }
}
