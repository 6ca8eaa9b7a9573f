pub mod carts;
pub mod checkout;
pub mod discounts;
pub mod orders;
pub mod products;

// Re-export services for convenience
pub use carts::CartService;
pub use checkout::CheckoutService;
pub use discounts::DiscountService;
pub use orders::OrderService;
pub use products::ProductService;
