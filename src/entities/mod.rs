pub mod cart;
pub mod cart_item;
pub mod category;
pub mod discount;
pub mod order;
pub mod order_item;
pub mod product;
pub mod seller;
