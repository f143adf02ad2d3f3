/// Commerce services module - catalog, cart and checkout
pub mod cart_service;
pub mod catalog_service;
pub mod checkout_service;

// Re-export services for convenience
pub use cart_service::{AddToCartInput, CartService, CartSnapshot, CartView};
pub use catalog_service::CatalogService;
pub use checkout_service::CheckoutService;
