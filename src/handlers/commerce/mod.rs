/// Commerce API handlers module
pub mod carts;
pub mod categories;
pub mod products;

// Re-export route builders
pub use carts::carts_routes;
pub use categories::categories_routes;
pub use products::products_routes;
