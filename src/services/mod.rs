// Checkout core
pub mod inventory;
pub mod orders;
pub mod payments;

// Catalog, cart and checkout orchestration
pub mod commerce;
