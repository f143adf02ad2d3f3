use crate::{entities::product, errors::ServiceError};
use metrics::counter;
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter};
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// A request for `quantity` units of one product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StockDemand {
    pub product_id: Uuid,
    pub quantity: i32,
}

impl StockDemand {
    pub fn new(product_id: Uuid, quantity: i32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// Why a single demand cannot be met right now
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum InventoryFailure {
    Missing {
        product_id: Uuid,
    },
    Unavailable {
        product_id: Uuid,
        title: String,
    },
    Inactive {
        product_id: Uuid,
        title: String,
    },
    InsufficientStock {
        product_id: Uuid,
        title: String,
        requested: i32,
        available: i32,
    },
}

impl InventoryFailure {
    pub fn product_id(&self) -> Uuid {
        match self {
            InventoryFailure::Missing { product_id }
            | InventoryFailure::Unavailable { product_id, .. }
            | InventoryFailure::Inactive { product_id, .. }
            | InventoryFailure::InsufficientStock { product_id, .. } => *product_id,
        }
    }
}

impl From<InventoryFailure> for ServiceError {
    fn from(failure: InventoryFailure) -> Self {
        match failure {
            InventoryFailure::Missing { product_id } => {
                ServiceError::ProductUnavailable(format!("Product {} no longer exists", product_id))
            }
            InventoryFailure::Unavailable { title, .. } => {
                ServiceError::ProductUnavailable(format!("\"{}\" has already been sold", title))
            }
            InventoryFailure::Inactive { title, .. } => {
                ServiceError::ProductInactive(format!("\"{}\" is not currently listed", title))
            }
            InventoryFailure::InsufficientStock {
                title,
                requested,
                available,
                ..
            } => ServiceError::InsufficientStock(format!(
                "\"{}\": requested {}, only {} available",
                title, requested, available
            )),
        }
    }
}

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("{} demand(s) failed availability checks", .0.len())]
    Rejected(Vec<InventoryFailure>),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl From<InventoryError> for ServiceError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::Rejected(failures) => failures
                .into_iter()
                .next()
                .map(ServiceError::from)
                .unwrap_or_else(|| {
                    ServiceError::InternalError("Empty inventory rejection".to_string())
                }),
            InventoryError::Database(e) => ServiceError::DatabaseError(e),
        }
    }
}

/// Checks a product against a requested quantity. Sold beats inactive beats stock.
pub fn classify(product: &product::Model, quantity: i32) -> Option<InventoryFailure> {
    if product.is_sold {
        Some(InventoryFailure::Unavailable {
            product_id: product.id,
            title: product.title.clone(),
        })
    } else if !product.is_active {
        Some(InventoryFailure::Inactive {
            product_id: product.id,
            title: product.title.clone(),
        })
    } else if quantity > product.stock {
        Some(InventoryFailure::InsufficientStock {
            product_id: product.id,
            title: product.title.clone(),
            requested: quantity,
            available: product.stock,
        })
    } else {
        None
    }
}

/// Read-only availability check against the live catalog.
///
/// Never mutates; callers decide what to do with the failures. Run it on the
/// connection or transaction that will perform the follow-up writes.
#[derive(Debug, Clone, Copy, Default)]
pub struct InventoryGuard;

impl InventoryGuard {
    pub fn new() -> Self {
        Self
    }

    /// Validates every demand, reporting all failures in demand order.
    #[instrument(skip(self, conn, demands), fields(demands = demands.len()))]
    pub async fn validate<C>(&self, conn: &C, demands: &[StockDemand]) -> Result<(), InventoryError>
    where
        C: ConnectionTrait,
    {
        let merged = merge_demands(demands);
        if merged.is_empty() {
            return Ok(());
        }

        let ids: Vec<Uuid> = merged.iter().map(|d| d.product_id).collect();
        let products: HashMap<Uuid, product::Model> = product::Entity::find()
            .filter(product::Column::Id.is_in(ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let failures: Vec<InventoryFailure> = merged
            .iter()
            .filter_map(|demand| match products.get(&demand.product_id) {
                Some(product) => classify(product, demand.quantity),
                None => Some(InventoryFailure::Missing {
                    product_id: demand.product_id,
                }),
            })
            .collect();

        if failures.is_empty() {
            debug!("Inventory check passed");
            Ok(())
        } else {
            counter!("market.inventory.rejections", failures.len() as u64);
            warn!(
                failed = failures.len(),
                first = %failures[0].product_id(),
                "Inventory check rejected demands"
            );
            Err(InventoryError::Rejected(failures))
        }
    }
}

/// Sums quantities for repeated products, keeping first-seen order.
fn merge_demands(demands: &[StockDemand]) -> Vec<StockDemand> {
    let mut merged: Vec<StockDemand> = Vec::with_capacity(demands.len());
    for demand in demands {
        match merged.iter_mut().find(|d| d.product_id == demand.product_id) {
            Some(existing) => existing.quantity += demand.quantity,
            None => merged.push(*demand),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::product::ProductCondition;
    use chrono::Utc;

    fn product(stock: i32, is_sold: bool, is_active: bool) -> product::Model {
        product::Model {
            id: Uuid::new_v4(),
            title: "Desk Lamp".into(),
            slug: "desk-lamp".into(),
            description: None,
            price: 15000,
            condition: ProductCondition::Used,
            stock,
            is_sold,
            is_active,
            seller_id: Uuid::new_v4(),
            category_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn available_product_passes() {
        assert_eq!(classify(&product(5, false, true), 5), None);
    }

    #[test]
    fn sold_is_reported_before_inactive() {
        let failure = classify(&product(0, true, false), 1).unwrap();
        assert!(matches!(failure, InventoryFailure::Unavailable { .. }));
    }

    #[test]
    fn inactive_is_reported_before_stock() {
        let failure = classify(&product(0, false, false), 3).unwrap();
        assert!(matches!(failure, InventoryFailure::Inactive { .. }));
    }

    #[test]
    fn insufficient_stock_reports_available_amount() {
        let failure = classify(&product(2, false, true), 3).unwrap();
        match &failure {
            InventoryFailure::InsufficientStock {
                requested,
                available,
                ..
            } => {
                assert_eq!(*requested, 3);
                assert_eq!(*available, 2);
            }
            other => panic!("unexpected failure {:?}", other),
        }
        let err: ServiceError = failure.into();
        assert!(err.to_string().contains("only 2 available"));
    }

    #[test]
    fn repeated_products_are_merged() {
        let id = Uuid::new_v4();
        let other = Uuid::new_v4();
        let merged = merge_demands(&[
            StockDemand::new(id, 1),
            StockDemand::new(other, 2),
            StockDemand::new(id, 3),
        ]);
        assert_eq!(merged, vec![StockDemand::new(id, 4), StockDemand::new(other, 2)]);
    }

    #[test]
    fn rejection_surfaces_first_failure() {
        let err: ServiceError = InventoryError::Rejected(vec![
            InventoryFailure::Missing {
                product_id: Uuid::nil(),
            },
            InventoryFailure::Inactive {
                product_id: Uuid::nil(),
                title: "x".into(),
            },
        ])
        .into();
        assert!(matches!(err, ServiceError::ProductUnavailable(_)));
    }
}
