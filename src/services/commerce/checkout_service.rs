use crate::{
    entities::order::OrderStatus,
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        commerce::cart_service::CartService,
        inventory::{InventoryGuard, StockDemand},
        orders::{OrderDraft, OrderLedger, OrderResponse, OrderWithItems},
        payments::{PaymentDetails, PaymentGateway},
    },
};
use metrics::counter;
use sea_orm::{DatabaseConnection, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Body of `POST /orders`
pub type CreateOrderInput = OrderDraft;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateOrderStatusInput {
    pub status: OrderStatus,
}

/// Drives the order lifecycle: cart to pending order, payment capture,
/// cancellation and seller fulfilment updates.
///
/// Availability is checked when the order is created and again right before
/// the gateway is called. Stock only moves once payment is approved, through
/// conditional updates inside the same transaction that marks the order paid.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    gateway: Arc<dyn PaymentGateway>,
    inventory: InventoryGuard,
    ledger: OrderLedger,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        gateway: Arc<dyn PaymentGateway>,
        ledger: OrderLedger,
    ) -> Self {
        Self {
            db,
            event_sender,
            gateway,
            inventory: InventoryGuard::new(),
            ledger,
        }
    }

    /// Converts the buyer's cart into a PENDING order.
    ///
    /// Snapshot, availability check, order insert and cart clear share one
    /// transaction. Stock is left untouched.
    ///
    /// # Returns
    ///
    /// * `Err(ServiceError::EmptyCart)` - The cart has no lines
    /// * `Err(ServiceError::ProductUnavailable | ProductInactive | InsufficientStock)` - A line cannot be covered
    #[instrument(skip(self, input))]
    pub async fn create_order(
        &self,
        buyer_id: Uuid,
        input: CreateOrderInput,
    ) -> Result<OrderResponse, ServiceError> {
        let txn = self.db.begin().await?;

        let snapshot = CartService::snapshot(&txn, buyer_id).await?;
        let cart_id = match snapshot.cart_id {
            Some(id) if !snapshot.is_empty() => id,
            _ => {
                txn.rollback().await?;
                return Err(ServiceError::EmptyCart);
            }
        };

        let demands: Vec<StockDemand> = snapshot
            .lines
            .iter()
            .map(|line| StockDemand::new(line.product_id, line.quantity))
            .collect();

        let created = async {
            self.inventory.validate(&txn, &demands).await?;
            let created = self
                .ledger
                .create(&txn, buyer_id, &snapshot.lines, input)
                .await?;
            CartService::clear_lines(&txn, cart_id).await?;
            Ok::<_, ServiceError>(created)
        }
        .await;

        let created = match created {
            Ok(created) => created,
            Err(e) => {
                txn.rollback().await?;
                return Err(e);
            }
        };
        txn.commit().await?;

        counter!("market.orders.created", 1);
        info!(
            order_id = %created.order.id,
            total_amount = created.order.total_amount,
            "Order created from cart"
        );
        self.event_sender
            .send_or_log(Event::OrderCreated(created.order.id))
            .await;
        self.event_sender
            .send_or_log(Event::CartCleared(cart_id))
            .await;

        Ok(created.into())
    }

    /// Captures payment for a PENDING order.
    ///
    /// # Returns
    ///
    /// * `Err(ServiceError::NotFound)` - No such order
    /// * `Err(ServiceError::Forbidden)` - Caller is not the buyer
    /// * `Err(ServiceError::AlreadyProcessed)` - Order is no longer PENDING
    /// * `Err(ServiceError::ValidationError)` - Card payment without a card number
    /// * `Err(ServiceError::ProductUnavailable | ProductInactive | InsufficientStock)` - Stock went away
    /// * `Err(ServiceError::InvalidCard)` - Card number failed validation
    /// * `Err(ServiceError::PaymentDeclined)` - Gateway declined; order stays PENDING
    #[instrument(skip(self, details))]
    pub async fn pay_order(
        &self,
        buyer_id: Uuid,
        order_id: Uuid,
        details: PaymentDetails,
    ) -> Result<OrderResponse, ServiceError> {
        let view = self.ledger.find_one(&*self.db, order_id).await?;
        if !view.is_buyer(buyer_id) {
            return Err(ServiceError::Forbidden(
                "You can only pay for your own orders".to_string(),
            ));
        }
        if view.order.status != OrderStatus::Pending {
            return Err(ServiceError::AlreadyProcessed(format!(
                "Order already processed (status: {})",
                view.order.status
            )));
        }
        details.validate()?;

        self.inventory
            .validate(&*self.db, &view.demands())
            .await
            .map_err(ServiceError::from)?;

        let result = self
            .gateway
            .process(view.order.total_amount, &details)
            .await?;

        if !result.success {
            counter!("market.payments.declined", 1);
            warn!(%order_id, reason = %result.message, "Payment declined");
            self.event_sender
                .send_or_log(Event::PaymentDeclined {
                    order_id,
                    reason: result.message.clone(),
                })
                .await;
            return Err(ServiceError::PaymentDeclined(result.message));
        }

        let txn = self.db.begin().await?;
        let captured = async {
            self.ledger
                .mark_paid(&txn, order_id, details.method(), &result.transaction_id)
                .await?;
            self.ledger.commit_stock(&txn, &view.items).await
        }
        .await;

        if let Err(e) = captured {
            txn.rollback().await?;
            warn!(%order_id, error = %e, "Payment approved but capture rolled back");
            return Err(e);
        }
        txn.commit().await?;

        counter!("market.orders.paid", 1);
        info!(%order_id, transaction_id = %result.transaction_id, "Order paid");
        self.event_sender
            .send_or_log(Event::OrderPaid {
                order_id,
                transaction_id: result.transaction_id,
            })
            .await;

        self.ledger
            .find_one(&*self.db, order_id)
            .await
            .map(Into::into)
    }

    /// Buyer cancellation. Paid or shipped orders give their stock back.
    #[instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        buyer_id: Uuid,
        order_id: Uuid,
    ) -> Result<OrderResponse, ServiceError> {
        let view = self.ledger.find_one(&*self.db, order_id).await?;
        if !view.is_buyer(buyer_id) {
            return Err(ServiceError::Forbidden(
                "You can only cancel your own orders".to_string(),
            ));
        }
        self.cancel(view).await
    }

    /// Seller fulfilment update.
    ///
    /// Sellers may ship a paid order, deliver a shipped one, or cancel anything
    /// not yet delivered. PAID is only reachable through payment.
    #[instrument(skip(self, input), fields(requested = %input.status))]
    pub async fn update_status(
        &self,
        seller_id: Uuid,
        order_id: Uuid,
        input: UpdateOrderStatusInput,
    ) -> Result<OrderResponse, ServiceError> {
        let view = self.ledger.find_one(&*self.db, order_id).await?;
        if !view.is_seller(seller_id) {
            return Err(ServiceError::Forbidden(
                "Only a seller of this order can update its status".to_string(),
            ));
        }

        let current = view.order.status;
        let next = input.status;
        if !seller_may_move(current, next) {
            return Err(ServiceError::InvalidTransition {
                from: current.to_string(),
                to: next.to_string(),
            });
        }

        if next == OrderStatus::Cancelled {
            return self.cancel(view).await;
        }

        self.ledger
            .set_status(&*self.db, order_id, current, next)
            .await?;

        info!(%order_id, from = %current, to = %next, "Order status updated");
        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: current.to_string(),
                new_status: next.to_string(),
            })
            .await;

        self.ledger
            .find_one(&*self.db, order_id)
            .await
            .map(Into::into)
    }

    /// Readable by the buyer, any seller of an item, or an admin.
    pub async fn get_order(
        &self,
        viewer_id: Uuid,
        is_admin: bool,
        order_id: Uuid,
    ) -> Result<OrderResponse, ServiceError> {
        let view = self.ledger.find_one(&*self.db, order_id).await?;
        if !(is_admin || view.is_buyer(viewer_id) || view.is_seller(viewer_id)) {
            return Err(ServiceError::Forbidden(
                "You do not have access to this order".to_string(),
            ));
        }
        Ok(view.into())
    }

    pub async fn list_buyer_orders(
        &self,
        buyer_id: Uuid,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<OrderResponse>, ServiceError> {
        let orders = self
            .ledger
            .find_buyer_orders(&*self.db, buyer_id, limit, offset)
            .await?;
        Ok(orders.into_iter().map(Into::into).collect())
    }

    pub async fn list_seller_sales(
        &self,
        seller_id: Uuid,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<OrderResponse>, ServiceError> {
        let orders = self
            .ledger
            .find_seller_sales(&*self.db, seller_id, limit, offset)
            .await?;
        Ok(orders.into_iter().map(Into::into).collect())
    }

    async fn cancel(&self, view: OrderWithItems) -> Result<OrderResponse, ServiceError> {
        let order_id = view.order.id;
        let current = view.order.status;
        match current {
            OrderStatus::Delivered => return Err(ServiceError::AlreadyDelivered),
            OrderStatus::Cancelled => return Err(ServiceError::AlreadyCancelled),
            _ => {}
        }
        let restore = current.holds_stock();

        let txn = self.db.begin().await?;
        let cancelled = async {
            self.ledger
                .set_status(&txn, order_id, current, OrderStatus::Cancelled)
                .await?;
            if restore {
                self.ledger.restore_stock(&txn, &view.items).await?;
            }
            Ok::<_, ServiceError>(())
        }
        .await;

        if let Err(e) = cancelled {
            txn.rollback().await?;
            return Err(e);
        }
        txn.commit().await?;

        counter!("market.orders.cancelled", 1);
        info!(%order_id, from = %current, stock_restored = restore, "Order cancelled");
        self.event_sender
            .send_or_log(Event::OrderCancelled {
                order_id,
                stock_restored: restore,
            })
            .await;

        self.ledger
            .find_one(&*self.db, order_id)
            .await
            .map(Into::into)
    }
}

/// Edges open to sellers. Payment is the only way into PAID.
pub fn seller_may_move(from: OrderStatus, to: OrderStatus) -> bool {
    to != OrderStatus::Paid && from.can_transition_to(to)
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrderStatus::*;

    #[test]
    fn sellers_follow_fulfilment_edges() {
        assert!(seller_may_move(Paid, Shipped));
        assert!(seller_may_move(Shipped, Delivered));
        assert!(seller_may_move(Pending, Cancelled));
        assert!(seller_may_move(Paid, Cancelled));
        assert!(seller_may_move(Shipped, Cancelled));
    }

    #[test]
    fn sellers_cannot_skip_or_repeat() {
        assert!(!seller_may_move(Pending, Paid));
        assert!(!seller_may_move(Pending, Delivered));
        assert!(!seller_may_move(Pending, Shipped));
        assert!(!seller_may_move(Paid, Paid));
        assert!(!seller_may_move(Delivered, Cancelled));
        assert!(!seller_may_move(Cancelled, Cancelled));
        assert!(!seller_may_move(Delivered, Shipped));
    }
}
