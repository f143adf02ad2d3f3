use crate::{
    entities::{
        order::{self, OrderStatus, PaymentMethod},
        order_item, product,
    },
    errors::ServiceError,
    services::{
        commerce::cart_service::{lines_total, CartLineSnapshot},
        inventory::StockDemand,
    },
};
use chrono::{DateTime, Utc};
use rand::Rng;
use sea_orm::{
    sea_query::{Expr, Query},
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, DbErr, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Builds an order number for a given creation instant.
pub type OrderNumberGenerator = fn(DateTime<Utc>) -> String;

/// `ORD-YYYYMMDD-NNNNN`, NNNNN uniform in 1..=99999
pub fn generate_order_number(at: DateTime<Utc>) -> String {
    let sequence: u32 = rand::thread_rng().gen_range(1..=99_999);
    format!("ORD-{}-{:05}", at.format("%Y%m%d"), sequence)
}

/// Header fields a buyer supplies at checkout
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct OrderDraft {
    pub payment_method: PaymentMethod,
    #[validate(length(min = 10, message = "Shipping address must be at least 10 characters"))]
    pub shipping_address: String,
    #[validate(length(max = 500, message = "Notes must be at most 500 characters"))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub seller_id: Uuid,
    pub product_title: String,
    pub quantity: i32,
    pub price: i64,
    pub line_total: i64,
}

impl From<order_item::Model> for OrderItemResponse {
    fn from(item: order_item::Model) -> Self {
        Self {
            line_total: item.line_total(),
            id: item.id,
            product_id: item.product_id,
            seller_id: item.seller_id,
            product_title: item.product_title,
            quantity: item.quantity,
            price: item.price,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub buyer_id: Uuid,
    pub total_amount: i64,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub shipping_address: String,
    pub notes: Option<String>,
    pub transaction_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<OrderItemResponse>,
}

/// An order header together with its frozen lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderWithItems {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

impl OrderWithItems {
    /// One demand per line, for re-validating availability before capture
    pub fn demands(&self) -> Vec<StockDemand> {
        self.items
            .iter()
            .map(|item| StockDemand::new(item.product_id, item.quantity))
            .collect()
    }

    pub fn items_total(&self) -> i64 {
        self.items
            .iter()
            .map(order_item::Model::line_total)
            .fold(0, i64::saturating_add)
    }

    pub fn is_buyer(&self, user_id: Uuid) -> bool {
        self.order.buyer_id == user_id
    }

    pub fn is_seller(&self, user_id: Uuid) -> bool {
        self.items.iter().any(|item| item.seller_id == user_id)
    }
}

impl From<OrderWithItems> for OrderResponse {
    fn from(value: OrderWithItems) -> Self {
        let OrderWithItems { order, items } = value;
        Self {
            id: order.id,
            order_number: order.order_number,
            buyer_id: order.buyer_id,
            total_amount: order.total_amount,
            status: order.status,
            payment_method: order.payment_method,
            shipping_address: order.shipping_address,
            notes: order.notes,
            transaction_id: order.transaction_id,
            paid_at: order.paid_at,
            created_at: order.created_at,
            updated_at: order.updated_at,
            items: items.into_iter().map(Into::into).collect(),
        }
    }
}

/// Persistence for orders and the stock bookkeeping tied to their lifecycle.
///
/// Every mutating method takes the caller's transaction; the ledger never
/// opens or commits one itself, so the checkout flow decides the atomic unit.
#[derive(Debug, Clone)]
pub struct OrderLedger {
    max_number_attempts: u32,
    next_number: OrderNumberGenerator,
}

impl Default for OrderLedger {
    fn default() -> Self {
        Self::new(5)
    }
}

impl OrderLedger {
    pub fn new(max_number_attempts: u32) -> Self {
        Self {
            max_number_attempts: max_number_attempts.max(1),
            next_number: generate_order_number,
        }
    }

    /// Replaces the order number source. Used to exercise collisions.
    pub fn with_number_generator(mut self, generator: OrderNumberGenerator) -> Self {
        self.next_number = generator;
        self
    }

    /// Inserts a PENDING order and one item per snapshot line.
    ///
    /// The order number is retried inside a savepoint when it collides with an
    /// existing one. Stock is not touched.
    ///
    /// # Returns
    ///
    /// * `Err(ServiceError::EmptyCart)` - No lines were given
    /// * `Err(ServiceError::Conflict)` - Every generated order number was taken
    #[instrument(skip(self, txn, lines, draft), fields(lines = lines.len()))]
    pub async fn create(
        &self,
        txn: &DatabaseTransaction,
        buyer_id: Uuid,
        lines: &[CartLineSnapshot],
        draft: OrderDraft,
    ) -> Result<OrderWithItems, ServiceError> {
        if lines.is_empty() {
            return Err(ServiceError::EmptyCart);
        }
        draft.validate()?;

        let now = Utc::now();
        let total_amount = lines_total(lines)?;

        let mut header = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_number: Set(String::new()),
            buyer_id: Set(buyer_id),
            total_amount: Set(total_amount),
            status: Set(OrderStatus::Pending),
            payment_method: Set(draft.payment_method),
            shipping_address: Set(draft.shipping_address),
            notes: Set(draft.notes),
            transaction_id: Set(None),
            paid_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let mut inserted = None;
        for attempt in 1..=self.max_number_attempts {
            let order_number = (self.next_number)(now);
            header.order_number = Set(order_number.clone());

            let savepoint = txn.begin().await?;
            match header.clone().insert(&savepoint).await {
                Ok(model) => {
                    savepoint.commit().await?;
                    inserted = Some(model);
                    break;
                }
                Err(err) if is_unique_violation(&err) => {
                    savepoint.rollback().await?;
                    warn!(attempt, %order_number, "Order number collision, retrying");
                }
                Err(err) => {
                    savepoint.rollback().await?;
                    error!(error = %err, "Failed to insert order");
                    return Err(err.into());
                }
            }
        }

        let order = inserted.ok_or_else(|| {
            error!(attempts = self.max_number_attempts, "Could not allocate a unique order number");
            ServiceError::Conflict("Could not allocate a unique order number".to_string())
        })?;

        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order.id),
                product_id: Set(line.product_id),
                seller_id: Set(line.seller_id),
                quantity: Set(line.quantity),
                price: Set(line.unit_price),
                product_title: Set(line.title.clone()),
                created_at: Set(now),
            }
            .insert(txn)
            .await?;
            items.push(item);
        }

        info!(order_id = %order.id, order_number = %order.order_number, total_amount, "Order recorded");
        Ok(OrderWithItems { order, items })
    }

    /// Loads an order and its items.
    pub async fn find_one<C>(&self, conn: &C, order_id: Uuid) -> Result<OrderWithItems, ServiceError>
    where
        C: ConnectionTrait,
    {
        let order = order::Entity::find_by_id(order_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::CreatedAt)
            .all(conn)
            .await?;

        Ok(OrderWithItems { order, items })
    }

    /// A buyer's orders, newest first.
    pub async fn find_buyer_orders<C>(
        &self,
        conn: &C,
        buyer_id: Uuid,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<OrderWithItems>, ServiceError>
    where
        C: ConnectionTrait,
    {
        let orders = order::Entity::find()
            .filter(order::Column::BuyerId.eq(buyer_id))
            .order_by_desc(order::Column::CreatedAt)
            .limit(limit)
            .offset(offset)
            .all(conn)
            .await?;
        attach_items(conn, orders).await
    }

    /// Orders containing at least one item sold by `seller_id`, newest first.
    pub async fn find_seller_sales<C>(
        &self,
        conn: &C,
        seller_id: Uuid,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<OrderWithItems>, ServiceError>
    where
        C: ConnectionTrait,
    {
        let orders = order::Entity::find()
            .filter(
                order::Column::Id.in_subquery(
                    Query::select()
                        .column(order_item::Column::OrderId)
                        .from(order_item::Entity)
                        .and_where(order_item::Column::SellerId.eq(seller_id))
                        .to_owned(),
                ),
            )
            .order_by_desc(order::Column::CreatedAt)
            .limit(limit)
            .offset(offset)
            .all(conn)
            .await?;
        attach_items(conn, orders).await
    }

    /// PENDING -> PAID, recording how and when it was paid.
    ///
    /// Conditional on the row still being PENDING, so a second capture of the
    /// same order fails with `AlreadyProcessed`.
    pub async fn mark_paid<C>(
        &self,
        conn: &C,
        order_id: Uuid,
        method: PaymentMethod,
        transaction_id: &str,
    ) -> Result<(), ServiceError>
    where
        C: ConnectionTrait,
    {
        let now = Utc::now();
        let result = order::Entity::update_many()
            .col_expr(order::Column::Status, Expr::value(OrderStatus::Paid))
            .col_expr(order::Column::PaymentMethod, Expr::value(method))
            .col_expr(
                order::Column::TransactionId,
                Expr::value(Some(transaction_id.to_string())),
            )
            .col_expr(order::Column::PaidAt, Expr::value(Some(now)))
            .col_expr(order::Column::UpdatedAt, Expr::value(now))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            let current = order::Entity::find_by_id(order_id)
                .one(conn)
                .await?
                .map(|o| o.status.to_string())
                .unwrap_or_else(|| "missing".to_string());
            return Err(ServiceError::AlreadyProcessed(format!(
                "Order already processed (status: {})",
                current
            )));
        }
        Ok(())
    }

    /// Moves an order from `from` to `to`. Zero rows means someone else moved it first.
    pub async fn set_status<C>(
        &self,
        conn: &C,
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<(), ServiceError>
    where
        C: ConnectionTrait,
    {
        let result = order::Entity::update_many()
            .col_expr(order::Column::Status, Expr::value(to))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(from))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            warn!(%order_id, %from, %to, "Order status changed underneath transition");
            return Err(ServiceError::ConcurrentModification(order_id));
        }
        Ok(())
    }

    /// Decrements stock for every item, flagging products that hit zero as sold.
    ///
    /// Each decrement only applies while enough active, unsold stock remains.
    /// The first item that cannot be covered aborts with `InsufficientStock`;
    /// the caller must roll the transaction back.
    #[instrument(skip(self, conn, items), fields(items = items.len()))]
    pub async fn commit_stock<C>(
        &self,
        conn: &C,
        items: &[order_item::Model],
    ) -> Result<(), ServiceError>
    where
        C: ConnectionTrait,
    {
        let now = Utc::now();
        for item in items {
            let result = product::Entity::update_many()
                .col_expr(
                    product::Column::Stock,
                    Expr::col(product::Column::Stock).sub(item.quantity),
                )
                .col_expr(product::Column::UpdatedAt, Expr::value(now))
                .filter(product::Column::Id.eq(item.product_id))
                .filter(product::Column::Stock.gte(item.quantity))
                .filter(product::Column::IsSold.eq(false))
                .filter(product::Column::IsActive.eq(true))
                .exec(conn)
                .await?;

            if result.rows_affected == 0 {
                warn!(product_id = %item.product_id, quantity = item.quantity, "Stock commit lost the race");
                return Err(ServiceError::InsufficientStock(format!(
                    "\"{}\" no longer has {} unit(s) available",
                    item.product_title, item.quantity
                )));
            }

            product::Entity::update_many()
                .col_expr(product::Column::IsSold, Expr::value(true))
                .filter(product::Column::Id.eq(item.product_id))
                .filter(product::Column::Stock.eq(0))
                .exec(conn)
                .await?;
        }
        Ok(())
    }

    /// Gives every item's quantity back to its product and clears the sold flag.
    ///
    /// Products that no longer exist are skipped.
    #[instrument(skip(self, conn, items), fields(items = items.len()))]
    pub async fn restore_stock<C>(
        &self,
        conn: &C,
        items: &[order_item::Model],
    ) -> Result<(), ServiceError>
    where
        C: ConnectionTrait,
    {
        let now = Utc::now();
        for item in items {
            let result = product::Entity::update_many()
                .col_expr(
                    product::Column::Stock,
                    Expr::col(product::Column::Stock).add(item.quantity),
                )
                .col_expr(product::Column::IsSold, Expr::value(false))
                .col_expr(product::Column::UpdatedAt, Expr::value(now))
                .filter(product::Column::Id.eq(item.product_id))
                .exec(conn)
                .await?;

            if result.rows_affected == 0 {
                warn!(product_id = %item.product_id, "Product gone, stock not restored");
            }
        }
        Ok(())
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

async fn attach_items<C>(
    conn: &C,
    orders: Vec<order::Model>,
) -> Result<Vec<OrderWithItems>, ServiceError>
where
    C: ConnectionTrait,
{
    if orders.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
    let mut grouped: HashMap<Uuid, Vec<order_item::Model>> = HashMap::new();
    for item in order_item::Entity::find()
        .filter(order_item::Column::OrderId.is_in(ids))
        .order_by_asc(order_item::Column::CreatedAt)
        .all(conn)
        .await?
    {
        grouped.entry(item.order_id).or_default().push(item);
    }

    Ok(orders
        .into_iter()
        .map(|order| {
            let items = grouped.remove(&order.id).unwrap_or_default();
            OrderWithItems { order, items }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(seller_id: Uuid, price: i64, quantity: i32) -> order_item::Model {
        order_item::Model {
            id: Uuid::new_v4(),
            order_id: Uuid::nil(),
            product_id: Uuid::new_v4(),
            seller_id,
            quantity,
            price,
            product_title: "Calculator".into(),
            created_at: Utc::now(),
        }
    }

    fn order(buyer_id: Uuid, total_amount: i64) -> order::Model {
        order::Model {
            id: Uuid::nil(),
            order_number: "ORD-20250101-00001".into(),
            buyer_id,
            total_amount,
            status: OrderStatus::Pending,
            payment_method: PaymentMethod::Cash,
            shipping_address: "Residence Hall B, room 12".into(),
            notes: None,
            transaction_id: None,
            paid_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn order_number_uses_creation_date() {
        let at = Utc.with_ymd_and_hms(2025, 3, 7, 12, 0, 0).unwrap();
        let number = generate_order_number(at);
        assert!(number.starts_with("ORD-20250307-"));
        let sequence: u32 = number[13..].parse().unwrap();
        assert!((1..=99_999).contains(&sequence));
        assert_eq!(number.len(), 18);
    }

    #[test]
    fn ownership_helpers() {
        let buyer = Uuid::new_v4();
        let seller = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let view = OrderWithItems {
            order: order(buyer, 25000),
            items: vec![item(seller, 10000, 2), item(seller, 5000, 1)],
        };

        assert!(view.is_buyer(buyer));
        assert!(view.is_seller(seller));
        assert!(!view.is_seller(stranger));
        assert!(!view.is_buyer(stranger));
        assert_eq!(view.items_total(), 25000);
        assert_eq!(view.demands().len(), 2);
    }

    #[test]
    fn response_carries_line_totals() {
        let view = OrderWithItems {
            order: order(Uuid::new_v4(), 30000),
            items: vec![item(Uuid::new_v4(), 10000, 3)],
        };
        let response = OrderResponse::from(view);
        assert_eq!(response.items[0].line_total, 30000);
        assert_eq!(response.status, OrderStatus::Pending);
        assert!(response.transaction_id.is_none());
    }

    #[test]
    fn draft_validation() {
        let mut draft = OrderDraft {
            payment_method: PaymentMethod::Card,
            shipping_address: "short".into(),
            notes: None,
        };
        assert!(draft.validate().is_err());

        draft.shipping_address = "Library building, 2nd floor".into();
        assert!(draft.validate().is_ok());

        draft.notes = Some("x".repeat(501));
        assert!(draft.validate().is_err());
    }

    #[test]
    fn attempts_are_at_least_one() {
        assert_eq!(OrderLedger::new(0).max_number_attempts, 1);
    }
}
