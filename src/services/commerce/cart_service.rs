use crate::{
    entities::commerce::{cart, cart_item, Cart, CartItem, CartModel, Product, ProductModel},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Shopping cart service.
///
/// Every user owns exactly one cart, created lazily on first access. Lines
/// reference products only; prices are always read live from the catalog.
/// The service also produces the immutable [`CartSnapshot`] that checkout
/// turns into order items.
///
/// # Examples
///
/// ```ignore
/// let cart_service = CartService::new(db, event_sender);
///
/// cart_service
///     .add_to_cart(user_id, AddToCartInput { product_id, quantity: 2 })
///     .await?;
///
/// let total = cart_service.cart_total(user_id).await?;
/// ```
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

/// Input for adding a product to the cart
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct AddToCartInput {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 1000, message = "Quantity must be at least 1"))]
    pub quantity: i32,
}

/// Input for changing a line's quantity
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateCartItemInput {
    #[validate(range(min = 1, max = 1000, message = "Quantity must be at least 1"))]
    pub quantity: i32,
}

/// Cart line joined with live product data
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartItemView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub title: String,
    pub slug: String,
    pub unit_price: i64,
    pub quantity: i32,
    pub line_total: i64,
    pub stock: i32,
    pub is_sold: bool,
    pub is_active: bool,
    pub seller_id: Uuid,
}

/// Cart with its lines and live totals
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub items: Vec<CartItemView>,
    pub total: i64,
    pub item_count: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CartTotal {
    pub total: i64,
    pub item_count: i32,
}

/// Point-in-time copy of one cart line, priced from the live product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLineSnapshot {
    pub product_id: Uuid,
    pub title: String,
    pub unit_price: i64,
    pub quantity: i32,
    pub seller_id: Uuid,
}

impl CartLineSnapshot {
    pub fn line_total(&self) -> Result<i64, ServiceError> {
        line_amount(&self.title, self.unit_price, self.quantity)
    }
}

/// `unit_price × quantity`, rejecting amounts that do not fit in an `i64`.
pub fn line_amount(title: &str, unit_price: i64, quantity: i32) -> Result<i64, ServiceError> {
    unit_price.checked_mul(i64::from(quantity)).ok_or_else(|| {
        ServiceError::ValidationError(format!("\"{}\": line total is out of range", title))
    })
}

/// Σ of line amounts, rejecting totals that do not fit in an `i64`.
pub fn sum_amounts<I>(amounts: I) -> Result<i64, ServiceError>
where
    I: IntoIterator<Item = i64>,
{
    amounts
        .into_iter()
        .try_fold(0i64, i64::checked_add)
        .ok_or_else(|| ServiceError::ValidationError("Cart total is out of range".to_string()))
}

/// Order total for a set of snapshot lines.
pub fn lines_total(lines: &[CartLineSnapshot]) -> Result<i64, ServiceError> {
    let amounts = lines
        .iter()
        .map(CartLineSnapshot::line_total)
        .collect::<Result<Vec<_>, _>>()?;
    sum_amounts(amounts)
}

/// Immutable view of a user's cart used by checkout
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CartSnapshot {
    pub cart_id: Option<Uuid>,
    pub lines: Vec<CartLineSnapshot>,
}

impl CartSnapshot {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn total(&self) -> Result<i64, ServiceError> {
        lines_total(&self.lines)
    }
}

fn to_view(
    cart: &CartModel,
    rows: Vec<(cart_item::Model, Option<ProductModel>)>,
) -> Result<CartView, ServiceError> {
    let mut items = Vec::with_capacity(rows.len());
    for (item, product) in rows {
        let Some(product) = product else { continue };
        let line_total = line_amount(&product.title, product.price, item.quantity)?;
        items.push(CartItemView {
            id: item.id,
            product_id: product.id,
            title: product.title,
            slug: product.slug,
            unit_price: product.price,
            quantity: item.quantity,
            line_total,
            stock: product.stock,
            is_sold: product.is_sold,
            is_active: product.is_active,
            seller_id: product.seller_id,
        });
    }

    Ok(CartView {
        id: cart.id,
        user_id: cart.user_id,
        total: sum_amounts(items.iter().map(|i| i.line_total))?,
        item_count: items.iter().map(|i| i.quantity).sum(),
        items,
    })
}

impl CartService {
    /// Creates a new `CartService` instance.
    ///
    /// # Arguments
    ///
    /// * `db` - Database connection pool
    /// * `event_sender` - Event sender for publishing cart events
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    async fn find_or_create<C>(conn: &C, user_id: Uuid) -> Result<CartModel, ServiceError>
    where
        C: ConnectionTrait,
    {
        if let Some(existing) = Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(conn)
            .await?
        {
            return Ok(existing);
        }

        let now = Utc::now();
        let inserted = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(conn)
        .await;

        match inserted {
            Ok(model) => {
                info!(cart_id = %model.id, %user_id, "Created cart");
                Ok(model)
            }
            // Lost a creation race against the unique user_id constraint
            Err(err) => Cart::find()
                .filter(cart::Column::UserId.eq(user_id))
                .one(conn)
                .await?
                .ok_or(ServiceError::DatabaseError(err)),
        }
    }

    async fn lines<C>(
        conn: &C,
        cart_id: Uuid,
    ) -> Result<Vec<(cart_item::Model, Option<ProductModel>)>, ServiceError>
    where
        C: ConnectionTrait,
    {
        Ok(CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .find_also_related(Product)
            .all(conn)
            .await?)
    }

    /// Returns the user's cart, creating it on first access.
    #[instrument(skip(self))]
    pub async fn get_or_create_cart(&self, user_id: Uuid) -> Result<CartView, ServiceError> {
        let db = &*self.db;
        let cart = Self::find_or_create(db, user_id).await?;
        let rows = Self::lines(db, cart.id).await?;
        to_view(&cart, rows)
    }

    /// Adds a product to the cart or increments an existing line.
    ///
    /// Checks run in this order: product exists, not sold, active, enough stock.
    /// An increment may not push the line above the product's stock.
    ///
    /// # Returns
    ///
    /// * `Ok(CartView)` - Updated cart
    /// * `Err(ServiceError::NotFound)` - Product does not exist
    /// * `Err(ServiceError::ProductUnavailable)` - Product already sold
    /// * `Err(ServiceError::ProductInactive)` - Listing is paused
    /// * `Err(ServiceError::InsufficientStock)` - Not enough units
    #[instrument(skip(self))]
    pub async fn add_to_cart(
        &self,
        user_id: Uuid,
        input: AddToCartInput,
    ) -> Result<CartView, ServiceError> {
        input.validate()?;
        let db = &*self.db;

        let product = Product::find_by_id(input.product_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", input.product_id))
            })?;

        if product.is_sold {
            return Err(ServiceError::ProductUnavailable(format!(
                "\"{}\" has already been sold",
                product.title
            )));
        }
        if !product.is_active {
            return Err(ServiceError::ProductInactive(format!(
                "\"{}\" is not currently listed",
                product.title
            )));
        }
        if product.stock < input.quantity {
            return Err(ServiceError::InsufficientStock(format!(
                "\"{}\": only {} available",
                product.title, product.stock
            )));
        }

        let cart = Self::find_or_create(db, user_id).await?;

        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product.id))
            .one(db)
            .await?;

        let now = Utc::now();
        match existing {
            Some(item) => {
                let new_quantity = item.quantity + input.quantity;
                if new_quantity > product.stock {
                    return Err(ServiceError::InsufficientStock(format!(
                        "\"{}\": cart would hold {}, only {} available",
                        product.title, new_quantity, product.stock
                    )));
                }
                line_amount(&product.title, product.price, new_quantity)?;
                let mut item: cart_item::ActiveModel = item.into();
                item.quantity = Set(new_quantity);
                item.updated_at = Set(now);
                item.update(db).await?;
            }
            None => {
                line_amount(&product.title, product.price, input.quantity)?;
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    product_id: Set(product.id),
                    quantity: Set(input.quantity),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(db)
                .await?;
            }
        }

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id: cart.id,
                product_id: product.id,
                quantity: input.quantity,
            })
            .await;

        info!(
            "Added item to cart {}: product {} x{}",
            cart.id, product.id, input.quantity
        );
        let rows = Self::lines(db, cart.id).await?;
        to_view(&cart, rows)
    }

    /// Sets the quantity of one of the caller's cart lines.
    #[instrument(skip(self))]
    pub async fn update_cart_item(
        &self,
        user_id: Uuid,
        item_id: Uuid,
        input: UpdateCartItemInput,
    ) -> Result<CartView, ServiceError> {
        input.validate()?;
        let db = &*self.db;
        let cart = Self::find_or_create(db, user_id).await?;

        let (item, product) = CartItem::find_by_id(item_id)
            .filter(cart_item::Column::CartId.eq(cart.id))
            .find_also_related(Product)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found", item_id)))?;

        let product = product.ok_or_else(|| {
            ServiceError::NotFound(format!("Product {} not found", item.product_id))
        })?;

        if input.quantity > product.stock {
            return Err(ServiceError::InsufficientStock(format!(
                "\"{}\": only {} available",
                product.title, product.stock
            )));
        }
        line_amount(&product.title, product.price, input.quantity)?;

        let mut item: cart_item::ActiveModel = item.into();
        item.quantity = Set(input.quantity);
        item.updated_at = Set(Utc::now());
        item.update(db).await?;

        let rows = Self::lines(db, cart.id).await?;
        to_view(&cart, rows)
    }

    /// Removes one of the caller's cart lines.
    #[instrument(skip(self))]
    pub async fn remove_cart_item(
        &self,
        user_id: Uuid,
        item_id: Uuid,
    ) -> Result<CartView, ServiceError> {
        let db = &*self.db;
        let cart = Self::find_or_create(db, user_id).await?;

        let result = CartItem::delete_many()
            .filter(cart_item::Column::Id.eq(item_id))
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(db)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Cart item {} not found",
                item_id
            )));
        }

        let rows = Self::lines(db, cart.id).await?;
        to_view(&cart, rows)
    }

    /// Empties the caller's cart.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, user_id: Uuid) -> Result<CartView, ServiceError> {
        let db = &*self.db;
        let cart = Self::find_or_create(db, user_id).await?;
        Self::clear_lines(db, cart.id).await?;

        self.event_sender.send_or_log(Event::CartCleared(cart.id)).await;
        to_view(&cart, Vec::new())
    }

    /// Sum of live price times quantity, plus the unit count.
    #[instrument(skip(self))]
    pub async fn cart_total(&self, user_id: Uuid) -> Result<CartTotal, ServiceError> {
        let view = self.get_or_create_cart(user_id).await?;
        Ok(CartTotal {
            total: view.total,
            item_count: view.item_count,
        })
    }

    /// Reads the user's cart as immutable line snapshots.
    ///
    /// Does not create a cart and never fails on an empty one. Lines whose
    /// product has disappeared are skipped.
    pub async fn snapshot<C>(conn: &C, user_id: Uuid) -> Result<CartSnapshot, ServiceError>
    where
        C: ConnectionTrait,
    {
        let Some(cart) = Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(conn)
            .await?
        else {
            return Ok(CartSnapshot::default());
        };

        let lines = Self::lines(conn, cart.id)
            .await?
            .into_iter()
            .filter_map(|(item, product)| match product {
                Some(product) => Some(CartLineSnapshot {
                    product_id: product.id,
                    title: product.title,
                    unit_price: product.price,
                    quantity: item.quantity,
                    seller_id: product.seller_id,
                }),
                None => {
                    warn!(cart_item = %item.id, "Skipping cart line with missing product");
                    None
                }
            })
            .collect();

        Ok(CartSnapshot {
            cart_id: Some(cart.id),
            lines,
        })
    }

    /// Removes every line of a cart on the given connection or transaction.
    pub async fn clear_lines<C>(conn: &C, cart_id: Uuid) -> Result<u64, ServiceError>
    where
        C: ConnectionTrait,
    {
        let result = CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .exec(conn)
            .await?;
        Ok(result.rows_affected)
    }
}

// ==================== Snapshot Tests ====================
