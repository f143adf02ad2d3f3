use crate::{
    entities::{
        commerce::{
            cart_item, category, CartItem, Category, CategoryModel, Product, ProductCondition,
            ProductModel,
        },
        product::{self, slugify},
        user,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, ModelTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Product and category catalog.
///
/// Besides CRUD for listings, this is where checkout's catalog reads come
/// from: products are looked up by id for price, stock and flags.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateCategoryInput {
    #[validate(length(min = 2, max = 80, message = "Category name must be between 2 and 80 characters"))]
    pub name: String,
    #[validate(length(max = 500))]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateCategoryInput {
    #[validate(length(min = 2, max = 80, message = "Category name must be between 2 and 80 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 500))]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateProductInput {
    #[validate(length(min = 3, max = 200, message = "Title must be at least 3 characters"))]
    pub title: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(range(min = 1, max = 999999999, message = "Price must be between 1 and 999999999"))]
    pub price: i64,
    #[serde(default)]
    pub condition: ProductCondition,
    #[validate(range(min = 0, max = 10000, message = "Stock must be between 0 and 10000"))]
    pub stock: Option<i32>,
    pub category_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateProductInput {
    #[validate(length(min = 3, max = 200, message = "Title must be at least 3 characters"))]
    pub title: Option<String>,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(range(min = 1, max = 999999999, message = "Price must be between 1 and 999999999"))]
    pub price: Option<i64>,
    pub condition: Option<ProductCondition>,
    #[validate(range(min = 0, max = 10000, message = "Stock must be between 0 and 10000"))]
    pub stock: Option<i32>,
    pub is_active: Option<bool>,
    pub category_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductResponse {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub description: Option<String>,
    pub price: i64,
    pub condition: ProductCondition,
    pub stock: i32,
    pub is_sold: bool,
    pub is_active: bool,
    pub seller_id: Uuid,
    pub category_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ProductModel> for ProductResponse {
    fn from(model: ProductModel) -> Self {
        Self {
            id: model.id,
            title: model.title,
            slug: model.slug,
            description: model.description,
            price: model.price,
            condition: model.condition,
            stock: model.stock,
            is_sold: model.is_sold,
            is_active: model.is_active,
            seller_id: model.seller_id,
            category_id: model.category_id,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CategoryResponse {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<CategoryModel> for CategoryResponse {
    fn from(model: CategoryModel) -> Self {
        Self {
            id: model.id,
            name: model.name,
            slug: model.slug,
            description: model.description,
            is_active: model.is_active,
            created_at: model.created_at,
        }
    }
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    // ==================== Categories ====================

    #[instrument(skip(self))]
    pub async fn create_category(
        &self,
        input: CreateCategoryInput,
    ) -> Result<CategoryResponse, ServiceError> {
        input.validate()?;
        let name = input.name.trim().to_string();
        let slug = slugify(&name);

        let duplicate = Category::find()
            .filter(
                Condition::any()
                    .add(category::Column::Name.eq(name.clone()))
                    .add(category::Column::Slug.eq(slug.clone())),
            )
            .one(&*self.db)
            .await?;
        if duplicate.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Category \"{}\" already exists",
                name
            )));
        }

        let model = category::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name),
            slug: Set(slug),
            description: Set(input.description),
            is_active: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?;

        info!(category_id = %model.id, "Created category");
        Ok(model.into())
    }

    /// Active categories, alphabetical.
    pub async fn list_categories(
        &self,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<CategoryResponse>, ServiceError> {
        let rows = Category::find()
            .filter(category::Column::IsActive.eq(true))
            .order_by_asc(category::Column::Name)
            .limit(limit)
            .offset(offset)
            .all(&*self.db)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Looks a category up by id, slug or name.
    pub async fn get_category(&self, term: &str) -> Result<CategoryResponse, ServiceError> {
        let query = match Uuid::parse_str(term) {
            Ok(id) => Category::find_by_id(id),
            Err(_) => Category::find().filter(
                Condition::any()
                    .add(category::Column::Slug.eq(term.to_lowercase()))
                    .add(category::Column::Name.eq(term)),
            ),
        };

        query
            .one(&*self.db)
            .await?
            .map(Into::into)
            .ok_or_else(|| ServiceError::NotFound(format!("Category \"{}\" not found", term)))
    }

    /// Renames or re-describes a category. A new name also moves the slug.
    ///
    /// # Returns
    ///
    /// * `Err(ServiceError::NotFound)` - No such category
    /// * `Err(ServiceError::Conflict)` - Another category already uses the name or slug
    #[instrument(skip(self, input))]
    pub async fn update_category(
        &self,
        category_id: Uuid,
        input: UpdateCategoryInput,
    ) -> Result<CategoryResponse, ServiceError> {
        input.validate()?;
        let existing = self.find_category(category_id).await?;
        let mut active: category::ActiveModel = existing.into();

        if let Some(name) = input.name {
            let name = name.trim().to_string();
            let slug = slugify(&name);
            let duplicate = Category::find()
                .filter(category::Column::Id.ne(category_id))
                .filter(
                    Condition::any()
                        .add(category::Column::Name.eq(name.clone()))
                        .add(category::Column::Slug.eq(slug.clone())),
                )
                .one(&*self.db)
                .await?;
            if duplicate.is_some() {
                return Err(ServiceError::Conflict(format!(
                    "Category \"{}\" already exists",
                    name
                )));
            }
            active.name = Set(name);
            active.slug = Set(slug);
        }
        if let Some(description) = input.description {
            active.description = Set(Some(description));
        }

        let updated = active.update(&*self.db).await?;
        self.event_sender
            .send_or_log(Event::CategoryUpdated {
                category_id: updated.id,
                is_active: updated.is_active,
            })
            .await;
        info!(%category_id, "Updated category");
        Ok(updated.into())
    }

    /// Soft toggle. Inactive categories drop out of listings and reject new products.
    #[instrument(skip(self))]
    pub async fn set_category_active(
        &self,
        category_id: Uuid,
        is_active: bool,
    ) -> Result<CategoryResponse, ServiceError> {
        let existing = self.find_category(category_id).await?;
        if existing.is_active == is_active {
            return Ok(existing.into());
        }

        let mut active: category::ActiveModel = existing.into();
        active.is_active = Set(is_active);
        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CategoryUpdated {
                category_id,
                is_active,
            })
            .await;
        info!(%category_id, is_active, "Category activation changed");
        Ok(updated.into())
    }

    async fn find_category(&self, category_id: Uuid) -> Result<CategoryModel, ServiceError> {
        Category::find_by_id(category_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Category {} not found", category_id)))
    }

    async fn ensure_active_category(&self, category_id: Uuid) -> Result<(), ServiceError> {
        let found = self.find_category(category_id).await?;
        if !found.is_active {
            return Err(ServiceError::BadRequest(format!(
                "Category \"{}\" is not active",
                found.name
            )));
        }
        Ok(())
    }

    async fn ensure_slug_free(&self, slug: &str, except: Option<Uuid>) -> Result<(), ServiceError> {
        let mut query = Product::find().filter(product::Column::Slug.eq(slug));
        if let Some(id) = except {
            query = query.filter(product::Column::Id.ne(id));
        }
        if query.one(&*self.db).await?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "A product with slug \"{}\" already exists",
                slug
            )));
        }
        Ok(())
    }

    // ==================== Products ====================

    /// Publishes a listing owned by `seller_id`.
    ///
    /// # Returns
    ///
    /// * `Err(ServiceError::ValidationError)` - Bad title, price or stock
    /// * `Err(ServiceError::NotFound)` - Seller or category missing
    /// * `Err(ServiceError::BadRequest)` - Inactive seller or category
    /// * `Err(ServiceError::Conflict)` - Slug taken
    #[instrument(skip(self, input), fields(title = %input.title))]
    pub async fn create_product(
        &self,
        seller_id: Uuid,
        input: CreateProductInput,
    ) -> Result<ProductResponse, ServiceError> {
        input.validate()?;

        let seller = user::Entity::find_by_id(seller_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", seller_id)))?;
        if !seller.is_active {
            return Err(ServiceError::BadRequest(
                "Your account is inactive".to_string(),
            ));
        }

        if let Some(category_id) = input.category_id {
            self.ensure_active_category(category_id).await?;
        }

        let title = input.title.trim().to_string();
        let slug = slugify(&title);
        self.ensure_slug_free(&slug, None).await?;

        let now = Utc::now();
        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            title: Set(title),
            slug: Set(slug),
            description: Set(input.description),
            price: Set(input.price),
            condition: Set(input.condition),
            stock: Set(input.stock.unwrap_or(1)),
            is_sold: Set(false),
            is_active: Set(true),
            seller_id: Set(seller_id),
            category_id: Set(input.category_id),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        self.event_sender
            .send_or_log(Event::ProductCreated(model.id))
            .await;
        info!(product_id = %model.id, %seller_id, "Created product");
        Ok(model.into())
    }

    /// Active listings, newest first.
    pub async fn list_products(
        &self,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<ProductResponse>, ServiceError> {
        let rows = Product::find()
            .filter(product::Column::IsActive.eq(true))
            .order_by_desc(product::Column::CreatedAt)
            .limit(limit)
            .offset(offset)
            .all(&*self.db)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// All of a seller's listings, including paused and sold ones.
    pub async fn list_by_seller(
        &self,
        seller_id: Uuid,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<ProductResponse>, ServiceError> {
        let rows = Product::find()
            .filter(product::Column::SellerId.eq(seller_id))
            .order_by_desc(product::Column::CreatedAt)
            .limit(limit)
            .offset(offset)
            .all(&*self.db)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Looks a product up by id or slug.
    pub async fn get_product(&self, term: &str) -> Result<ProductResponse, ServiceError> {
        self.find_product(term).await.map(Into::into)
    }

    async fn find_product(&self, term: &str) -> Result<ProductModel, ServiceError> {
        let query = match Uuid::parse_str(term) {
            Ok(id) => Product::find_by_id(id),
            Err(_) => Product::find().filter(product::Column::Slug.eq(term.to_lowercase())),
        };
        query
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product \"{}\" not found", term)))
    }

    /// Owner-only edit. Existing order items keep their frozen title and price.
    #[instrument(skip(self, input))]
    pub async fn update_product(
        &self,
        seller_id: Uuid,
        product_id: Uuid,
        input: UpdateProductInput,
    ) -> Result<ProductResponse, ServiceError> {
        input.validate()?;

        let existing = Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        if existing.seller_id != seller_id {
            return Err(ServiceError::Forbidden(
                "Only the seller can edit this product".to_string(),
            ));
        }

        if let Some(category_id) = input.category_id {
            self.ensure_active_category(category_id).await?;
        }

        let mut active: product::ActiveModel = existing.into();

        if let Some(title) = input.title {
            let title = title.trim().to_string();
            let slug = slugify(&title);
            self.ensure_slug_free(&slug, Some(product_id)).await?;
            active.title = Set(title);
            active.slug = Set(slug);
        }
        if let Some(description) = input.description {
            active.description = Set(Some(description));
        }
        if let Some(price) = input.price {
            active.price = Set(price);
        }
        if let Some(condition) = input.condition {
            active.condition = Set(condition);
        }
        if let Some(stock) = input.stock {
            active.stock = Set(stock);
            if stock > 0 {
                active.is_sold = Set(false);
            }
        }
        if let Some(is_active) = input.is_active {
            active.is_active = Set(is_active);
        }
        if input.category_id.is_some() {
            active.category_id = Set(input.category_id);
        }
        active.updated_at = Set(Utc::now());

        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::ProductUpdated(updated.id))
            .await;
        info!(product_id = %updated.id, "Updated product");
        Ok(updated.into())
    }

    /// Removes a listing. Only its seller or an admin may do this.
    ///
    /// Cart lines pointing at the product go with it. Order items keep their
    /// snapshot, so past orders still read correctly.
    ///
    /// # Returns
    ///
    /// * `Err(ServiceError::NotFound)` - No such product
    /// * `Err(ServiceError::Forbidden)` - Caller is neither the seller nor an admin
    #[instrument(skip(self))]
    pub async fn delete_product(
        &self,
        actor_id: Uuid,
        is_admin: bool,
        product_id: Uuid,
    ) -> Result<ProductResponse, ServiceError> {
        let txn = self.db.begin().await?;

        let existing = Product::find_by_id(product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        if existing.seller_id != actor_id && !is_admin {
            return Err(ServiceError::Forbidden(
                "You do not have permission to delete this product".to_string(),
            ));
        }

        let lines = CartItem::delete_many()
            .filter(cart_item::Column::ProductId.eq(product_id))
            .exec(&txn)
            .await?;
        existing.clone().delete(&txn).await?;
        txn.commit().await?;

        if is_admin && existing.seller_id != actor_id {
            warn!(%product_id, %actor_id, "Product removed by admin");
        }
        self.event_sender
            .send_or_log(Event::ProductDeleted(product_id))
            .await;
        info!(%product_id, cart_lines = lines.rows_affected, "Deleted product");
        Ok(existing.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_product_input_rules() {
        let mut input = CreateProductInput {
            title: "Physics I notes".into(),
            description: None,
            price: 12000,
            condition: ProductCondition::Used,
            stock: None,
            category_id: None,
        };
        assert!(input.validate().is_ok());

        input.price = 0;
        assert!(input.validate().is_err());

        input.price = 100;
        input.title = "ab".into();
        assert!(input.validate().is_err());

        input.title = "abc".into();
        input.stock = Some(-1);
        assert!(input.validate().is_err());

        input.stock = Some(10_001);
        assert!(input.validate().is_err());

        input.stock = Some(10_000);
        input.price = 999_999_999;
        assert!(input.validate().is_ok());

        input.price = i64::MAX;
        assert!(input.validate().is_err());
    }

    #[test]
    fn update_product_input_caps_price() {
        let input = UpdateProductInput {
            price: Some(1_000_000_000),
            ..Default::default()
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn condition_defaults_to_new() {
        let input: CreateProductInput =
            serde_json::from_str(r#"{"title":"Microscope","price":90000}"#).unwrap();
        assert_eq!(input.condition, ProductCondition::New);
        assert_eq!(input.stock, None);
    }
}
