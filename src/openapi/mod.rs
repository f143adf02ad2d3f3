use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Campus Market API",
        version = "0.1.0",
        description = r#"
# Campus Market API

Backend for a university marketplace: students list products, fill a cart and
check out with a simulated payment gateway.

## Checkout lifecycle

1. `POST /orders` turns the cart into a **pending** order. Stock is not reserved.
2. `POST /orders/{id}/pay` re-checks availability, charges the payment method and
   commits stock atomically. Declines leave the order pending.
3. Sellers move paid orders to **shipped** and **delivered**. Buyers or sellers may
   cancel before delivery; committed stock is returned.

## Authentication

Catalog reads are public. Everything else needs a bearer token from `/auth/login`:

```
Authorization: Bearer <your-jwt-token>
```

## Error Handling

```json
{
  "error": "INSUFFICIENT_STOCK",
  "message": "\"Desk Lamp\": requested 3, only 2 available",
  "request_id": "6f1c...",
  "timestamp": "2025-01-01T00:00:00Z"
}
```

## Pagination

List endpoints accept `limit` (default 10, max 100) and `offset` (default 0).
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Registration and login"),
        (name = "categories", description = "Product categories"),
        (name = "products", description = "Product listings"),
        (name = "cart", description = "The caller's shopping cart"),
        (name = "orders", description = "Checkout, payment and fulfilment"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        // Auth
        crate::handlers::auth::register,
        crate::handlers::auth::login,
        crate::handlers::auth::profile,

        // Catalog
        crate::handlers::commerce::categories::list_categories,
        crate::handlers::commerce::categories::create_category,
        crate::handlers::commerce::categories::get_category,
        crate::handlers::commerce::categories::update_category,
        crate::handlers::commerce::categories::activate_category,
        crate::handlers::commerce::categories::deactivate_category,
        crate::handlers::commerce::products::list_products,
        crate::handlers::commerce::products::create_product,
        crate::handlers::commerce::products::list_my_products,
        crate::handlers::commerce::products::get_product,
        crate::handlers::commerce::products::update_product,
        crate::handlers::commerce::products::delete_product,

        // Cart
        crate::handlers::commerce::carts::get_cart,
        crate::handlers::commerce::carts::add_to_cart,
        crate::handlers::commerce::carts::update_cart_item,
        crate::handlers::commerce::carts::remove_cart_item,
        crate::handlers::commerce::carts::clear_cart,
        crate::handlers::commerce::carts::cart_total,

        // Orders
        crate::handlers::orders::create_order,
        crate::handlers::orders::list_my_orders,
        crate::handlers::orders::list_my_sales,
        crate::handlers::orders::get_order,
        crate::handlers::orders::pay_order,
        crate::handlers::orders::cancel_order,
        crate::handlers::orders::update_order_status,

        // Health
        crate::health_check,
        crate::api_status,
    ),
    components(
        schemas(
            // Error types
            crate::errors::ErrorResponse,

            // Order types
            crate::entities::order::OrderStatus,
            crate::entities::order::PaymentMethod,
            crate::services::payments::PaymentDetails,
        )
    )
)]
pub struct ApiDocV1;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "Bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_checkout_routes() {
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_string_pretty(&openapi).unwrap();
        assert!(json.contains("Campus Market API"));
        assert!(json.contains("/api/v1/orders/{id}/pay"));
        assert!(json.contains("/api/v1/cart/add"));
        assert!(json.contains("/api/v1/categories/{id}/activate"));
        assert!(json.contains("/api/v1/auth/profile"));
        assert!(json.contains("Bearer"));
    }
}
