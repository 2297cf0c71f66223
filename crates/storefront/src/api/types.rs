//! Wire types for the marketplace REST API.
//!
//! These mirror the backend's JSON payloads. Optional or late-added fields
//! carry `#[serde(default)]` so older backends still decode.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use cornermarket_core::{
    CategoryId, DeliveryMethod, FavoriteId, ImageId, LineItemId, OrderId, OrderItemId,
    OrderStatus, Price, ProductId, ProfileType, ReviewId, UserId, UserRole,
};

// =============================================================================
// List envelopes
// =============================================================================

/// A list endpoint response.
///
/// Paginated endpoints return `{count, next, previous, results}`, the rest a
/// bare array. Both decode into this type.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ListResponse<T> {
    /// Page envelope.
    Page {
        results: Vec<T>,
        #[serde(default)]
        count: Option<u64>,
        #[serde(default)]
        next: Option<String>,
        #[serde(default)]
        previous: Option<String>,
    },
    /// Bare array.
    Bare(Vec<T>),
}

impl<T> ListResponse<T> {
    /// Total number of matching records (the page length for bare arrays).
    #[must_use]
    pub fn count(&self) -> u64 {
        match self {
            Self::Page { results, count, .. } => {
                count.unwrap_or_else(|| u64::try_from(results.len()).unwrap_or(u64::MAX))
            }
            Self::Bare(items) => u64::try_from(items.len()).unwrap_or(u64::MAX),
        }
    }

    /// Whether another page follows this one.
    #[must_use]
    pub const fn has_next(&self) -> bool {
        matches!(self, Self::Page { next: Some(_), .. })
    }

    /// Borrow the records.
    #[must_use]
    pub fn items(&self) -> &[T] {
        match self {
            Self::Page { results, .. } => results,
            Self::Bare(items) => items,
        }
    }

    /// Take the records.
    #[must_use]
    pub fn into_items(self) -> Vec<T> {
        match self {
            Self::Page { results, .. } => results,
            Self::Bare(items) => items,
        }
    }
}

// =============================================================================
// Accounts
// =============================================================================

/// An account as returned by `/api/auth/user/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub role: UserRole,
}

impl User {
    /// Name to greet the user with.
    #[must_use]
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }

    /// Whether the account can manage products.
    #[must_use]
    pub fn is_seller(&self) -> bool {
        self.role == UserRole::Seller
    }
}

/// Token pair issued by `/api/auth/login/`.
#[derive(Clone, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
    #[serde(default)]
    pub user: Option<User>,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access", &"[REDACTED]")
            .field("refresh", &"[REDACTED]")
            .field("user", &self.user)
            .finish()
    }
}

/// Response of `/api/auth/refresh/`.
#[derive(Clone, Deserialize)]
pub struct RefreshedToken {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

impl std::fmt::Debug for RefreshedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshedToken")
            .field("access", &"[REDACTED]")
            .field("refresh", &self.refresh.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Buyer profile from `/api/users/profile/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub user: User,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    #[serde(rename = "type", default)]
    pub profile_type: ProfileType,
}

/// Partial profile update. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

// =============================================================================
// Catalog
// =============================================================================

/// A product image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductImage {
    pub id: ImageId,
    #[serde(default)]
    pub product: Option<ProductId>,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub image_url: String,
}

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Price,
    #[serde(default)]
    pub seller: Option<UserId>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub is_published: bool,
    #[serde(default)]
    pub images: Vec<ProductImage>,
}

const fn default_true() -> bool {
    true
}

impl Product {
    /// URL of the first image, if any.
    #[must_use]
    pub fn cover_image(&self) -> Option<&str> {
        self.images
            .iter()
            .map(|img| img.image_url.as_str())
            .find(|url| !url.is_empty())
    }
}

/// Product create/update payload for seller endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProductInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Price>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_published: Option<bool>,
}

/// A catalog category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub parent: Option<CategoryId>,
}

/// Product list filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ProductQuery {
    pub search: Option<String>,
    pub category: Option<CategoryId>,
    pub ordering: Option<String>,
    pub page: Option<u32>,
}

impl ProductQuery {
    /// Query string pairs in a stable order.
    #[must_use]
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            pairs.push(("search", search.to_string()));
        }
        if let Some(category) = self.category {
            pairs.push(("category", category.to_string()));
        }
        if let Some(ordering) = self.ordering.as_deref().filter(|s| !s.is_empty()) {
            pairs.push(("ordering", ordering.to_string()));
        }
        if let Some(page) = self.page {
            pairs.push(("page", page.to_string()));
        }
        pairs
    }
}

/// A product review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub product: ProductId,
    #[serde(default)]
    pub user: Option<User>,
    pub rating: u8,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Review create payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewReview {
    pub product: ProductId,
    pub rating: u8,
    pub comment: String,
}

// =============================================================================
// Cart
// =============================================================================

/// One cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: LineItemId,
    pub product: Product,
    pub quantity: u32,
    #[serde(default)]
    pub price: Option<Price>,
    #[serde(default)]
    pub subtotal: Option<Price>,
}

impl CartItem {
    /// Quantity times the product's current price.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.product.price.times(self.quantity)
    }
}

/// Cart as returned by every `/api/cart/` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Cart {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub items: Vec<CartItem>,
    #[serde(default)]
    pub total_price: Option<Price>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AddToCart {
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Debug, Serialize)]
pub(crate) struct UpdateQuantity {
    pub quantity: i64,
}

// =============================================================================
// Favorites
// =============================================================================

/// A favorite record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Favorite {
    pub id: FavoriteId,
    pub product: Product,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ProductRef {
    pub product_id: ProductId,
}

/// Response of `/api/favorites/toggle/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ToggleResponse {
    pub is_favorite: bool,
}

// =============================================================================
// Orders
// =============================================================================

/// One order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub product: Product,
    #[serde(default)]
    pub seller: Option<UserId>,
    pub quantity: u32,
    pub price: Price,
    #[serde(default)]
    pub subtotal: Option<Price>,
    #[serde(default)]
    pub product_image: String,
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    #[serde(default)]
    pub buyer: Option<UserId>,
    #[serde(default)]
    pub status: OrderStatus,
    pub total_price: Price,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub contact_name: String,
    #[serde(default)]
    pub contact_phone: String,
    #[serde(default)]
    pub delivery_method: DeliveryMethod,
    #[serde(default)]
    pub delivery_address: String,
    #[serde(default)]
    pub items: Vec<OrderItem>,
}

/// Order create payload. The backend builds the lines from the current cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewOrder {
    pub contact_name: String,
    pub contact_phone: String,
    pub delivery_method: DeliveryMethod,
    pub delivery_address: String,
}

// =============================================================================
// Seller analytics
// =============================================================================

/// A best-selling product row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopProduct {
    pub name: String,
    #[serde(default)]
    pub quantity: u64,
    #[serde(default)]
    pub revenue: Price,
}

/// Revenue for one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySales {
    pub date: NaiveDate,
    #[serde(default)]
    pub revenue: Price,
}

/// Seller dashboard counters from `/api/sellers/analytics/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SellerAnalytics {
    pub products_count: u64,
    pub published_count: u64,
    pub draft_count: u64,
    pub orders_count: u64,
    pub pending_orders: u64,
    pub total_revenue: Price,
    pub top_products: Vec<TopProduct>,
    pub sales_last_30: Vec<DailySales>,
    pub unique_buyers: u64,
    pub avg_rating: Option<Decimal>,
    pub reviews_count: u64,
    pub avg_order_size: Option<Decimal>,
    pub total_units_sold: u64,
    pub avg_product_price: Option<Price>,
    pub min_product_price: Option<Price>,
    pub max_product_price: Option<Price>,
}

impl SellerAnalytics {
    /// Orders that are no longer pending.
    #[must_use]
    pub const fn completed_orders(&self) -> u64 {
        self.orders_count.saturating_sub(self.pending_orders)
    }

    /// Share of completed orders in percent, rounded to one decimal.
    #[must_use]
    pub fn completion_rate(&self) -> Decimal {
        if self.orders_count == 0 {
            return Decimal::ZERO;
        }
        (Decimal::from(self.completed_orders()) * Decimal::ONE_HUNDRED
            / Decimal::from(self.orders_count))
        .round_dp(1)
    }

    /// Units sold across the top products.
    #[must_use]
    pub fn units_sold(&self) -> u64 {
        self.top_products.iter().map(|p| p.quantity).sum()
    }

    /// Mean revenue per day over the reported series.
    #[must_use]
    pub fn avg_daily_revenue(&self) -> Price {
        let days = Decimal::from(self.sales_last_30.len().max(1));
        let sum: Price = self.sales_last_30.iter().map(|d| d.revenue).sum();
        Price::new(sum.amount() / days)
    }

    /// Revenue per completed order.
    #[must_use]
    pub fn avg_order_value(&self) -> Price {
        match self.completed_orders() {
            0 => Price::ZERO,
            n => Price::new(self.total_revenue.amount() / Decimal::from(n)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn product_json(id: i64, price: &str) -> serde_json::Value {
        json!({
            "id": id,
            "name": format!("Product {id}"),
            "description": "",
            "price": price,
            "seller": 2,
            "created_at": "2025-01-10T12:00:00Z",
            "updated_at": "2025-01-10T12:00:00Z",
            "is_published": true,
            "images": [{"id": 1, "product": id, "image": "products/a.png", "image_url": "/media/products/a.png"}]
        })
    }

    #[test]
    fn test_list_response_bare_and_paged() {
        let bare: ListResponse<Category> =
            serde_json::from_value(json!([{"id": 1, "name": "Tea", "slug": "tea", "parent": null}]))
                .unwrap();
        assert_eq!(bare.count(), 1);
        assert!(!bare.has_next());

        let page: ListResponse<Category> = serde_json::from_value(json!({
            "count": 12,
            "next": "http://127.0.0.1:8000/api/categories/?page=2",
            "previous": null,
            "results": [{"id": 2, "name": "Coffee"}]
        }))
        .unwrap();
        assert_eq!(page.count(), 12);
        assert!(page.has_next());
        assert_eq!(page.into_items()[0].name, "Coffee");
    }

    #[test]
    fn test_product_decodes_backend_payload() {
        let product: Product = serde_json::from_value(product_json(42, "500.00")).unwrap();
        assert_eq!(product.id, ProductId::new(42));
        assert_eq!(product.price, Price::from_minor(50_000));
        assert_eq!(product.cover_image(), Some("/media/products/a.png"));
    }

    #[test]
    fn test_cart_item_line_total() {
        let item: CartItem = serde_json::from_value(json!({
            "id": 9,
            "product": product_json(42, "500.00"),
            "quantity": 3,
            "price": "500.00",
            "subtotal": "1500.00"
        }))
        .unwrap();
        assert_eq!(item.line_total(), Price::from_minor(150_000));
    }

    #[test]
    fn test_product_query_pairs() {
        let query = ProductQuery {
            search: Some("  tea ".to_string()),
            category: Some(CategoryId::new(3)),
            ordering: None,
            page: Some(2),
        };
        assert_eq!(
            query.pairs(),
            vec![
                ("search", "tea".to_string()),
                ("category", "3".to_string()),
                ("page", "2".to_string()),
            ]
        );
        assert!(ProductQuery::default().pairs().is_empty());
    }

    #[test]
    fn test_token_pair_debug_redacts() {
        let pair: TokenPair =
            serde_json::from_value(json!({"access": "secret-a", "refresh": "secret-r"})).unwrap();
        let debug = format!("{pair:?}");
        assert!(!debug.contains("secret-a"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_user_display_name() {
        let user: User = serde_json::from_value(json!({
            "id": 1, "username": "buyer@example.com", "email": "buyer@example.com",
            "first_name": "", "last_name": "", "role": "customer"
        }))
        .unwrap();
        assert_eq!(user.display_name(), "buyer@example.com");
        assert!(!user.is_seller());
    }

    #[test]
    fn test_seller_analytics_derived_values() {
        let analytics: SellerAnalytics = serde_json::from_value(json!({
            "products_count": 4,
            "published_count": 3,
            "draft_count": 1,
            "orders_count": 8,
            "pending_orders": 2,
            "total_revenue": "1200.00",
            "top_products": [
                {"name": "Tea", "quantity": 5, "revenue": "500.00"},
                {"name": "Mug", "quantity": 7, "revenue": "700.00"}
            ],
            "sales_last_30": [
                {"date": "2025-01-01", "revenue": "100.00"},
                {"date": "2025-01-02", "revenue": "300.00"}
            ]
        }))
        .unwrap();
        assert_eq!(analytics.completed_orders(), 6);
        assert_eq!(analytics.completion_rate(), Decimal::new(750, 1));
        assert_eq!(analytics.units_sold(), 12);
        assert_eq!(analytics.avg_daily_revenue(), Price::from_minor(20_000));
        assert_eq!(analytics.avg_order_value(), Price::from_minor(20_000));
    }

    #[test]
    fn test_seller_analytics_empty() {
        let analytics: SellerAnalytics = serde_json::from_value(json!({})).unwrap();
        assert_eq!(analytics.completion_rate(), Decimal::ZERO);
        assert_eq!(analytics.avg_daily_revenue(), Price::ZERO);
        assert_eq!(analytics.avg_order_value(), Price::ZERO);
    }
}
