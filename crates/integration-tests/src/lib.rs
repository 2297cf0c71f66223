//! In-process fake of the marketplace backend for end-to-end tests.
//!
//! [`FakeBackend::start`] binds an axum server to `127.0.0.1:0` and seeds
//! two accounts and three products. Tests drive the real client against it
//! and use the knobs to reject tokens, delay user fetches or fail adds for
//! a product.
//!
//! # Seed data
//!
//! | Account                | Password | Role     | Id |
//! |------------------------|----------|----------|----|
//! | `buyer@example.com`    | `secret` | customer | 1  |
//! | `seller@example.com`   | `secret` | seller   | 2  |
//!
//! Products 42 (`Ceramic mug`, 12.50), 7 (`Linen towel`, 8.00) and
//! 13 (`Oak board`, 30.00), all sold by the seller. Product 42 has one
//! review.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::extract::{Path as UrlPath, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use cornermarket_storefront::storage::FileStorage;
use cornermarket_storefront::{AppState, ClientConfig};

pub const BUYER_EMAIL: &str = "buyer@example.com";
pub const SELLER_EMAIL: &str = "seller@example.com";
pub const PASSWORD: &str = "secret";

const CREATED_AT: &str = "2025-01-10T12:00:00Z";

// =============================================================================
// Records
// =============================================================================

#[derive(Clone)]
struct UserRecord {
    id: i64,
    email: String,
    password: String,
    role: String,
    phone: String,
    address: String,
}

impl UserRecord {
    fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "username": self.email,
            "email": self.email,
            "first_name": "",
            "last_name": "",
            "role": self.role,
        })
    }

    fn profile_json(&self) -> Value {
        let profile_type = if self.role == "seller" { "seller" } else { "customer" };
        json!({
            "user": self.to_json(),
            "phone": self.phone,
            "address": self.address,
            "type": profile_type,
        })
    }
}

#[derive(Clone)]
struct ProductRecord {
    id: i64,
    name: String,
    price: Decimal,
    seller: i64,
    is_published: bool,
}

impl ProductRecord {
    fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "description": format!("{} from the fake catalog", self.name),
            "price": self.price.to_string(),
            "seller": self.seller,
            "is_published": self.is_published,
            "images": [],
            "created_at": CREATED_AT,
            "updated_at": CREATED_AT,
        })
    }
}

#[derive(Clone, Copy)]
struct LineRecord {
    id: i64,
    product: i64,
    quantity: i64,
}

struct ReviewRecord {
    id: i64,
    product: i64,
    user: Option<i64>,
    rating: i64,
    comment: String,
}

struct OrderRecord {
    id: i64,
    buyer: i64,
    body: Value,
}

#[derive(Default)]
struct Data {
    next_id: i64,
    users: Vec<UserRecord>,
    access: HashMap<String, i64>,
    refresh: HashMap<String, i64>,
    products: Vec<ProductRecord>,
    /// Keyed by user id, 0 for anonymous requests.
    carts: HashMap<i64, Vec<LineRecord>>,
    favorites: HashMap<i64, Vec<(i64, i64)>>,
    orders: Vec<OrderRecord>,
    reviews: Vec<ReviewRecord>,
    rejected: HashSet<String>,
    user_delays: HashMap<String, Duration>,
    failing_adds: HashSet<i64>,
    hits: HashMap<&'static str, usize>,
}

impl Data {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn user(&self, id: i64) -> Option<&UserRecord> {
        self.users.iter().find(|u| u.id == id)
    }

    fn product(&self, id: i64) -> Option<&ProductRecord> {
        self.products.iter().find(|p| p.id == id)
    }

    fn issue(&mut self, user_id: i64) -> (String, String) {
        let n = self.next_id();
        let access = format!("access-{user_id}-{n}");
        let refresh = format!("refresh-{user_id}-{n}");
        self.access.insert(access.clone(), user_id);
        self.refresh.insert(refresh.clone(), user_id);
        (access, refresh)
    }

    fn line_json(&self, line: &LineRecord) -> Value {
        let product = self.product(line.product);
        let price = product.map_or(Decimal::ZERO, |p| p.price);
        json!({
            "id": line.id,
            "product": product.map_or(Value::Null, ProductRecord::to_json),
            "quantity": line.quantity,
            "price": price.to_string(),
            "subtotal": (price * Decimal::from(line.quantity)).to_string(),
        })
    }

    fn cart_json(&self, key: i64) -> Value {
        let lines = self.carts.get(&key).map_or(&[][..], Vec::as_slice);
        let total: Decimal = lines
            .iter()
            .filter_map(|l| self.product(l.product).map(|p| p.price * Decimal::from(l.quantity)))
            .sum();
        json!({
            "id": key,
            "items": lines.iter().map(|l| self.line_json(l)).collect::<Vec<_>>(),
            "total_price": total.to_string(),
        })
    }

    fn review_json(&self, review: &ReviewRecord) -> Value {
        json!({
            "id": review.id,
            "product": review.product,
            "user": review.user.and_then(|id| self.user(id)).map(UserRecord::to_json),
            "rating": review.rating,
            "comment": review.comment,
            "created_at": CREATED_AT,
        })
    }

    fn favorites_json(&self, user_id: i64) -> Value {
        let records: Vec<Value> = self
            .favorites
            .get(&user_id)
            .map(|favs| {
                favs.iter()
                    .filter_map(|(id, product)| {
                        self.product(*product).map(|p| {
                            json!({"id": id, "product": p.to_json(), "created_at": CREATED_AT})
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        json!({
            "count": records.len(),
            "next": null,
            "previous": null,
            "results": records,
        })
    }
}

// =============================================================================
// Server
// =============================================================================

struct Backend {
    data: Mutex<Data>,
}

impl Backend {
    fn lock(&self) -> MutexGuard<'_, Data> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The user behind the bearer token, `None` without a header.
    fn caller(&self, headers: &HeaderMap) -> Result<Option<i64>, Response> {
        let Some(value) = headers.get(header::AUTHORIZATION) else {
            return Ok(None);
        };
        let token = value
            .to_str()
            .ok()
            .and_then(|v| v.strip_prefix("Bearer "))
            .unwrap_or_default();

        let data = self.lock();
        match data.access.get(token) {
            Some(id) if !data.rejected.contains(token) => Ok(Some(*id)),
            _ => Err(error(
                StatusCode::UNAUTHORIZED,
                json!({
                    "detail": "Given token not valid for any token type",
                    "code": "token_not_valid",
                }),
            )),
        }
    }

    fn require_user(&self, headers: &HeaderMap) -> Result<i64, Response> {
        self.caller(headers)?.ok_or_else(|| {
            error(
                StatusCode::UNAUTHORIZED,
                json!({"detail": "Authentication credentials were not provided."}),
            )
        })
    }
}

type Shared = State<Arc<Backend>>;

fn error(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

fn not_found() -> Response {
    error(StatusCode::NOT_FOUND, json!({"detail": "Not found."}))
}

fn ok(body: Value) -> Response {
    Json(body).into_response()
}

/// A running fake backend. Stops when dropped.
pub struct FakeBackend {
    addr: SocketAddr,
    backend: Arc<Backend>,
    task: JoinHandle<()>,
}

impl FakeBackend {
    /// Bind to an ephemeral port and start serving seeded data.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn start() -> std::io::Result<Self> {
        let backend = Arc::new(Backend {
            data: Mutex::new(seed()),
        });

        let app = Router::new()
            .route("/api/auth/login/", post(login))
            .route("/api/auth/register/", post(register))
            .route("/api/auth/user/", get(current_user))
            .route("/api/auth/refresh/", post(refresh))
            .route("/api/auth/become-seller/", post(become_seller))
            .route("/api/users/profile/", get(profile).patch(update_profile))
            .route("/api/products/", get(list_products))
            .route("/api/products/{id}/", get(get_product))
            .route("/api/categories/", get(list_categories))
            .route("/api/reviews/", get(list_reviews).post(create_review))
            .route("/api/cart/", get(get_cart).post(add_to_cart))
            .route(
                "/api/cart/{id}/",
                patch(update_cart_item).delete(remove_cart_item),
            )
            .route("/api/favorites/", get(list_favorites).post(add_favorite))
            .route("/api/favorites/toggle/", post(toggle_favorite))
            .route("/api/favorites/{id}/", delete(remove_favorite))
            .route("/api/orders/", get(list_orders).post(create_order))
            .route("/api/orders/{id}/", get(get_order))
            .route(
                "/api/sellers/products/",
                get(seller_products).post(create_seller_product),
            )
            .route(
                "/api/sellers/products/{id}/",
                patch(update_seller_product).delete(delete_seller_product),
            )
            .route("/api/sellers/orders/", get(seller_orders))
            .route("/api/sellers/analytics/", get(seller_analytics))
            .with_state(Arc::clone(&backend));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            addr,
            backend,
            task,
        })
    }

    /// Base URL of the server.
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Client configuration pointing at this server, storing state in
    /// `state_dir`, with a short draft debounce.
    ///
    /// # Panics
    ///
    /// Panics if the bound address does not form a valid URL.
    #[must_use]
    pub fn config(&self, state_dir: &Path) -> ClientConfig {
        let mut config = ClientConfig::for_api_url(&self.url()).expect("valid loopback url");
        config.state_dir = state_dir.to_path_buf();
        config.request_timeout = Some(Duration::from_secs(5));
        config.draft.debounce = Duration::from_millis(50);
        config
    }

    /// Issue a token pair for the account with `email`, as a login would.
    ///
    /// # Panics
    ///
    /// Panics if no such account exists.
    #[must_use]
    pub fn issue_tokens(&self, email: &str) -> (String, String) {
        let mut data = self.backend.lock();
        let id = data
            .users
            .iter()
            .find(|u| u.email == email)
            .map(|u| u.id)
            .expect("seeded account");
        data.issue(id)
    }

    /// Answer 401 to every request carrying `access`.
    pub fn reject_token(&self, access: &str) {
        self.backend.lock().rejected.insert(access.to_owned());
    }

    /// Hold user fetches made with `access` for `delay`.
    pub fn delay_user_fetch(&self, access: &str, delay: Duration) {
        self.backend
            .lock()
            .user_delays
            .insert(access.to_owned(), delay);
    }

    /// Answer 500 to cart adds of `product_id`.
    pub fn fail_adds_for(&self, product_id: i64) {
        self.backend.lock().failing_adds.insert(product_id);
    }

    /// Put a line into the cart of `email` (or the anonymous cart) directly.
    pub fn seed_cart(&self, email: Option<&str>, product_id: i64, quantity: i64) {
        let mut data = self.backend.lock();
        let key = email
            .and_then(|e| data.users.iter().find(|u| u.email == e))
            .map_or(0, |u| u.id);
        let id = data.next_id();
        data.carts.entry(key).or_default().push(LineRecord {
            id,
            product: product_id,
            quantity,
        });
    }

    /// `(product_id, quantity)` lines in the cart of user `user_id` (0 for
    /// anonymous).
    #[must_use]
    pub fn cart_lines(&self, user_id: i64) -> Vec<(i64, i64)> {
        self.backend
            .lock()
            .carts
            .get(&user_id)
            .map(|lines| lines.iter().map(|l| (l.product, l.quantity)).collect())
            .unwrap_or_default()
    }

    /// Favorite product ids of user `user_id`.
    #[must_use]
    pub fn favorite_products(&self, user_id: i64) -> Vec<i64> {
        self.backend
            .lock()
            .favorites
            .get(&user_id)
            .map(|favs| favs.iter().map(|(_, product)| *product).collect())
            .unwrap_or_default()
    }

    /// Number of orders placed.
    #[must_use]
    pub fn order_count(&self) -> usize {
        self.backend.lock().orders.len()
    }

    /// How many times an endpoint was hit: `"products"`, `"product"`,
    /// `"categories"` or `"user"`.
    #[must_use]
    pub fn hits(&self, endpoint: &str) -> usize {
        self.backend.lock().hits.get(endpoint).copied().unwrap_or(0)
    }
}

/// Build and initialize a client context against `backend`, keeping state
/// under `state_dir`.
///
/// # Panics
///
/// Panics if the state directory cannot be opened.
pub async fn client(backend: &FakeBackend, state_dir: &Path) -> AppState {
    let storage = FileStorage::open(state_dir).expect("state dir");
    let state = AppState::new(backend.config(state_dir), Arc::new(storage)).expect("client");
    state.init().await;
    state
}

/// Wait until the observed value satisfies `done`, for at most two seconds.
///
/// Returns whether it did.
pub async fn wait_for<T>(rx: &mut watch::Receiver<T>, done: impl FnMut(&T) -> bool) -> bool {
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(done))
        .await
        .is_ok_and(|r| r.is_ok())
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn seed() -> Data {
    let mut data = Data {
        next_id: 100,
        ..Data::default()
    };
    data.users = vec![
        UserRecord {
            id: 1,
            email: BUYER_EMAIL.to_owned(),
            password: PASSWORD.to_owned(),
            role: "customer".to_owned(),
            phone: "+100200300".to_owned(),
            address: "Main st 1".to_owned(),
        },
        UserRecord {
            id: 2,
            email: SELLER_EMAIL.to_owned(),
            password: PASSWORD.to_owned(),
            role: "seller".to_owned(),
            phone: "+100200400".to_owned(),
            address: "Market sq 2".to_owned(),
        },
    ];
    data.products = [
        (42, "Ceramic mug", Decimal::new(1250, 2)),
        (7, "Linen towel", Decimal::new(800, 2)),
        (13, "Oak board", Decimal::new(3000, 2)),
    ]
    .into_iter()
    .map(|(id, name, price)| ProductRecord {
        id,
        name: name.to_owned(),
        price,
        seller: 2,
        is_published: true,
    })
    .collect();
    data.reviews = vec![ReviewRecord {
        id: 1,
        product: 42,
        user: None,
        rating: 5,
        comment: "Holds a lot of tea".to_owned(),
    }];
    data
}

fn field<'a>(body: &'a Value, name: &str) -> &'a str {
    body.get(name).and_then(Value::as_str).unwrap_or_default()
}

fn int_field(body: &Value, name: &str) -> Option<i64> {
    body.get(name).and_then(Value::as_i64)
}

/// A decimal sent either as a string or as a JSON number.
fn decimal_field(body: &Value, name: &str) -> Option<Decimal> {
    match body.get(name)? {
        Value::String(s) => Decimal::from_str(s).ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

// =============================================================================
// Auth
// =============================================================================

async fn login(State(backend): Shared, Json(body): Json<Value>) -> Response {
    let mut data = backend.lock();
    let user = data
        .users
        .iter()
        .find(|u| u.email == field(&body, "username") && u.password == field(&body, "password"))
        .map(|u| u.id);

    match user {
        Some(id) => {
            let (access, refresh) = data.issue(id);
            ok(json!({"access": access, "refresh": refresh}))
        }
        None => error(
            StatusCode::UNAUTHORIZED,
            json!({"detail": "No active account found with the given credentials"}),
        ),
    }
}

async fn register(State(backend): Shared, Json(body): Json<Value>) -> Response {
    let email = field(&body, "email").to_owned();
    let password = field(&body, "password").to_owned();
    if password.len() < 6 {
        return error(
            StatusCode::BAD_REQUEST,
            json!({"password": ["Ensure this field has at least 6 characters."]}),
        );
    }

    let mut data = backend.lock();
    if data.users.iter().any(|u| u.email == email) {
        return error(
            StatusCode::BAD_REQUEST,
            json!({"email": ["A user with that email already exists."]}),
        );
    }

    let user = UserRecord {
        id: data.next_id(),
        email,
        password,
        role: field(&body, "role").to_owned(),
        phone: String::new(),
        address: String::new(),
    };
    let body = user.to_json();
    data.users.push(user);
    (StatusCode::CREATED, Json(body)).into_response()
}

async fn current_user(State(backend): Shared, headers: HeaderMap) -> Response {
    let id = match backend.require_user(&headers) {
        Ok(id) => id,
        Err(response) => return response,
    };

    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default()
        .to_owned();
    let delay = {
        let mut data = backend.lock();
        *data.hits.entry("user").or_default() += 1;
        data.user_delays.get(&token).copied()
    };
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    backend
        .lock()
        .user(id)
        .map_or_else(not_found, |u| ok(u.to_json()))
}

async fn refresh(State(backend): Shared, Json(body): Json<Value>) -> Response {
    let mut data = backend.lock();
    let Some(id) = data.refresh.get(field(&body, "refresh")).copied() else {
        return error(
            StatusCode::UNAUTHORIZED,
            json!({"detail": "Token is invalid or expired", "code": "token_not_valid"}),
        );
    };
    let (access, _) = data.issue(id);
    ok(json!({"access": access}))
}

async fn become_seller(State(backend): Shared, headers: HeaderMap) -> Response {
    let id = match backend.require_user(&headers) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let mut data = backend.lock();
    let Some(user) = data.users.iter_mut().find(|u| u.id == id) else {
        return not_found();
    };
    "seller".clone_into(&mut user.role);
    ok(user.to_json())
}

async fn profile(State(backend): Shared, headers: HeaderMap) -> Response {
    let id = match backend.require_user(&headers) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let data = backend.lock();
    data.user(id)
        .map_or_else(not_found, |u| ok(u.profile_json()))
}

async fn update_profile(
    State(backend): Shared,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let id = match backend.require_user(&headers) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let mut data = backend.lock();
    let Some(user) = data.users.iter_mut().find(|u| u.id == id) else {
        return not_found();
    };
    if let Some(phone) = body.get("phone").and_then(Value::as_str) {
        phone.clone_into(&mut user.phone);
    }
    if let Some(address) = body.get("address").and_then(Value::as_str) {
        address.clone_into(&mut user.address);
    }
    ok(user.profile_json())
}

// =============================================================================
// Catalog
// =============================================================================

async fn list_products(
    State(backend): Shared,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let mut data = backend.lock();
    *data.hits.entry("products").or_default() += 1;

    let search = params
        .get("search")
        .map(|s| s.to_lowercase())
        .unwrap_or_default();
    let results: Vec<Value> = data
        .products
        .iter()
        .filter(|p| p.is_published && p.name.to_lowercase().contains(&search))
        .map(ProductRecord::to_json)
        .collect();
    ok(json!({
        "count": results.len(),
        "next": null,
        "previous": null,
        "results": results,
    }))
}

async fn get_product(State(backend): Shared, UrlPath(id): UrlPath<i64>) -> Response {
    let mut data = backend.lock();
    *data.hits.entry("product").or_default() += 1;
    data.product(id)
        .map_or_else(not_found, |p| ok(p.to_json()))
}

async fn list_categories(State(backend): Shared) -> Response {
    *backend.lock().hits.entry("categories").or_default() += 1;
    ok(json!([
        {"id": 1, "name": "Kitchen", "slug": "kitchen", "parent": null},
        {"id": 2, "name": "Textiles", "slug": "textiles", "parent": null},
    ]))
}

async fn list_reviews(
    State(backend): Shared,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let product = params
        .get("product")
        .and_then(|p| i64::from_str(p).ok())
        .unwrap_or_default();
    let data = backend.lock();
    let reviews: Vec<Value> = data
        .reviews
        .iter()
        .filter(|r| r.product == product)
        .map(|r| data.review_json(r))
        .collect();
    ok(json!(reviews))
}

async fn create_review(
    State(backend): Shared,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let user = match backend.require_user(&headers) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let product = int_field(&body, "product").unwrap_or_default();
    let rating = int_field(&body, "rating").unwrap_or_default();

    let mut data = backend.lock();
    if data.product(product).is_none() {
        return error(
            StatusCode::BAD_REQUEST,
            json!({"product": ["Invalid pk - object does not exist."]}),
        );
    }
    if !(1..=5).contains(&rating) {
        return error(
            StatusCode::BAD_REQUEST,
            json!({"rating": ["Ensure this value is between 1 and 5."]}),
        );
    }

    let review = ReviewRecord {
        id: data.next_id(),
        product,
        user: Some(user),
        rating,
        comment: field(&body, "comment").to_owned(),
    };
    let body = data.review_json(&review);
    data.reviews.push(review);
    (StatusCode::CREATED, Json(body)).into_response()
}

// =============================================================================
// Cart
// =============================================================================

async fn get_cart(State(backend): Shared, headers: HeaderMap) -> Response {
    let key = match backend.caller(&headers) {
        Ok(id) => id.unwrap_or(0),
        Err(response) => return response,
    };
    ok(backend.lock().cart_json(key))
}

async fn add_to_cart(
    State(backend): Shared,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let key = match backend.caller(&headers) {
        Ok(id) => id.unwrap_or(0),
        Err(response) => return response,
    };
    let product = int_field(&body, "product_id").unwrap_or_default();
    let quantity = int_field(&body, "quantity").unwrap_or(1);

    let mut data = backend.lock();
    if data.failing_adds.contains(&product) {
        return error(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"detail": "Internal server error"}),
        );
    }
    if data.product(product).is_none() {
        return error(
            StatusCode::BAD_REQUEST,
            json!({"product_id": ["Invalid pk - object does not exist."]}),
        );
    }

    let existing = data
        .carts
        .get(&key)
        .and_then(|lines| lines.iter().position(|l| l.product == product));
    match existing {
        Some(index) => {
            if let Some(line) = data.carts.get_mut(&key).and_then(|l| l.get_mut(index)) {
                line.quantity += quantity;
            }
        }
        None => {
            let id = data.next_id();
            data.carts.entry(key).or_default().push(LineRecord {
                id,
                product,
                quantity,
            });
        }
    }
    (StatusCode::CREATED, Json(data.cart_json(key))).into_response()
}

async fn update_cart_item(
    State(backend): Shared,
    headers: HeaderMap,
    UrlPath(id): UrlPath<i64>,
    Json(body): Json<Value>,
) -> Response {
    let key = match backend.caller(&headers) {
        Ok(id) => id.unwrap_or(0),
        Err(response) => return response,
    };
    let quantity = int_field(&body, "quantity").unwrap_or_default();

    let mut data = backend.lock();
    let lines = data.carts.entry(key).or_default();
    let Some(index) = lines.iter().position(|l| l.id == id) else {
        return not_found();
    };
    if quantity <= 0 {
        lines.remove(index);
    } else if let Some(line) = lines.get_mut(index) {
        line.quantity = quantity;
    }
    ok(data.cart_json(key))
}

async fn remove_cart_item(
    State(backend): Shared,
    headers: HeaderMap,
    UrlPath(id): UrlPath<i64>,
) -> Response {
    let key = match backend.caller(&headers) {
        Ok(id) => id.unwrap_or(0),
        Err(response) => return response,
    };
    let mut data = backend.lock();
    let lines = data.carts.entry(key).or_default();
    let before = lines.len();
    lines.retain(|l| l.id != id);
    if lines.len() == before {
        return not_found();
    }
    StatusCode::NO_CONTENT.into_response()
}

// =============================================================================
// Favorites
// =============================================================================

async fn list_favorites(State(backend): Shared, headers: HeaderMap) -> Response {
    match backend.require_user(&headers) {
        Ok(id) => ok(backend.lock().favorites_json(id)),
        Err(response) => response,
    }
}

async fn add_favorite(
    State(backend): Shared,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let user = match backend.require_user(&headers) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let product = int_field(&body, "product_id").unwrap_or_default();

    let mut data = backend.lock();
    let Some(product_json) = data.product(product).map(ProductRecord::to_json) else {
        return error(
            StatusCode::BAD_REQUEST,
            json!({"product_id": ["Invalid pk - object does not exist."]}),
        );
    };
    if data
        .favorites
        .get(&user)
        .is_some_and(|favs| favs.iter().any(|(_, p)| *p == product))
    {
        return error(
            StatusCode::BAD_REQUEST,
            json!({"non_field_errors": ["The fields user, product must make a unique set."]}),
        );
    }
    let id = data.next_id();
    data.favorites.entry(user).or_default().push((id, product));
    (
        StatusCode::CREATED,
        Json(json!({"id": id, "product": product_json, "created_at": CREATED_AT})),
    )
        .into_response()
}

async fn toggle_favorite(
    State(backend): Shared,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let user = match backend.require_user(&headers) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let product = int_field(&body, "product_id").unwrap_or_default();

    let mut data = backend.lock();
    if data.product(product).is_none() {
        return not_found();
    }
    let id = data.next_id();
    let favs = data.favorites.entry(user).or_default();
    let is_favorite = if let Some(index) = favs.iter().position(|(_, p)| *p == product) {
        favs.remove(index);
        false
    } else {
        favs.push((id, product));
        true
    };
    ok(json!({"is_favorite": is_favorite}))
}

async fn remove_favorite(
    State(backend): Shared,
    headers: HeaderMap,
    UrlPath(id): UrlPath<i64>,
) -> Response {
    let user = match backend.require_user(&headers) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let mut data = backend.lock();
    let favs = data.favorites.entry(user).or_default();
    favs.retain(|(fav, _)| *fav != id);
    StatusCode::NO_CONTENT.into_response()
}

// =============================================================================
// Orders
// =============================================================================

async fn list_orders(State(backend): Shared, headers: HeaderMap) -> Response {
    let user = match backend.require_user(&headers) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let data = backend.lock();
    let orders: Vec<&Value> = data
        .orders
        .iter()
        .filter(|o| o.buyer == user)
        .map(|o| &o.body)
        .collect();
    ok(json!(orders))
}

async fn get_order(
    State(backend): Shared,
    headers: HeaderMap,
    UrlPath(id): UrlPath<i64>,
) -> Response {
    let user = match backend.require_user(&headers) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let data = backend.lock();
    data.orders
        .iter()
        .find(|o| o.id == id && o.buyer == user)
        .map_or_else(not_found, |o| ok(o.body.clone()))
}

async fn create_order(
    State(backend): Shared,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let user = match backend.require_user(&headers) {
        Ok(id) => id,
        Err(response) => return response,
    };

    let blank: Vec<&str> = ["contact_name", "contact_phone", "delivery_address"]
        .into_iter()
        .filter(|name| field(&body, name).trim().is_empty())
        .collect();
    if !blank.is_empty() {
        let errors: serde_json::Map<String, Value> = blank
            .into_iter()
            .map(|name| (name.to_owned(), json!(["This field may not be blank."])))
            .collect();
        return error(StatusCode::BAD_REQUEST, Value::Object(errors));
    }

    let mut data = backend.lock();
    let lines = data.carts.remove(&user).unwrap_or_default();
    if lines.is_empty() {
        return error(StatusCode::BAD_REQUEST, json!({"detail": "Cart is empty"}));
    }

    let cart = {
        data.carts.insert(user, lines.clone());
        let cart = data.cart_json(user);
        data.carts.remove(&user);
        cart
    };
    let id = data.next_id();
    let items: Vec<Value> = lines
        .iter()
        .map(|line| {
            let mut item = data.line_json(line);
            item["seller"] = json!(data.product(line.product).map(|p| p.seller));
            item["product_image"] = json!("");
            item
        })
        .collect();

    let order = json!({
        "id": id,
        "buyer": user,
        "status": "pending",
        "total_price": cart["total_price"],
        "created_at": CREATED_AT,
        "updated_at": CREATED_AT,
        "contact_name": field(&body, "contact_name"),
        "contact_phone": field(&body, "contact_phone"),
        "delivery_method": body.get("delivery_method").cloned().unwrap_or(json!("pickup")),
        "delivery_address": field(&body, "delivery_address"),
        "items": items,
    });
    data.orders.push(OrderRecord {
        id,
        buyer: user,
        body: order.clone(),
    });
    (StatusCode::CREATED, Json(order)).into_response()
}

// =============================================================================
// Seller
// =============================================================================

fn require_seller(backend: &Backend, headers: &HeaderMap) -> Result<i64, Response> {
    let id = backend.require_user(headers)?;
    if backend.lock().user(id).is_some_and(|u| u.role == "seller") {
        Ok(id)
    } else {
        Err(error(
            StatusCode::FORBIDDEN,
            json!({"detail": "You do not have permission to perform this action."}),
        ))
    }
}

async fn seller_products(State(backend): Shared, headers: HeaderMap) -> Response {
    let seller = match require_seller(&backend, &headers) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let products: Vec<Value> = backend
        .lock()
        .products
        .iter()
        .filter(|p| p.seller == seller)
        .map(ProductRecord::to_json)
        .collect();
    ok(json!(products))
}

fn product_input(body: &Value, product: &mut ProductRecord) {
    if let Some(name) = body.get("name").and_then(Value::as_str) {
        name.clone_into(&mut product.name);
    }
    if let Some(price) = decimal_field(body, "price") {
        product.price = price;
    }
    if let Some(published) = body.get("is_published").and_then(Value::as_bool) {
        product.is_published = published;
    }
}

async fn create_seller_product(
    State(backend): Shared,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let seller = match require_seller(&backend, &headers) {
        Ok(id) => id,
        Err(response) => return response,
    };
    if field(&body, "name").trim().is_empty() {
        return error(
            StatusCode::BAD_REQUEST,
            json!({"name": ["This field may not be blank."]}),
        );
    }
    if decimal_field(&body, "price").is_none() {
        return error(
            StatusCode::BAD_REQUEST,
            json!({"price": ["A valid number is required."]}),
        );
    }

    let mut data = backend.lock();
    let mut product = ProductRecord {
        id: data.next_id(),
        name: String::new(),
        price: Decimal::ZERO,
        seller,
        is_published: true,
    };
    product_input(&body, &mut product);
    let body = product.to_json();
    data.products.push(product);
    (StatusCode::CREATED, Json(body)).into_response()
}

async fn update_seller_product(
    State(backend): Shared,
    headers: HeaderMap,
    UrlPath(id): UrlPath<i64>,
    Json(body): Json<Value>,
) -> Response {
    let seller = match require_seller(&backend, &headers) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let mut data = backend.lock();
    let Some(product) = data
        .products
        .iter_mut()
        .find(|p| p.id == id && p.seller == seller)
    else {
        return not_found();
    };
    product_input(&body, product);
    ok(product.to_json())
}

async fn delete_seller_product(
    State(backend): Shared,
    headers: HeaderMap,
    UrlPath(id): UrlPath<i64>,
) -> Response {
    let seller = match require_seller(&backend, &headers) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let mut data = backend.lock();
    let before = data.products.len();
    data.products.retain(|p| p.id != id || p.seller != seller);
    if data.products.len() == before {
        return not_found();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn seller_orders(State(backend): Shared, headers: HeaderMap) -> Response {
    if let Err(response) = require_seller(&backend, &headers) {
        return response;
    }
    let orders: Vec<Value> = backend.lock().orders.iter().map(|o| o.body.clone()).collect();
    ok(json!({"count": orders.len(), "next": null, "previous": null, "results": orders}))
}

async fn seller_analytics(State(backend): Shared, headers: HeaderMap) -> Response {
    if let Err(response) = require_seller(&backend, &headers) {
        return response;
    }
    ok(json!({
        "products_count": 3,
        "published_count": 3,
        "draft_count": 0,
        "orders_count": 8,
        "pending_orders": 2,
        "total_revenue": "600.00",
        "top_products": [
            {"name": "Ceramic mug", "quantity": 10, "revenue": "125.00"},
            {"name": "Oak board", "quantity": 5, "revenue": "150.00"},
        ],
        "sales_last_30": [
            {"date": "2025-01-08", "revenue": "100.00"},
            {"date": "2025-01-09", "revenue": "50.00"},
        ],
        "unique_buyers": 4,
        "avg_rating": "4.5",
        "reviews_count": 2,
    }))
}
