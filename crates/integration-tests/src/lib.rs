//! End-to-end test support for the shopfront client.
//!
//! [`TestApi`] runs an in-process storefront API on a random local port.
//! It speaks the same wire format as the real backend: session and refresh
//! credentials travel as HTTP-only cookies, list endpoints answer with JSON
//! arrays (orders paginated), and errors carry `detail`, `error` or
//! per-field messages.
//!
//! # Usage
//!
//! ```rust,ignore
//! let api = TestApi::start().await?;
//! let storefront = api.storefront()?;
//! storefront.start().await;
//!
//! api.expire_access_tokens();
//! storefront.cart().refresh().await?; // refreshed transparently
//! ```
//!
//! Seeded data: one shopper ([`SHOPPER_EMAIL`] / [`SHOPPER_PASSWORD`]), two
//! categories and four products, one of them out of stock.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::extract::{Path, Query, Request, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{AppendHeaders, IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use shopfront_client::{AppError, ClientConfig, ConfigError, LoginForm, Storefront};
use thiserror::Error;
use tokio::task::JoinHandle;

pub const SHOPPER_USERNAME: &str = "ada";
pub const SHOPPER_EMAIL: &str = "ada@example.com";
pub const SHOPPER_PASSWORD: &str = "correct-horse";

const ACCESS_COOKIE: &str = "access_token";
const REFRESH_COOKIE: &str = "refresh_token";
const CREATED_AT: &str = "2026-10-16T12:00:00Z";

// =============================================================================
// Server Handle
// =============================================================================

/// A test fixture that could not be brought into the requested state.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error(transparent)]
    Client(#[from] AppError),

    #[error("signed in, but no cart was loaded")]
    CartNotLoaded,
}

/// A running fake storefront API. Stops when dropped.
pub struct TestApi {
    addr: SocketAddr,
    backend: Arc<Backend>,
    server: JoinHandle<()>,
}

impl TestApi {
    /// Bind a random local port and start serving.
    ///
    /// # Errors
    ///
    /// Returns an error if no local port can be bound.
    pub async fn start() -> std::io::Result<Self> {
        let backend = Arc::new(Backend::seeded());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let app = router(backend.clone());
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "Test API stopped");
            }
        });

        Ok(Self {
            addr,
            backend,
            server,
        })
    }

    /// Root URL the client should be configured with.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    /// Client configuration pointing at this server, catalog cache disabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is rejected.
    pub fn config(&self) -> Result<ClientConfig, ConfigError> {
        let mut config = ClientConfig::for_base_url(&self.base_url())?;
        config.catalog_cache_ttl = Duration::ZERO;
        config.request_timeout = Some(Duration::from_secs(5));
        Ok(config)
    }

    /// A storefront with its own cookie jar, talking to this server.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be built.
    pub fn storefront(&self) -> shopfront_client::Result<Storefront> {
        Storefront::new(self.config()?)
    }

    /// A started storefront signed in as the seeded shopper, cart loaded.
    ///
    /// # Errors
    ///
    /// Returns the client error if the storefront cannot be built or the
    /// sign-in is refused, and `CartNotLoaded` if the cart did not load.
    pub async fn signed_in(&self) -> Result<Storefront, FixtureError> {
        let storefront = self.storefront()?;
        storefront.start().await;
        storefront.sign_in(shopper_login(), None).await?;

        if storefront.cart().cart().is_none() {
            return Err(FixtureError::CartNotLoaded);
        }
        Ok(storefront)
    }

    /// Forget every issued session token, as if they had all expired.
    pub fn expire_access_tokens(&self) {
        self.backend.store().access.clear();
    }

    /// Forget every issued refresh token.
    pub fn revoke_refresh_tokens(&self) {
        self.backend.store().refresh.clear();
    }

    /// Requests received for `path` so far.
    #[must_use]
    pub fn hits(&self, path: &str) -> usize {
        self.backend.store().hits.get(path).copied().unwrap_or(0)
    }

    /// Units of `product_id` in the shopper's server-side cart.
    #[must_use]
    pub fn cart_units(&self, email: &str, product_id: i64) -> u32 {
        let store = self.backend.store();
        store
            .users
            .iter()
            .find(|user| user.email == email)
            .and_then(|user| store.carts.get(&user.id))
            .map_or(0, |lines| {
                lines
                    .iter()
                    .filter(|line| line.product_id == product_id)
                    .map(|line| line.quantity)
                    .sum()
            })
    }
}

/// Sign-in form for the seeded shopper.
#[must_use]
pub fn shopper_login() -> LoginForm {
    LoginForm {
        email: SHOPPER_EMAIL.to_string(),
        password: SHOPPER_PASSWORD.to_string(),
    }
}

impl Drop for TestApi {
    fn drop(&mut self) {
        self.server.abort();
    }
}

// =============================================================================
// State
// =============================================================================

struct Backend {
    store: Mutex<Store>,
}

#[derive(Default)]
struct Store {
    users: Vec<User>,
    categories: Vec<CategoryRow>,
    products: Vec<ProductRow>,
    /// Session token to user ID.
    access: HashMap<String, i64>,
    /// Refresh token to user ID.
    refresh: HashMap<String, i64>,
    carts: HashMap<i64, Vec<CartLine>>,
    orders: HashMap<i64, Vec<Value>>,
    hits: HashMap<String, usize>,
    next_id: i64,
}

struct User {
    id: i64,
    username: String,
    email: String,
    password: String,
}

struct CategoryRow {
    id: i64,
    name: &'static str,
    slug: &'static str,
}

struct ProductRow {
    id: i64,
    name: &'static str,
    slug: &'static str,
    price_cents: i64,
    stock: u32,
    category_id: i64,
}

struct CartLine {
    id: i64,
    product_id: i64,
    quantity: u32,
}

impl Backend {
    fn seeded() -> Self {
        let store = Store {
            users: vec![User {
                id: 1,
                username: SHOPPER_USERNAME.to_string(),
                email: SHOPPER_EMAIL.to_string(),
                password: SHOPPER_PASSWORD.to_string(),
            }],
            categories: vec![
                CategoryRow {
                    id: 1,
                    name: "Tea",
                    slug: "tea",
                },
                CategoryRow {
                    id: 2,
                    name: "Teaware",
                    slug: "teaware",
                },
            ],
            products: vec![
                ProductRow {
                    id: 1,
                    name: "Green Tea",
                    slug: "green-tea",
                    price_cents: 1250,
                    stock: 10,
                    category_id: 1,
                },
                ProductRow {
                    id: 2,
                    name: "Black Tea",
                    slug: "black-tea",
                    price_cents: 900,
                    stock: 5,
                    category_id: 1,
                },
                ProductRow {
                    id: 3,
                    name: "Cast Iron Teapot",
                    slug: "teapot",
                    price_cents: 3500,
                    stock: 0,
                    category_id: 2,
                },
                ProductRow {
                    id: 4,
                    name: "Tea Cup",
                    slug: "tea-cup",
                    price_cents: 800,
                    stock: 12,
                    category_id: 2,
                },
            ],
            next_id: 100,
            ..Store::default()
        };
        Self {
            store: Mutex::new(store),
        }
    }

    fn store(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Store {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn user(&self, id: i64) -> Option<&User> {
        self.users.iter().find(|user| user.id == id)
    }

    fn product(&self, id: i64) -> Option<&ProductRow> {
        self.products.iter().find(|product| product.id == id)
    }

    fn category_json(&self, id: i64) -> Value {
        self.categories
            .iter()
            .find(|category| category.id == id)
            .map_or(Value::Null, |category| {
                json!({
                    "id": category.id,
                    "name": category.name,
                    "slug": category.slug,
                    "description": "",
                })
            })
    }

    fn product_json(&self, product: &ProductRow) -> Value {
        json!({
            "id": product.id,
            "name": product.name,
            "slug": product.slug,
            "description": format!("{} from the test catalog.", product.name),
            "price": money(product.price_cents),
            "stock": product.stock,
            "image": null,
            "is_active": true,
            "in_stock": product.stock > 0,
            "category": self.category_json(product.category_id),
            "created_at": CREATED_AT,
        })
    }

    fn cart_json(&self, user_id: i64) -> Value {
        let mut total = 0;
        let items: Vec<Value> = self
            .carts
            .get(&user_id)
            .into_iter()
            .flatten()
            .filter_map(|line| {
                let product = self.product(line.product_id)?;
                let subtotal = product.price_cents * i64::from(line.quantity);
                total += subtotal;
                Some(json!({
                    "id": line.id,
                    "product": self.product_json(product),
                    "quantity": line.quantity,
                    "subtotal": money(subtotal),
                }))
            })
            .collect();

        json!({
            "id": user_id,
            "cart_items": items,
            "total": money(total),
            "created_at": CREATED_AT,
        })
    }
}

fn money(cents: i64) -> String {
    format!("{}.{:02}", cents / 100, cents % 100)
}

fn user_json(user: &User) -> Value {
    json!({
        "id": user.id,
        "username": user.username,
        "email": user.email,
        "phone": null,
        "address": null,
    })
}

// =============================================================================
// Cookies
// =============================================================================

fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

fn set_cookie(name: &str, value: &str, max_age: u64) -> String {
    format!("{name}={value}; Max-Age={max_age}; Path=/; HttpOnly; SameSite=Lax")
}

fn delete_cookie(name: &str) -> String {
    format!("{name}=; Max-Age=0; Path=/; HttpOnly; SameSite=Lax")
}

fn issue_tokens(store: &mut Store, user_id: i64) -> (String, String) {
    let access = uuid::Uuid::new_v4().to_string();
    let refresh = uuid::Uuid::new_v4().to_string();
    store.access.insert(access.clone(), user_id);
    store.refresh.insert(refresh.clone(), user_id);
    (access, refresh)
}

/// The signed-in user, or the 401 the real backend would send.
fn authenticate(store: &Store, headers: &HeaderMap) -> Result<i64, Response> {
    let Some(token) = read_cookie(headers, ACCESS_COOKIE) else {
        return Err(detail(
            StatusCode::UNAUTHORIZED,
            "Authentication credentials were not provided.",
        ));
    };
    store.access.get(&token).copied().ok_or_else(|| {
        detail(
            StatusCode::UNAUTHORIZED,
            "Given token not valid for any token type",
        )
    })
}

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "detail": message }))).into_response()
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

// =============================================================================
// Routes
// =============================================================================

fn router(backend: Arc<Backend>) -> Router {
    Router::new()
        .route("/api/auth/register/", post(register))
        .route("/api/auth/login/", post(login))
        .route("/api/auth/logout/", post(logout))
        .route("/api/auth/token/refresh/", post(refresh))
        .route("/api/auth/profile/", get(profile))
        .route("/api/products/", get(products))
        .route("/api/products/categories/", get(categories))
        .route("/api/products/{slug}/", get(product))
        .route("/api/orders/", get(orders))
        .route("/api/orders/create/", post(create_order))
        .route("/api/orders/cart/", get(cart))
        .route("/api/orders/cart/add/", post(add_to_cart))
        .route("/api/orders/cart/remove/{item_id}/", delete(remove_from_cart))
        .layer(middleware::from_fn_with_state(backend.clone(), count_hits))
        .with_state(backend)
}

async fn count_hits(State(backend): State<Arc<Backend>>, request: Request, next: Next) -> Response {
    *backend
        .store()
        .hits
        .entry(request.uri().path().to_string())
        .or_default() += 1;
    next.run(request).await
}

async fn register(State(backend): State<Arc<Backend>>, Json(body): Json<Value>) -> Response {
    let field = |name: &str| {
        body.get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let (username, email, password) = (field("username"), field("email"), field("password"));

    let mut store = backend.store();
    let mut errors = serde_json::Map::new();
    for (name, value) in [("username", &username), ("email", &email), ("password", &password)] {
        if value.is_empty() {
            errors.insert(name.to_string(), json!(["This field may not be blank."]));
        }
    }
    if password != field("password2") {
        errors.insert(
            "password".to_string(),
            json!(["Password fields didn't match."]),
        );
    }
    if store.users.iter().any(|user| user.email == email) {
        errors.insert(
            "email".to_string(),
            json!(["user with this email already exists."]),
        );
    }
    if !errors.is_empty() {
        return (StatusCode::BAD_REQUEST, Json(Value::Object(errors))).into_response();
    }

    let user = User {
        id: store.next_id(),
        username,
        email,
        password,
    };
    let body = user_json(&user);
    store.users.push(user);
    (StatusCode::CREATED, Json(body)).into_response()
}

async fn login(State(backend): State<Arc<Backend>>, Json(body): Json<Value>) -> Response {
    let email = body.get("email").and_then(Value::as_str).unwrap_or_default();
    let password = body
        .get("password")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let mut store = backend.store();
    let Some(user) = store
        .users
        .iter()
        .find(|user| user.email == email && user.password == password)
    else {
        return detail(StatusCode::UNAUTHORIZED, "Invalid email or password.");
    };
    let (user_id, body) = (user.id, user_json(user));
    let (access, refresh) = issue_tokens(&mut store, user_id);

    (
        AppendHeaders([
            (SET_COOKIE, set_cookie(ACCESS_COOKIE, &access, 60 * 60)),
            (SET_COOKIE, set_cookie(REFRESH_COOKIE, &refresh, 60 * 60 * 24 * 7)),
        ]),
        Json(body),
    )
        .into_response()
}

async fn refresh(State(backend): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    let mut store = backend.store();
    let Some(token) = read_cookie(&headers, REFRESH_COOKIE) else {
        return detail(StatusCode::UNAUTHORIZED, "No refresh token.");
    };
    let Some(user_id) = store.refresh.get(&token).copied() else {
        return (
            StatusCode::UNAUTHORIZED,
            AppendHeaders([
                (SET_COOKIE, delete_cookie(ACCESS_COOKIE)),
                (SET_COOKIE, delete_cookie(REFRESH_COOKIE)),
            ]),
            Json(json!({ "detail": "Token is invalid or expired." })),
        )
            .into_response();
    };

    let access = uuid::Uuid::new_v4().to_string();
    store.access.insert(access.clone(), user_id);
    (
        AppendHeaders([(SET_COOKIE, set_cookie(ACCESS_COOKIE, &access, 60 * 60))]),
        Json(json!({ "detail": "Token refreshed." })),
    )
        .into_response()
}

async fn logout(State(backend): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    let mut store = backend.store();
    if let Some(token) = read_cookie(&headers, ACCESS_COOKIE) {
        store.access.remove(&token);
    }
    if let Some(token) = read_cookie(&headers, REFRESH_COOKIE) {
        store.refresh.remove(&token);
    }
    (
        AppendHeaders([
            (SET_COOKIE, delete_cookie(ACCESS_COOKIE)),
            (SET_COOKIE, delete_cookie(REFRESH_COOKIE)),
        ]),
        Json(json!({ "detail": "Logged out." })),
    )
        .into_response()
}

async fn profile(State(backend): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    let store = backend.store();
    let user_id = match authenticate(&store, &headers) {
        Ok(id) => id,
        Err(response) => return response,
    };
    store.user(user_id).map_or_else(
        || detail(StatusCode::UNAUTHORIZED, "User not found."),
        |user| Json(user_json(user)).into_response(),
    )
}

async fn products(
    State(backend): State<Arc<Backend>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let store = backend.store();
    let category = params.get("category").and_then(|slug| {
        store
            .categories
            .iter()
            .find(|category| category.slug == slug.as_str())
            .map(|category| category.id)
    });
    if params.contains_key("category") && category.is_none() {
        return Json(json!([])).into_response();
    }
    let search = params.get("search").map(|text| text.to_lowercase());

    let listed: Vec<Value> = store
        .products
        .iter()
        .filter(|product| category.is_none_or(|id| product.category_id == id))
        .filter(|product| {
            search
                .as_ref()
                .is_none_or(|text| product.name.to_lowercase().contains(text.as_str()))
        })
        .map(|product| store.product_json(product))
        .collect();
    Json(Value::Array(listed)).into_response()
}

async fn categories(State(backend): State<Arc<Backend>>) -> Response {
    let store = backend.store();
    let listed: Vec<Value> = store
        .categories
        .iter()
        .map(|category| store.category_json(category.id))
        .collect();
    Json(Value::Array(listed)).into_response()
}

async fn product(State(backend): State<Arc<Backend>>, Path(slug): Path<String>) -> Response {
    let store = backend.store();
    store
        .products
        .iter()
        .find(|product| product.slug == slug)
        .map_or_else(
            || detail(StatusCode::NOT_FOUND, "No Product matches the given query."),
            |product| Json(store.product_json(product)).into_response(),
        )
}

async fn cart(State(backend): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    let store = backend.store();
    match authenticate(&store, &headers) {
        Ok(user_id) => Json(store.cart_json(user_id)).into_response(),
        Err(response) => response,
    }
}

async fn add_to_cart(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut store = backend.store();
    let user_id = match authenticate(&store, &headers) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let product_id = body.get("product_id").and_then(Value::as_i64);
    let quantity = body
        .get("quantity")
        .and_then(Value::as_u64)
        .and_then(|q| u32::try_from(q).ok())
        .unwrap_or(1);
    let Some(product_id) = product_id.filter(|id| store.product(*id).is_some()) else {
        return error(StatusCode::NOT_FOUND, "Product not found.");
    };

    let line_id = store.next_id();
    let lines = store.carts.entry(user_id).or_default();
    if let Some(line) = lines.iter_mut().find(|line| line.product_id == product_id) {
        line.quantity += quantity;
    } else {
        lines.push(CartLine {
            id: line_id,
            product_id,
            quantity,
        });
    }
    Json(store.cart_json(user_id)).into_response()
}

async fn remove_from_cart(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Path(item_id): Path<i64>,
) -> Response {
    let mut store = backend.store();
    let user_id = match authenticate(&store, &headers) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let lines = store.carts.entry(user_id).or_default();
    let before = lines.len();
    lines.retain(|line| line.id != item_id);
    if lines.len() == before {
        return error(StatusCode::NOT_FOUND, "Item not found.");
    }
    Json(json!({ "message": "Item removed from cart." })).into_response()
}

async fn orders(State(backend): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    let store = backend.store();
    let user_id = match authenticate(&store, &headers) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let placed = store.orders.get(&user_id).cloned().unwrap_or_default();
    Json(json!({
        "count": placed.len(),
        "next": null,
        "previous": null,
        "results": placed,
    }))
    .into_response()
}

async fn create_order(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut store = backend.store();
    let user_id = match authenticate(&store, &headers) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let lines = store.carts.remove(&user_id).unwrap_or_default();
    if lines.is_empty() {
        return error(StatusCode::BAD_REQUEST, "Your cart is empty.");
    }
    let address = body
        .get("shipping_address")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();
    if address.is_empty() {
        store.carts.insert(user_id, lines);
        return error(StatusCode::BAD_REQUEST, "Shipping address is required.");
    }

    let mut total = 0;
    let mut items = Vec::new();
    for line in &lines {
        let Some(product) = store.product(line.product_id) else {
            continue;
        };
        let subtotal = product.price_cents * i64::from(line.quantity);
        total += subtotal;
        items.push(json!({
            "id": line.id,
            "product": store.product_json(product),
            "quantity": line.quantity,
            "price": money(product.price_cents),
            "subtotal": money(subtotal),
        }));
    }
    let order = json!({
        "id": store.next_id(),
        "status": "pending",
        "total_price": money(total),
        "shipping_address": address,
        "items": items,
        "created_at": CREATED_AT,
    });
    store
        .orders
        .entry(user_id)
        .or_default()
        .insert(0, order.clone());
    (StatusCode::CREATED, Json(order)).into_response()
}
