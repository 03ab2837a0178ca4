//! HTTP surface.
//!
//! The account id arrives in a header set by the auth gateway; guests are
//! tracked through a cookie session holding their cart token.

use std::sync::Arc;

use axum::http::HeaderName;
use axum::routing::{get, patch, post, put};
use axum::{Json, Router};
use secrecy::SecretString;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tower_sessions::cookie::time::Duration;
use tower_sessions::cookie::SameSite;
use tower_sessions::{Expiry, SessionManagerLayer, SessionStore};

use crate::domain::events::EventBus;
use crate::services::{CartService, DeliveryPolicy, OrderFactory, OrderService};
use crate::store::Store;

pub mod cart;
pub mod delivery;
pub mod error;
pub mod extract;
pub mod orders;

pub use error::ApiError;

pub const SESSION_COOKIE_NAME: &str = "opensase_session";
const SESSION_INACTIVITY_DAYS: i64 = 7;

pub struct AppState<S> {
    pub carts: CartService<S>,
    pub delivery: DeliveryPolicy<S>,
    pub checkout: OrderFactory<S>,
    pub orders: OrderService<S>,
    account_header: HeaderName,
    admin_token: Option<SecretString>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            carts: self.carts.clone(),
            delivery: self.delivery.clone(),
            checkout: self.checkout.clone(),
            orders: self.orders.clone(),
            account_header: self.account_header.clone(),
            admin_token: self.admin_token.clone(),
        }
    }
}

impl<S: Store> AppState<S> {
    pub fn new(store: Arc<S>, events: EventBus) -> Self {
        Self {
            carts: CartService::new(Arc::clone(&store), events.clone()),
            delivery: DeliveryPolicy::new(Arc::clone(&store), events.clone()),
            checkout: OrderFactory::new(Arc::clone(&store), events.clone()),
            orders: OrderService::new(store, events),
            account_header: HeaderName::from_static("x-account-id"),
            admin_token: None,
        }
    }

    /// Header name must already be lower case.
    pub fn with_account_header(mut self, header: HeaderName) -> Self {
        self.account_header = header;
        self
    }

    pub fn with_admin_token(mut self, token: Option<SecretString>) -> Self {
        self.admin_token = token;
        self
    }
}

/// Cookie session over `store`. The service runs on `PostgresStore` so guest
/// cart tokens survive restarts and are shared between replicas.
pub fn session_layer<T: SessionStore + Clone>(store: T, secure: bool) -> SessionManagerLayer<T> {
    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(Duration::days(SESSION_INACTIVITY_DAYS)))
        .with_secure(secure)
        .with_same_site(SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
}

pub fn router<S: Store, T: SessionStore + Clone>(state: AppState<S>, sessions: SessionManagerLayer<T>) -> Router {
    let api = Router::new()
        .route("/cart", get(cart::get_cart::<S>))
        .route("/cart/items", post(cart::add_item::<S>))
        .route("/cart/items/:line_id", put(cart::set_quantity::<S>).delete(cart::remove_item::<S>))
        .route("/cart/clear", post(cart::clear::<S>))
        .route("/delivery/settings", get(delivery::settings::<S>))
        .route("/orders", get(orders::list_orders::<S>).post(orders::place_order::<S>))
        .route("/orders/:id", get(orders::get_order::<S>))
        .route("/admin/orders/:id/status", put(orders::update_status::<S>))
        .route("/admin/delivery/rules", get(delivery::list_rules::<S>).post(delivery::create_rule::<S>))
        .route("/admin/delivery/rules/:id", patch(delivery::update_rule::<S>))
        .route("/admin/delivery/rules/:id/activate", post(delivery::activate_rule::<S>));

    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "opensase-checkout"})) }))
        .nest("/api/v1", api)
        .with_state(state)
        .layer(sessions)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
