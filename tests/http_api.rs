//! End-to-end tests of the HTTP surface over the in-memory store.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde_json::{json, Value};
use tower::ServiceExt;
use tower_sessions::MemoryStore as SessionMemoryStore;

use opensase_checkout::domain::events::EventBus;
use opensase_checkout::domain::value_objects::{AccountId, Money};
use opensase_checkout::http::{router, session_layer, AppState};
use opensase_checkout::store::MemoryStore;

const ADMIN_TOKEN: &str = "k3J9xQ2mZ7vB1nR8tY4wL6pA0sD5fG3h";

struct TestApp {
    store: MemoryStore,
    app: Router,
}

struct Reply {
    status: StatusCode,
    cookie: Option<String>,
    body: Value,
}

impl TestApp {
    fn new() -> Self {
        let store = MemoryStore::new();
        let state = AppState::new(Arc::new(store.clone()), EventBus::disabled())
            .with_admin_token(Some(SecretString::from(ADMIN_TOKEN.to_string())));
        Self { app: router(state, session_layer(SessionMemoryStore::default(), false)), store }
    }

    async fn send(&self, method: &str, uri: &str, cookie: Option<&str>, account: Option<i64>, body: Option<Value>) -> Reply {
        self.send_with(method, uri, cookie, account, None, body).await
    }

    async fn send_with(
        &self,
        method: &str,
        uri: &str,
        cookie: Option<&str>,
        account: Option<i64>,
        bearer: Option<&str>,
        body: Option<Value>,
    ) -> Reply {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        if let Some(account) = account {
            request = request.header("x-account-id", account.to_string());
        }
        if let Some(token) = bearer {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(str::to_string);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        Reply { status, cookie, body }
    }
}

fn money(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().unwrap(),
        Value::Number(n) => n.to_string().parse().unwrap(),
        other => panic!("not a money value: {other}"),
    }
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new();
    let reply = app.send("GET", "/health", None, None, None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["status"], "healthy");
}

#[tokio::test]
async fn test_guest_cart_survives_across_requests_and_merges_at_login() {
    let app = TestApp::new();
    let tea = app.store.insert_product("Tea", Money::from_major(1500), true).await;
    let address = app.store.insert_address(AccountId::new(7), "Center", "Main").await;

    let first = app.send("GET", "/api/v1/cart", None, None, None).await;
    assert_eq!(first.status, StatusCode::OK);
    let cookie = first.cookie.expect("session cookie issued");
    assert!(cookie.starts_with("opensase_session="));

    let body = json!({"product_id": tea.id, "quantity": 2});
    app.send("POST", "/api/v1/cart/items", Some(&cookie), None, Some(body.clone())).await;
    let added = app.send("POST", "/api/v1/cart/items", Some(&cookie), None, Some(body)).await;
    assert_eq!(added.status, StatusCode::OK);
    assert_eq!(added.body["lines"].as_array().unwrap().len(), 1);
    assert_eq!(added.body["lines"][0]["quantity"], 4);
    assert_eq!(added.body["total_items"], 4);
    assert_eq!(money(&added.body["total_price"]), Decimal::from(6000));

    // First authenticated request from the same browser adopts the guest cart.
    let merged = app.send("GET", "/api/v1/cart", Some(&cookie), Some(7), None).await;
    assert_eq!(merged.status, StatusCode::OK);
    assert_eq!(merged.body["lines"][0]["quantity"], 4);
    assert_eq!(app.store.counts().await.carts, 1);

    let placed = app
        .send("POST", "/api/v1/orders", Some(&cookie), Some(7), Some(json!({"address_id": address.id, "payment_method": "cash"})))
        .await;
    assert_eq!(placed.status, StatusCode::CREATED);
    assert_eq!(placed.body["status"], "new");
    assert_eq!(placed.body["item_count"], 1);
    assert_eq!(money(&placed.body["delivery_cost"]), Decimal::from(1000));
    assert_eq!(money(&placed.body["total_price"]), Decimal::from(7000));

    let cart = app.send("GET", "/api/v1/cart", Some(&cookie), Some(7), None).await;
    assert_eq!(cart.body["lines"].as_array().unwrap().len(), 0);

    let orders = app.send("GET", "/api/v1/orders", None, None, None).await;
    assert_eq!(orders.status, StatusCode::UNAUTHORIZED);
    let orders = app.send("GET", "/api/v1/orders", None, Some(7), None).await;
    assert_eq!(orders.body.as_array().unwrap().len(), 1);

    let id = placed.body["id"].as_i64().unwrap();
    let detail = app.send("GET", &format!("/api/v1/orders/{id}"), None, Some(7), None).await;
    assert_eq!(detail.status, StatusCode::OK);
    assert_eq!(detail.body["lines"][0]["product_name"], "Tea");
    let foreign = app.send("GET", &format!("/api/v1/orders/{id}"), None, Some(8), None).await;
    assert_eq!(foreign.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_line_mutations_and_errors() {
    let app = TestApp::new();
    let jam = app.store.insert_product("Jam", Money::from_major(300), true).await;
    let gone = app.store.insert_product("Gone", Money::from_major(300), false).await;

    let added = app.send("POST", "/api/v1/cart/items", None, Some(3), Some(json!({"product_id": jam.id}))).await;
    assert_eq!(added.body["lines"][0]["quantity"], 1);
    let line = added.body["lines"][0]["id"].as_i64().unwrap();

    let unavailable = app.send("POST", "/api/v1/cart/items", None, Some(3), Some(json!({"product_id": gone.id}))).await;
    assert_eq!(unavailable.status, StatusCode::BAD_REQUEST);
    assert_eq!(unavailable.body["error"], "product_unavailable");

    let missing = app.send("POST", "/api/v1/cart/items", None, Some(3), Some(json!({"product_id": 9999}))).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);

    let zero = app.send("POST", "/api/v1/cart/items", None, Some(3), Some(json!({"product_id": jam.id, "quantity": 0}))).await;
    assert_eq!(zero.status, StatusCode::BAD_REQUEST);

    let set = app.send("PUT", &format!("/api/v1/cart/items/{line}"), None, Some(3), Some(json!({"quantity": 6}))).await;
    assert_eq!(set.body["lines"][0]["quantity"], 6);

    let deleted = app.send("PUT", &format!("/api/v1/cart/items/{line}"), None, Some(3), Some(json!({"quantity": 0}))).await;
    assert_eq!(deleted.body["lines"].as_array().unwrap().len(), 0);

    let again = app.send("DELETE", &format!("/api/v1/cart/items/{line}"), None, Some(3), None).await;
    assert_eq!(again.status, StatusCode::NOT_FOUND);
    assert_eq!(again.body["error"], "not_found");

    let cleared = app.send("POST", "/api/v1/cart/clear", None, Some(3), None).await;
    assert_eq!(cleared.status, StatusCode::OK);
    assert_eq!(cleared.body["total_items"], 0);
}

#[tokio::test]
async fn test_checkout_rejections() {
    let app = TestApp::new();
    let address = app.store.insert_address(AccountId::new(4), "Center", "Main").await;
    let order = json!({"address_id": address.id, "payment_method": "cash"});

    let guest = app.send("POST", "/api/v1/orders", None, None, Some(order.clone())).await;
    assert_eq!(guest.status, StatusCode::UNAUTHORIZED);

    let empty = app.send("POST", "/api/v1/orders", None, Some(4), Some(order)).await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);
    assert_eq!(empty.body["error"], "empty_cart");
    assert_eq!(app.store.counts().await.orders, 0);

    let salt = app.store.insert_product("Salt", Money::from_major(10), true).await;
    app.send("POST", "/api/v1/cart/items", None, Some(4), Some(json!({"product_id": salt.id}))).await;
    let bad_method = app
        .send("POST", "/api/v1/orders", None, Some(4), Some(json!({"address_id": address.id, "payment_method": "barter"})))
        .await;
    assert_eq!(bad_method.status, StatusCode::BAD_REQUEST);
    assert_eq!(bad_method.body["error"], "invalid_payment_method");

    let bad_account = app.send("GET", "/api/v1/cart", None, Some(-1), None).await;
    assert_eq!(bad_account.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_delivery_settings_and_admin_rules() {
    let app = TestApp::new();

    let settings = app.send("GET", "/api/v1/delivery/settings", None, None, None).await;
    assert_eq!(settings.status, StatusCode::OK);
    assert_eq!(money(&settings.body["free_delivery_threshold"]), Decimal::from(8000));
    assert_eq!(money(&settings.body["delivery_cost"]), Decimal::from(1000));

    let anonymous = app.send("GET", "/api/v1/admin/delivery/rules", None, None, None).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
    let wrong = app.send_with("GET", "/api/v1/admin/delivery/rules", None, None, Some("nope"), None).await;
    assert_eq!(wrong.status, StatusCode::FORBIDDEN);

    let created = app
        .send_with(
            "POST",
            "/api/v1/admin/delivery/rules",
            None,
            None,
            Some(ADMIN_TOKEN),
            Some(json!({"free_threshold": "5000", "flat_fee": "500"})),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.body["active"], false);
    let id = created.body["id"].as_i64().unwrap();

    let activated = app
        .send_with("POST", &format!("/api/v1/admin/delivery/rules/{id}/activate"), None, None, Some(ADMIN_TOKEN), None)
        .await;
    assert_eq!(activated.status, StatusCode::OK);

    let settings = app.send("GET", "/api/v1/delivery/settings", None, None, None).await;
    assert_eq!(money(&settings.body["free_delivery_threshold"]), Decimal::from(5000));

    let rules = app.send_with("GET", "/api/v1/admin/delivery/rules", None, None, Some(ADMIN_TOKEN), None).await;
    let active: Vec<_> = rules.body.as_array().unwrap().iter().filter(|r| r["active"] == true).collect();
    assert_eq!(active.len(), 1);

    let missing = app
        .send_with("POST", "/api/v1/admin/delivery/rules/9999/activate", None, None, Some(ADMIN_TOKEN), None)
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_status_transitions() {
    let app = TestApp::new();
    let bread = app.store.insert_product("Bread", Money::from_major(100), true).await;
    let address = app.store.insert_address(AccountId::new(2), "Center", "Main").await;
    app.send("POST", "/api/v1/cart/items", None, Some(2), Some(json!({"product_id": bread.id}))).await;
    let placed = app
        .send("POST", "/api/v1/orders", None, Some(2), Some(json!({"address_id": address.id, "payment_method": "card"})))
        .await;
    let id = placed.body["id"].as_i64().unwrap();
    let uri = format!("/api/v1/admin/orders/{id}/status");

    let ok = app.send_with("PUT", &uri, None, None, Some(ADMIN_TOKEN), Some(json!({"status": "processing"}))).await;
    assert_eq!(ok.status, StatusCode::OK);
    assert_eq!(ok.body["status"], "processing");

    let backwards = app.send_with("PUT", &uri, None, None, Some(ADMIN_TOKEN), Some(json!({"status": "new"}))).await;
    assert_eq!(backwards.status, StatusCode::CONFLICT);
    assert_eq!(backwards.body["error"], "invalid_status_transition");

    let unknown = app.send_with("PUT", &uri, None, None, Some(ADMIN_TOKEN), Some(json!({"status": "lost"}))).await;
    assert_eq!(unknown.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_bodies_are_structured_validation_errors() {
    let app = TestApp::new();
    let jam = app.store.insert_product("Jam", Money::from_major(300), true).await;

    let negative = app.send("POST", "/api/v1/cart/items", None, Some(3), Some(json!({"product_id": jam.id, "quantity": -3}))).await;
    assert_eq!(negative.status, StatusCode::BAD_REQUEST);
    assert_eq!(negative.body["error"], "validation_error");
    assert!(negative.body["message"].is_string());

    let huge = app.send("POST", "/api/v1/cart/items", None, Some(3), Some(json!({"product_id": jam.id, "quantity": 10001}))).await;
    assert_eq!(huge.status, StatusCode::BAD_REQUEST);
    assert_eq!(huge.body["error"], "validation_error");

    let added = app.send("POST", "/api/v1/cart/items", None, Some(3), Some(json!({"product_id": jam.id}))).await;
    let line = added.body["lines"][0]["id"].as_i64().unwrap();
    let huge_set = app.send("PUT", &format!("/api/v1/cart/items/{line}"), None, Some(3), Some(json!({"quantity": 20000}))).await;
    assert_eq!(huge_set.status, StatusCode::BAD_REQUEST);
    assert_eq!(huge_set.body["error"], "validation_error");

    let address = app
        .send("POST", "/api/v1/orders", None, Some(3), Some(json!({"address_id": "home", "payment_method": "cash"})))
        .await;
    assert_eq!(address.status, StatusCode::BAD_REQUEST);
    assert_eq!(address.body["error"], "validation_error");
    assert_eq!(app.store.counts().await.orders, 0);

    let cart = app.send("GET", "/api/v1/cart", None, Some(3), None).await;
    assert_eq!(cart.body["lines"][0]["quantity"], 1);
}
