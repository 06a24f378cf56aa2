//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use api::AppState;
use api::auth::{STORE_ID_HEADER, USER_ID_HEADER, USER_ROLE_HEADER};
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{Money, ProductId, StoreId, UserId};
use inventory::{InMemoryInventoryLedger, InventoryLedger, Product};
use metrics_exporter_prometheus::PrometheusHandle;
use orders::GatewayMode;
use serde_json::{Value, json};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    router: Router,
    state: Arc<AppState<InMemoryInventoryLedger>>,
    store: StoreId,
}

impl TestApp {
    /// Product 1: "Desk Lamp" at 10.99 with 10 in stock.
    async fn new(mode: GatewayMode) -> Self {
        let store = StoreId::new();
        let ledger = InMemoryInventoryLedger::with_products([Product::new(
            ProductId::new(1),
            "Desk Lamp",
            Money::from_cents(1099),
            10,
            store,
        )])
        .await;
        let state = api::create_state(ledger, mode);
        let router = api::create_app(state.clone(), get_metrics_handle());
        Self {
            router,
            state,
            store,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    async fn stock(&self) -> u32 {
        self.state
            .carts
            .ledger()
            .product(ProductId::new(1))
            .await
            .unwrap()
            .unwrap()
            .stock_quantity
    }

    /// Creates a cart holding `quantity` lamps and returns its code.
    async fn cart_with_lamps(&self, quantity: u32) -> String {
        let (status, created) = self.send(post("/cart/create", None, Value::Null)).await;
        assert_eq!(status, StatusCode::CREATED);
        let code = created["cart_code"].as_str().unwrap().to_string();

        let (status, _) = self
            .send(post(
                "/cart/add",
                None,
                json!({ "cart_code": code, "product_id": 1, "quantity": quantity }),
            ))
            .await;
        assert_eq!(status, StatusCode::OK);
        code
    }

    async fn checkout(&self, user: UserId, code: &str) -> (StatusCode, Value) {
        self.send(post(
            "/orders/create",
            Some(user),
            json!({
                "cart_code": code,
                "shipping_address": "Rua Amilcar Cabral 12, Luanda",
                "payment_method": "reference",
            }),
        ))
        .await
    }
}

fn request(method: &str, uri: &str, user: Option<UserId>, body: Value) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header(USER_ID_HEADER, user.to_string());
    }
    if body.is_null() {
        builder.body(Body::empty()).unwrap()
    } else {
        builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }
}

fn get(uri: &str, user: Option<UserId>) -> Request<Body> {
    request("GET", uri, user, Value::Null)
}

fn post(uri: &str, user: Option<UserId>, body: Value) -> Request<Body> {
    request("POST", uri, user, body)
}

fn seller_status_update(order_number: &str, store: StoreId, status: &str) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri(format!("/seller/orders/{order_number}/status"))
        .header(USER_ID_HEADER, UserId::new().to_string())
        .header(USER_ROLE_HEADER, "seller")
        .header(STORE_ID_HEADER, store.to_string())
        .header("content-type", "application/json")
        .body(Body::from(json!({ "status": status }).to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new(GatewayMode::AlwaysApprove).await;

    let (status, json) = app.send(get("/health", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_cart_add_and_get() {
    let app = TestApp::new(GatewayMode::AlwaysApprove).await;
    let code = app.cart_with_lamps(2).await;

    let (status, cart) = app.send(get(&format!("/cart/{code}"), None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["cart_code"], code.as_str());
    assert_eq!(cart["items"][0]["product_name"], "Desk Lamp");
    assert_eq!(cart["items"][0]["quantity"], 2);
    assert_eq!(cart["items"][0]["sub_total"], "21.98");
    assert_eq!(cart["cart_total"], "21.98");

    let (status, stats) = app
        .send(get(&format!("/cart/{code}/stats"), None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_quantity"], 2);

    // Carts only check stock.
    assert_eq!(app.stock().await, 10);
}

#[tokio::test]
async fn test_cart_add_validation() {
    let app = TestApp::new(GatewayMode::AlwaysApprove).await;

    let (status, _) = app
        .send(post(
            "/cart/add",
            None,
            json!({ "cart_code": "abc", "product_id": 1, "quantity": 0 }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(post(
            "/cart/add",
            None,
            json!({ "cart_code": "abc", "product_id": 1, "quantity": 11 }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(post(
            "/cart/add",
            None,
            json!({ "cart_code": "abc", "product_id": 99, "quantity": 1 }),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.send(get("/cart/unknown", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cart_add_quantity_defaults_to_one() {
    let app = TestApp::new(GatewayMode::AlwaysApprove).await;

    let (status, cart) = app
        .send(post(
            "/cart/add",
            None,
            json!({ "cart_code": "defaulted", "product_id": 1 }),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["items"][0]["quantity"], 1);
}

#[tokio::test]
async fn test_malformed_cart_bodies_are_bad_requests() {
    let app = TestApp::new(GatewayMode::AlwaysApprove).await;

    let (status, json) = app
        .send(post(
            "/cart/add",
            None,
            json!({ "cart_code": "abc", "product_id": 1, "quantity": "two" }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());

    let (status, json) = app
        .send(request(
            "PUT",
            "/cart/update",
            Some(UserId::new()),
            json!({ "item_id": 1 }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());

    let (status, json) = app
        .send(post(
            "/orders/create",
            Some(UserId::new()),
            json!({ "cart_code": "abc" }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_update_and_delete_item() {
    let app = TestApp::new(GatewayMode::AlwaysApprove).await;
    let user = UserId::new();
    let code = app.cart_with_lamps(1).await;
    let (_, cart) = app.send(get(&format!("/cart/{code}"), None)).await;
    let item_id = cart["items"][0]["id"].as_i64().unwrap();
    let update_body = json!({ "item_id": item_id, "quantity": 5 });

    let (status, _) = app
        .send(request("PUT", "/cart/update", None, update_body.clone()))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, item) = app
        .send(request("PUT", "/cart/update", Some(user), update_body))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(item["quantity"], 5);

    let uri = format!("/cart/item/{item_id}");
    let (status, _) = app.send(request("DELETE", &uri, None, Value::Null)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send(request("DELETE", &uri, Some(user), Value::Null))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app
        .send(request("DELETE", &uri, Some(user), Value::Null))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_authenticated_routes_require_identity() {
    let app = TestApp::new(GatewayMode::AlwaysApprove).await;

    let (status, json) = app.send(get("/orders", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(json["error"].is_string());

    let (status, _) = app.send(get("/cart/user", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_order() {
    let app = TestApp::new(GatewayMode::AlwaysApprove).await;
    let user = UserId::new();
    let code = app.cart_with_lamps(2).await;

    let (status, json) = app.checkout(user, &code).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["order"]["status"], "confirmed");
    assert_eq!(json["order"]["payment_status"], "paid");
    assert_eq!(json["order"]["total_amount"], "21.98");
    assert!(json["transaction_id"].as_str().unwrap().starts_with("TXN-"));
    assert_eq!(app.stock().await, 8);

    let (_, cart) = app.send(get(&format!("/cart/{code}"), None)).await;
    assert_eq!(cart["items"].as_array().unwrap().len(), 0);

    let order_number = json["order"]["order_number"].as_str().unwrap();
    let (status, listed) = app.send(get("/orders", Some(user))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed[0]["order_number"], order_number);

    let (status, payment) = app
        .send(get(&format!("/orders/{order_number}/payment"), Some(user)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payment["payment_status"], "completed");
    assert_eq!(payment["amount"], "21.98");

    // Another user cannot see it.
    let (status, _) = app
        .send(get(&format!("/orders/{order_number}"), Some(UserId::new())))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_order_from_empty_cart() {
    let app = TestApp::new(GatewayMode::AlwaysApprove).await;
    let (_, created) = app.send(post("/cart/create", None, Value::Null)).await;
    let code = created["cart_code"].as_str().unwrap();

    let (status, json) = app.checkout(UserId::new(), code).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Cart is empty");
    assert_eq!(app.state.workflow.order_count().await, 0);
}

#[tokio::test]
async fn test_create_order_rejects_bad_payment_method() {
    let app = TestApp::new(GatewayMode::AlwaysApprove).await;
    let code = app.cart_with_lamps(1).await;

    let (status, json) = app
        .send(post(
            "/orders/create",
            Some(UserId::new()),
            json!({
                "cart_code": code,
                "shipping_address": "Luanda",
                "payment_method": "cheque",
            }),
        ))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("reference, mobile, card"));
}

#[tokio::test]
async fn test_declined_payment_returns_order_number() {
    let app = TestApp::new(GatewayMode::AlwaysDecline).await;
    let user = UserId::new();
    let code = app.cart_with_lamps(3).await;

    let (status, json) = app.checkout(user, &code).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let order_number = json["order_number"].as_str().unwrap();
    assert_eq!(app.stock().await, 10);

    let (_, order) = app
        .send(get(&format!("/orders/{order_number}"), Some(user)))
        .await;
    assert_eq!(order["status"], "cancelled");
    assert_eq!(order["payment_status"], "failed");

    let (_, cart) = app.send(get(&format!("/cart/{code}"), None)).await;
    assert_eq!(cart["items"][0]["quantity"], 3);
}

#[tokio::test]
async fn test_refund_only_once() {
    let app = TestApp::new(GatewayMode::AlwaysApprove).await;
    let user = UserId::new();
    let code = app.cart_with_lamps(1).await;
    let (_, created) = app.checkout(user, &code).await;
    let order_number = created["order"]["order_number"].as_str().unwrap();
    let uri = format!("/orders/{order_number}/refund");

    let (status, json) = app.send(post(&uri, Some(user), Value::Null)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["order"]["payment_status"], "refunded");
    assert_eq!(json["order"]["status"], "cancelled");
    assert!(json["message"].as_str().unwrap().contains("Refund ID"));

    let (status, _) = app.send(post(&uri, Some(user), Value::Null)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_merge_foreign_cart_is_forbidden() {
    let app = TestApp::new(GatewayMode::AlwaysApprove).await;
    let owner = UserId::new();

    let (status, owned) = app.send(post("/cart/user", Some(owner), Value::Null)).await;
    assert_eq!(status, StatusCode::OK);
    let owned_code = owned["cart_code"].as_str().unwrap();

    let (status, _) = app
        .send(post(
            "/cart/merge",
            Some(UserId::new()),
            json!({ "temp_cart_code": owned_code }),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_merge_anonymous_cart() {
    let app = TestApp::new(GatewayMode::AlwaysApprove).await;
    let user = UserId::new();
    let temp = app.cart_with_lamps(3).await;

    let (status, merged) = app
        .send(post(
            "/cart/merge",
            Some(user),
            json!({ "temp_cart_code": temp }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(merged["items"][0]["quantity"], 3);

    let (status, _) = app.send(get(&format!("/cart/{temp}"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, cart) = app.send(get("/cart/user", Some(user))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["cart_code"], merged["cart_code"]);
}

#[tokio::test]
async fn test_seller_updates_order_status() {
    let app = TestApp::new(GatewayMode::AlwaysApprove).await;
    let code = app.cart_with_lamps(1).await;
    let (_, created) = app.checkout(UserId::new(), &code).await;
    let order_number = created["order"]["order_number"].as_str().unwrap();

    let (status, order) = app
        .send(seller_status_update(order_number, app.store, "shipped"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "shipped");

    let (status, json) = app
        .send(seller_status_update(order_number, app.store, "lost"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().starts_with("Invalid status"));

    let (status, _) = app
        .send(seller_status_update(order_number, StoreId::new(), "delivered"))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Customers may not use seller routes.
    let (status, _) = app.send(get("/seller/orders", Some(UserId::new()))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = TestApp::new(GatewayMode::AlwaysApprove).await;

    let response = app
        .router
        .clone()
        .oneshot(get("/metrics", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
