#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use storefront_api::{
    app_router,
    config::AppConfig,
    db::{self, DbConfig},
    entities::{
        customer,
        discount_code::{self, DiscountKind},
        order::{self, Entity as OrderEntity},
        payment_intent::{self, PaymentIntentStatus},
    },
    errors::ServiceError,
    events::{self, Event},
    handlers::AppServices,
    notifications::{NotificationDispatcher, Notifier, NotifyError},
    services::{
        carts::{AddItemRequest, CartService},
        catalog::{Catalog, ProductInfo},
        checkout::CheckoutService,
        discounts::DiscountService,
        inventory::InventoryService,
        order_status::{OrderStatus, OrderStatusService},
        payments::{GatewayIntent, PaymentGateway, PaymentService},
    },
    AppState,
};

pub const WEBHOOK_SECRET: &str = "integration_test_webhook_secret_32chars";
pub const CURRENCY: &str = "USD";

/// In-process catalog stub; products are registered by the test.
#[derive(Clone, Default)]
pub struct StaticCatalog {
    products: Arc<Mutex<HashMap<Uuid, ProductInfo>>>,
}

impl StaticCatalog {
    pub fn insert(&self, product_id: Uuid, name: &str, unit_price: Decimal) {
        self.products.lock().unwrap().insert(
            product_id,
            ProductInfo {
                name: name.to_string(),
                unit_price,
                active: true,
            },
        );
    }

    pub fn deactivate(&self, product_id: Uuid) {
        if let Some(info) = self.products.lock().unwrap().get_mut(&product_id) {
            info.active = false;
        }
    }
}

#[async_trait]
impl Catalog for StaticCatalog {
    async fn product(&self, product_id: Uuid) -> Result<Option<ProductInfo>, ServiceError> {
        Ok(self.products.lock().unwrap().get(&product_id).cloned())
    }
}

/// Gateway stub that hands out sequential external references without
/// any network traffic.
#[derive(Default)]
pub struct StubGateway {
    counter: AtomicU64,
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_intent(
        &self,
        _customer_id: Uuid,
        _amount: Decimal,
        _currency: &str,
    ) -> Result<GatewayIntent, ServiceError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(GatewayIntent {
            external_ref: format!("pi_test_{}", n),
            client_payload: json!({"stub": true}),
        })
    }
}

/// Notifier that records deliveries and fails for chosen recipients.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    pub delivered: Arc<Mutex<Vec<(Uuid, String, String)>>>,
    pub failing: Arc<Mutex<HashSet<String>>>,
}

impl RecordingNotifier {
    pub fn fail_for(&self, email: &str) {
        self.failing.lock().unwrap().insert(email.to_string());
    }

    pub fn deliveries(&self) -> Vec<(Uuid, String, String)> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_status_change(
        &self,
        order_id: Uuid,
        recipient_email: &str,
        _recipient_name: &str,
        new_status: &str,
    ) -> Result<(), NotifyError> {
        if self.failing.lock().unwrap().contains(recipient_email) {
            return Err(NotifyError(format!("mailbox {} unavailable", recipient_email)));
        }
        self.delivered.lock().unwrap().push((
            order_id,
            recipient_email.to_string(),
            new_status.to_string(),
        ));
        Ok(())
    }
}

fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        environment: "test".to_string(),
        log_level: "debug".to_string(),
        log_json: false,
        auto_migrate: true,
        gateway_url: "http://localhost:1".to_string(),
        gateway_timeout_secs: 1,
        catalog_url: "http://localhost:1".to_string(),
        payment_webhook_secret: WEBHOOK_SECRET.to_string(),
        payment_webhook_tolerance_secs: 300,
        currency: CURRENCY.to_string(),
    }
}

/// Full application wired against an in-memory SQLite database. The
/// pool is capped at one connection so every handle sees the same
/// in-memory database.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub catalog: StaticCatalog,
    pub event_rx: mpsc::Receiver<Event>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_notifier(Arc::new(storefront_api::notifications::LogNotifier)).await
    }

    pub async fn with_notifier(notifier: Arc<dyn Notifier>) -> Self {
        let cfg = test_config();
        let pool = db::establish_connection_with_config(&DbConfig {
            url: cfg.database_url.clone(),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(30),
        })
        .await
        .expect("test database");
        db::run_migrations(&pool).await.expect("migrations");
        let db = Arc::new(pool);

        let (event_sender, event_rx) = events::channel();
        let catalog = StaticCatalog::default();
        let dispatcher = NotificationDispatcher::new(notifier);

        let carts = CartService::new(db.clone());
        let discounts = DiscountService::new(db.clone());
        let inventory = InventoryService::new(db.clone());
        let payments = PaymentService::new(
            db.clone(),
            Arc::new(StubGateway::default()),
            cfg.payment_webhook_secret.clone(),
            cfg.payment_webhook_tolerance_secs,
            event_sender.clone(),
        );
        let checkout = CheckoutService::new(
            db.clone(),
            carts.clone(),
            discounts,
            inventory,
            payments.clone(),
            Arc::new(catalog.clone()),
            event_sender.clone(),
            dispatcher.clone(),
            cfg.currency.clone(),
        );
        let order_status = OrderStatusService::new(db.clone(), event_sender.clone(), dispatcher);

        let state = AppState {
            db,
            config: cfg,
            event_sender,
            services: AppServices {
                carts,
                checkout,
                payments,
                order_status,
            },
        };
        let router = app_router(state.clone());

        Self {
            router,
            state,
            catalog,
            event_rx,
        }
    }

    pub fn inventory(&self) -> InventoryService {
        InventoryService::new(self.state.db.clone())
    }

    pub fn discounts(&self) -> DiscountService {
        DiscountService::new(self.state.db.clone())
    }

    pub async fn seed_customer(&self) -> customer::Model {
        customer::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(format!("{}@example.com", Uuid::new_v4().simple())),
            name: Set("Test Customer".to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed customer")
    }

    /// Registers a product in the catalog stub and stocks it.
    pub async fn seed_product(
        &self,
        name: &str,
        unit_price: Decimal,
        quantity: i32,
        low_stock_threshold: i32,
        allow_backorder: bool,
    ) -> Uuid {
        let product_id = Uuid::new_v4();
        self.catalog.insert(product_id, name, unit_price);
        self.inventory()
            .set_stock(product_id, quantity, low_stock_threshold, allow_backorder)
            .await
            .expect("seed stock");
        product_id
    }

    pub async fn seed_discount(
        &self,
        code: &str,
        kind: DiscountKind,
        value: Decimal,
        usage_limit: Option<i32>,
    ) -> discount_code::Model {
        let now = Utc::now();
        discount_code::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.to_uppercase()),
            kind: Set(kind),
            value: Set(value),
            active: Set(true),
            usage_limit: Set(usage_limit),
            redemption_count: Set(0),
            starts_at: Set(now - ChronoDuration::days(1)),
            ends_at: Set(now + ChronoDuration::days(1)),
            created_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed discount")
    }

    pub async fn seed_order(&self, customer_id: Uuid, status: OrderStatus) -> order::Model {
        let id = Uuid::new_v4();
        order::ActiveModel {
            id: Set(id),
            order_number: Set(format!("ORD-{}", &id.simple().to_string()[..8].to_uppercase())),
            customer_id: Set(customer_id),
            status: Set(status.to_string()),
            payment_status: Set("pending".to_string()),
            total_amount: Set(Decimal::new(1000, 2)),
            currency: Set(CURRENCY.to_string()),
            discount_code: Set(None),
            discount_amount: Set(None),
            shipping_address: Set(None),
            billing_address: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
            version: Set(1),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed order")
    }

    pub async fn add_to_cart(&self, customer_id: Uuid, product_id: Uuid, quantity: i32) {
        self.state
            .services
            .carts
            .add_item(
                customer_id,
                AddItemRequest {
                    product_id,
                    quantity,
                    customization: None,
                },
            )
            .await
            .expect("add cart item");
    }

    /// Adds a line with a customization payload. Distinct payloads keep
    /// distinct lines even for the same product.
    pub async fn add_to_cart_with(
        &self,
        customer_id: Uuid,
        product_id: Uuid,
        quantity: i32,
        customization: Value,
    ) {
        self.state
            .services
            .carts
            .add_item(
                customer_id,
                AddItemRequest {
                    product_id,
                    quantity,
                    customization: Some(customization),
                },
            )
            .await
            .expect("add cart item");
    }

    pub async fn stock_of(&self, product_id: Uuid) -> i32 {
        self.inventory()
            .get_stock(product_id)
            .await
            .expect("stock lookup")
            .map(|item| item.quantity)
            .expect("stock row")
    }

    pub async fn redemption_count(&self, code: &str) -> i32 {
        discount_code::Entity::find()
            .filter(discount_code::Column::Code.eq(code.to_uppercase()))
            .one(&*self.state.db)
            .await
            .expect("discount lookup")
            .expect("discount row")
            .redemption_count
    }

    pub async fn intent_status(&self, external_ref: &str) -> PaymentIntentStatus {
        payment_intent::Entity::find()
            .filter(payment_intent::Column::ExternalRef.eq(external_ref))
            .one(&*self.state.db)
            .await
            .expect("intent lookup")
            .expect("intent row")
            .status
    }

    pub async fn order_count(&self) -> usize {
        OrderEntity::find().all(&*self.state.db).await.expect("orders").len()
    }

    pub async fn order_by_id(&self, order_id: Uuid) -> Option<order::Model> {
        OrderEntity::find_by_id(order_id)
            .one(&*self.state.db)
            .await
            .expect("order lookup")
    }

    /// Sends a request through the full router. `identity` supplies the
    /// headers the upstream auth proxy would inject.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        identity: Option<(Uuid, &str)>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some((customer_id, role)) = identity {
            builder = builder
                .header("x-customer-id", customer_id.to_string())
                .header("x-role", role);
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        };
        self.router.clone().oneshot(request).await.expect("response")
    }

    /// Posts a raw signed webhook body.
    pub async fn post_webhook(
        &self,
        payload: &[u8],
        signature: &str,
        query: Option<&str>,
    ) -> Response {
        let path = match query {
            Some(q) => format!("/api/v1/checkout/webhook?{}", q),
            None => "/api/v1/checkout/webhook".to_string(),
        };
        let request = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header("content-type", "application/json")
            .header("x-signature", signature)
            .body(Body::from(payload.to_vec()))
            .expect("request");
        self.router.clone().oneshot(request).await.expect("response")
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body");
    serde_json::from_slice(&bytes).expect("json body")
}

pub fn assert_status(response: &Response, expected: StatusCode) {
    assert_eq!(response.status(), expected);
}
