use std::str::FromStr;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use marketplace_api::{
    config::AppConfig,
    db,
    entities::{category, discount, product, seller},
    events::{self, EventSender},
    handlers::AppServices,
    AppState,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, EntityTrait, PaginatorTrait, Set};
use serde_json::{json, Value};
use tempfile::NamedTempFile;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

/// Harness that runs the full application router against a throwaway
/// SQLite database. Each instance gets its own database file, so tests
/// never observe each other's rows.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _db_file: NamedTempFile,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let db_file = NamedTempFile::new().expect("create temp database file");
        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_file.path().display()),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 5;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let services = AppServices::new(db_arc.clone(), event_sender.clone());

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };

        let router = Router::new()
            .merge(marketplace_api::health_routes())
            .nest("/api/v1", marketplace_api::api_v1_routes())
            .with_state(state.clone());

        Self {
            router,
            state,
            _db_file: db_file,
            _event_task: event_task,
        }
    }

    /// Send a request against the router with the given identity headers.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, String)],
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, value);
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn seed_seller(&self, shop_name: &str) -> seller::Model {
        seller::ActiveModel {
            id: Set(Uuid::new_v4()),
            shop_name: Set(shop_name.to_string()),
            is_active: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed seller")
    }

    pub async fn seed_category(&self, name: &str) -> category::Model {
        category::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed category")
    }

    pub async fn seed_product(
        &self,
        seller_id: Uuid,
        category_id: Uuid,
        name: &str,
        price: Decimal,
        stock: i32,
    ) -> product::Model {
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            seller_id: Set(seller_id),
            category_id: Set(category_id),
            name: Set(name.to_string()),
            description: Set(None),
            image_url: Set(None),
            price: Set(price),
            stock_quantity: Set(stock),
            is_active: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product")
    }

    /// Seed a discount that is active right now with its full budget left.
    /// Non-positive `cap` means uncapped.
    #[allow(dead_code)]
    pub async fn seed_discount(
        &self,
        code: &str,
        percent: Decimal,
        cap: Decimal,
        budget: Decimal,
    ) -> discount::Model {
        let now = Utc::now();
        discount::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.to_string()),
            discount_percent: Set(percent),
            max_discount_amount: Set(cap),
            budget: Set(budget),
            remaining_budget: Set(budget),
            starts_at: Set(now - Duration::days(1)),
            ends_at: Set(now + Duration::days(30)),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(None),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed discount")
    }

    /// Add a product to a user's cart through the API and return the id of
    /// the resulting cart line.
    #[allow(dead_code)]
    pub async fn add_to_cart(&self, user_id: Uuid, product_id: Uuid, quantity: i32) -> Uuid {
        let response = self
            .request(
                Method::POST,
                "/api/v1/cart/items",
                Some(json!({ "product_id": product_id, "quantity": quantity })),
                &as_customer(user_id),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK, "add_to_cart failed");

        let body = json_body(response).await;
        let line = body["items"]
            .as_array()
            .expect("cart items array")
            .iter()
            .find(|line| line["product_id"] == json!(product_id))
            .expect("added line present in cart")
            .clone();
        Uuid::parse_str(line["id"].as_str().expect("line id")).expect("line id is a uuid")
    }

    /// POST /checkout for the given user and selection.
    #[allow(dead_code)]
    pub async fn checkout(
        &self,
        user_id: Uuid,
        cart_item_ids: &[Uuid],
        discount_code: Option<&str>,
    ) -> axum::response::Response {
        let mut body = json!({
            "cart_item_ids": cart_item_ids,
            "shipping_address": "1 Test Street, Springfield",
        });
        if let Some(code) = discount_code {
            body["discount_code"] = json!(code);
        }
        self.request(
            Method::POST,
            "/api/v1/checkout",
            Some(body),
            &as_customer(user_id),
        )
        .await
    }

    #[allow(dead_code)]
    pub async fn product_stock(&self, product_id: Uuid) -> i32 {
        product::Entity::find_by_id(product_id)
            .one(&*self.state.db)
            .await
            .expect("query product")
            .expect("product exists")
            .stock_quantity
    }

    #[allow(dead_code)]
    pub async fn discount_remaining(&self, discount_id: Uuid) -> Decimal {
        discount::Entity::find_by_id(discount_id)
            .one(&*self.state.db)
            .await
            .expect("query discount")
            .expect("discount exists")
            .remaining_budget
    }

    #[allow(dead_code)]
    pub async fn orders_count(&self) -> u64 {
        marketplace_api::entities::order::Entity::find()
            .count(&*self.state.db)
            .await
            .expect("count orders")
    }

    /// Number of lines currently in the user's cart, as the API reports it.
    #[allow(dead_code)]
    pub async fn cart_line_count(&self, user_id: Uuid) -> usize {
        let response = self
            .request(Method::GET, "/api/v1/cart", None, &as_customer(user_id))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        json_body(response).await["items"]
            .as_array()
            .expect("cart items array")
            .len()
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub fn as_customer(user_id: Uuid) -> Vec<(&'static str, String)> {
    vec![("x-user-id", user_id.to_string())]
}

#[allow(dead_code)]
pub fn as_seller(user_id: Uuid, seller_id: Uuid) -> Vec<(&'static str, String)> {
    vec![
        ("x-user-id", user_id.to_string()),
        ("x-user-role", "seller".to_string()),
        ("x-seller-id", seller_id.to_string()),
    ]
}

#[allow(dead_code)]
pub fn as_admin(user_id: Uuid) -> Vec<(&'static str, String)> {
    vec![
        ("x-user-id", user_id.to_string()),
        ("x-user-role", "admin".to_string()),
    ]
}

pub async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is json")
}

/// Money fields serialize as strings; parse them back for comparisons.
#[allow(dead_code)]
pub fn decimal_field(value: &Value) -> Decimal {
    Decimal::from_str(value.as_str().expect("decimal serialized as string"))
        .expect("decimal parses")
}
