mod common;

use axum::http::{Method, StatusCode};
use common::{as_customer, decimal_field, json_body, TestApp};
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::{json, Value};
use uuid::Uuid;

#[tokio::test]
async fn product_view_includes_shop_and_category() {
    let app = TestApp::new().await;

    let category = app.seed_category("Furniture").await;
    let shop = app.seed_seller("Walnut Works").await;
    let desk = app
        .seed_product(shop.id, category.id, "Walnut Desk", dec!(100), 5)
        .await;

    // Product reads are public, no identity headers.
    let response = app
        .request(Method::GET, &format!("/api/v1/products/{}", desk.id), None, &[])
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;

    assert_eq!(body["name"], json!("Walnut Desk"));
    assert_eq!(body["shop_name"], json!("Walnut Works"));
    assert_eq!(body["category_name"], json!("Furniture"));
    assert_eq!(body["is_active"], json!(true));
    assert_eq!(body["stock_quantity"], json!(5));
    assert_eq!(decimal_field(&body["price"]), dec!(100));
}

#[tokio::test]
async fn retired_products_stay_readable() {
    let app = TestApp::new().await;

    let category = app.seed_category("Furniture").await;
    let shop = app.seed_seller("Walnut Works").await;
    let desk = app
        .seed_product(shop.id, category.id, "Walnut Desk", dec!(100), 5)
        .await;
    let mut retired: marketplace_api::entities::product::ActiveModel = desk.clone().into();
    retired.is_active = Set(false);
    retired
        .update(&*app.state.db)
        .await
        .expect("retire product");

    let response = app
        .request(Method::GET, &format!("/api/v1/products/{}", desk.id), None, &[])
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["is_active"], json!(false));

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/products/{}", Uuid::new_v4()),
            None,
            &[],
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn discount_preview_reports_terms() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();

    app.seed_discount("SAVE10", dec!(10), dec!(50), dec!(1000))
        .await;
    app.seed_discount("OPEN", dec!(5), dec!(0), dec!(200)).await;

    // Codes match case-insensitively.
    let response = app
        .request(
            Method::GET,
            "/api/v1/discounts/save10/validate",
            None,
            &as_customer(user),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["code"], json!("SAVE10"));
    assert_eq!(decimal_field(&body["discount_percent"]), dec!(10));
    assert_eq!(decimal_field(&body["max_discount_amount"]), dec!(50));
    assert_eq!(decimal_field(&body["remaining_budget"]), dec!(1000));

    // A non-positive cap is reported as no cap at all.
    let response = app
        .request(
            Method::GET,
            "/api/v1/discounts/OPEN/validate",
            None,
            &as_customer(user),
        )
        .await;
    let body = json_body(response).await;
    assert_eq!(body["max_discount_amount"], Value::Null);
}

#[tokio::test]
async fn discount_codes_are_stored_in_canonical_uppercase() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();

    // Seeded in mixed case with stray whitespace; the entity hook stores
    // the canonical form, so lookups in any casing still find it.
    let seeded = app
        .seed_discount(" Spring15 ", dec!(15), dec!(0), dec!(500))
        .await;
    assert_eq!(seeded.code, "SPRING15");

    let response = app
        .request(
            Method::GET,
            "/api/v1/discounts/spring15/validate",
            None,
            &as_customer(user),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["code"], json!("SPRING15"));
    assert_eq!(decimal_field(&body["discount_percent"]), dec!(15));
}

#[tokio::test]
async fn discount_preview_failure_modes() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();

    let response = app
        .request(
            Method::GET,
            "/api/v1/discounts/NOPE/validate",
            None,
            &as_customer(user),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let seeded = app
        .seed_discount("GONE", dec!(10), dec!(0), dec!(100))
        .await;
    let now = chrono::Utc::now();
    let mut d: marketplace_api::entities::discount::ActiveModel = seeded.into();
    d.starts_at = Set(now - chrono::Duration::days(30));
    d.ends_at = Set(now - chrono::Duration::days(1));
    d.update(&*app.state.db).await.expect("expire discount");

    let response = app
        .request(
            Method::GET,
            "/api/v1/discounts/GONE/validate",
            None,
            &as_customer(user),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    let message = body["message"].as_str().expect("error message");
    assert!(
        message.contains("has expired"),
        "unexpected message: {}",
        message
    );

    // The preview, unlike product reads, needs an identity.
    let response = app
        .request(Method::GET, "/api/v1/discounts/GONE/validate", None, &[])
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
