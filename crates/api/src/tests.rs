use std::sync::Arc;

use actix_web::{http::StatusCode, test, web, App};
use amora_domain::model::{
    DataIntegrityIssue, IntegrityReport, IssueType, ItemType, PaymentStatus, PointTransactionKind,
    SubscriptionStatus,
};
use amora_domain::services::{
    cache::InMemoryEventCache,
    telemetry::{init_telemetry, TelemetryConfig, TelemetryGuard},
};
use amora_domain::storage::{
    CommerceStore, EntitlementStore, IntegrityStore, SubscriptionStore, WebhookEventStore,
};
use amora_domain::webhook::{WebhookVerifier, DEFAULT_TOLERANCE};
use amora_storage::testing::{
    attendee_status, memory_storage, seed_checkout_payment, seed_conversation,
    seed_event_with_pending_attendee, seed_item, seed_match, seed_photo, seed_plan, seed_product,
    seed_profile, seed_user,
};
use amora_storage::SeaOrmStorage;
use chrono::{Duration, TimeZone, Utc};
use serde_json::{json, Value};

use crate::application::{admin_routes, public_routes};
use crate::handlers::integrity::FixResponse;
use crate::handlers::webhook::{WebhookAck, SIGNATURE_HEADER};
use crate::state::AppState;

const WEBHOOK_SECRET: &str = "whsec_test_secret";
const ADMIN_TOKEN: &str = "admin-test-token";

fn telemetry() -> TelemetryGuard {
    let config = TelemetryConfig::from_env("API_TEST");
    init_telemetry(&config).expect("telemetry inits")
}

fn build_state(storage: SeaOrmStorage) -> AppState {
    AppState::new(
        storage,
        WebhookVerifier::new(WEBHOOK_SECRET, DEFAULT_TOLERANCE),
        Arc::new(InMemoryEventCache::default()),
        None,
        telemetry(),
        ADMIN_TOKEN,
    )
}

fn signed(payload: &Value) -> (Vec<u8>, String) {
    let body = serde_json::to_vec(payload).unwrap();
    let header = WebhookVerifier::new(WEBHOOK_SECRET, DEFAULT_TOLERANCE)
        .sign(&body, Utc::now().timestamp())
        .unwrap();
    (body, header)
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state))
                .configure(public_routes)
                .configure(admin_routes),
        )
        .await
    };
}

fn webhook_request(payload: &Value) -> test::TestRequest {
    let (body, header) = signed(payload);
    test::TestRequest::post()
        .uri("/api/webhooks/stripe")
        .insert_header((SIGNATURE_HEADER, header))
        .set_payload(body)
}

fn bearer() -> (&'static str, String) {
    ("Authorization", format!("Bearer {ADMIN_TOKEN}"))
}

fn subscription_event(id: &str) -> Value {
    json!({
        "id": id,
        "type": "customer.subscription.updated",
        "created": 1_699_000_000,
        "data": {
            "object": {
                "id": "sub_1",
                "customer": "cus_abc",
                "status": "active",
                "current_period_start": 1_697_408_000,
                "current_period_end": 1_700_000_000,
                "cancel_at_period_end": false,
                "items": { "data": [ { "price": { "id": "price_monthly_premium" } } ] }
            }
        }
    })
}

#[actix_web::test]
async fn webhook_without_signature_is_rejected() {
    let app = app!(build_state(memory_storage().await));
    let req = test::TestRequest::post()
        .uri("/api/webhooks/stripe")
        .set_payload(serde_json::to_vec(&subscription_event("evt_1")).unwrap())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn webhook_with_wrong_signature_is_rejected_and_not_logged() {
    let storage = memory_storage().await;
    let app = app!(build_state(storage.clone()));
    let body = serde_json::to_vec(&subscription_event("evt_forged")).unwrap();
    let forged = WebhookVerifier::new("whsec_other", DEFAULT_TOLERANCE)
        .sign(&body, Utc::now().timestamp())
        .unwrap();
    let req = test::TestRequest::post()
        .uri("/api/webhooks/stripe")
        .insert_header((SIGNATURE_HEADER, forged))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(storage.find_event("evt_forged").await.unwrap().is_none());
}

#[actix_web::test]
async fn subscription_event_upgrades_user_once() {
    let storage = memory_storage().await;
    seed_user(&storage, "u1", Some("cus_abc"), 0).await;
    seed_plan(
        &storage,
        "plan_premium",
        "premium",
        "price_monthly_premium",
        "price_yearly_premium",
        5,
    )
    .await;
    let app = app!(build_state(storage.clone()));

    let resp = test::call_service(&app, webhook_request(&subscription_event("evt_123")).to_request())
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let ack: WebhookAck = test::read_body_json(resp).await;
    assert!(ack.received);
    assert!(!ack.duplicate);

    let user = storage.find_entitlements("u1").await.unwrap().unwrap();
    assert_eq!(user.subscription_tier, "premium");
    assert_eq!(user.subscription_plan_id.as_deref(), Some("plan_premium"));
    assert_eq!(user.daily_superlikes_remaining, 5);
    assert_eq!(
        user.subscription_expires_at,
        Some(Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap())
    );
    let subscription = storage.find_subscription("sub_1").await.unwrap().unwrap();
    assert_eq!(subscription.user_id, "u1");

    let resp = test::call_service(&app, webhook_request(&subscription_event("evt_123")).to_request())
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let ack: WebhookAck = test::read_body_json(resp).await;
    assert!(ack.duplicate);
}

#[actix_web::test]
async fn checkout_grants_items_and_debits_points() {
    let storage = memory_storage().await;
    seed_user(&storage, "u1", Some("cus_abc"), 1_000).await;
    seed_item(&storage, "item_sl5", "superlike_pack", 5, None).await;
    seed_item(&storage, "item_boost", "boost", 1, None).await;
    seed_product(&storage, "p1", 3).await;
    seed_checkout_payment(&storage, "cs_1", "u1", 4_998).await;
    let app = app!(build_state(storage.clone()));

    let items = json!([
        { "item_id": "item_sl5", "quantity": 2, "price": 9.99 },
        { "item_id": "item_boost", "quantity": 1, "points": 100 },
        { "product_id": "p1", "quantity": 1, "price": 20.0 }
    ]);
    let event = json!({
        "id": "evt_checkout",
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "cs_1",
                "payment_intent": "pi_1",
                "customer": "cus_abc",
                "amount_total": 4_998,
                "currency": "usd",
                "metadata": {
                    "user_id": "u1",
                    "payment_method": "both",
                    "points_to_deduct": "200",
                    "items": items.to_string()
                }
            }
        }
    });

    let before = Utc::now();
    let resp = test::call_service(&app, webhook_request(&event).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let user = storage.find_entitlements("u1").await.unwrap().unwrap();
    assert_eq!(user.superlike_balance, 10);
    assert_eq!(user.points_balance, 800);
    let boost = user.boost_expires_at.expect("boost granted");
    assert!(boost >= before + Duration::minutes(30));

    let payments = storage.payments_for_session("cs_1").await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, PaymentStatus::Succeeded);
    assert_eq!(payments[0].stripe_payment_intent_id.as_deref(), Some("pi_1"));

    let orders = storage.orders_for_user("u1").await.unwrap();
    assert_eq!(orders.len(), 3);
    assert_eq!(
        amora_storage::testing::product_stock(&storage, "p1").await,
        Some(2)
    );

    let ledger = storage.point_transactions("u1").await.unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].amount, -200);
    assert_eq!(ledger[0].reference.as_deref(), Some("cs_1"));
}

#[actix_web::test]
async fn event_registration_checkout_confirms_attendee() {
    let storage = memory_storage().await;
    seed_user(&storage, "u1", None, 0).await;
    seed_event_with_pending_attendee(&storage, "ev_1", "u1").await;
    seed_checkout_payment(&storage, "cs_event", "u1", 2_500).await;
    let app = app!(build_state(storage.clone()));

    let event = json!({
        "id": "evt_registration",
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "cs_event",
                "amount_total": 2_500,
                "metadata": { "type": "event_registration", "user_id": "u1", "event_id": "ev_1" }
            }
        }
    });
    let resp = test::call_service(&app, webhook_request(&event).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        attendee_status(&storage, "ev_1", "u1").await.as_deref(),
        Some("registered")
    );
    assert!(storage.orders_for_user("u1").await.unwrap().is_empty());
}

#[actix_web::test]
async fn admin_routes_require_bearer_token() {
    let app = app!(build_state(memory_storage().await));

    let missing = test::TestRequest::get()
        .uri("/api/admin/data-integrity")
        .to_request();
    assert_eq!(
        test::call_service(&app, missing).await.status(),
        StatusCode::UNAUTHORIZED
    );

    let wrong = test::TestRequest::get()
        .uri("/api/admin/data-integrity")
        .insert_header(("Authorization", "Bearer nope"))
        .to_request();
    assert_eq!(
        test::call_service(&app, wrong).await.status(),
        StatusCode::FORBIDDEN
    );
}

#[actix_web::test]
async fn avatar_fix_converges() {
    let storage = memory_storage().await;
    seed_user(&storage, "u1", None, 0).await;
    seed_profile(&storage, "u1", Some("Ana"), None).await;
    seed_photo(&storage, "photo_1", "u1", "u1/first.jpg", true, 0).await;
    let app = app!(build_state(storage.clone()));

    let req = test::TestRequest::get()
        .uri("/api/admin/data-integrity?check=avatars")
        .insert_header(bearer())
        .to_request();
    let report: IntegrityReport = test::call_and_read_body_json(&app, req).await;
    assert_eq!(report.total_users, 1);
    assert_eq!(report.issues.len(), 1);
    assert_eq!(report.issues[0].issue_type, IssueType::MissingAvatar);
    assert!(report.issues[0].auto_fixable);
    assert_eq!(report.summary.critical, 1);

    let req = test::TestRequest::post()
        .uri("/api/admin/data-integrity")
        .insert_header(bearer())
        .set_json(json!({
            "action": "fix_single",
            "userId": "u1",
            "issueType": "missing_avatar"
        }))
        .to_request();
    let fix: FixResponse = test::call_and_read_body_json(&app, req).await;
    assert!(fix.success);
    assert!(fix.result.expect("single fix result").success);

    let req = test::TestRequest::get()
        .uri("/api/admin/data-integrity?check=avatars")
        .insert_header(bearer())
        .to_request();
    let report: IntegrityReport = test::call_and_read_body_json(&app, req).await;
    assert!(report.issues.is_empty());
}

#[actix_web::test]
async fn unknown_check_is_a_bad_request() {
    let app = app!(build_state(memory_storage().await));
    let req = test::TestRequest::get()
        .uri("/api/admin/data-integrity?check=everything")
        .insert_header(bearer())
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::BAD_REQUEST
    );
}

#[actix_web::test]
async fn duplicate_matches_are_fixed_in_batch() {
    let storage = memory_storage().await;
    seed_user(&storage, "u1", None, 0).await;
    seed_user(&storage, "u2", None, 0).await;
    let now = Utc::now();
    seed_match(&storage, "m_old", "u1", "u2", now - Duration::hours(2)).await;
    seed_match(&storage, "m_new", "u1", "u2", now).await;
    let app = app!(build_state(storage.clone()));

    let req = test::TestRequest::get()
        .uri("/api/admin/match-integrity")
        .insert_header(bearer())
        .to_request();
    let report: IntegrityReport = test::call_and_read_body_json(&app, req).await;
    assert_eq!(report.issues.len(), 1);
    assert_eq!(report.issues[0].issue_type, IssueType::DuplicateMatch);

    let req = test::TestRequest::post()
        .uri("/api/admin/match-integrity")
        .insert_header(bearer())
        .set_json(json!({ "action": "fix_duplicate_matches" }))
        .to_request();
    let fix: FixResponse = test::call_and_read_body_json(&app, req).await;
    assert!(fix.success);
    assert_eq!(fix.fixed.map(|items| items.len()), Some(1));
    assert_eq!(fix.failed.map(|items| items.len()), Some(0));

    let req = test::TestRequest::get()
        .uri("/api/admin/match-integrity")
        .insert_header(bearer())
        .to_request();
    let report: IntegrityReport = test::call_and_read_body_json(&app, req).await;
    assert!(report.issues.is_empty());
}

#[actix_web::test]
async fn match_endpoint_rejects_profile_actions() {
    let app = app!(build_state(memory_storage().await));
    let req = test::TestRequest::post()
        .uri("/api/admin/match-integrity")
        .insert_header(bearer())
        .set_json(json!({ "action": "fix_avatars" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
}

#[actix_web::test]
async fn metrics_are_rendered() {
    let app = app!(build_state(memory_storage().await));
    let req = test::TestRequest::get().uri("/metrics").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

async fn premium_subscriber() -> SeaOrmStorage {
    let storage = memory_storage().await;
    seed_user(&storage, "u1", Some("cus_abc"), 0).await;
    seed_plan(
        &storage,
        "plan_premium",
        "premium",
        "price_monthly_premium",
        "price_yearly_premium",
        5,
    )
    .await;
    storage
}

macro_rules! admin_post {
    ($app:expr, $uri:expr, $body:expr $(,)?) => {{
        let req = test::TestRequest::post()
            .uri($uri)
            .insert_header(bearer())
            .set_json($body)
            .to_request();
        let response: FixResponse = test::call_and_read_body_json(&$app, req).await;
        response
    }};
}

macro_rules! admin_scan {
    ($app:expr, $uri:expr) => {{
        let req = test::TestRequest::get()
            .uri($uri)
            .insert_header(bearer())
            .to_request();
        let report: IntegrityReport = test::call_and_read_body_json(&$app, req).await;
        report
    }};
}

#[actix_web::test]
async fn subscription_deletion_downgrades_to_free() {
    let storage = premium_subscriber().await;
    let app = app!(build_state(storage.clone()));
    let resp = test::call_service(&app, webhook_request(&subscription_event("evt_up")).to_request())
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let deleted = json!({
        "id": "evt_del",
        "type": "customer.subscription.deleted",
        "data": {
            "object": {
                "id": "sub_1",
                "customer": "cus_abc",
                "status": "canceled",
                "ended_at": 1_700_100_000,
                "items": { "data": [ { "price": { "id": "price_monthly_premium" } } ] }
            }
        }
    });
    let resp = test::call_service(&app, webhook_request(&deleted).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let user = storage.find_entitlements("u1").await.unwrap().unwrap();
    assert_eq!(user.subscription_tier, "free");
    assert_eq!(user.subscription_plan_id, None);
    assert_eq!(user.daily_superlikes_remaining, 1);
    let subscription = storage.find_subscription("sub_1").await.unwrap().unwrap();
    assert_eq!(subscription.status, SubscriptionStatus::Canceled);
    assert_eq!(
        subscription.ended_at,
        Some(Utc.timestamp_opt(1_700_100_000, 0).unwrap())
    );
}

#[actix_web::test]
async fn paid_invoice_is_recorded_against_the_subscriber() {
    let storage = premium_subscriber().await;
    let app = app!(build_state(storage.clone()));
    let resp = test::call_service(&app, webhook_request(&subscription_event("evt_up")).to_request())
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let invoice = json!({
        "id": "evt_invoice",
        "type": "invoice.paid",
        "data": {
            "object": {
                "id": "in_1",
                "subscription": "sub_1",
                "customer": "cus_abc",
                "amount_paid": 999,
                "currency": "usd"
            }
        }
    });
    let resp = test::call_service(&app, webhook_request(&invoice).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let payments = storage.payments_for_subscription("sub_1").await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, PaymentStatus::Succeeded);
    assert_eq!(payments[0].amount, 999);
    assert_eq!(payments[0].user_id.as_deref(), Some("u1"));
    assert_eq!(payments[0].stripe_invoice_id.as_deref(), Some("in_1"));
}

#[actix_web::test]
async fn points_pack_checkout_credits_points_with_order_reference() {
    let storage = memory_storage().await;
    seed_user(&storage, "u1", None, 0).await;
    seed_item(&storage, "item_pp", "points_pack", 500, None).await;
    seed_checkout_payment(&storage, "cs_pp", "u1", 1_998).await;
    let app = app!(build_state(storage.clone()));

    let event = json!({
        "id": "evt_pp",
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "cs_pp",
                "amount_total": 1_998,
                "metadata": {
                    "user_id": "u1",
                    "items": json!([{ "item_id": "item_pp", "quantity": 2, "price": 19.98 }]).to_string()
                }
            }
        }
    });
    let resp = test::call_service(&app, webhook_request(&event).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let user = storage.find_entitlements("u1").await.unwrap().unwrap();
    assert_eq!(user.points_balance, 1_000);
    assert_eq!(
        storage
            .inventory_quantity("u1", &ItemType::PointsPack)
            .await
            .unwrap(),
        1_000
    );
    let orders = storage.orders_for_user("u1").await.unwrap();
    assert_eq!(orders.len(), 1);
    let ledger = storage.point_transactions("u1").await.unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].amount, 1_000);
    assert_eq!(ledger[0].kind, PointTransactionKind::Purchase);
    assert_eq!(ledger[0].reference.as_deref(), Some(orders[0].id.as_str()));
}

#[actix_web::test]
async fn missing_primary_fix_promotes_first_photo_and_converges() {
    let storage = memory_storage().await;
    seed_user(&storage, "u1", None, 0).await;
    seed_profile(&storage, "u1", Some("Ana"), Some("u1/g1.jpg")).await;
    seed_photo(&storage, "g3", "u1", "u1/g3.jpg", false, 2).await;
    seed_photo(&storage, "g1", "u1", "u1/g1.jpg", false, 0).await;
    seed_photo(&storage, "g2", "u1", "u1/g2.jpg", false, 1).await;
    let app = app!(build_state(storage.clone()));

    let report = admin_scan!(app, "/api/admin/data-integrity?check=gallery");
    assert_eq!(report.issues.len(), 1);
    let issue = &report.issues[0];
    assert_eq!(issue.issue_type, IssueType::MissingPrimaryPhoto);

    let fix = admin_post!(
        app,
        "/api/admin/data-integrity",
        json!({
            "action": "fix_single",
            "userId": issue.user_id,
            "issueType": issue.issue_type,
            "details": issue.details,
        }),
    );
    assert!(fix.success);

    let primary: Vec<String> = storage
        .gallery_for_user("u1")
        .await
        .unwrap()
        .into_iter()
        .filter(|photo| photo.is_primary)
        .map(|photo| photo.id)
        .collect();
    assert_eq!(primary, vec!["g1".to_string()]);
    let report = admin_scan!(app, "/api/admin/data-integrity?check=gallery");
    assert!(report.issues.is_empty());
}

#[actix_web::test]
async fn gallery_batch_removes_unresolvable_rows() {
    let storage = memory_storage().await;
    for user in ["u1", "u2"] {
        seed_user(&storage, user, None, 0).await;
    }
    seed_photo(&storage, "b1", "u1", "null", true, 0).await;
    seed_photo(&storage, "b2", "u1", "u1/b2.jpg", false, 1).await;
    seed_photo(&storage, "p1", "u2", "u2/p1.jpg", true, 0).await;
    seed_photo(&storage, "p2", "u2", "undefined", false, 1).await;
    let app = app!(build_state(storage.clone()));

    let report = admin_scan!(app, "/api/admin/data-integrity?check=gallery");
    let mut types: Vec<IssueType> = report.issues.iter().map(|i| i.issue_type).collect();
    types.sort();
    let mut expected = vec![IssueType::BrokenPrimaryPhoto, IssueType::OrphanedGalleryRecord];
    expected.sort();
    assert_eq!(types, expected);

    let fix = admin_post!(
        app,
        "/api/admin/data-integrity",
        json!({ "action": "fix_gallery" }),
    );
    assert_eq!(fix.fixed.map(|items| items.len()), Some(2));
    assert_eq!(fix.failed.map(|items| items.len()), Some(0));

    let u1: Vec<(String, bool)> = storage
        .gallery_for_user("u1")
        .await
        .unwrap()
        .into_iter()
        .map(|photo| (photo.id, photo.is_primary))
        .collect();
    assert_eq!(u1, vec![("b2".to_string(), true)]);
    let u2 = storage.gallery_for_user("u2").await.unwrap();
    assert_eq!(u2.len(), 1);
    assert_eq!(u2[0].id, "p1");

    let report = admin_scan!(app, "/api/admin/data-integrity?check=gallery");
    assert!(report.issues.is_empty());
}

#[actix_web::test]
async fn duplicate_conversations_merge_into_the_oldest() {
    let storage = memory_storage().await;
    for user in ["u1", "u2"] {
        seed_user(&storage, user, None, 0).await;
    }
    let now = Utc::now();
    seed_conversation(&storage, "c_old", &["u1", "u2"], 2, now - Duration::hours(1)).await;
    seed_conversation(&storage, "c_new", &["u2", "u1"], 3, now).await;
    let app = app!(build_state(storage.clone()));

    let report = admin_scan!(app, "/api/admin/match-integrity");
    assert_eq!(report.issues.len(), 1);
    assert_eq!(report.issues[0].issue_type, IssueType::DuplicateConversation);

    let fix = admin_post!(
        app,
        "/api/admin/match-integrity",
        json!({ "action": "fix_duplicate_conversations" }),
    );
    let fixed = fix.fixed.expect("batch result");
    assert_eq!(fixed.len(), 1);
    assert!(fixed[0].message.contains("c_old"));
    assert!(fixed[0].message.contains("moved 3 message(s)"));

    let remaining: Vec<String> = storage
        .direct_conversations()
        .await
        .unwrap()
        .into_iter()
        .map(|conversation| conversation.id)
        .collect();
    assert_eq!(remaining, vec!["c_old".to_string()]);
    let report = admin_scan!(app, "/api/admin/match-integrity");
    assert!(report.issues.is_empty());
}

#[actix_web::test]
async fn orphaned_conversations_fix_from_scanned_issue_and_in_batch() {
    let storage = memory_storage().await;
    seed_user(&storage, "u3", None, 0).await;
    let now = Utc::now();
    seed_conversation(&storage, "c_empty", &[], 0, now).await;
    seed_conversation(&storage, "c_solo", &["u3"], 1, now).await;
    let app = app!(build_state(storage.clone()));

    let report = admin_scan!(app, "/api/admin/match-integrity");
    assert_eq!(report.issues.len(), 2);
    let empty: &DataIntegrityIssue = report
        .issues
        .iter()
        .find(|issue| issue.details["conversationId"] == "c_empty")
        .expect("empty conversation reported");
    assert_eq!(empty.issue_type, IssueType::OrphanedConversation);
    assert_eq!(empty.user_id, "");

    let fix = admin_post!(
        app,
        "/api/admin/match-integrity",
        json!({
            "action": "fix_single",
            "userId": empty.user_id,
            "issueType": empty.issue_type,
            "details": empty.details,
        }),
    );
    assert!(fix.success);

    let fix = admin_post!(
        app,
        "/api/admin/match-integrity",
        json!({ "action": "fix_orphaned_conversations" }),
    );
    assert_eq!(fix.fixed.map(|items| items.len()), Some(1));

    assert!(storage.direct_conversations().await.unwrap().is_empty());
    let report = admin_scan!(app, "/api/admin/match-integrity");
    assert!(report.issues.is_empty());
}
