//! Integration tests for govcon-api endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use govcon_api::rate_limit::{InMemoryStore, RateLimiter};
use govcon_api::{build_router, AppState};
use govcon_common::config::{RateLimitPolicy, RateLimitScope};
use govcon_common::db::{init_database, record_load, LoadLogEntry, LoadStatus, LoadType};
use serde_json::Value;
use sqlx::SqlitePool;
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot`

async fn setup() -> (TempDir, SqlitePool, Router) {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("govcon.db")).await.unwrap();
    let limiter = Arc::new(RateLimiter::new(
        Arc::new(InMemoryStore::new()),
        vec![RateLimitPolicy {
            name: "per-ip".to_string(),
            scope: RateLimitScope::Ip,
            limit: 1000,
            window_ms: 60_000,
        }],
    ));
    let app = build_router(AppState::new(pool.clone(), limiter));
    (dir, pool, app)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("X-Forwarded-For", "198.51.100.7")
        .body(Body::empty())
        .unwrap()
}

async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

fn log_entry(table: &str, status: LoadStatus) -> LoadLogEntry {
    let now = Utc::now();
    LoadLogEntry {
        table_name: table.to_string(),
        records_processed: 10,
        records_inserted: 8,
        records_updated: 2,
        records_skipped: 0,
        records_failed: 0,
        load_start_time: now,
        load_end_time: now,
        load_duration_ms: 12,
        load_status: status,
        error_message: None,
        loaded_by: "test".to_string(),
        load_type: LoadType::Import,
    }
}

async fn seed_profile(pool: &SqlitePool) {
    sqlx::query(
        "INSERT INTO contractor_profiles
             (profile_key, display_name, primary_uei, uei_count, total_lifetime_revenue,
              is_prime, agency_hhi, concentration_risk, top_agencies, last_rebuild_id)
         VALUES ('name:ACME', 'Acme LLC', 'U1', 2, 500.0, 1, 0.68, 'high',
                 '[{\"category\":\"DOD\",\"revenue\":400.0,\"percentage\":80.0}]', 'r1')",
    )
    .execute(pool)
    .await
    .unwrap();
    for uei in ["U1", "U2"] {
        sqlx::query("INSERT INTO profile_uei_map (uei, profile_key) VALUES (?, 'name:ACME')")
            .bind(uei)
            .execute(pool)
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let (_dir, _pool, app) = setup().await;

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "govcon-api");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_load_logs_newest_first() {
    let (_dir, pool, app) = setup().await;
    record_load(&pool, &log_entry("contractor_universe", LoadStatus::Success))
        .await
        .unwrap();
    record_load(&pool, &log_entry("monthly_metrics", LoadStatus::Partial))
        .await
        .unwrap();

    let response = app.oneshot(get("/api/load-logs")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["limit"], 50);
    let loads = body["loads"].as_array().unwrap();
    assert_eq!(loads.len(), 2);
    assert_eq!(loads[0]["tableName"], "monthly_metrics");
    assert_eq!(loads[0]["loadStatus"], "partial");
    assert_eq!(loads[0]["loadType"], "import");
    assert_eq!(loads[1]["recordsInserted"], 8);
}

#[tokio::test]
async fn test_load_logs_limit_handling() {
    let (_dir, pool, app) = setup().await;
    for _ in 0..3 {
        record_load(&pool, &log_entry("peer_comparisons", LoadStatus::Success))
            .await
            .unwrap();
    }

    let response = app.clone().oneshot(get("/api/load-logs?limit=2")).await.unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["loads"].as_array().unwrap().len(), 2);

    let response = app.clone().oneshot(get("/api/load-logs?limit=9999")).await.unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["limit"], 500);

    let response = app.clone().oneshot(get("/api/load-logs?limit=0")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let response = app.oneshot(get("/api/load-logs?limit=abc")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_iceberg_lookup() {
    let (_dir, pool, app) = setup().await;
    sqlx::query(
        "INSERT INTO iceberg_opportunities
             (uei, prime_revenue, sub_revenue, total_revenue, sub_to_prime_ratio,
              hidden_revenue_pct, opportunity_score, opportunity_tier)
         VALUES ('U1', 100.0, 200.0, 300.0, 2.0, 66.7, 100.0, 'high')",
    )
    .execute(&pool)
    .await
    .unwrap();

    let response = app.clone().oneshot(get("/api/contractors/U1/iceberg")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["uei"], "U1");
    assert_eq!(body["subToPrimeRatio"], 2.0);
    assert_eq!(body["opportunityTier"], "high");

    let response = app.oneshot(get("/api/contractors/NOPE/iceberg")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    assert!(body["error"]["message"].as_str().unwrap().contains("NOPE"));
}

#[tokio::test]
async fn test_profile_lookups() {
    let (_dir, pool, app) = setup().await;
    seed_profile(&pool).await;

    let response = app.clone().oneshot(get("/api/contractors/U2/profile")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["profileKey"], "name:ACME");
    assert_eq!(body["displayName"], "Acme LLC");
    assert_eq!(body["ueis"], serde_json::json!(["U1", "U2"]));
    assert_eq!(body["topAgencies"][0]["category"], "DOD");
    assert_eq!(body["concentrationRisk"], "high");

    let response = app.clone().oneshot(get("/api/profiles/name:ACME")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["ueiCount"], 2);

    let response = app.clone().oneshot(get("/api/profiles/name:MISSING")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.oneshot(get("/api/contractors/U9/profile")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
