#![cfg(feature = "postgres-tests")]

use std::sync::Arc;

use assess_config::AppConfig;
use assess_domain::{CefrLevel, Item};
use assess_api::{build_router, AppState};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;

fn test_config() -> AppConfig {
    AppConfig {
        database_url: String::new(),
        bind_address: "0.0.0.0:0".to_string(),
        session_ttl_minutes: 120,
        expiry_scan_interval_s: 60,
        default_request_deadline_ms: 5000,
        quadrature_size: 41,
        top_k_selection: 1,
        irt_model: "2pl".to_string(),
        recommendation_courses_per_skill: 2,
        admin_api_key: String::new(),
    }
}

fn admin_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-user-id", Uuid::new_v4().to_string())
        .header("x-user-role", "admin")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[sqlx::test]
async fn health_and_ready_report_ok(pool: PgPool) -> Result<(), sqlx::Error> {
    let state = Arc::new(AppState::new(pool, test_config()));
    let app = build_router(state);

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/v1/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");

    let response = app
        .oneshot(Request::builder().uri("/v1/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["database"], "connected");
    Ok(())
}

#[sqlx::test]
async fn admin_endpoints_reject_non_admin_callers(pool: PgPool) -> Result<(), sqlx::Error> {
    let state = Arc::new(AppState::new(pool, test_config()));
    let app = build_router(state);

    let request = Request::builder()
        .method("POST")
        .uri("/v1/admin/pathways")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-user-id", Uuid::new_v4().to_string())
        .header("x-user-role", "student")
        .body(Body::from(
            json!({ "id": Uuid::new_v4(), "name": "general english", "active": true }).to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    Ok(())
}

#[sqlx::test]
async fn start_assessment_without_identity_headers_is_unauthorized(
    pool: PgPool,
) -> Result<(), sqlx::Error> {
    let state = Arc::new(AppState::new(pool, test_config()));
    let app = build_router(state);

    let request = Request::builder()
        .method("POST")
        .uri("/v1/assessments/start")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "assigned_id": Uuid::new_v4() }).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

/// End-to-end happy path through the public HTTP surface: author a pathway,
/// template, config and items as an admin, assign the template, then drive a
/// placement session to completion as the test taker.
#[sqlx::test]
async fn full_placement_flow_through_http(pool: PgPool) -> Result<(), sqlx::Error> {
    let state = Arc::new(AppState::new(pool, test_config()));
    let app = build_router(state);

    let pathway_id = Uuid::new_v4();
    let response = app
        .clone()
        .oneshot(admin_request(
            "POST",
            "/v1/admin/pathways",
            json!({ "id": pathway_id, "name": "general english", "active": true }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let template_id = Uuid::new_v4();
    let response = app
        .clone()
        .oneshot(admin_request(
            "POST",
            "/v1/admin/templates",
            json!({
                "id": template_id,
                "pathway_id": pathway_id,
                "assessment_type": "PLACEMENT",
                "rubric": {},
                "version": 1,
                "published_at": chrono::Utc::now(),
                "active": true,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(admin_request(
            "POST",
            "/v1/admin/templates/configs",
            json!({
                "template_id": template_id,
                "adaptive_params": {
                    "model": "twopl",
                    "starting_ability": 0.0,
                    "min_questions": 2,
                    "max_questions": 3,
                    "stopping_criterion": { "standard_error": 0.3 },
                    "skill_areas": { "grammar": { "min_items": 0, "max_items": 5 } },
                    "top_k_selection": 1,
                    "quadrature_size": 41,
                    "target_cefr_policy": { "policy": "current_plus_one" },
                    "proficiency_range": [
                        [-4.0, "A1"],
                        [-2.5, "A2"],
                        [-1.0, "B1"],
                        [0.5, "B2"],
                        [2.0, "C1"],
                        [3.0, "C2"]
                    ],
                },
                "speaking_params": null,
                "writing_params": null,
                "recommendation_courses_per_skill": 2,
                "active": true,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    for b in [-1.0, 0.0, 1.0, 1.5] {
        let item = Item {
            id: Uuid::new_v4(),
            content: json!({ "answer": "b" }),
            item_type: "multiple_choice".to_string(),
            skill_areas: ["grammar".to_string()].into_iter().collect(),
            target_cefr: CefrLevel::B1,
            irt_params: assess_domain::IrtParams { a: 1.2, b, c: 0.1 },
            active: true,
        };
        let response = app
            .clone()
            .oneshot(admin_request(
                "POST",
                "/v1/admin/items",
                serde_json::to_value(&item).unwrap(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let test_taker_id = Uuid::new_v4();
    let response = app
        .clone()
        .oneshot(admin_request(
            "POST",
            "/v1/admin/assessments/assign",
            json!({ "template_id": template_id, "test_taker_id": test_taker_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let assigned_id: Uuid = serde_json::from_value(body["assigned_ids"][0].clone()).unwrap();

    let student_id = Uuid::new_v4();
    let request = Request::builder()
        .method("POST")
        .uri("/v1/assessments/start")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-user-id", student_id.to_string())
        .header("x-user-role", "student")
        .body(Body::from(json!({ "assigned_id": assigned_id }).to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let session_id: Uuid = serde_json::from_value(body["session_id"].clone()).unwrap();
    let mut item_id: Uuid = serde_json::from_value(body["question"]["item_id"].clone()).unwrap();
    let mut current_index = 0u32;

    loop {
        let answer = json!({
            "item_id": item_id,
            "response_data": { "answer": "b" },
            "time_taken_ms": 1500,
            "current_index": current_index,
        });
        let request = Request::builder()
            .method("POST")
            .uri(format!("/v1/assessments/{session_id}/answer"))
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-user-id", student_id.to_string())
            .header("x-user-role", "student")
            .body(Body::from(answer.to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;

        if body["outcome"] == "completed" {
            break;
        }
        item_id = serde_json::from_value(body["question"]["item_id"].clone()).unwrap();
        current_index += 1;
    }

    let request = Request::builder()
        .method("GET")
        .uri(format!("/v1/assessments/{session_id}"))
        .header("x-user-id", student_id.to_string())
        .header("x-user-role", "student")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "COMPLETED");

    Ok(())
}
