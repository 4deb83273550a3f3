#[cfg(test)]
mod tests {
    use crate::routes::build_app;
    use crate::state::{test_state, AppState};
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request should build");

        let response = app.oneshot(request).await.expect("router should respond");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    fn offline_app() -> Router {
        build_app(test_state())
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (status, body) = send(offline_app(), Method::GET, "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "OK");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn submission_without_parcels_is_rejected() {
        let (status, body) = send(
            offline_app(),
            Method::POST,
            "/api/rsbsa_submission",
            Some(json!({
                "draftId": 3,
                "data": { "lastName": "Santos", "firstName": "Maria", "farmlandParcels": [] }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "At least one farmland parcel is required");
    }

    #[tokio::test]
    async fn submission_without_ownership_is_rejected() {
        let (status, body) = send(
            offline_app(),
            Method::POST,
            "/api/rsbsa_submission",
            Some(json!({
                "data": {
                    "lastName": "Santos",
                    "firstName": "Maria",
                    "farmlandParcels": [{ "totalFarmAreaHa": 1.2 }]
                }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error"],
            "At least one farmland parcel must have an ownership type (registered owner, tenant, or lessee)"
        );
    }

    #[tokio::test]
    async fn malformed_ids_are_bad_requests() {
        for (method, uri) in [
            (Method::DELETE, "/api/rsbsa_submission/abc"),
            (Method::GET, "/api/rsbsa_submission/12x"),
            (Method::GET, "/api/distribution/requests/-4"),
        ] {
            let (status, body) = send(offline_app(), method, uri, None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
            assert_eq!(body["error"], "Invalid ID format");
        }
    }

    #[tokio::test]
    async fn unknown_submission_status_is_rejected_before_lookup() {
        let (status, body) = send(
            offline_app(),
            Method::PUT,
            "/api/rsbsa_submission/1",
            Some(json!({ "status": "Pending" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error"],
            "Invalid status. Must be one of: Submitted, Active Farmer, Not Active"
        );

        let (status, body) = send(
            offline_app(),
            Method::PUT,
            "/api/rsbsa_submission/1",
            Some(json!({ "favouriteColour": "green" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No valid fields to update");
    }

    #[tokio::test]
    async fn registration_rules_are_enforced() {
        let (status, body) = send(
            offline_app(),
            Method::POST,
            "/api/register",
            Some(json!({
                "username": "pedro",
                "email": "pedro@da.gov.ph",
                "password": "secret1",
                "role": "technician"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Technician usernames must end with .tech");

        let (status, body) = send(
            offline_app(),
            Method::POST,
            "/api/register",
            Some(json!({ "username": "pedro.tech" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "All fields are required");
    }

    #[tokio::test]
    async fn login_requires_credentials() {
        let (status, body) = send(
            offline_app(),
            Method::POST,
            "/api/login",
            Some(json!({ "username": "admin" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Username and password are required");
    }

    #[tokio::test]
    async fn distribution_inputs_are_validated() {
        let (status, body) = send(
            offline_app(),
            Method::GET,
            "/api/distribution/gap-analysis/harvest_2025",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error"],
            "Invalid season 'harvest_2025'. Expected wet_YYYY or dry_YYYY"
        );

        let (status, _) = send(
            offline_app(),
            Method::GET,
            "/api/distribution/requests?status=shipped",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            offline_app(),
            Method::POST,
            "/api/distribution/allocations",
            Some(json!({ "season": "wet_2025", "urea_46_0_0_bags": -5 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]
            .as_str()
            .unwrap_or_default()
            .ends_with("must be a non-negative number"));
    }

    #[tokio::test]
    async fn non_object_bodies_are_rejected() {
        let (status, body) = send(
            offline_app(),
            Method::POST,
            "/api/distribution/requests",
            Some(json!([1, 2, 3])),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Request body must be a JSON object");
    }

    #[tokio::test]
    async fn mistyped_bodies_get_json_errors() {
        let (status, body) = send(
            offline_app(),
            Method::POST,
            "/api/register",
            Some(json!({ "username": 5, "email": "x@y.ph", "password": "secret1", "role": "admin" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["error"]
            .as_str()
            .unwrap_or_default()
            .starts_with("Invalid request body"));

        let (status, body) = send(
            offline_app(),
            Method::POST,
            "/api/login",
            Some(json!({ "username": ["admin"], "password": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (status, body) = send(
            offline_app(),
            Method::PUT,
            "/api/rsbsa_farm_parcels/1",
            Some(json!(["not", "an", "object"])),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Request body must be a JSON object");
    }

    #[tokio::test]
    async fn quantities_beyond_column_range_are_rejected() {
        let (status, body) = send(
            offline_app(),
            Method::POST,
            "/api/distribution/allocations",
            Some(json!({ "season": "wet_2025", "urea_46_0_0_bags": 1e11 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]
            .as_str()
            .unwrap_or_default()
            .ends_with("must be a non-negative number"));

        let (status, body) = send(
            offline_app(),
            Method::PUT,
            "/api/rsbsa_farm_parcels/1",
            Some(json!({ "totalFarmAreaHa": 1e9 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Farm area must be a non-negative number");
    }

    // The tests below need a live Postgres at DATABASE_URL:
    // cargo test -- --ignored

    async fn live_state() -> AppState {
        use crate::config::AppConfig;
        use crate::db;
        use std::sync::Arc;

        dotenvy::dotenv().ok();
        let config = AppConfig::from_env().expect("config should load");
        let pool = db::init_pool(&config.database_url).expect("Failed to create pool");
        db::init_database(&pool, &config)
            .await
            .expect("Failed to prepare database");
        AppState {
            pool,
            config: Arc::new(config),
        }
    }

    #[tokio::test]
    #[ignore]
    async fn submission_lifecycle_round_trip() {
        let state = live_state().await;

        let (status, created) = send(
            build_app(state.clone()),
            Method::POST,
            "/api/rsbsa_submission",
            Some(json!({
                "draftId": null,
                "data": {
                    "lastName": "Integration",
                    "firstName": "Test",
                    "barangay": "Calao",
                    "farmlandParcels": [
                        { "totalFarmAreaHa": 1.5, "farmLocationBarangay": "Calao", "ownershipTypeRegisteredOwner": true },
                        { "totalFarmAreaHa": "2", "ownershipTypeTenant": true, "landOwnerName": "Cruz, Jose" }
                    ]
                }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{}", created);
        assert_eq!(created["parcelCount"], 2);
        assert_eq!(created["totalFarmArea"], 3.5);
        let id = created["submissionId"].as_i64().expect("id should be numeric");

        let (status, record) = send(
            build_app(state.clone()),
            Method::GET,
            &format!("/api/rsbsa_submission/{}", id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(record["TOTAL FARM AREA"], 3.5);
        assert_eq!(record["status"], "Submitted");
        assert_eq!(record["parcels"].as_array().map(Vec::len), Some(2));

        let (status, updated) = send(
            build_app(state.clone()),
            Method::PUT,
            &format!("/api/rsbsa_submission/{}", id),
            Some(json!({ "status": "Active Farmer" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["status"], "Active Farmer");
        assert_eq!(updated["farmerName"], "Integration, Test");

        let (status, deleted) = send(
            build_app(state.clone()),
            Method::DELETE,
            &format!("/api/rsbsa_submission/{}", id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(deleted["message"], "RSBSA submission deleted successfully");

        let (status, _) = send(
            build_app(state),
            Method::DELETE,
            &format!("/api/rsbsa_submission/{}", id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    #[ignore]
    async fn duplicate_registration_conflicts() {
        let state = live_state().await;
        let username = format!("it{}.jo", chrono::Utc::now().timestamp_millis());
        let body = json!({
            "username": username,
            "email": format!("{}@example.ph", username),
            "password": "secret12",
            "role": "jo"
        });

        let (status, created) =
            send(build_app(state.clone()), Method::POST, "/api/register", Some(body.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(created["user"]["password_hash"].is_null());

        let (status, _) =
            send(build_app(state.clone()), Method::POST, "/api/register", Some(body)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, login) = send(
            build_app(state.clone()),
            Method::POST,
            "/api/login",
            Some(json!({ "username": username, "password": "secret12" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(login["token"].is_string());

        let (status, _) = send(
            build_app(state.clone()),
            Method::POST,
            "/api/login",
            Some(json!({ "username": username, "password": "wrong-one" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let _ = sqlx::query("DELETE FROM users WHERE username = $1")
            .bind(&username)
            .execute(&state.pool)
            .await;
    }
}
