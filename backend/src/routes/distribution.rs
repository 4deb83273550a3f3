use crate::commands::distribution::{allocation, record, report, request};
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/distribution/allocations",
            get(allocation::get_allocations).post(allocation::create_allocation),
        )
        .route(
            "/api/distribution/allocations/:key",
            get(allocation::get_allocation)
                .put(allocation::update_allocation)
                .delete(allocation::delete_allocation),
        )
        .route(
            "/api/distribution/requests",
            get(request::get_requests).post(request::create_request),
        )
        .route(
            "/api/distribution/requests/:id",
            get(request::get_request)
                .put(request::update_request)
                .delete(request::delete_request),
        )
        .route(
            "/api/distribution/records",
            get(record::get_records).post(record::create_record),
        )
        .route(
            "/api/distribution/gap-analysis/:season",
            get(report::get_gap_analysis),
        )
        .route(
            "/api/distribution/recommendations/:season",
            get(report::get_recommendations),
        )
        .route(
            "/api/distribution/barangay-shortages/:season",
            get(report::get_barangay_shortages),
        )
        .route(
            "/api/distribution/historical-comparison",
            get(report::get_historical_comparison),
        )
}
