use crate::commands::rsbsa::{parcel, submission, views};
use crate::state::AppState;
use axum::{
    routing::{get, put},
    Router,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/rsbsa_submission",
            get(submission::get_submissions).post(submission::create_submission),
        )
        .route(
            "/api/rsbsa_submission/:id",
            get(submission::get_submission)
                .put(submission::update_submission)
                .delete(submission::delete_submission),
        )
        .route(
            "/api/rsbsa_submission/:id/parcels",
            get(parcel::get_submission_parcels),
        )
        .route("/api/rsbsa_farm_parcels", get(parcel::get_all_parcels))
        .route(
            "/api/rsbsa_farm_parcels/by-farmer",
            get(parcel::get_parcels_by_farmer),
        )
        .route("/api/rsbsa_farm_parcels/:id", put(parcel::update_parcel))
        .route("/api/landowners", get(views::get_landowners))
        .route("/api/registered-owners", get(views::get_registered_owners))
        .route("/api/farmers/summary", get(views::get_farmer_summary))
}
