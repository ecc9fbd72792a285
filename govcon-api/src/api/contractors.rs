//! Contractor iceberg and profile lookups

use axum::{
    extract::{Path, State},
    Json,
};
use govcon_common::db::{
    fetch_iceberg, fetch_profile, fetch_profile_for_uei, IcebergOpportunity, ProfileWithMembers,
};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// GET /api/contractors/:uei/iceberg
pub async fn get_contractor_iceberg(
    State(state): State<AppState>,
    Path(uei): Path<String>,
) -> ApiResult<Json<IcebergOpportunity>> {
    fetch_iceberg(&state.db, &uei)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No iceberg record for UEI {}", uei)))
}

/// GET /api/contractors/:uei/profile
pub async fn get_contractor_profile(
    State(state): State<AppState>,
    Path(uei): Path<String>,
) -> ApiResult<Json<ProfileWithMembers>> {
    fetch_profile_for_uei(&state.db, &uei)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("UEI {} is not mapped to a profile", uei)))
}

/// GET /api/profiles/:profile_key
pub async fn get_profile(
    State(state): State<AppState>,
    Path(profile_key): Path<String>,
) -> ApiResult<Json<ProfileWithMembers>> {
    fetch_profile(&state.db, &profile_key)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No profile {}", profile_key)))
}
