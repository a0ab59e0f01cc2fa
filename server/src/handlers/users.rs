//! User handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::{error::Result, models::*, services::page_params, AppState};

use super::AuthUser;

pub async fn search_users(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<SearchQuery>,
) -> Result<Json<ApiResponse<Page<UserSummary>>>> {
    let page = page_params(query.page, query.limit, &state.config.limits)?;
    let results = state.users.search(&auth.user_id, &query.q, page).await?;
    Ok(Json(ApiResponse::ok("Search results", results)))
}

pub async fn get_user(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(user_id): Path<String>,
) -> Result<Json<ApiResponse<UserProfile>>> {
    let profile = state.users.get_profile(&user_id).await?;
    Ok(Json(ApiResponse::ok("User found", profile)))
}

pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<ApiResponse<UserProfile>>> {
    let profile = state.users.update_profile(&auth.user_id, req).await?;
    Ok(Json(ApiResponse::ok("Profile updated", profile)))
}

/// Change presence status and announce it to connected clients
pub async fn update_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<ApiResponse<UserProfile>>> {
    let at = state.users.update_status(&auth.user_id, req.status).await?;

    state.presence.broadcast_all(ServerEvent::StatusChanged(PresencePayload {
        user_id: auth.user_id.clone(),
        status: req.status,
        timestamp: Some(at),
        last_seen: None,
    }));

    let profile = state.users.get_profile(&auth.user_id).await?;
    Ok(Json(ApiResponse::ok("Status updated", profile)))
}
