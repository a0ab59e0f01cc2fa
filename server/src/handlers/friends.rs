//! Friend and block handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{error::Result, models::*, services::page_params, AppState};

use super::AuthUser;

pub async fn list_friends(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<ApiResponse<Page<UserSummary>>>> {
    let page = page_params(query.page, query.limit, &state.config.limits)?;
    let friends = state.friends.get_friends(&auth.user_id, page).await?;
    Ok(Json(ApiResponse::ok("Friends loaded", friends)))
}

pub async fn received_requests(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<Vec<FriendRequestView>>>> {
    let requests = state.friends.get_friend_requests(&auth.user_id).await?;
    Ok(Json(ApiResponse::ok("Friend requests loaded", requests)))
}

pub async fn sent_requests(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<Vec<FriendRequestView>>>> {
    let requests = state.friends.get_sent_requests(&auth.user_id).await?;
    Ok(Json(ApiResponse::ok("Sent requests loaded", requests)))
}

pub async fn send_request(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<SendFriendRequestRequest>,
) -> Result<(StatusCode, Json<ApiResponse<FriendRequestView>>)> {
    let request = state
        .friends
        .send_request(&auth.user_id, &req.receiver_id, req.message.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok("Friend request sent", request))))
}

pub async fn accept_request(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(request_id): Path<String>,
) -> Result<Json<ApiResponse<FriendRequestView>>> {
    let request = state.friends.accept_request(&request_id, &auth.user_id).await?;
    Ok(Json(ApiResponse::ok("Friend request accepted", request)))
}

pub async fn reject_request(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(request_id): Path<String>,
) -> Result<Json<ApiResponse<FriendRequestView>>> {
    let request = state.friends.reject_request(&request_id, &auth.user_id).await?;
    Ok(Json(ApiResponse::ok("Friend request rejected", request)))
}

pub async fn cancel_request(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(request_id): Path<String>,
) -> Result<Json<ApiResponse<()>>> {
    state.friends.cancel_request(&request_id, &auth.user_id).await?;
    Ok(Json(ApiResponse::message("Friend request cancelled")))
}

pub async fn remove_friend(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(friend_id): Path<String>,
) -> Result<Json<ApiResponse<()>>> {
    state.friends.remove_friend(&auth.user_id, &friend_id).await?;
    Ok(Json(ApiResponse::message("Friend removed")))
}

pub async fn blocked_users(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<Vec<UserSummary>>>> {
    let users = state.friends.get_blocked_users(&auth.user_id).await?;
    Ok(Json(ApiResponse::ok("Blocked users loaded", users)))
}

pub async fn block_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<BlockUserRequest>,
) -> Result<Json<ApiResponse<()>>> {
    state
        .friends
        .block_user(&auth.user_id, &req.user_id, req.reason.as_deref())
        .await?;
    Ok(Json(ApiResponse::message("User blocked")))
}

pub async fn unblock_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<String>,
) -> Result<Json<ApiResponse<()>>> {
    state.friends.unblock_user(&auth.user_id, &user_id).await?;
    Ok(Json(ApiResponse::message("User unblocked")))
}
