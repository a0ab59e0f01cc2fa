//! Notification handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::{error::Result, models::*, services::page_params, AppState};

use super::AuthUser;

pub async fn list_notifications(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<ApiResponse<NotificationPage>>> {
    let page = page_params(query.page, query.limit, &state.config.limits)?;
    let notifications = state
        .notifications
        .list(&auth.user_id, query.is_read, page)
        .await?;
    Ok(Json(ApiResponse::ok("Notifications loaded", notifications)))
}

pub async fn mark_as_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(notification_id): Path<String>,
) -> Result<Json<ApiResponse<()>>> {
    state
        .notifications
        .mark_as_read(&notification_id, &auth.user_id)
        .await?;

    state.presence.send_to_user(
        &auth.user_id,
        ServerEvent::NotificationRead(NotificationReadPayload {
            notification_id: Some(notification_id),
        }),
    );

    Ok(Json(ApiResponse::message("Notification marked as read")))
}

pub async fn mark_all_as_read(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<()>>> {
    let updated = state.notifications.mark_all_as_read(&auth.user_id).await?;

    state.presence.send_to_user(
        &auth.user_id,
        ServerEvent::NotificationRead(NotificationReadPayload { notification_id: None }),
    );

    Ok(Json(ApiResponse::message(format!("{} notifications marked as read", updated))))
}

pub async fn delete_notification(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(notification_id): Path<String>,
) -> Result<Json<ApiResponse<()>>> {
    state
        .notifications
        .delete(&notification_id, &auth.user_id)
        .await?;
    Ok(Json(ApiResponse::message("Notification deleted")))
}
