//! Message handlers
//!
//! Mutations broadcast the same events to the chat group as their
//! real-time counterparts.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{error::Result, models::*, services::page_params, AppState};

use super::AuthUser;

pub async fn send_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<ApiResponse<MessageView>>)> {
    let view = state.messages.send_message(&auth.user_id, req).await?;

    state
        .presence
        .broadcast_to_room(&view.chat_id, ServerEvent::MessageNew(view.clone()), None);

    Ok((StatusCode::CREATED, Json(ApiResponse::ok("Message sent", view))))
}

pub async fn get_messages(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<String>,
    Query(query): Query<GetMessagesQuery>,
) -> Result<Json<ApiResponse<Page<MessageView>>>> {
    let page = page_params(query.page, query.limit, &state.config.limits)?;
    let messages = state
        .messages
        .get_messages(&chat_id, &auth.user_id, page, query.before.as_deref())
        .await?;
    Ok(Json(ApiResponse::ok("Messages loaded", messages)))
}

pub async fn edit_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(message_id): Path<String>,
    Json(req): Json<EditMessageRequest>,
) -> Result<Json<ApiResponse<MessageView>>> {
    let view = state
        .messages
        .edit_message(&message_id, &auth.user_id, &req.content)
        .await?;

    state
        .presence
        .broadcast_to_room(&view.chat_id, ServerEvent::MessageEdited(view.clone()), None);

    Ok(Json(ApiResponse::ok("Message edited", view)))
}

pub async fn delete_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(message_id): Path<String>,
    Query(query): Query<DeleteMessageQuery>,
) -> Result<Json<ApiResponse<()>>> {
    let deleted = state
        .messages
        .delete_message(&message_id, &auth.user_id, query.for_everyone)
        .await?;

    if deleted.delete_for_everyone {
        let chat_id = deleted.chat_id.clone();
        state
            .presence
            .broadcast_to_room(&chat_id, ServerEvent::MessageDeleted(deleted), None);
    } else {
        state
            .presence
            .send_to_user(&auth.user_id, ServerEvent::MessageDeleted(deleted));
    }

    Ok(Json(ApiResponse::message("Message deleted")))
}

pub async fn mark_as_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(message_id): Path<String>,
) -> Result<Json<ApiResponse<()>>> {
    let receipt = state.messages.mark_as_read(&message_id, &auth.user_id).await?;

    let chat_id = receipt.chat_id.clone();
    state
        .presence
        .broadcast_to_room(&chat_id, ServerEvent::MessageRead(receipt), None);

    Ok(Json(ApiResponse::message("Message marked as read")))
}

pub async fn mark_as_delivered(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(message_id): Path<String>,
) -> Result<Json<ApiResponse<()>>> {
    let receipt = state
        .messages
        .mark_as_delivered(&message_id, &auth.user_id)
        .await?;

    let chat_id = receipt.chat_id.clone();
    state
        .presence
        .broadcast_to_room(&chat_id, ServerEvent::MessageDelivered(receipt), None);

    Ok(Json(ApiResponse::message("Message marked as delivered")))
}
