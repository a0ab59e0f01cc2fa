//! Chat handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::{AppError, Result},
    models::*,
    AppState,
};

use super::AuthUser;

pub async fn list_chats(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ListChatsQuery>,
) -> Result<Json<ApiResponse<Vec<ChatView>>>> {
    let chats = state
        .chats
        .get_chats_for_user(&auth.user_id, query.include_requests)
        .await?;
    Ok(Json(ApiResponse::ok("Chats loaded", chats)))
}

/// Open a private chat with one other user, or create a group
pub async fn create_chat(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<CreateChatRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ChatView>>)> {
    let chat = match req.chat_type {
        ChatType::Private => {
            let other = match req.participants.as_slice() {
                [other] => other,
                [a, b] if *a == auth.user_id => b,
                [a, b] if *b == auth.user_id => a,
                _ => return Err(AppError::validation("A private chat needs exactly one other participant")),
            };
            state.chats.create_or_get_private_chat(&auth.user_id, other).await?
        }
        ChatType::Group => {
            let name = req
                .name
                .as_deref()
                .ok_or_else(|| AppError::validation("Group name is required"))?;
            state
                .chats
                .create_group_chat(&auth.user_id, name, &req.participants, req.description.as_deref())
                .await?
        }
    };

    Ok((StatusCode::CREATED, Json(ApiResponse::ok("Chat ready", chat))))
}

pub async fn list_message_requests(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<Vec<ChatView>>>> {
    let chats = state.chats.get_message_requests(&auth.user_id).await?;
    Ok(Json(ApiResponse::ok("Message requests loaded", chats)))
}

pub async fn get_chat(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<String>,
) -> Result<Json<ApiResponse<ChatView>>> {
    let chat = state.chats.get_chat_by_id(&chat_id, &auth.user_id).await?;
    Ok(Json(ApiResponse::ok("Chat found", chat)))
}

pub async fn update_chat(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<String>,
    Json(req): Json<UpdateChatRequest>,
) -> Result<Json<ApiResponse<ChatView>>> {
    let chat = state.chats.update_chat(&chat_id, &auth.user_id, req).await?;
    Ok(Json(ApiResponse::ok("Chat updated", chat)))
}

pub async fn delete_chat(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<String>,
) -> Result<Json<ApiResponse<()>>> {
    state.chats.delete_chat(&chat_id, &auth.user_id).await?;
    Ok(Json(ApiResponse::message("Chat deleted")))
}

pub async fn add_participant(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<String>,
    Json(req): Json<AddParticipantRequest>,
) -> Result<Json<ApiResponse<ChatView>>> {
    let chat = state
        .chats
        .add_participant(&chat_id, &auth.user_id, &req.user_id)
        .await?;
    Ok(Json(ApiResponse::ok("Participant added", chat)))
}

pub async fn remove_participant(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((chat_id, user_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<()>>> {
    state
        .chats
        .remove_participant(&chat_id, &auth.user_id, &user_id)
        .await?;
    Ok(Json(ApiResponse::message("Participant removed")))
}

pub async fn accept_request(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<String>,
) -> Result<Json<ApiResponse<ChatView>>> {
    let chat = state.chats.accept_message_request(&chat_id, &auth.user_id).await?;
    Ok(Json(ApiResponse::ok("Message request accepted", chat)))
}

pub async fn decline_request(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<String>,
) -> Result<Json<ApiResponse<()>>> {
    state.chats.decline_message_request(&chat_id, &auth.user_id).await?;
    Ok(Json(ApiResponse::message("Message request declined")))
}
