// handler/chat.rs
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use ammonia::Builder;
use axum::{
    extract::{Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Extension, Json, Router,
};
use axum_extra::extract::WithRejection;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::{chatdb::ConversationExt, productdb::ProductExt, userdb::UserExt},
    dtos::chatdtos::*,
    error::HttpError,
    handler::deal::{create_offer, list_conversation_deals},
    middleware::JWTAuthMiddeware,
    models::{chatmodels::Conversation, productmodel::ProductSummary, usermodel::UserSummary},
    service::error::ServiceError,
    AppState,
};

pub fn chat_handler() -> Router {
    Router::new()
        .route("/conversations", get(get_user_conversations).post(start_conversation))
        .route(
            "/conversations/:conversation_id",
            get(get_conversation_details).delete(delete_conversation),
        )
        .route(
            "/conversations/:conversation_id/messages",
            get(get_messages).post(send_message),
        )
        .route("/conversations/:conversation_id/messages/new", get(get_new_messages))
        .route("/conversations/:conversation_id/read", put(mark_conversation_as_read))
        .route(
            "/conversations/:conversation_id/typing",
            get(get_typing_status).post(set_typing),
        )
        .route(
            "/conversations/:conversation_id/deals",
            get(list_conversation_deals).post(create_offer),
        )
        .route("/unread-count", get(get_unread_count))
}

/// Strips every tag; chat content is plain text and is stored as typed otherwise.
pub fn sanitize_message(input: &str) -> String {
    let stripped = Builder::default()
        .tags(HashSet::new())
        .clean(input.trim())
        .to_string();

    unescape_text(&stripped).trim().to_string()
}

/// Reverses the escaping ammonia applies to text nodes. `&amp;` goes last so an
/// escaped entity is not decoded twice.
fn unescape_text(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", "\u{a0}")
        .replace("&amp;", "&")
}

async fn conversation_for_participant(
    app_state: &AppState,
    conversation_id: Uuid,
    user_id: Uuid,
) -> Result<Conversation, HttpError> {
    let conversation = app_state.db_client
        .get_conversation_by_id(conversation_id)
        .await
        .map_err(ServiceError::from)?
        .ok_or_else(|| ServiceError::NotFound("Conversation".to_string()))?;

    if !conversation.is_participant(user_id) {
        return Err(ServiceError::Forbidden(
            "You are not a participant in this conversation".to_string(),
        ).into());
    }

    Ok(conversation)
}

async fn conversation_details(
    app_state: &AppState,
    conversation: Conversation,
    viewer: Uuid,
    users: &HashMap<Uuid, UserSummary>,
) -> Result<ConversationWithDetails, HttpError> {
    let other_user = conversation
        .other_participant(viewer)
        .and_then(|id| users.get(&id).cloned());

    let product = match conversation.product_id {
        Some(product_id) => app_state.db_client
            .get_product(product_id)
            .await
            .map_err(ServiceError::from)?
            .map(|p| ProductSummary::from(&p)),
        None => None,
    };

    let last_message = app_state.db_client
        .get_last_message(conversation.id)
        .await
        .map_err(ServiceError::from)?
        .map(|m| MessageResponse::for_viewer(m, viewer));

    let unread_count = app_state.db_client
        .get_conversation_unread_count(conversation.id, viewer)
        .await
        .map_err(ServiceError::from)?;

    Ok(ConversationWithDetails {
        conversation,
        other_user,
        product,
        last_message,
        unread_count,
    })
}

async fn user_map(app_state: &AppState, ids: &[Uuid]) -> Result<HashMap<Uuid, UserSummary>, HttpError> {
    let users = app_state.db_client
        .get_user_summaries(ids)
        .await
        .map_err(ServiceError::from)?;

    Ok(users.into_iter().map(|u| (u.id, u)).collect())
}

pub async fn start_conversation(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    WithRejection(Json(body), _): WithRejection<Json<StartConversationDto>, HttpError>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()).with_kind("validation_error"))?;

    let me = auth.user.id;

    let product = match body.product_id {
        Some(product_id) => Some(
            app_state.db_client
                .get_product(product_id)
                .await
                .map_err(ServiceError::from)?
                .ok_or_else(|| ServiceError::NotFound("Product".to_string()))?,
        ),
        None => None,
    };

    let counterpart_id = match (body.other_user_id, &product) {
        (Some(other_user_id), _) => other_user_id,
        (None, Some(product)) => product.farmer_id,
        (None, None) => {
            return Err(ServiceError::Validation(
                "Provide the other user or a product to talk about".to_string(),
            ).into());
        }
    };

    if counterpart_id == me {
        let reason = if product.is_some() {
            "You cannot start a conversation about your own product"
        } else {
            "You cannot start a conversation with yourself"
        };
        return Err(ServiceError::Validation(reason.to_string()).into());
    }

    if let Some(product) = &product {
        if product.farmer_id != me && product.farmer_id != counterpart_id {
            return Err(ServiceError::Validation(
                "The product owner must be part of the conversation".to_string(),
            ).into());
        }
    }

    app_state.db_client
        .get_user(counterpart_id)
        .await
        .map_err(ServiceError::from)?
        .ok_or_else(|| ServiceError::NotFound("User".to_string()))?;

    let opening_message = match &product {
        Some(product) => format!("Started conversation about {}", product.name),
        None => "Started a conversation".to_string(),
    };

    let (conversation, is_new) = app_state.db_client
        .start_or_get_conversation(me, counterpart_id, product.as_ref().map(|p| p.id), sanitize_message(&opening_message))
        .await
        .map_err(ServiceError::from)?;

    if is_new {
        tracing::info!("Conversation {} started by {} with {}", conversation.id, me, counterpart_id);
    }

    let users = user_map(&app_state, &conversation.participants()).await?;
    let details = conversation_details(&app_state, conversation, me, &users).await?;

    let status = if is_new { StatusCode::CREATED } else { StatusCode::OK };

    Ok((status, Json(serde_json::json!({
        "status": "success",
        "data": details
    }))))
}

pub async fn get_user_conversations(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    WithRejection(Query(pagination), _): WithRejection<Query<PaginationQuery>, HttpError>,
) -> Result<impl IntoResponse, HttpError> {
    let (limit, offset) = pagination.limit_offset(DEFAULT_PAGE_SIZE);

    let conversations = app_state.db_client
        .get_user_conversations(auth.user.id, limit, offset)
        .await
        .map_err(ServiceError::from)?;

    let mut participant_ids: Vec<Uuid> = conversations
        .iter()
        .flat_map(|c| c.participants())
        .collect();
    participant_ids.sort();
    participant_ids.dedup();
    let users = user_map(&app_state, &participant_ids).await?;

    let mut details = Vec::with_capacity(conversations.len());
    for conversation in conversations {
        details.push(conversation_details(&app_state, conversation, auth.user.id, &users).await?);
    }

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": details,
        "results": details.len()
    })))
}

pub async fn get_conversation_details(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    WithRejection(Path(conversation_id), _): WithRejection<Path<Uuid>, HttpError>,
) -> Result<impl IntoResponse, HttpError> {
    let conversation = conversation_for_participant(&app_state, conversation_id, auth.user.id).await?;

    let users = user_map(&app_state, &conversation.participants()).await?;
    let details = conversation_details(&app_state, conversation, auth.user.id, &users).await?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": details
    })))
}

pub async fn delete_conversation(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    WithRejection(Path(conversation_id), _): WithRejection<Path<Uuid>, HttpError>,
) -> Result<impl IntoResponse, HttpError> {
    let conversation = conversation_for_participant(&app_state, conversation_id, auth.user.id).await?;

    app_state.db_client
        .delete_conversation_for_user(conversation.id, auth.user.id)
        .await
        .map_err(ServiceError::from)?;

    tracing::info!("Conversation {} hidden for {}", conversation.id, auth.user.id);

    Ok(Json(serde_json::json!({
        "status": "success",
        "message": "Conversation deleted"
    })))
}

pub async fn get_messages(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    WithRejection(Path(conversation_id), _): WithRejection<Path<Uuid>, HttpError>,
    WithRejection(Query(pagination), _): WithRejection<Query<PaginationQuery>, HttpError>,
) -> Result<impl IntoResponse, HttpError> {
    let conversation = conversation_for_participant(&app_state, conversation_id, auth.user.id).await?;
    let (limit, offset) = pagination.limit_offset(MESSAGE_PAGE_SIZE);

    app_state.db_client
        .mark_messages_as_delivered(conversation.id, auth.user.id)
        .await
        .map_err(ServiceError::from)?;

    let messages: Vec<MessageResponse> = app_state.db_client
        .get_conversation_messages(conversation.id, limit, offset)
        .await
        .map_err(ServiceError::from)?
        .into_iter()
        .map(|m| MessageResponse::for_viewer(m, auth.user.id))
        .collect();

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": messages,
        "results": messages.len()
    })))
}

pub async fn send_message(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    WithRejection(Path(conversation_id), _): WithRejection<Path<Uuid>, HttpError>,
    WithRejection(Json(body), _): WithRejection<Json<SendMessageDto>, HttpError>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()).with_kind("validation_error"))?;

    let conversation = conversation_for_participant(&app_state, conversation_id, auth.user.id).await?;

    let content = sanitize_message(&body.content);
    if content.is_empty() {
        return Err(ServiceError::Validation("Message cannot be empty".to_string()).into());
    }

    let message = app_state.db_client
        .send_message(conversation.id, auth.user.id, body.message_type, content)
        .await
        .map_err(ServiceError::from)?;

    tracing::debug!("Message {} sent in conversation {}", message.id, conversation.id);

    Ok((StatusCode::CREATED, Json(serde_json::json!({
        "status": "success",
        "data": MessageResponse::for_viewer(message, auth.user.id)
    }))))
}

pub async fn get_new_messages(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    WithRejection(Path(conversation_id), _): WithRejection<Path<Uuid>, HttpError>,
    WithRejection(Query(query), _): WithRejection<Query<NewMessagesQuery>, HttpError>,
) -> Result<impl IntoResponse, HttpError> {
    let conversation = conversation_for_participant(&app_state, conversation_id, auth.user.id).await?;

    let messages: Vec<MessageResponse> = app_state.db_client
        .get_messages_after(conversation.id, query.after)
        .await
        .map_err(ServiceError::from)?
        .into_iter()
        .map(|m| MessageResponse::for_viewer(m, auth.user.id))
        .collect();

    if messages.iter().any(|m| !m.is_own && !m.is_read) {
        app_state.db_client
            .mark_messages_as_read(conversation.id, auth.user.id, Some(query.after))
            .await
            .map_err(ServiceError::from)?;
    }

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": messages,
        "results": messages.len()
    })))
}

pub async fn mark_conversation_as_read(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    WithRejection(Path(conversation_id), _): WithRejection<Path<Uuid>, HttpError>,
) -> Result<impl IntoResponse, HttpError> {
    let conversation = conversation_for_participant(&app_state, conversation_id, auth.user.id).await?;

    let marked = app_state.db_client
        .mark_messages_as_read(conversation.id, auth.user.id, None)
        .await
        .map_err(ServiceError::from)?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": { "marked_read": marked }
    })))
}

pub async fn set_typing(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    WithRejection(Path(conversation_id), _): WithRejection<Path<Uuid>, HttpError>,
) -> Result<impl IntoResponse, HttpError> {
    let conversation = conversation_for_participant(&app_state, conversation_id, auth.user.id).await?;

    app_state.presence_service.set_typing(conversation.id, auth.user.id).await;

    Ok(Json(serde_json::json!({
        "status": "success"
    })))
}

pub async fn get_typing_status(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    WithRejection(Path(conversation_id), _): WithRejection<Path<Uuid>, HttpError>,
) -> Result<impl IntoResponse, HttpError> {
    let conversation = conversation_for_participant(&app_state, conversation_id, auth.user.id).await?;

    let other_user_typing = match conversation.other_participant(auth.user.id) {
        Some(other) => app_state.presence_service.is_typing(conversation.id, other).await,
        None => false,
    };

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": TypingStatus {
            conversation_id: conversation.id,
            other_user_typing,
        }
    })))
}

pub async fn get_unread_count(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let unread_count = app_state.db_client
        .get_unread_count(auth.user.id)
        .await
        .map_err(ServiceError::from)?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": { "unread_count": unread_count }
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_markup() {
        assert_eq!(sanitize_message("  hello  "), "hello");
        assert_eq!(sanitize_message("<b>50kg</b> please"), "50kg please");
        assert_eq!(sanitize_message("<script>alert(1)</script>"), "");
        assert_eq!(sanitize_message("   "), "");
    }

    #[test]
    fn test_sanitize_keeps_plain_text_as_typed() {
        let typed = "50kg < 60kg & fresh, \"grade A\" > grade B";
        assert_eq!(sanitize_message(typed), typed);
        assert_eq!(sanitize_message("<i>rice & beans</i> < 5kg"), "rice & beans < 5kg");
    }
}
