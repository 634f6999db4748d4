use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use helpdesk_core::Actor;
use helpdesk_types::api::{ActiveTicketResponse, SetActiveRequest, StartRequest};
use helpdesk_types::{Action, MessageContent, UserId};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn start(
    State(state): State<AppState>,
    Json(req): Json<StartRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req.display_name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::BadRequest("display_name must not be empty".into()));
    }
    let user = state
        .run(move |h| h.start(req.user_id, &name))
        .await?;
    Ok(Json(user))
}

pub async fn create_ticket(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<impl IntoResponse, ApiError> {
    let (ticket, _) = state.run_and_notify(move |h| h.open_ticket(user_id)).await?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

pub async fn list_tickets(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<impl IntoResponse, ApiError> {
    let tickets = state.run(move |h| h.user_tickets(user_id)).await?;
    Ok(Json(tickets))
}

pub async fn get_active(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<impl IntoResponse, ApiError> {
    let ticket_id = state.run(move |h| h.active_ticket(user_id)).await?;
    Ok(Json(ActiveTicketResponse { ticket_id }))
}

pub async fn set_active(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Json(req): Json<SetActiveRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .run(move |h| h.set_active(user_id, req.ticket_id))
        .await?;
    Ok(Json(ActiveTicketResponse {
        ticket_id: Some(req.ticket_id),
    }))
}

/// Free-form message; lands in the user's active ticket.
pub async fn send_message(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Json(content): Json<MessageContent>,
) -> Result<impl IntoResponse, ApiError> {
    let (message, delivery) = state
        .run_and_notify(move |h| h.client_message(user_id, &content))
        .await?;
    info!(
        ticket = %message.ticket_id,
        "Client {} wrote; staff notified: {} delivered, {} failed",
        user_id, delivery.delivered, delivery.failed
    );
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn perform(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Json(action): Json<Action>,
) -> Result<impl IntoResponse, ApiError> {
    info!(ticket = %action.ticket_id(), "Client {} action", user_id);
    let (response, _) = state
        .run_and_notify(move |h| h.perform(Actor::Client(user_id), action))
        .await?;
    Ok(Json(response))
}

/// `null` when the user has no subscription on record.
pub async fn subscription(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<impl IntoResponse, ApiError> {
    let today = state.today();
    let status = state
        .run(move |h| h.subscription_status(user_id, today))
        .await?;
    Ok(Json(status))
}
