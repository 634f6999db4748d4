use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::info;

use helpdesk_core::{Actor, TickOutcome};
use helpdesk_types::api::{
    DeliverySummary, DirectMessageRequest, ScanRunResponse, UpsertSubscriptionRequest,
};
use helpdesk_types::{Action, MessageContent, TicketId, TicketStatus, UserId};

use crate::error::ApiError;
use crate::middleware::StaffId;
use crate::state::AppState;

const DEFAULT_EXPIRING_DAYS: u32 = 7;

#[derive(Debug, Deserialize)]
pub struct TicketQuery {
    /// Comma-separated statuses. Defaults to the tickets waiting on staff.
    pub status: Option<String>,
}

fn parse_statuses(raw: Option<&str>) -> Result<Vec<TicketStatus>, ApiError> {
    let Some(raw) = raw else {
        return Ok(TicketStatus::ALL.into_iter().filter(|s| s.awaits_staff()).collect());
    };
    raw.split(',')
        .map(|s| s.trim().parse::<TicketStatus>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))
}

pub async fn list_tickets(
    State(state): State<AppState>,
    Query(query): Query<TicketQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let statuses = parse_statuses(query.status.as_deref())?;
    let tickets = state.run(move |h| h.tickets_by_status(&statuses)).await?;
    Ok(Json(tickets))
}

pub async fn get_ticket(
    State(state): State<AppState>,
    Path(ticket_id): Path<TicketId>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state.run(move |h| h.ticket_view(ticket_id)).await?;
    Ok(Json(view))
}

pub async fn reply(
    State(state): State<AppState>,
    Path(ticket_id): Path<TicketId>,
    Extension(StaffId(staff_id)): Extension<StaffId>,
    Json(content): Json<MessageContent>,
) -> Result<impl IntoResponse, ApiError> {
    let ((_, message), _) = state
        .run_and_notify(move |h| h.staff_reply(staff_id, ticket_id, &content))
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn close(
    State(state): State<AppState>,
    Path(ticket_id): Path<TicketId>,
    Extension(StaffId(staff_id)): Extension<StaffId>,
) -> Result<impl IntoResponse, ApiError> {
    let ((ticket, _), _) = state
        .run_and_notify(move |h| h.close(Actor::Staff(staff_id), ticket_id))
        .await?;
    Ok(Json(ticket))
}

pub async fn reopen(
    State(state): State<AppState>,
    Path(ticket_id): Path<TicketId>,
    Extension(StaffId(staff_id)): Extension<StaffId>,
) -> Result<impl IntoResponse, ApiError> {
    let ((ticket, _), _) = state
        .run_and_notify(move |h| h.reopen(Actor::Staff(staff_id), ticket_id))
        .await?;
    Ok(Json(ticket))
}

pub async fn perform(
    State(state): State<AppState>,
    Extension(StaffId(staff_id)): Extension<StaffId>,
    Json(action): Json<Action>,
) -> Result<impl IntoResponse, ApiError> {
    let (response, _) = state
        .run_and_notify(move |h| h.perform(Actor::Staff(staff_id), action))
        .await?;
    Ok(Json(response))
}

pub async fn upsert_subscription(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Extension(StaffId(staff_id)): Extension<StaffId>,
    Json(req): Json<UpsertSubscriptionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let sub = state
        .run(move |h| h.upsert_subscription(staff_id, user_id, req.end_date))
        .await?;
    Ok(Json(sub))
}

#[derive(Debug, Deserialize)]
pub struct ExpiringQuery {
    pub days: Option<u32>,
}

pub async fn expiring_subscriptions(
    State(state): State<AppState>,
    Query(query): Query<ExpiringQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let today = state.today();
    let days = query.days.unwrap_or(DEFAULT_EXPIRING_DAYS);
    let subs = state
        .run(move |h| h.expiring_subscriptions(today, days))
        .await?;
    Ok(Json(subs))
}

/// Every user with their subscription end date.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(StaffId(staff_id)): Extension<StaffId>,
) -> Result<impl IntoResponse, ApiError> {
    let users = state.run(move |h| h.list_users(staff_id)).await?;
    Ok(Json(users))
}

pub async fn direct_message(
    State(state): State<AppState>,
    Extension(StaffId(staff_id)): Extension<StaffId>,
    Json(req): Json<DirectMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ((), report) = state
        .run_and_notify(move |h| h.direct_message(staff_id, req.user_id, &req.text))
        .await?;
    Ok(Json(DeliverySummary {
        delivered: report.delivered,
        failed: report.failed,
    }))
}

/// Runs a scheduled scan now. Refused (as "skipped") while the same scan is
/// already in flight.
pub async fn run_scan(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Extension(StaffId(staff_id)): Extension<StaffId>,
) -> Result<impl IntoResponse, ApiError> {
    let runner = state
        .scans
        .get(name.as_str())
        .ok_or_else(|| ApiError::UnknownScan(name.clone()))?;

    info!(scan = runner.name(), staff = %staff_id, "Manual scan requested");
    let response = match runner.trigger().await {
        TickOutcome::Completed(report) => ScanRunResponse {
            scan: name,
            outcome: "completed".into(),
            intents: report.intents,
            delivered: report.delivered,
            failed: report.failed,
        },
        TickOutcome::Skipped => ScanRunResponse {
            scan: name,
            outcome: "skipped".into(),
            intents: 0,
            delivered: 0,
            failed: 0,
        },
        TickOutcome::Failed(reason) => {
            return Err(ApiError::Internal(format!("scan {} failed: {}", name, reason)));
        }
    };
    Ok(Json(response))
}
