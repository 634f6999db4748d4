use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use helpdesk_types::UserId;

use crate::error::ApiError;
use crate::state::AppState;

pub const STAFF_HEADER: &str = "x-staff-id";

/// Staff identity established by `require_staff`.
#[derive(Debug, Clone, Copy)]
pub struct StaffId(pub UserId);

/// Rejects requests whose `X-Staff-Id` is missing or not a configured staff member.
pub async fn require_staff(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let staff_id = req
        .headers()
        .get(STAFF_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<i64>().ok())
        .map(UserId)
        .ok_or(ApiError::Unauthorized)?;

    if !state.helpdesk.is_staff(staff_id) {
        return Err(ApiError::Unauthorized);
    }

    req.extensions_mut().insert(StaffId(staff_id));
    Ok(next.run(req).await)
}
