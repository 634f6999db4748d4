//! HTTP surface of the helpdesk. Client routes take the user id from the
//! path because identity is established by the chat transport in front of
//! this service; staff routes require an `X-Staff-Id` header.

pub mod clients;
pub mod error;
pub mod middleware;
pub mod staff;
pub mod state;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post, put},
};

pub use error::ApiError;
pub use state::{AppState, AppStateInner};

pub fn router(state: AppState) -> Router {
    let client_routes = Router::new()
        .route("/api/clients/start", post(clients::start))
        .route(
            "/api/clients/{user_id}/tickets",
            get(clients::list_tickets).post(clients::create_ticket),
        )
        .route(
            "/api/clients/{user_id}/active",
            get(clients::get_active).put(clients::set_active),
        )
        .route("/api/clients/{user_id}/messages", post(clients::send_message))
        .route("/api/clients/{user_id}/actions", post(clients::perform))
        .route("/api/clients/{user_id}/subscription", get(clients::subscription));

    let staff_routes = Router::new()
        .route("/api/staff/tickets", get(staff::list_tickets))
        .route("/api/staff/tickets/{ticket_id}", get(staff::get_ticket))
        .route("/api/staff/tickets/{ticket_id}/reply", post(staff::reply))
        .route("/api/staff/tickets/{ticket_id}/close", post(staff::close))
        .route("/api/staff/tickets/{ticket_id}/reopen", post(staff::reopen))
        .route("/api/staff/actions", post(staff::perform))
        .route("/api/staff/subscriptions/expiring", get(staff::expiring_subscriptions))
        .route("/api/staff/subscriptions/{user_id}", put(staff::upsert_subscription))
        .route("/api/staff/users", get(staff::list_users))
        .route("/api/staff/direct", post(staff::direct_message))
        .route("/api/staff/scans/{name}/run", post(staff::run_scan))
        .layer(from_fn_with_state(state.clone(), middleware::require_staff));

    Router::new()
        .merge(client_routes)
        .merge(staff_routes)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::FixedOffset;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use helpdesk_core::{
        Ack, DeliveryError, Helpdesk, Notifier, ScanRunner, SlaPolicy, SlaScan,
    };
    use helpdesk_db::Database;
    use helpdesk_types::{Notice, UserId};

    use super::*;

    const STAFF: i64 = 900;

    #[derive(Default)]
    struct Inbox(Mutex<Vec<(UserId, Notice)>>);

    #[async_trait]
    impl Notifier for Inbox {
        async fn send(&self, recipient: UserId, notice: &Notice) -> Result<Ack, DeliveryError> {
            self.0.lock().unwrap().push((recipient, notice.clone()));
            Ok(Ack)
        }
    }

    fn app() -> (Router, Arc<Inbox>) {
        let store = Arc::new(Database::open_in_memory().unwrap());
        let inbox = Arc::new(Inbox::default());
        let timeout = Duration::from_secs(1);
        let sla = SlaScan::new(
            store.clone(),
            inbox.clone(),
            SlaPolicy {
                sla_hours: 12,
                staff: vec![UserId(STAFF)],
            },
            timeout,
        );
        let state = Arc::new(AppStateInner {
            helpdesk: Helpdesk::new(store, vec![UserId(STAFF)]),
            notifier: inbox.clone(),
            delivery_timeout: timeout,
            offset: FixedOffset::east_opt(3 * 3600).unwrap(),
            scans: HashMap::from([("sla", ScanRunner::new(Arc::new(sla)))]),
        });
        (router(state), inbox)
    }

    async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        staff: Option<i64>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(id) = staff {
            req = req.header(middleware::STAFF_HEADER, id.to_string());
        }
        let req = match body {
            Some(body) => req
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => req.body(Body::empty()),
        }
        .unwrap();

        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn start(app: &Router, id: i64, name: &str) {
        let (status, _) = call(
            app,
            "POST",
            "/api/clients/start",
            None,
            Some(json!({ "user_id": id, "display_name": name })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn conversation_over_http() {
        let (app, inbox) = app();
        start(&app, 1, "alice").await;

        let (status, ticket) = call(&app, "POST", "/api/clients/1/tickets", None, None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(ticket["status"], "open");
        let id = ticket["id"].as_i64().unwrap();

        let (status, message) = call(
            &app,
            "POST",
            "/api/clients/1/messages",
            None,
            Some(json!({ "text": "hello" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(message["ticket_id"], id);

        let (status, _) = call(
            &app,
            "POST",
            &format!("/api/staff/tickets/{id}/reply"),
            Some(STAFF),
            Some(json!({ "text": "looking into it" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, closed) = call(&app, "POST", &format!("/api/staff/tickets/{id}/close"), Some(STAFF), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(closed["status"], "closed");

        let (status, err) = call(
            &app,
            "POST",
            "/api/clients/1/messages",
            None,
            Some(json!({ "text": "still there?" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(err["error"], "active_ticket_closed");

        let (_, view) = call(&app, "GET", &format!("/api/staff/tickets/{id}"), Some(STAFF), None).await;
        assert_eq!(view["messages"].as_array().unwrap().len(), 2);

        // created + client message to staff, reply + close to the owner
        let sent = inbox.0.lock().unwrap();
        let to_owner = sent.iter().filter(|(r, _)| *r == UserId(1)).count();
        let to_staff = sent.iter().filter(|(r, _)| *r == UserId(STAFF)).count();
        assert_eq!((to_owner, to_staff), (2, 2));
    }

    #[tokio::test]
    async fn staff_routes_require_known_staff_id() {
        let (app, _) = app();
        let (status, _) = call(&app, "GET", "/api/staff/tickets", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = call(&app, "GET", "/api/staff/tickets", Some(1), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, body) = call(&app, "GET", "/api/staff/tickets", Some(STAFF), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn clients_cannot_act_on_foreign_tickets() {
        let (app, _) = app();
        start(&app, 1, "alice").await;
        start(&app, 2, "bob").await;
        let (_, ticket) = call(&app, "POST", "/api/clients/2/tickets", None, None).await;

        let (status, err) = call(
            &app,
            "POST",
            "/api/clients/1/actions",
            None,
            Some(json!({ "type": "close", "data": { "ticket_id": ticket["id"] } })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(err["error"], "not_owner");
    }

    #[tokio::test]
    async fn unknown_actions_are_rejected_at_the_boundary() {
        let (app, _) = app();
        start(&app, 1, "alice").await;
        let (status, _) = call(
            &app,
            "POST",
            "/api/clients/1/actions",
            None,
            Some(json!({ "type": "escalate", "data": { "ticket_id": 1 } })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn bad_status_filter_is_a_bad_request() {
        let (app, _) = app();
        let (status, _) = call(&app, "GET", "/api/staff/tickets?status=open,lost", Some(STAFF), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn manual_scan_runs() {
        let (app, _) = app();
        let (status, body) = call(&app, "POST", "/api/staff/scans/sla/run", Some(STAFF), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "completed");
        assert_eq!(body["intents"], 0);

        let (status, _) = call(&app, "POST", "/api/staff/scans/backup/run", Some(STAFF), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn subscription_lookup() {
        let (app, _) = app();
        start(&app, 1, "alice").await;

        let (_, none) = call(&app, "GET", "/api/clients/1/subscription", None, None).await;
        assert_eq!(none, Value::Null);

        let (status, _) = call(
            &app,
            "PUT",
            "/api/staff/subscriptions/1",
            Some(STAFF),
            Some(json!({ "end_date": "2999-01-01" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, sub) = call(&app, "GET", "/api/clients/1/subscription", None, None).await;
        assert_eq!(sub["end_date"], "2999-01-01");
        assert!(sub["days_left"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn staff_list_users_with_subscriptions() {
        let (app, _) = app();
        start(&app, 1, "alice").await;
        start(&app, 2, "bob").await;
        call(
            &app,
            "PUT",
            "/api/staff/subscriptions/2",
            Some(STAFF),
            Some(json!({ "end_date": "2026-12-31" })),
        )
        .await;

        let (status, _) = call(&app, "GET", "/api/staff/users", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, users) = call(&app, "GET", "/api/staff/users", Some(STAFF), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            users,
            json!([
                { "user_id": 1, "display_name": "alice", "subscription_end": null },
                { "user_id": 2, "display_name": "bob", "subscription_end": "2026-12-31" },
            ])
        );
    }

    #[tokio::test]
    async fn expiring_window_saturates_instead_of_overflowing() {
        let (app, _) = app();
        start(&app, 1, "alice").await;
        call(
            &app,
            "PUT",
            "/api/staff/subscriptions/1",
            Some(STAFF),
            Some(json!({ "end_date": "2999-01-01" })),
        )
        .await;

        let uri = format!("/api/staff/subscriptions/expiring?days={}", u32::MAX);
        let (status, subs) = call(&app, "GET", &uri, Some(STAFF), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(subs.as_array().unwrap().len(), 1);
    }
}
