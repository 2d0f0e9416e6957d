//! Axum HTTP handlers.
//!
//! Read routes serve the current snapshot. Action routes run the form input
//! through [`AdminForms`] and hand the resulting action to the [`Dashboard`];
//! they answer once the transaction is confirmed or has failed.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::errors::DashboardError;
use crate::sync::Dashboard;
use crate::types::{parse_uint, Action};
use crate::views::{self, AdminForms};

#[derive(Clone)]
pub struct ApiState {
    pub dashboard: Dashboard,
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub status: &'static str,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub hash: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    /// Decimal or `0x` hex.
    pub candidate_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AddCandidateRequest {
    pub name: String,
    pub proposal: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterVoterRequest {
    pub address: String,
    #[serde(default)]
    pub is_admin: bool,
}

/// Dates use the `datetime-local` format, e.g. `2030-01-02T00:00`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartVotingRequest {
    #[serde(default)]
    pub start_date: String,
    pub end_date: String,
}

// ─────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(render_dashboard))
        .route("/api/status", get(status))
        .route("/api/dashboard", get(get_dashboard))
        .route("/api/diagnostics", get(get_diagnostics))
        .route("/api/connect", post(connect))
        .route("/api/disconnect", post(disconnect))
        .route("/api/vote", post(vote))
        .route("/api/candidates", post(add_candidate))
        .route("/api/voters", post(register_voter))
        .route("/api/voting/start", post(start_voting))
        .route("/api/voting/end", post(end_voting))
        .route("/api/transaction/dismiss", post(dismiss_transaction))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn error_response(e: DashboardError) -> Response {
    let status = match &e {
        DashboardError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        DashboardError::NotConnected | DashboardError::WalletUnavailable => StatusCode::CONFLICT,
        DashboardError::ContractUnreachable(_) | DashboardError::RemoteCall(_) => {
            StatusCode::BAD_GATEWAY
        }
        DashboardError::TransactionFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(serde_json::json!(ErrorResponse {
            error: e.to_string()
        })),
    )
        .into_response()
}

fn missing(what: &str) -> Response {
    error_response(DashboardError::InvalidInput(format!("{what} required")))
}

/// Dispatch an action and answer with its transaction hash.
async fn submit(state: &ApiState, action: Action) -> Response {
    match state.dashboard.mutate(action).await {
        Ok(hash) => (StatusCode::OK, Json(TransactionResponse { hash })).into_response(),
        Err(e) => error_response(e),
    }
}

// ─────────────────────────────────────────────────────────
// Read handlers
// ─────────────────────────────────────────────────────────

/// `GET /api/status`
pub async fn status() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok",
        message: "Blockchain voting system is running",
    })
}

/// `GET /api/dashboard`
pub async fn get_dashboard(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.dashboard.snapshot().await)
}

/// `GET /`
///
/// Plain-text rendering of the current dashboard.
pub async fn render_dashboard(State(state): State<ApiState>) -> impl IntoResponse {
    let snapshot = state.dashboard.snapshot().await;
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        views::render_dashboard(&snapshot),
    )
}

/// `GET /api/diagnostics`
///
/// Raw voting flags, timestamps and clock drift straight from the contract.
pub async fn get_diagnostics(State(state): State<ApiState>) -> Response {
    match state.dashboard.diagnostics().await {
        Ok(d) => (StatusCode::OK, Json(d)).into_response(),
        Err(e) => error_response(e),
    }
}

// ─────────────────────────────────────────────────────────
// Session handlers
// ─────────────────────────────────────────────────────────

/// `POST /api/connect`
pub async fn connect(State(state): State<ApiState>) -> Response {
    match state.dashboard.connect().await {
        Ok(()) => (StatusCode::OK, Json(state.dashboard.snapshot().await)).into_response(),
        Err(e) => error_response(e),
    }
}

/// `POST /api/disconnect`
pub async fn disconnect(State(state): State<ApiState>) -> impl IntoResponse {
    state.dashboard.disconnect().await;
    StatusCode::NO_CONTENT
}

/// `POST /api/transaction/dismiss`
pub async fn dismiss_transaction(State(state): State<ApiState>) -> impl IntoResponse {
    state.dashboard.dismiss_transaction().await;
    StatusCode::NO_CONTENT
}

// ─────────────────────────────────────────────────────────
// Action handlers
// ─────────────────────────────────────────────────────────

/// `POST /api/vote`
pub async fn vote(State(state): State<ApiState>, Json(body): Json<VoteRequest>) -> Response {
    match parse_uint(&body.candidate_id) {
        Ok(candidate_id) => submit(&state, Action::Vote { candidate_id }).await,
        Err(e) => error_response(e),
    }
}

/// `POST /api/candidates`
pub async fn add_candidate(
    State(state): State<ApiState>,
    Json(body): Json<AddCandidateRequest>,
) -> Response {
    let mut forms = AdminForms {
        candidate_name: body.name,
        candidate_proposal: body.proposal,
        ..AdminForms::default()
    };
    match forms.take_add_candidate() {
        Some(action) => submit(&state, action).await,
        None => missing("candidate name and proposal"),
    }
}

/// `POST /api/voters`
pub async fn register_voter(
    State(state): State<ApiState>,
    Json(body): Json<RegisterVoterRequest>,
) -> Response {
    let mut forms = AdminForms {
        voter_address: body.address,
        voter_is_admin: body.is_admin,
        ..AdminForms::default()
    };
    match forms.take_register_voter() {
        Ok(Some(action)) => submit(&state, action).await,
        Ok(None) => missing("voter address"),
        Err(e) => error_response(e),
    }
}

/// `POST /api/voting/start`
///
/// The start date is accepted but voting always opens at submission time.
pub async fn start_voting(
    State(state): State<ApiState>,
    Json(body): Json<StartVotingRequest>,
) -> Response {
    let mut forms = AdminForms {
        start_date: body.start_date,
        end_date: body.end_date,
        ..AdminForms::default()
    };
    match forms.take_start_voting() {
        Ok(Some(action)) => submit(&state, action).await,
        Ok(None) => missing("end date"),
        Err(e) => error_response(e),
    }
}

/// `POST /api/voting/end`
pub async fn end_voting(State(state): State<ApiState>) -> Response {
    submit(&state, Action::EndVoting).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::sync::{SyncIntervals, SystemClock};
    use crate::testing::{dashboard_with, seeded_chain, uint};
    use crate::types::{Address, TxStatus};

    fn disconnected() -> ApiState {
        ApiState {
            dashboard: Dashboard::new(
                None,
                Address::default(),
                Arc::new(SystemClock),
                SyncIntervals::default(),
            ),
        }
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    async fn send_json(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let (status, bytes) = send(app, method, uri, body).await;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn status_reports_ok() {
        let (status, body) = send_json(router(disconnected()), "GET", "/api/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "status": "ok",
                "message": "Blockchain voting system is running"
            })
        );
    }

    #[tokio::test]
    async fn dashboard_snapshot_starts_disconnected() {
        let (status, body) = send_json(router(disconnected()), "GET", "/api/dashboard", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isConnected"], false);
        assert_eq!(body["networkName"], "Localhost");
        assert_eq!(body["transaction"]["status"], "idle");
    }

    #[tokio::test]
    async fn text_dashboard_is_plain_text() {
        let (status, bytes) = send(router(disconnected()), "GET", "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(String::from_utf8(bytes).unwrap().starts_with("Not connected"));
    }

    #[tokio::test]
    async fn actions_without_session_conflict() {
        let state = disconnected();
        let (status, body) = send_json(
            router(state.clone()),
            "POST",
            "/api/vote",
            Some(json!({ "candidateId": "1" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("not connected"));

        let (status, _) = send_json(router(state.clone()), "POST", "/api/connect", None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send_json(router(state), "GET", "/api/diagnostics", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn malformed_form_input_is_rejected_before_dispatch() {
        let chain = seeded_chain();
        let state = ApiState {
            dashboard: dashboard_with(chain.clone(), None),
        };
        state.dashboard.connect().await.unwrap();

        let cases = [
            ("/api/vote", json!({ "candidateId": "first" })),
            ("/api/candidates", json!({ "name": "Dave", "proposal": "  " })),
            ("/api/voters", json!({ "address": "0x12", "isAdmin": false })),
            ("/api/voters", json!({ "address": "" })),
            ("/api/voting/start", json!({ "endDate": "next week" })),
        ];
        for (uri, body) in cases {
            let (status, _) = send_json(router(state.clone()), "POST", uri, Some(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        }
        assert!(chain.lock().unwrap().writes.is_empty());
        state.dashboard.disconnect().await;
    }

    #[tokio::test]
    async fn connect_vote_and_dismiss_over_http() {
        let chain = seeded_chain();
        chain.lock().unwrap().voting_active = true;
        let state = ApiState {
            dashboard: dashboard_with(chain.clone(), None),
        };

        let (status, body) = send_json(router(state.clone()), "POST", "/api/connect", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isConnected"], true);

        let (status, body) = send_json(
            router(state.clone()),
            "POST",
            "/api/vote",
            Some(json!({ "candidateId": "2" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["hash"].as_str().unwrap().starts_with("0x"));
        assert_eq!(chain.lock().unwrap().writes, vec!["vote(2)"]);

        let snap = state.dashboard.snapshot().await;
        assert_eq!(snap.transaction.status, TxStatus::Success);
        assert_eq!(snap.candidates[2].vote_count, uint(1));

        let (status, _) = send(router(state.clone()), "POST", "/api/transaction/dismiss", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(state.dashboard.snapshot().await.transaction.status, TxStatus::Idle);

        let (status, _) = send(router(state.clone()), "POST", "/api/disconnect", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(!state.dashboard.snapshot().await.is_connected);
    }

    #[tokio::test]
    async fn admin_routes_dispatch_form_actions() {
        let chain = seeded_chain();
        let state = ApiState {
            dashboard: dashboard_with(chain.clone(), None),
        };
        state.dashboard.connect().await.unwrap();
        let voter = Address::with_last_byte(0xb2);

        let requests = [
            ("/api/candidates", json!({ "name": "Dave", "proposal": "Bike lanes" })),
            ("/api/voters", json!({ "address": voter.to_string(), "isAdmin": true })),
            (
                "/api/voting/start",
                json!({ "startDate": "2000-01-01T00:00", "endDate": "1970-01-01T01:00" }),
            ),
        ];
        for (uri, body) in requests {
            let (status, _) = send_json(router(state.clone()), "POST", uri, Some(body)).await;
            assert_eq!(status, StatusCode::OK, "{uri}");
        }
        let (status, _) = send_json(router(state.clone()), "POST", "/api/voting/end", None).await;
        assert_eq!(status, StatusCode::OK);

        // The fake clock reads 1000; the requested start date is ignored.
        assert_eq!(
            chain.lock().unwrap().writes,
            vec![
                "addCandidate(Dave,Bike lanes)".to_string(),
                format!("registerVoter({voter},2)"),
                "startVoting(1000,3600)".to_string(),
                "endVoting()".to_string(),
            ]
        );
        state.dashboard.disconnect().await;
    }

    #[tokio::test]
    async fn reverted_transaction_maps_to_unprocessable() {
        let chain = seeded_chain();
        chain.lock().unwrap().revert_writes = true;
        let state = ApiState {
            dashboard: dashboard_with(chain, None),
        };
        state.dashboard.connect().await.unwrap();

        let (status, body) = send_json(router(state.clone()), "POST", "/api/voting/end", None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap().contains("execution reverted"));
        state.dashboard.disconnect().await;
    }

    #[tokio::test]
    async fn diagnostics_route_reports_contract_view() {
        let chain = seeded_chain();
        let state = ApiState {
            dashboard: dashboard_with(chain, None),
        };
        state.dashboard.connect().await.unwrap();

        let (status, body) = send_json(router(state.clone()), "GET", "/api/diagnostics", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["candidateCount"], 3);
        assert_eq!(body["votingStarted"], false);
        assert_eq!(body["driftSecs"], 0);
        state.dashboard.disconnect().await;
    }
}
