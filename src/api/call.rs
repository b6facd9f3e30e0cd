use axum::{extract::State, routing::post, Json, Router};
use axum_extra::extract::Form;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::Config;
use crate::coordinator::CallUpdate;
use crate::error::{codes, AppError, Result};
use crate::state::AppState;
use crate::transit;

/// Call routes
pub fn call_routes() -> Router<AppState> {
    Router::new().route("/call", post(handle_call))
}

/// Form body for POST /call. `pc_err` may repeat, one entry per peer the
/// client currently fails to reach.
#[derive(Debug, Deserialize)]
pub struct CallRequest {
    pub uid: String,
    pub rid: String,
    pub call_type: String,
    #[serde(default)]
    pub pc_err: Vec<String>,
    /// Optional host:port override for the signaling relay.
    pub wshpp: Option<String>,
    /// "false" selects plain ws/http toward the relay.
    pub wstls: Option<String>,
}

/// The websocket URL clients connect to and the base URL this server
/// posts forwarded messages to, for the same relay instance.
fn wss_parameters(config: &Config, req: &CallRequest) -> (String, String) {
    let host_port = req
        .wshpp
        .as_deref()
        .filter(|s| !s.is_empty())
        .unwrap_or(&config.wss_host_port_pair);

    if req.wstls.as_deref() == Some("false") {
        (
            format!("ws://{}/ws", host_port),
            format!("http://{}", host_port),
        )
    } else {
        (
            format!("wss://{}/ws", host_port),
            format!("https://{}", host_port),
        )
    }
}

/// POST /call - join, refresh or leave a room
async fn handle_call(State(state): State<AppState>, Form(req): Form<CallRequest>) -> Json<Value> {
    tracing::info!(
        call_type = %req.call_type,
        uid = %req.uid,
        rid = %req.rid,
        pc_err = ?req.pc_err,
        "handling call"
    );

    match dispatch(&state, &req).await {
        Ok(body) => Json(body),
        Err(err) => {
            tracing::warn!(error = %err, rid = %req.rid, uid = %req.uid, "call failed");
            Json(json!({ "result": err.result_code() }))
        }
    }
}

async fn dispatch(state: &AppState, req: &CallRequest) -> Result<Value> {
    match req.call_type.as_str() {
        "join" => {
            // Idempotent re-entry: drop any stale membership first so a
            // rejoin starts from fresh pair state.
            leave_quietly(state, &req.rid, &req.uid).await?;
            let update = state.coordinator.join(&req.rid, &req.uid).await?;
            respond_with_conns(state, req, update).await
        }
        "refresh" => {
            let update = state
                .coordinator
                .refresh(&req.rid, &req.uid, &req.pc_err)
                .await?;
            respond_with_conns(state, req, update).await
        }
        "leave" => {
            leave_quietly(state, &req.rid, &req.uid).await?;
            let (_, wss_post_url) = wss_parameters(&state.config, req);
            state.relay.notify_call(&wss_post_url, &req.rid, &req.uid).await;
            Ok(json!({ "result": codes::SUCCESS }))
        }
        other => Err(AppError::InvalidRequest(format!(
            "unsupported call_type '{}'",
            other
        ))),
    }
}

/// Leave that tolerates the room already being gone.
async fn leave_quietly(state: &AppState, rid: &str, uid: &str) -> Result<()> {
    match state.coordinator.leave(rid, uid).await {
        Ok(()) => Ok(()),
        Err(AppError::UnknownRoom(_)) => {
            tracing::debug!(rid = %rid, uid = %uid, "leave for unknown room");
            Ok(())
        }
        Err(err) => Err(err),
    }
}

async fn respond_with_conns(
    state: &AppState,
    req: &CallRequest,
    update: CallUpdate,
) -> Result<Value> {
    let (wss_url, wss_post_url) = wss_parameters(&state.config, req);

    if update.dirty {
        state.relay.notify_call(&wss_post_url, &req.rid, &req.uid).await;
    }

    Ok(json!({
        "result": codes::SUCCESS,
        "params": {
            "wss_url": wss_url,
            "ice_servers": transit::ice_servers(&state.config),
            "conns": update.conns,
        }
    }))
}
