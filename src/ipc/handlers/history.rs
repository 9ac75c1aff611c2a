use crate::ipc::error::ok;
use crate::ipc::helpers::{get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use uuid::Uuid;

fn handle_history_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let entries: Vec<_> = state.session.history().list().collect();
    ok(&req.id, json!({ "entries": entries }))
}

fn history_revert(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let raw = get_required_str(params, "changeId")?;
    let change_id = Uuid::parse_str(raw.trim()).map_err(|_| HandlerErr {
        code: "bad_params",
        message: format!("invalid changeId: {}", raw),
        details: None,
    })?;
    let outcome = state.session.revert(change_id)?;
    Ok(json!({
        "reverted": outcome.change,
        "record": outcome.record,
        "staleIds": outcome.stale_ids,
        "historyEntries": state.session.history().len(),
    }))
}

fn handle_history_revert(state: &mut AppState, req: &Request) -> serde_json::Value {
    match history_revert(state, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "history.list" => Some(handle_history_list(state, req)),
        "history.revert" => Some(handle_history_revert(state, req)),
        _ => None,
    }
}
