use crate::ipc::error::ok;
use crate::ipc::helpers::{get_optional_f64, get_optional_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = &state.session;
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "students": session.roster().len(),
            "feedbackItems": session.catalog().items().len(),
            "historyEntries": session.history().len(),
        }),
    )
}

fn settings(state: &AppState) -> serde_json::Value {
    let session = &state.session;
    json!({
        "assignmentName": session.assignment_name,
        "maxPoints": session.max_points(),
        "students": session.roster().len(),
        "withSubmissions": session.roster().iter().filter(|r| r.has_submission()).count(),
    })
}

fn handle_session_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, settings(state))
}

fn handle_session_reset(state: &mut AppState, req: &Request) -> serde_json::Value {
    state.session.reset();
    ok(&req.id, settings(state))
}

fn assignment_update(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let name = get_optional_str(params, "name");
    let max_points = get_optional_f64(params, "maxPoints")?;
    let recomputed = state
        .session
        .update_assignment(name.as_deref(), max_points)?;
    let mut result = settings(state);
    result["recomputed"] = json!(recomputed);
    Ok(result)
}

fn handle_assignment_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    match assignment_update(state, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "session.get" => Some(handle_session_get(state, req)),
        "session.reset" => Some(handle_session_reset(state, req)),
        "assignment.update" => Some(handle_assignment_update(state, req)),
        _ => None,
    }
}
