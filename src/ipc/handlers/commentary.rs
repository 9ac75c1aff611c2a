use crate::ipc::error::ok;
use crate::ipc::helpers::{get_optional_str, get_required_str, get_required_usize, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn commentary_generate(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student = get_required_str(params, "student")?;
    let prompt = get_optional_str(params, "prompt");
    let (commentary, record) = state.session.generate_commentary(
        state.commentary.as_ref(),
        &student,
        prompt.as_deref(),
    )?;
    Ok(json!({ "commentary": commentary, "record": record }))
}

fn handle_commentary_generate(state: &mut AppState, req: &Request) -> serde_json::Value {
    match commentary_generate(state, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_commentary_batch(state: &mut AppState, req: &Request) -> serde_json::Value {
    let prompt = get_optional_str(&req.params, "prompt");
    let report = state.session.commentary_batch(
        state.commentary.as_ref(),
        prompt.as_deref(),
        state.request_delay,
    );
    ok(&req.id, json!(report))
}

fn commentary_suggest(
    state: &mut AppState,
    _params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let added = state.session.suggest_feedback(state.commentary.as_ref())?;
    Ok(json!({ "added": added, "suggestions": state.session.suggestions() }))
}

fn handle_commentary_suggest(state: &mut AppState, req: &Request) -> serde_json::Value {
    match commentary_suggest(state, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn commentary_dismiss_suggestion(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let index = get_required_usize(params, "index")?;
    let removed = state.session.dismiss_suggestion(index)?;
    Ok(json!({ "removed": removed, "suggestions": state.session.suggestions() }))
}

fn handle_commentary_dismiss_suggestion(state: &mut AppState, req: &Request) -> serde_json::Value {
    match commentary_dismiss_suggestion(state, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "commentary.generate" => Some(handle_commentary_generate(state, req)),
        "commentary.batch" => Some(handle_commentary_batch(state, req)),
        "commentary.suggest" => Some(handle_commentary_suggest(state, req)),
        "commentary.suggestions" => Some(ok(
            &req.id,
            json!({ "suggestions": state.session.suggestions() }),
        )),
        "commentary.dismissSuggestion" => Some(handle_commentary_dismiss_suggestion(state, req)),
        _ => None,
    }
}
