use crate::ipc::error::ok;
use crate::ipc::helpers::{get_optional_str, get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::format_points;
use anyhow::Context;
use serde_json::json;

fn roster_import(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let text = match (get_optional_str(params, "text"), get_optional_str(params, "path")) {
        (Some(text), _) => text,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read roster {}", path))?,
        (None, None) => return Err(HandlerErr::bad_params("missing path or text")),
    };
    let summary = state.session.import_roster(&text)?;
    Ok(json!(summary))
}

fn roster_export(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let csv = state.session.export_roster();
    let out_path = get_optional_str(params, "outPath");
    if let Some(path) = out_path.as_deref() {
        std::fs::write(path, &csv).with_context(|| format!("failed to write {}", path))?;
    }
    Ok(json!({
        "csv": csv,
        "fileName": state.session.export_file_name(),
        "rows": state.session.roster().len(),
        "outPath": out_path,
    }))
}

fn roster_set_grade(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student = get_required_str(params, "student")?;
    let grade = match params.get("grade") {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Number(n)) => n.as_f64().map(format_points).unwrap_or_default(),
        Some(serde_json::Value::Null) => String::new(),
        _ => return Err(HandlerErr::bad_params("missing grade")),
    };
    let record = state.session.set_grade(&student, &grade)?;
    Ok(json!({ "record": record }))
}

fn handle_roster_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    match roster_import(state, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_roster_export(state: &mut AppState, req: &Request) -> serde_json::Value {
    match roster_export(state, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_roster_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "maxPoints": state.session.max_points(),
            "records": state.session.roster(),
        }),
    )
}

fn handle_roster_set_grade(state: &mut AppState, req: &Request) -> serde_json::Value {
    match roster_set_grade(state, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "roster.import" => Some(handle_roster_import(state, req)),
        "roster.export" => Some(handle_roster_export(state, req)),
        "roster.list" => Some(handle_roster_list(state, req)),
        "roster.setGrade" => Some(handle_roster_set_grade(state, req)),
        _ => None,
    }
}
