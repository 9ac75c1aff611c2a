use crate::archive;
use crate::ipc::error::ok;
use crate::ipc::helpers::{get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::Path;

fn submissions_import(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let path = get_required_str(params, "path")?;
    let bytes = archive::read_archive_file(Path::new(&path))?;
    let summary = state.session.import_submissions(&bytes);
    Ok(json!(summary))
}

fn handle_submissions_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    match submissions_import(state, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "submissions.import" => Some(handle_submissions_import(state, req)),
        _ => None,
    }
}
