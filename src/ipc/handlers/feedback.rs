use crate::error::GradingError;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    get_feedback_id, get_optional_str, get_required_f64, get_required_str, get_required_usize,
    get_str_list, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::ledger::{ListQuery, SortDirection, SortField};
use serde::de::DeserializeOwned;
use serde_json::json;

fn get_enum<T: DeserializeOwned + Default>(
    params: &serde_json::Value,
    key: &str,
) -> Result<T, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(T::default()),
        Some(v) => serde_json::from_value(v.clone()).map_err(|_| HandlerErr {
            code: "bad_params",
            message: format!("invalid {}", key),
            details: Some(json!({ "value": v })),
        }),
    }
}

fn feedback_list(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let query = ListQuery {
        search: get_optional_str(params, "query"),
        sort_field: get_enum::<SortField>(params, "sortField")?,
        direction: get_enum::<SortDirection>(params, "sortDirection")?,
    };
    let applied = match get_optional_str(params, "student") {
        Some(name) => Some(
            state
                .session
                .student(&name)
                .map(|r| r.applied_ids.clone())
                .ok_or_else(|| GradingError::NotFound(format!("student {name}")))?,
        ),
        None => None,
    };
    let items = state.session.catalog().list(&query, applied.as_ref());
    let rows: Vec<serde_json::Value> = items
        .iter()
        .map(|item| {
            json!({
                "id": item.id,
                "comment": item.comment,
                "grade": item.grade,
                "applied": applied.as_ref().map(|a| a.contains(&item.id)),
            })
        })
        .collect();
    Ok(json!({ "items": rows }))
}

fn feedback_create(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let comment = get_required_str(params, "comment")?;
    let grade = get_required_f64(params, "grade")?;
    let item = state.session.create_feedback(&comment, grade)?;
    Ok(json!({ "item": item }))
}

fn feedback_edit(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let id = get_feedback_id(params, "id")?;
    let comment = get_required_str(params, "comment")?;
    let grade = get_required_f64(params, "grade")?;
    let (item, affected) = state.session.edit_feedback(id, &comment, grade)?;
    Ok(json!({ "item": item, "affectedStudents": affected }))
}

fn feedback_delete(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let id = get_feedback_id(params, "id")?;
    let affected = state.session.delete_feedback(id)?;
    Ok(json!({ "deleted": id, "affectedStudents": affected }))
}

fn feedback_apply(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let id = get_feedback_id(params, "id")?;
    let students = get_str_list(params, "students")?;
    let outcome = state.session.apply_feedback(id, &students)?;
    Ok(json!({
        "results": outcome.results,
        "unknownStudents": outcome.unknown,
    }))
}

fn feedback_reorder(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let from = get_required_usize(params, "fromIndex")?;
    let to = get_required_usize(params, "toIndex")?;
    state.session.reorder_feedback(from, to)?;
    Ok(json!({ "items": state.session.catalog().items() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let handler: fn(&mut AppState, &serde_json::Value) -> Result<serde_json::Value, HandlerErr> =
        match req.method.as_str() {
            "feedback.list" => feedback_list,
            "feedback.create" => feedback_create,
            "feedback.edit" => feedback_edit,
            "feedback.delete" => feedback_delete,
            "feedback.apply" => feedback_apply,
            "feedback.reorder" => feedback_reorder,
            _ => return None,
        };
    Some(match handler(state, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    })
}
