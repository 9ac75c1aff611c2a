use std::time::Duration;

use serde::Deserialize;

use crate::commentary::CommentaryGenerator;
use crate::session::Session;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub session: Session,
    pub commentary: Box<dyn CommentaryGenerator>,
    /// Spacing between commentary requests in a batch.
    pub request_delay: Duration,
}
