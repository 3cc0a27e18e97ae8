use axum::{
    http::StatusCode,
    response::{
        IntoResponse,
        Response,
    },
};
use stream_harvester_pool::ControlError;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("The control request is invalid: {0}")]
    Control(#[from] ControlError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        warn!("rejecting control request: {self}");
        (
            StatusCode::BAD_REQUEST,
            axum::Json(serde_json::json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}
