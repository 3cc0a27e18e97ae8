use crate::error::AppError;
use axum::{
    extract::State,
    Json,
};
use stream_harvester_pool::{
    Control,
    EndpointReport,
    Host,
    StreamConnector,
    UpdateMode,
};

pub async fn list<C: StreamConnector>(State(control): State<Control<C>>) -> Json<Vec<Host>> {
    Json(control.endpoints())
}

/// Body: one endpoint spec per line. Replaces all endpoints.
pub async fn replace<C: StreamConnector>(
    State(control): State<Control<C>>,
    body: String,
) -> Result<Json<EndpointReport>, AppError> {
    Ok(Json(control.set_endpoints(UpdateMode::Replace, &body)?))
}

/// Body: one endpoint spec per line. Adds to the existing endpoints.
pub async fn append<C: StreamConnector>(
    State(control): State<Control<C>>,
    body: String,
) -> Result<Json<EndpointReport>, AppError> {
    Ok(Json(control.set_endpoints(UpdateMode::Append, &body)?))
}
