use crate::error::AppError;
use axum::{
    extract::{
        rejection::FormRejection,
        Form,
        Query,
        State,
    },
    Json,
};
use serde::{
    Deserialize,
    Serialize,
};
use stream_harvester_pool::{
    Control,
    PoolSizeChange,
    StreamConnector,
};

#[derive(Debug, Deserialize)]
pub struct ResizeQuery {
    // Kept as text so that a malformed number gets our own error message.
    num: Option<String>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct PoolSize {
    pub streams: usize,
}

pub async fn size<C: StreamConnector>(State(control): State<Control<C>>) -> Json<PoolSize> {
    Json(PoolSize {
        streams: control.pool_size(),
    })
}

/// `num` comes from a urlencoded form body if there is one, otherwise from the query string.
pub async fn resize<C: StreamConnector>(
    State(control): State<Control<C>>,
    Query(query): Query<ResizeQuery>,
    form: Result<Form<ResizeQuery>, FormRejection>,
) -> Result<Json<PoolSizeChange>, AppError> {
    let num = form.ok().and_then(|Form(form)| form.num).or(query.num);
    Ok(Json(control.set_pool_size(num.as_deref()).await?))
}
