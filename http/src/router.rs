use crate::{
    endpoints,
    streams,
};
use axum::{
    routing::get,
    Router,
};
use stream_harvester_pool::{
    Control,
    StreamConnector,
};

pub fn create_router<C: StreamConnector>(control: Control<C>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/api/endpoints",
            get(endpoints::list::<C>)
                .post(endpoints::replace::<C>)
                .put(endpoints::append::<C>),
        )
        .route(
            "/api/streams",
            get(streams::size::<C>).post(streams::resize::<C>).put(streams::resize::<C>),
        )
        .with_state(control)
}

async fn healthz() -> &'static str {
    "Hello!"
}
