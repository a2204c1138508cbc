use axum::extract::{Request, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use instrumentor_service::services::SharedServices;
use tower::ServiceExt;
use tower_http::services::ServeDir;

use crate::endpoints::ResponseError;

/// Serves a request instrumented if its URL matches, and as a static file otherwise.
pub async fn serve_request(
    State(services): State<SharedServices>,
    request: Request,
) -> Response {
    let uri = request.uri();
    let url = uri.path_and_query().map_or(uri.path(), |pq| pq.as_str());

    if services.config().should_instrument(url) {
        let path = uri.path().to_owned();
        return instrument(&services, &path).await.into_response();
    }

    match ServeDir::new(services.root_dir()).oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}

async fn instrument(services: &SharedServices, path: &str) -> Result<Response, ResponseError> {
    let source = services
        .instrument(path)
        .await
        .map_err(|err| ResponseError::from_load_error(path, err))?;

    let headers = [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")];
    Ok((headers, source.to_string()).into_response())
}
