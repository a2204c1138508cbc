use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use instrumentor_service::caching::LoadError;
use sentry::integrations::anyhow::capture_anyhow;
use serde::{Deserialize, Serialize};

#[derive(Debug)]
pub struct ResponseError {
    status: StatusCode,
    err: anyhow::Error,
}

impl ResponseError {
    /// Wraps the failure to load `key` into an error response.
    ///
    /// Every load failure, including a missing file, is reported as a server error.
    pub fn from_load_error(key: &str, err: LoadError) -> Self {
        let status = StatusCode::INTERNAL_SERVER_ERROR;
        let err = anyhow::Error::new(err).context(format!("failed to instrument {key}"));
        Self { status, err }
    }
}

impl IntoResponse for ResponseError {
    fn into_response(self) -> Response {
        // missing files are not reported to Sentry
        let is_missing = matches!(
            self.err.downcast_ref::<LoadError>(),
            Some(LoadError::NotFound)
        );
        if self.status.is_server_error() && !is_missing {
            capture_anyhow(&self.err);
        }
        let mut response = Json(ApiErrorResponse::from(self.err)).into_response();
        *response.status_mut() = self.status;
        response
    }
}

/// An error response from an api.
#[derive(Serialize, Deserialize, Default, Debug)]
pub struct ApiErrorResponse {
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub causes: Option<Vec<String>>,
}

impl From<anyhow::Error> for ApiErrorResponse {
    fn from(err: anyhow::Error) -> Self {
        let mut chain = err.chain().map(|err| err.to_string());
        let detail = chain.next();
        let causes: Vec<_> = chain.collect();
        let causes = if causes.is_empty() {
            None
        } else {
            Some(causes)
        };

        ApiErrorResponse { detail, causes }
    }
}
