use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sentry::integrations::anyhow::capture_anyhow;
use serde::{Deserialize, Serialize};

/// An error returned from a handler, rendered as [`ApiErrorResponse`].
#[derive(Debug)]
pub struct ResponseError {
    status: StatusCode,
    err: anyhow::Error,
}

impl From<QueryRejection> for ResponseError {
    fn from(err: QueryRejection) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            err: anyhow::anyhow!(err.body_text()),
        }
    }
}

impl From<(StatusCode, &'static str)> for ResponseError {
    fn from((status, msg): (StatusCode, &'static str)) -> Self {
        Self {
            status,
            err: anyhow::anyhow!(msg),
        }
    }
}

impl From<(StatusCode, anyhow::Error)> for ResponseError {
    fn from((status, err): (StatusCode, anyhow::Error)) -> Self {
        Self { status, err }
    }
}

impl From<anyhow::Error> for ResponseError {
    fn from(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            err,
        }
    }
}

impl IntoResponse for ResponseError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
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
        let causes = (!causes.is_empty()).then_some(causes);

        ApiErrorResponse { detail, causes }
    }
}
