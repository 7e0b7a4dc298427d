use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use council_core::{CouncilError, Route};

// Input: one chat turn
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    // Omitted on the first turn; echoed back on every response
    #[serde(default)]
    pub session_id: Option<String>,
}

// Output: the agent's answer and how we got there
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub route: Route,
    pub label: String,
    pub reply: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Council(CouncilError),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<CouncilError> for ApiError {
    fn from(err: CouncilError) -> Self {
        ApiError::Council(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, error) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Council(err) => {
                let (status, code) = match &err {
                    CouncilError::Platform(_) => (StatusCode::BAD_GATEWAY, "platform_error"),
                    CouncilError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
                };
                (status, code, err.to_string())
            }
        };

        (
            status,
            Json(ErrorResponse {
                error,
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

/// `Json` extractor whose rejections come back as a 400 [`ErrorResponse`].
pub struct JsonBody<T>(pub T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}
