use axum::response::{IntoResponse, Response};
use http::StatusCode;

#[derive(Debug)]
pub enum AppError {
    StreamNotFound(String),
    StreamAlreadyExists(String),
    InvalidStreamPath(String),
    Throw(String),
    InternalServerError(anyhow::Error),
}

impl AppError {
    pub fn stream_not_found<T>(t: T) -> Self
    where
        T: ToString,
    {
        AppError::StreamNotFound(t.to_string())
    }

    pub fn stream_already_exists<T>(t: T) -> Self
    where
        T: ToString,
    {
        AppError::StreamAlreadyExists(t.to_string())
    }

    pub fn invalid_stream_path<T>(t: T) -> Self
    where
        T: ToString,
    {
        AppError::InvalidStreamPath(t.to_string())
    }

    pub fn throw<T>(t: T) -> Self
    where
        T: ToString,
    {
        AppError::Throw(t.to_string())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::StreamNotFound(_) => StatusCode::NOT_FOUND,
            AppError::StreamAlreadyExists(_) => StatusCode::CONFLICT,
            AppError::InvalidStreamPath(_) => StatusCode::BAD_REQUEST,
            AppError::Throw(_) | AppError::InternalServerError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::StreamNotFound(stream) => write!(f, "stream {stream} is not recording"),
            AppError::StreamAlreadyExists(stream) => {
                write!(f, "stream {stream} is already recording")
            }
            AppError::InvalidStreamPath(path) => write!(f, "invalid stream path: {path}"),
            AppError::Throw(err) => f.write_str(err),
            AppError::InternalServerError(err) => write!(f, "{err}"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        AppError::InternalServerError(err.into())
    }
}
