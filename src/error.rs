use thiserror::Error;

/// Every failure the book grid can report.
///
/// None of these are fatal to the process: the HTTP layer turns each one into a
/// structured `{ "error": ... }` body and the terminal client prints it as a status.
#[derive(Debug, Error)]
pub enum BookError {
    #[error("Only CSV files are allowed!")]
    InvalidFileType,

    #[error("file is too large (limit is {limit} bytes)")]
    FileTooLarge { limit: usize },

    #[error("failed to parse CSV: {0}")]
    ParseFailure(String),

    #[error("Session not found")]
    SessionNotFound,

    #[error("row {position} is out of range (dataset has {len} rows)")]
    IndexOutOfRange { position: usize, len: usize },

    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("invalid value for {field}: {value:?}")]
    InvalidValue { field: String, value: String },

    /// A request body or query string that does not have the expected shape.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("no row with id {0}")]
    RowNotFound(u64),

    #[error("count must be between {min} and {max}, got {requested}")]
    GenerationRangeInvalid {
        requested: i64,
        min: usize,
        max: usize,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BookError>;

#[cfg(feature = "web")]
mod http {
    use super::BookError;
    use axum::Json;
    use axum::extract::multipart::MultipartRejection;
    use axum::extract::rejection::{JsonRejection, QueryRejection};
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};

    impl BookError {
        pub fn status(&self) -> StatusCode {
            match self {
                BookError::SessionNotFound => StatusCode::NOT_FOUND,
                BookError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                BookError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
                BookError::InvalidFileType
                | BookError::ParseFailure(_)
                | BookError::IndexOutOfRange { .. }
                | BookError::UnknownField(_)
                | BookError::InvalidValue { .. }
                | BookError::InvalidRequest(_)
                | BookError::RowNotFound(_)
                | BookError::GenerationRangeInvalid { .. } => StatusCode::BAD_REQUEST,
            }
        }
    }

    impl From<JsonRejection> for BookError {
        fn from(rejection: JsonRejection) -> Self {
            BookError::InvalidRequest(rejection.body_text())
        }
    }

    impl From<QueryRejection> for BookError {
        fn from(rejection: QueryRejection) -> Self {
            BookError::InvalidRequest(rejection.body_text())
        }
    }

    impl From<MultipartRejection> for BookError {
        fn from(rejection: MultipartRejection) -> Self {
            BookError::InvalidRequest(rejection.body_text())
        }
    }

    impl IntoResponse for BookError {
        fn into_response(self) -> Response {
            let status = self.status();
            if status.is_server_error() {
                log::error!("request failed: {self}");
            } else {
                log::debug!("request rejected ({status}): {self}");
            }

            let body = serde_json::json!({ "error": self.to_string() });
            (status, Json(body)).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_human_readable() {
        assert_eq!(BookError::SessionNotFound.to_string(), "Session not found");
        let err = BookError::IndexOutOfRange { position: 7, len: 5 };
        assert_eq!(err.to_string(), "row 7 is out of range (dataset has 5 rows)");
    }

    #[cfg(feature = "web")]
    #[test]
    fn status_codes_follow_error_kind() {
        use axum::http::StatusCode;

        assert_eq!(BookError::SessionNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            BookError::FileTooLarge { limit: 1 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            BookError::UnknownField("Price".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            BookError::InvalidRequest("missing field".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
