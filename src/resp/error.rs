use std::fmt::{Display, Formatter};
use std::io::Cursor;

use rocket::http::{ContentType, Status};
use rocket::response::Responder;
use rocket::{response, Request, Response};
use serde_json::json;

/// Request-level failure rendered as the platform's JSON fail envelope:
/// `{"status": "fail" | "error", "message": ...}` with a matching HTTP status.
///
/// "fail" marks client mistakes (4xx), "error" marks server-side faults (5xx).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: Status,
    pub message: String,
}

impl ApiError {
    pub fn new(status: Status, message: impl ToString) -> ApiError {
        ApiError {
            status,
            message: message.to_string(),
        }
    }

    pub fn bad_request(message: impl ToString) -> ApiError {
        ApiError::new(Status::BadRequest, message)
    }

    pub fn unauthorized(message: impl ToString) -> ApiError {
        ApiError::new(Status::Unauthorized, message)
    }

    pub fn forbidden(message: impl ToString) -> ApiError {
        ApiError::new(Status::Forbidden, message)
    }

    pub fn not_found(message: impl ToString) -> ApiError {
        ApiError::new(Status::NotFound, message)
    }

    pub fn conflict(message: impl ToString) -> ApiError {
        ApiError::new(Status::Conflict, message)
    }

    pub fn internal(message: impl ToString) -> ApiError {
        ApiError::new(Status::InternalServerError, message)
    }

    fn kind(&self) -> &'static str {
        if self.status.code >= 500 {
            "error"
        } else {
            "fail"
        }
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for ApiError {}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let body = json!({
            "status": self.kind(),
            "message": self.message,
        })
        .to_string();

        Response::build()
            .status(self.status)
            .header(ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}

/// Detects the MongoDB duplicate-key error raised by unique indexes. Handlers
/// turn it into a 409 with a context-specific message.
pub fn is_duplicate_key(e: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};

    match e.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(we)) => we.code == 11000,
        ErrorKind::Command(ce) => ce.code == 11000,
        ErrorKind::BulkWrite(bwe) => bwe
            .write_errors
            .as_ref()
            .map(|errors| errors.iter().any(|we| we.code == 11000))
            .unwrap_or(false),
        _ => false,
    }
}

impl From<mongodb::error::Error> for ApiError {
    fn from(e: mongodb::error::Error) -> Self {
        use mongodb::error::ErrorKind;

        if is_duplicate_key(&e) {
            return ApiError::conflict("Duplicate field value.");
        }

        match e.kind.as_ref() {
            ErrorKind::Authentication { .. }
            | ErrorKind::DnsResolve { .. }
            | ErrorKind::ServerSelection { .. }
            | ErrorKind::InvalidTlsConfig { .. } => {
                ApiError::internal("Server was unable to access the database.")
            }
            ErrorKind::BsonDeserialization(_) | ErrorKind::BsonSerialization(_) => {
                ApiError::internal("There was a problem with stored document data.")
            }
            ErrorKind::Io(_) | ErrorKind::Write(_) => ApiError::internal(
                "A database write error occurred. Submitted data might not be properly stored.",
            ),
            _ => ApiError::internal("Database failed while processing request."),
        }
    }
}

impl From<bson::de::Error> for ApiError {
    fn from(_: bson::de::Error) -> Self {
        ApiError::internal("An error occurred while processing stored document data.")
    }
}

impl From<bson::ser::Error> for ApiError {
    fn from(_: bson::ser::Error) -> Self {
        ApiError::internal("An error occurred while serializing document data.")
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(_: serde_json::Error) -> Self {
        ApiError::internal("An error occurred while processing JSON data.")
    }
}

impl From<jsonwebtoken::errors::Error> for ApiError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match e.into_kind() {
            ErrorKind::ExpiredSignature => {
                ApiError::forbidden("Invalid or expired access token.")
            }
            _ => ApiError::forbidden("Error while handling JWT."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fail_below_500_error_above() {
        assert_eq!(ApiError::bad_request("x").kind(), "fail");
        assert_eq!(ApiError::conflict("x").kind(), "fail");
        assert_eq!(ApiError::internal("x").kind(), "error");
    }
}
