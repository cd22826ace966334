use std::io::Cursor;

use rocket::http::{ContentType, Status};
use rocket::response::Responder;
use rocket::{response, Request, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Paging block attached to list responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct PageMeta {
    pub total: u64,
    pub page: u64,
    pub limit: u64,
}

/// The uniform success envelope: `{status, message, data?, meta?}`.
///
/// Failures use [`super::error::ApiError`] instead, so `status` here is
/// always `"success"`.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T: Serialize> {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<PageMeta>,

    #[serde(skip)]
    http: Status,
}

impl Envelope<()> {
    /// A bare success message with no payload.
    pub fn message(message: impl ToString) -> Envelope<()> {
        Envelope {
            status: "success",
            message: message.to_string(),
            data: None,
            meta: None,
            http: Status::Ok,
        }
    }
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(message: impl ToString, data: T) -> Envelope<T> {
        Envelope {
            status: "success",
            message: message.to_string(),
            data: Some(data),
            meta: None,
            http: Status::Ok,
        }
    }

    pub fn created(message: impl ToString, data: T) -> Envelope<T> {
        Envelope {
            http: Status::Created,
            ..Envelope::ok(message, data)
        }
    }

    pub fn with_meta(mut self, meta: PageMeta) -> Envelope<T> {
        self.meta = Some(meta);
        self
    }
}

impl<'r, T: Serialize> Responder<'r, 'static> for Envelope<T> {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let body = serde_json::to_string(&self).map_err(|e| {
            tracing::error!("unable to serialize response envelope: {}", e);
            Status::InternalServerError
        })?;

        Response::build()
            .status(self.http)
            .header(ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_omits_absent_fields() {
        let body = serde_json::to_value(Envelope::message("done")).unwrap();
        assert_eq!(body["status"], "success");
        assert_eq!(body["message"], "done");
        assert!(body.get("data").is_none());
        assert!(body.get("meta").is_none());
    }

    #[test]
    fn envelope_carries_data_and_meta() {
        let body = serde_json::to_value(
            Envelope::ok("listed", vec![1, 2, 3]).with_meta(PageMeta {
                total: 3,
                page: 1,
                limit: 20,
            }),
        )
        .unwrap();
        assert_eq!(body["data"].as_array().unwrap().len(), 3);
        assert_eq!(body["meta"]["total"], 3);
    }
}
