//! Reads an `/ocr` request body into a [`Payload`].
//!
//! The content type is classified once and the body is read with the
//! matching axum extractor. Bodies that cannot be parsed become
//! [`Payload::Malformed`] so the decode policy decides what happens; only
//! body-level failures (too large, connection dropped) reject the request.

use axum::body::Bytes;
use axum::extract::rejection::FormRejection;
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use axum::Form;

use crate::processing::{ContentKind, Payload, RawField};

#[derive(Debug)]
pub struct OcrPayload(pub Payload);

impl<S> FromRequest<S> for OcrPayload
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(mut req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .map(|v| v.to_str().unwrap_or("<non-ascii>").to_string());

        let payload = match ContentKind::classify(content_type.as_deref()) {
            ContentKind::Anonymous => Payload::RawBody(read_bytes(req, state).await?),
            ContentKind::Json => Payload::JsonFields(read_bytes(req, state).await?),
            ContentKind::Unsupported(value) => Payload::Unsupported(value),
            ContentKind::UrlEncoded => {
                // axum matches the form content type case-sensitively.
                req.headers_mut().insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("application/x-www-form-urlencoded"),
                );
                match Form::<Vec<(String, String)>>::from_request(req, state).await {
                    Ok(Form(fields)) => Payload::FormFields(fields),
                    Err(FormRejection::BytesRejection(e)) => return Err(e.into_response()),
                    Err(e) => Payload::Malformed(e.body_text()),
                }
            }
            ContentKind::Multipart => match Multipart::from_request(req, state).await {
                Ok(multipart) => read_multipart(multipart).await,
                Err(e) => Payload::Malformed(e.body_text()),
            },
        };

        Ok(OcrPayload(payload))
    }
}

async fn read_bytes<S: Send + Sync>(req: Request, state: &S) -> Result<Bytes, Response> {
    Bytes::from_request(req, state)
        .await
        .map_err(IntoResponse::into_response)
}

async fn read_multipart(mut multipart: Multipart) -> Payload {
    let mut fields = Vec::new();

    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                let name = field.name().unwrap_or_default().to_string();
                let data = field.bytes().await.map_err(|e| e.body_text());
                fields.push(RawField { name, data });
            }
            Ok(None) => return Payload::MultipartFields { fields, error: None },
            Err(e) => {
                return Payload::MultipartFields {
                    fields,
                    error: Some(e.body_text()),
                }
            }
        }
    }
}
