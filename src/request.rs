use crate::error::Error;
use reqwest::Method;
use std::collections::BTreeMap;
use url::form_urlencoded;

pub const JSON_TYPE: &str = "application/json";
pub const FORM_TYPE: &str = "application/x-www-form-urlencoded";

const CONTENT_TYPE: &str = "Content-Type";

const BODY_METHODS: [Method; 3] = [Method::POST, Method::PUT, Method::PATCH];

/// Encodes the configured data fields into a request body. Pure: the
/// same inputs always produce the same bytes.
///
/// Methods that carry no body, and empty data maps, yield `None`. For
/// the rest the `Content-Type` header picks the encoding; a missing or
/// unrecognized value is a fatal configuration error.
pub fn build_body(
    method: &Method,
    headers: &BTreeMap<String, String>,
    data: &BTreeMap<String, String>,
) -> Result<Option<String>, Error> {
    if !BODY_METHODS.contains(method) || data.is_empty() {
        return Ok(None);
    }

    let content_type = headers
        .get(CONTENT_TYPE)
        .map(String::as_str)
        .unwrap_or_default();

    match content_type {
        JSON_TYPE => Ok(Some(serde_json::to_string(data)?)),
        FORM_TYPE => {
            let body = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(data)
                .finish();
            Ok(Some(body))
        }
        other => Err(Error::UnsupportedContentType {
            method: method.clone(),
            content_type: other.to_owned(),
        }),
    }
}
