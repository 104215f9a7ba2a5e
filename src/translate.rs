//! Converts dispatch results into typed [`ApiResponse`]s.
//!
//! The translator never fails: transport failures, error statuses and bodies
//! that do not deserialize all become [`ApiResponse::Failure`].

use crate::dispatch::{AttemptOutcome, Dispatch};
use crate::error::SerializationError;
use crate::request::{ApiRequest, RequestId};
use crate::response::{ApiResponse, FailureResponse, ResponseMeta, Status, SuccessResponse};
use crate::serializer::Serializer;
use crate::transport::RawResponse;
use crate::Error;
use http::HeaderMap;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

/// The structured payload of an error response.
#[derive(Debug, Deserialize)]
struct FailureEnvelope {
    #[serde(default, alias = "Message", alias = "error")]
    message: Option<String>,
    #[serde(default, alias = "Detail", alias = "details")]
    detail: Option<serde_json::Value>,
}

/// Builds typed responses.
#[derive(Clone, Copy)]
pub struct ResponseTranslator<'a> {
    serializer: &'a dyn Serializer,
}

impl<'a> ResponseTranslator<'a> {
    /// Creates a translator using the given serializer for bodies.
    pub fn new(serializer: &'a dyn Serializer) -> Self {
        Self { serializer }
    }

    /// Translates a dispatch into a typed response.
    ///
    /// Empty bodies on success yield `T::default()`.
    pub fn translate<T>(&self, request: &ApiRequest, dispatch: Dispatch) -> ApiResponse<T>
    where
        T: DeserializeOwned + Default,
    {
        let (status, response, meta) = match self.completed(request, dispatch) {
            Ok(completed) => completed,
            Err(failure) => return ApiResponse::Failure(failure),
        };

        if response.is_body_empty() {
            return ApiResponse::Success(SuccessResponse {
                payload: T::default(),
                status,
                meta,
            });
        }

        match self.decode::<T>(&response) {
            Ok(payload) => ApiResponse::Success(SuccessResponse {
                payload,
                status,
                meta,
            }),
            Err(e) => {
                tracing::error!(
                    request_id = %meta.request_id,
                    error = %e,
                    raw_response = %meta.raw_body,
                    "Failed to deserialize response"
                );
                ApiResponse::Failure(FailureResponse {
                    status,
                    message: format!(
                        "Failed to deserialize response into `{}`",
                        request.response_type()
                    ),
                    detail: None,
                    cause: Some(Box::new(Error::Serialization(e))),
                    meta,
                })
            }
        }
    }

    /// Translates a dispatch for a method without a response payload.
    ///
    /// The body of a success is kept in the metadata but never deserialized.
    pub fn translate_void(&self, request: &ApiRequest, dispatch: Dispatch) -> ApiResponse<()> {
        match self.completed(request, dispatch) {
            Ok((status, _, meta)) => ApiResponse::Success(SuccessResponse {
                payload: (),
                status,
                meta,
            }),
            Err(failure) => ApiResponse::Failure(failure),
        }
    }

    /// The failure for a call whose body could not be serialized.
    ///
    /// Nothing was sent, so the metadata carries a fresh identity and zero
    /// attempts.
    pub fn unsent<T>(&self, method: &str, error: SerializationError) -> ApiResponse<T> {
        let request_id = RequestId::new();

        tracing::error!(
            request_id = %request_id,
            method = %method,
            error = %error,
            "Failed to serialize request body"
        );

        ApiResponse::Failure(FailureResponse {
            status: Status::InvalidRequest,
            message: format!("Failed to serialize request body for `{}`", method),
            detail: None,
            cause: Some(Box::new(Error::Serialization(error))),
            meta: ResponseMeta {
                request_id,
                headers: HeaderMap::new(),
                raw_body: String::new(),
                latency: Duration::ZERO,
                attempts: 0,
            },
        })
    }

    /// Splits a dispatch into a successful response or a failure.
    fn completed(
        &self,
        request: &ApiRequest,
        dispatch: Dispatch,
    ) -> Result<(Status, RawResponse, ResponseMeta), FailureResponse> {
        let attempts = dispatch.attempts;
        let meta = |headers: HeaderMap, raw_body: String| ResponseMeta {
            request_id: request.id(),
            headers,
            raw_body,
            latency: dispatch.elapsed,
            attempts,
        };

        let (status, message, cause) = match dispatch.outcome {
            AttemptOutcome::Succeeded(response) => {
                let status = Status::from_code(response.status);
                let meta = meta(response.headers.clone(), response.text());

                tracing::info!(
                    request_id = %meta.request_id,
                    status = response.status,
                    latency_ms = meta.latency.as_millis(),
                    attempts = attempts,
                    "Received HTTP response"
                );

                if status.is_success() {
                    return Ok((status, response, meta));
                }
                return Err(self.status_failure(status, &response, meta));
            }
            AttemptOutcome::TimedOut => (
                Status::TimedOut,
                format!("Request timed out after {} attempt(s)", attempts),
                Error::Timeout,
            ),
            AttemptOutcome::TransientFailure(message) => (
                Status::ConnectionFailure,
                message.clone(),
                Error::Connection(message),
            ),
            AttemptOutcome::TerminalFailure(message) => (
                Status::InvalidRequest,
                message.clone(),
                Error::InvalidRequest(message),
            ),
            AttemptOutcome::Cancelled => (
                Status::Cancelled,
                "Request was cancelled".to_string(),
                Error::Cancelled,
            ),
        };

        Err(FailureResponse {
            status,
            message,
            detail: None,
            cause: Some(Box::new(cause)),
            meta: meta(HeaderMap::new(), String::new()),
        })
    }

    fn status_failure(
        &self,
        status: Status,
        response: &RawResponse,
        meta: ResponseMeta,
    ) -> FailureResponse {
        if status.is_client_error() {
            tracing::error!(
                request_id = %meta.request_id,
                status = response.status,
                response = %meta.raw_body,
                "Client error (4xx)"
            );
        } else if status.is_server_error() {
            tracing::warn!(
                request_id = %meta.request_id,
                status = response.status,
                response = %meta.raw_body,
                "Server error (5xx)"
            );
        }

        let envelope = if response.is_json() && !response.is_body_empty() {
            self.serializer
                .deserialize(&response.body)
                .ok()
                .and_then(|value| serde_json::from_value::<FailureEnvelope>(value).ok())
        } else {
            None
        };

        let (message, detail) = match envelope {
            Some(FailureEnvelope {
                message: Some(message),
                detail,
            }) => (message, detail.map(detail_text)),
            _ => (
                format!("request failed with status {}", response.status),
                None,
            ),
        };

        FailureResponse {
            status,
            message,
            detail,
            cause: None,
            meta,
        }
    }

    fn decode<T: DeserializeOwned>(&self, response: &RawResponse) -> Result<T, SerializationError> {
        let value = self.serializer.deserialize(&response.body)?;
        serde_json::from_value(value).map_err(|e| SerializationError::Deserialize {
            message: e.to_string(),
            raw_response: response.text(),
        })
    }
}

fn detail_text(detail: serde_json::Value) -> String {
    match detail {
        serde_json::Value::String(text) => text,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::Arguments;
    use crate::config::ConnectionSettings;
    use crate::request::RequestBuilder;
    use crate::schema::{ResourceSchema, RouteSchema};
    use crate::serializer::JsonSerializer;
    use http::header::CONTENT_TYPE;
    use http::HeaderValue;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct User {
        id: u32,
        name: String,
    }

    fn request() -> ApiRequest {
        let settings = ConnectionSettings::builder()
            .base_address("http://localhost/")
            .unwrap()
            .build()
            .unwrap();
        let schema = ResourceSchema::builder("Users")
            .route(RouteSchema::get("get", ""))
            .build()
            .unwrap();
        RequestBuilder::new(&settings, &JsonSerializer)
            .build::<User>(&schema, schema.route("get").unwrap(), &Arguments::new())
            .unwrap()
    }

    fn completed(status: u16, content_type: Option<&str>, body: &str) -> Dispatch {
        let mut headers = HeaderMap::new();
        if let Some(content_type) = content_type {
            headers.insert(CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
        }
        Dispatch {
            outcome: AttemptOutcome::Succeeded(RawResponse::new(
                status,
                headers,
                body.to_string(),
            )),
            attempts: 1,
            elapsed: Duration::from_millis(3),
        }
    }

    fn translate(dispatch: Dispatch) -> ApiResponse<User> {
        ResponseTranslator::new(&JsonSerializer).translate(&request(), dispatch)
    }

    #[test]
    fn success_body_is_deserialized() {
        let response = translate(completed(
            200,
            Some("application/json"),
            r#"{"id":1,"name":"ada"}"#,
        ));
        assert_eq!(
            response.payload(),
            Some(&User {
                id: 1,
                name: "ada".to_string()
            })
        );
        assert_eq!(response.meta().raw_body, r#"{"id":1,"name":"ada"}"#);
    }

    #[test]
    fn empty_success_yields_default_payload() {
        for status in [200, 201, 202, 204] {
            let response = translate(completed(status, None, ""));
            assert!(response.is_success(), "status {}", status);
            assert_eq!(response.into_payload(), Some(User::default()));
        }
    }

    #[test]
    fn bad_success_body_becomes_failure_with_cause() {
        let response = translate(completed(200, Some("application/json"), "not json"));

        let failure = response.failure().unwrap();
        assert_eq!(failure.status, Status::Ok);
        assert!(matches!(
            failure.cause.as_deref(),
            Some(Error::Serialization(SerializationError::Deserialize { raw_response, .. }))
                if raw_response == "not json"
        ));
    }

    #[test]
    fn json_error_envelope_is_read() {
        let response = translate(completed(
            422,
            Some("application/problem+json"),
            r#"{"message":"name is required","detail":{"field":"name"}}"#,
        ));

        let failure = response.failure().unwrap();
        assert_eq!(failure.status, Status::UnprocessableEntity);
        assert_eq!(failure.message, "name is required");
        assert_eq!(failure.detail.as_deref(), Some(r#"{"field":"name"}"#));
        assert!(failure.cause.is_none());
    }

    #[test]
    fn non_json_error_gets_generic_message() {
        let response = translate(completed(503, Some("text/html"), "<h1>down</h1>"));

        let failure = response.failure().unwrap();
        assert_eq!(failure.status, Status::ServiceUnavailable);
        assert_eq!(failure.message, "request failed with status 503");
        assert_eq!(failure.meta.raw_body, "<h1>down</h1>");
    }

    #[test]
    fn unknown_codes_collapse() {
        let response = translate(completed(299, None, ""));
        assert_eq!(response.status(), Status::Unknown(299));
        assert!(!response.is_success());
    }

    #[test]
    fn transport_outcomes_map_to_statuses() {
        let cases = [
            (AttemptOutcome::TimedOut, Status::TimedOut),
            (
                AttemptOutcome::TransientFailure("refused".to_string()),
                Status::ConnectionFailure,
            ),
            (
                AttemptOutcome::TerminalFailure("bad url".to_string()),
                Status::InvalidRequest,
            ),
            (AttemptOutcome::Cancelled, Status::Cancelled),
        ];

        for (outcome, expected) in cases {
            let response = translate(Dispatch {
                outcome,
                attempts: 2,
                elapsed: Duration::from_millis(1),
            });
            let failure = response.failure().unwrap();
            assert_eq!(failure.status, expected);
            assert_eq!(failure.meta.attempts, 2);
            assert!(failure.cause.is_some());
        }
    }

    #[test]
    fn unsent_calls_carry_the_serialization_cause() {
        let response: ApiResponse<User> = ResponseTranslator::new(&JsonSerializer)
            .unsent("create", SerializationError::Serialize("unsupported".to_string()));

        let failure = response.failure().unwrap();
        assert_eq!(failure.status, Status::InvalidRequest);
        assert_eq!(failure.meta.attempts, 0);
        assert!(matches!(
            failure.cause.as_deref(),
            Some(Error::Serialization(SerializationError::Serialize(_)))
        ));
    }

    #[test]
    fn void_translation_ignores_body() {
        let response = ResponseTranslator::new(&JsonSerializer)
            .translate_void(&request(), completed(200, None, "not json"));
        assert!(response.is_success());
        assert_eq!(response.meta().raw_body, "not json");
    }
}
