//! Typed call results.
//!
//! Every invocation that gets past request construction yields an
//! [`ApiResponse`]: either a [`SuccessResponse`] with a typed payload or a
//! [`FailureResponse`] with a status and message. Both carry [`ResponseMeta`]
//! with the raw body, headers, latency and attempt count for debugging.

use crate::request::RequestId;
use crate::Error;
use http::HeaderMap;
use std::fmt;
use std::time::Duration;

/// The outcome status of a call.
///
/// HTTP codes map to named variants; other codes collapse to
/// [`Status::Unknown`]. Outcomes without an HTTP response have their own
/// variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// 200
    Ok,
    /// 201
    Created,
    /// 202
    Accepted,
    /// 204
    NoContent,
    /// 301
    MovedPermanently,
    /// 302
    Found,
    /// 304
    NotModified,
    /// 400
    BadRequest,
    /// 401
    Unauthorized,
    /// 403
    Forbidden,
    /// 404
    NotFound,
    /// 405
    MethodNotAllowed,
    /// 408
    RequestTimeout,
    /// 409
    Conflict,
    /// 410
    Gone,
    /// 412
    PreconditionFailed,
    /// 415
    UnsupportedMediaType,
    /// 422
    UnprocessableEntity,
    /// 429
    TooManyRequests,
    /// 500
    InternalServerError,
    /// 501
    NotImplemented,
    /// 502
    BadGateway,
    /// 503
    ServiceUnavailable,
    /// 504
    GatewayTimeout,
    /// Every attempt exceeded the timeout.
    TimedOut,
    /// The remote end could not be reached.
    ConnectionFailure,
    /// The transport rejected the request as malformed.
    InvalidRequest,
    /// The caller cancelled the request.
    Cancelled,
    /// An HTTP code without a named variant.
    Unknown(u16),
}

impl Status {
    /// Maps an HTTP status code.
    ///
    /// # Examples
    ///
    /// ```
    /// use restbind::Status;
    ///
    /// assert_eq!(Status::from_code(204), Status::NoContent);
    /// assert_eq!(Status::from_code(418), Status::Unknown(418));
    /// assert!(!Status::from_code(206).is_success());
    /// ```
    pub fn from_code(code: u16) -> Self {
        match code {
            200 => Status::Ok,
            201 => Status::Created,
            202 => Status::Accepted,
            204 => Status::NoContent,
            301 => Status::MovedPermanently,
            302 => Status::Found,
            304 => Status::NotModified,
            400 => Status::BadRequest,
            401 => Status::Unauthorized,
            403 => Status::Forbidden,
            404 => Status::NotFound,
            405 => Status::MethodNotAllowed,
            408 => Status::RequestTimeout,
            409 => Status::Conflict,
            410 => Status::Gone,
            412 => Status::PreconditionFailed,
            415 => Status::UnsupportedMediaType,
            422 => Status::UnprocessableEntity,
            429 => Status::TooManyRequests,
            500 => Status::InternalServerError,
            501 => Status::NotImplemented,
            502 => Status::BadGateway,
            503 => Status::ServiceUnavailable,
            504 => Status::GatewayTimeout,
            other => Status::Unknown(other),
        }
    }

    /// The HTTP code, if this status came from a response.
    pub fn code(self) -> Option<u16> {
        let code = match self {
            Status::Ok => 200,
            Status::Created => 201,
            Status::Accepted => 202,
            Status::NoContent => 204,
            Status::MovedPermanently => 301,
            Status::Found => 302,
            Status::NotModified => 304,
            Status::BadRequest => 400,
            Status::Unauthorized => 401,
            Status::Forbidden => 403,
            Status::NotFound => 404,
            Status::MethodNotAllowed => 405,
            Status::RequestTimeout => 408,
            Status::Conflict => 409,
            Status::Gone => 410,
            Status::PreconditionFailed => 412,
            Status::UnsupportedMediaType => 415,
            Status::UnprocessableEntity => 422,
            Status::TooManyRequests => 429,
            Status::InternalServerError => 500,
            Status::NotImplemented => 501,
            Status::BadGateway => 502,
            Status::ServiceUnavailable => 503,
            Status::GatewayTimeout => 504,
            Status::Unknown(code) => code,
            Status::TimedOut
            | Status::ConnectionFailure
            | Status::InvalidRequest
            | Status::Cancelled => return None,
        };
        Some(code)
    }

    /// Returns `true` for Ok, Created, Accepted and NoContent.
    pub fn is_success(self) -> bool {
        matches!(
            self,
            Status::Ok | Status::Created | Status::Accepted | Status::NoContent
        )
    }

    /// Returns `true` for 4xx codes.
    pub fn is_client_error(self) -> bool {
        matches!(self.code(), Some(400..=499))
    }

    /// Returns `true` for 5xx codes.
    pub fn is_server_error(self) -> bool {
        matches!(self.code(), Some(500..=599))
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self, self.code()) {
            (Status::Unknown(code), _) => write!(f, "{} Unknown", code),
            (_, Some(code)) => write!(f, "{} {:?}", code, self),
            (_, None) => write!(f, "{:?}", self),
        }
    }
}

/// Details shared by success and failure responses.
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    /// The identity of the request.
    pub request_id: RequestId,

    /// The response headers. Empty when no response was received.
    pub headers: HeaderMap,

    /// The raw response body. Empty when no response was received.
    pub raw_body: String,

    /// Total time across all attempts.
    pub latency: Duration,

    /// The number of attempts made.
    pub attempts: usize,
}

impl ResponseMeta {
    /// Returns `true` if the request required retries.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// Returns a header value by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}

/// A successful call.
#[derive(Debug, Clone)]
pub struct SuccessResponse<T> {
    /// The deserialized payload, or `T::default()` for empty bodies.
    pub payload: T,
    /// The success status.
    pub status: Status,
    /// Response details.
    pub meta: ResponseMeta,
}

/// A failed call.
#[derive(Debug)]
pub struct FailureResponse {
    /// The failure status.
    pub status: Status,
    /// A human-readable message, from the failure envelope when there is one.
    pub message: String,
    /// Extra detail from the failure envelope.
    pub detail: Option<String>,
    /// The underlying error, for transport and serialization failures.
    pub cause: Option<Box<Error>>,
    /// Response details.
    pub meta: ResponseMeta,
}

/// The result of one call: a typed success or a failure.
///
/// # Examples
///
/// ```no_run
/// use restbind::{ApiHandle, ApiResponse, Arguments, Resource};
///
/// # async fn example<R: Resource>(users: ApiHandle<R>) -> Result<(), restbind::Error> {
/// let args = Arguments::new().arg("id", 42);
/// match users.invoke::<Option<serde_json::Value>>("get", &args).await? {
///     ApiResponse::Success(success) => {
///         println!("{:?} after {} attempt(s)", success.payload, success.meta.attempts);
///     }
///     ApiResponse::Failure(failure) => {
///         eprintln!("{}: {}", failure.status, failure.message);
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub enum ApiResponse<T> {
    /// The call succeeded.
    Success(SuccessResponse<T>),
    /// The call failed.
    Failure(FailureResponse),
}

impl<T> ApiResponse<T> {
    /// Returns `true` for the success variant.
    pub fn is_success(&self) -> bool {
        matches!(self, ApiResponse::Success(_))
    }

    /// The status of either variant.
    pub fn status(&self) -> Status {
        match self {
            ApiResponse::Success(success) => success.status,
            ApiResponse::Failure(failure) => failure.status,
        }
    }

    /// Response details of either variant.
    pub fn meta(&self) -> &ResponseMeta {
        match self {
            ApiResponse::Success(success) => &success.meta,
            ApiResponse::Failure(failure) => &failure.meta,
        }
    }

    /// The payload of a success.
    pub fn payload(&self) -> Option<&T> {
        match self {
            ApiResponse::Success(success) => Some(&success.payload),
            ApiResponse::Failure(_) => None,
        }
    }

    /// Consumes the response, returning the payload of a success.
    pub fn into_payload(self) -> Option<T> {
        match self {
            ApiResponse::Success(success) => Some(success.payload),
            ApiResponse::Failure(_) => None,
        }
    }

    /// The failure, if this is one.
    pub fn failure(&self) -> Option<&FailureResponse> {
        match self {
            ApiResponse::Success(_) => None,
            ApiResponse::Failure(failure) => Some(failure),
        }
    }

    /// Converts the response into a `Result`, wrapping failures in [`Error::CallFailed`].
    pub fn into_result(self) -> Result<T, Error> {
        match self {
            ApiResponse::Success(success) => Ok(success.payload),
            ApiResponse::Failure(failure) => Err(Error::CallFailed(Box::new(failure))),
        }
    }

    /// Maps the payload of a success, preserving the metadata.
    ///
    /// # Examples
    ///
    /// ```
    /// # use restbind::{ApiResponse, RequestId, ResponseMeta, Status, SuccessResponse};
    /// # use http::HeaderMap;
    /// # use std::time::Duration;
    /// let response = ApiResponse::Success(SuccessResponse {
    ///     payload: 42,
    ///     status: Status::Ok,
    ///     meta: ResponseMeta {
    ///         request_id: RequestId::new(),
    ///         headers: HeaderMap::new(),
    ///         raw_body: "42".to_string(),
    ///         latency: Duration::from_millis(100),
    ///         attempts: 1,
    ///     },
    /// });
    ///
    /// let string_response = response.map(|n| n.to_string());
    /// assert_eq!(string_response.payload().unwrap(), "42");
    /// ```
    pub fn map<U, F>(self, f: F) -> ApiResponse<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            ApiResponse::Success(success) => ApiResponse::Success(SuccessResponse {
                payload: f(success.payload),
                status: success.status,
                meta: success.meta,
            }),
            ApiResponse::Failure(failure) => ApiResponse::Failure(failure),
        }
    }
}
