//! Error types for resource clients.
//!
//! Errors fall into two groups. Construction-time errors ([`SchemaError`],
//! [`Error::Configuration`], [`Error::InvalidUrl`]) abort building a client or a
//! handle. Call-time errors are returned before any network activity when an
//! invocation cannot be turned into a request. Transport and application
//! failures are *not* errors: they are captured in
//! [`ApiResponse::Failure`](crate::ApiResponse::Failure) unless the caller opted
//! into [`CallOptions::throw_on_failure`](crate::CallOptions::throw_on_failure).

use std::fmt;

use crate::response::FailureResponse;

/// The main error type for resource clients.
///
/// # Examples
///
/// ```no_run
/// use restbind::{Arguments, ApiHandle, Error, Resource};
///
/// # async fn example<R: Resource>(users: ApiHandle<R>) -> Result<(), Error> {
/// match users.invoke::<serde_json::Value>("get_user", &Arguments::new()).await {
///     Ok(response) if response.is_success() => println!("{:?}", response.payload()),
///     Ok(response) => println!("failed with {}", response.status()),
///     Err(Error::MissingRouteValue { placeholder, .. }) => {
///         eprintln!("forgot to pass `{}`", placeholder);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A resource declaration is invalid.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Invalid configuration was provided.
    ///
    /// Raised eagerly while building settings or a client: a retry budget out of
    /// range, a zero timeout, a base address without a trailing `/`, or an
    /// invalid default header.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An invalid URL was provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The handle's resource declares no method with this name.
    #[error("Resource `{resource}` has no method named `{method}`")]
    UnknownMethod {
        /// The resource name.
        resource: String,
        /// The requested method name.
        method: String,
    },

    /// A required route placeholder had no value.
    #[error("Method `{method}` requires a value for `{{{placeholder}}}`")]
    MissingRouteValue {
        /// The method being invoked.
        method: String,
        /// The placeholder without a value.
        placeholder: String,
    },

    /// An argument was passed that the method does not bind.
    #[error("Method `{method}` has no parameter named `{argument}`")]
    UnboundArgument {
        /// The method being invoked.
        method: String,
        /// The unexpected argument name.
        argument: String,
    },

    /// A header-bound argument could not be encoded as a header value.
    #[error("Invalid value for header `{header}`: {reason}")]
    InvalidHeader {
        /// The header key.
        header: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A request body could not be serialized or a response body deserialized.
    #[error(transparent)]
    Serialization(#[from] SerializationError),

    /// Every attempt timed out.
    #[error("Request timed out")]
    Timeout,

    /// The transport could not reach the remote end.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The transport rejected the request as malformed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The caller cancelled the request.
    #[error("Request was cancelled")]
    Cancelled,

    /// A call made with `throw_on_failure` produced a failure response.
    #[error("Call failed with status {}: {}", .0.status, .0.message)]
    CallFailed(Box<FailureResponse>),
}

impl Error {
    /// Returns `true` if this error describes a condition the dispatch engine retries.
    ///
    /// Only timeouts and connection failures are retryable. Application-level
    /// failure statuses are never retried by the engine.
    ///
    /// # Examples
    ///
    /// ```
    /// use restbind::Error;
    ///
    /// assert!(Error::Timeout.is_retryable());
    /// assert!(Error::Connection("refused".to_string()).is_retryable());
    /// assert!(!Error::Cancelled.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Timeout | Error::Connection(_))
    }

    /// Returns `true` for errors raised while building a client, a handle or a schema.
    pub fn is_construction_error(&self) -> bool {
        matches!(
            self,
            Error::Schema(_) | Error::Configuration(_) | Error::InvalidUrl(_)
        )
    }

    /// Returns the failure response carried by [`Error::CallFailed`].
    pub fn failure(&self) -> Option<&FailureResponse> {
        match self {
            Error::CallFailed(failure) => Some(failure),
            _ => None,
        }
    }
}

/// A specialized `Result` type for resource clients.
pub type Result<T> = std::result::Result<T, Error>;

/// A body could not be converted to or from its wire form.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SerializationError {
    /// The request body could not be serialized.
    #[error("Failed to serialize request body: {0}")]
    Serialize(String),

    /// The response body could not be deserialized into the declared type.
    ///
    /// The raw response is kept for debugging.
    #[error("Failed to deserialize response: {message}")]
    Deserialize {
        /// The underlying serializer message.
        message: String,
        /// The raw response body.
        raw_response: String,
    },
}

/// One authoring mistake found while validating a resource declaration.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaProblem {
    /// The resource has an empty name.
    #[error("resource name is empty")]
    EmptyResourceName,

    /// Two methods share a name.
    #[error("method `{method}` is declared more than once")]
    DuplicateMethod {
        /// The repeated method name.
        method: String,
    },

    /// Two methods share a verb and template.
    #[error("`{verb} {template}` is declared by both `{first}` and `{second}`")]
    DuplicateRoute {
        /// The shared HTTP verb.
        verb: String,
        /// The shared template.
        template: String,
        /// The method declared first.
        first: String,
        /// The method declared second.
        second: String,
    },

    /// A template token is not a literal nor a well-formed placeholder.
    #[error("method `{method}`: malformed template token `{token}`")]
    MalformedTemplate {
        /// The method name.
        method: String,
        /// The offending token.
        token: String,
    },

    /// A placeholder appears more than once in a template.
    #[error("method `{method}`: placeholder `{placeholder}` appears more than once")]
    DuplicatePlaceholder {
        /// The method name.
        method: String,
        /// The repeated placeholder.
        placeholder: String,
    },

    /// A placeholder has no path binding.
    #[error("method `{method}`: placeholder `{placeholder}` has no path parameter")]
    UnmappedPlaceholder {
        /// The method name.
        method: String,
        /// The placeholder without a binding.
        placeholder: String,
    },

    /// A path binding has no placeholder.
    #[error("method `{method}`: path parameter `{parameter}` has no placeholder in the template")]
    UnboundPathParameter {
        /// The method name.
        method: String,
        /// The parameter without a placeholder.
        parameter: String,
    },

    /// Two bindings share a parameter name.
    #[error("method `{method}`: parameter `{parameter}` is bound more than once")]
    DuplicateParameter {
        /// The method name.
        method: String,
        /// The repeated parameter.
        parameter: String,
    },

    /// More than one parameter is bound to the body.
    #[error("method `{method}`: only one parameter may be bound to the body, found {count}")]
    MultipleBodyBindings {
        /// The method name.
        method: String,
        /// The number of body bindings.
        count: usize,
    },

    /// Two query bindings resolve to the same key.
    #[error("method `{method}`: query key `{key}` is produced by more than one parameter")]
    QueryKeyCollision {
        /// The method name.
        method: String,
        /// The colliding key.
        key: String,
    },

    /// A header binding declares an empty or invalid key.
    #[error("method `{method}`: parameter `{parameter}` has invalid header key `{key}`")]
    InvalidHeaderKey {
        /// The method name.
        method: String,
        /// The parameter name.
        parameter: String,
        /// The rejected key.
        key: String,
    },
}

/// A resource declaration failed validation.
///
/// Every problem found is collected so a whole API surface can be checked at
/// startup in one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaError {
    resource: String,
    problems: Vec<SchemaProblem>,
}

impl SchemaError {
    pub(crate) fn new(resource: impl Into<String>, problems: Vec<SchemaProblem>) -> Self {
        Self {
            resource: resource.into(),
            problems,
        }
    }

    /// The name of the resource that failed validation.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Every problem found in the declaration.
    pub fn problems(&self) -> &[SchemaProblem] {
        &self.problems
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid schema for resource `{}` ({} problem(s))",
            self.resource,
            self.problems.len()
        )?;
        for problem in &self.problems {
            write!(f, "; {}", problem)?;
        }
        Ok(())
    }
}

impl std::error::Error for SchemaError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_error_lists_every_problem() {
        let err = SchemaError::new(
            "Users",
            vec![
                SchemaProblem::EmptyResourceName,
                SchemaProblem::MultipleBodyBindings {
                    method: "create".to_string(),
                    count: 2,
                },
            ],
        );

        let text = err.to_string();
        assert!(text.starts_with("Invalid schema for resource `Users` (2 problem(s))"));
        assert!(text.contains("only one parameter may be bound to the body, found 2"));
    }

    #[test]
    fn missing_route_value_renders_braces() {
        let err = Error::MissingRouteValue {
            method: "get".to_string(),
            placeholder: "id".to_string(),
        };
        assert_eq!(err.to_string(), "Method `get` requires a value for `{id}`");
    }

    #[test]
    fn construction_errors_are_classified() {
        assert!(Error::Configuration("x".to_string()).is_construction_error());
        assert!(Error::Schema(SchemaError::new("A", vec![])).is_construction_error());
        assert!(!Error::Timeout.is_construction_error());
    }
}
