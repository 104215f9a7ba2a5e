//! # restbind - Typed bindings for REST resources
//!
//! restbind turns a declarative description of a REST resource into a typed,
//! retry-aware client. You describe each resource once (its name, version and
//! the routes of its methods), and a hand-written adapter calls the shared
//! [`ApiHandle::invoke`] core with a method name and [`Arguments`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use restbind::{
//!     ApiHandle, ApiResponse, Arguments, Client, ConnectionSettings, Resource, ResourceSchema,
//!     ResourceSchemaBuilder, RouteSchema,
//! };
//! use serde::{Deserialize, Serialize};
//! use std::time::Duration;
//!
//! #[derive(Serialize)]
//! struct NewUser {
//!     name: String,
//! }
//!
//! #[derive(Debug, Default, Deserialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! struct Users;
//!
//! impl Resource for Users {
//!     fn describe() -> ResourceSchemaBuilder {
//!         ResourceSchema::builder("Users")
//!             .version("v1")
//!             .route(RouteSchema::get("get", "{id}").path("id"))
//!             .route(RouteSchema::get("search", "").query_as("first_name", "first"))
//!             .route(RouteSchema::post("create", "").body("user"))
//!     }
//! }
//!
//! /// The adapter: one method per remote operation.
//! struct UsersApi(ApiHandle<Users>);
//!
//! impl UsersApi {
//!     async fn get(&self, id: u64) -> restbind::Result<ApiResponse<User>> {
//!         self.0.invoke("get", &Arguments::new().arg("id", id)).await
//!     }
//!
//!     async fn create(&self, user: &NewUser) -> restbind::Result<ApiResponse<User>> {
//!         self.0.invoke("create", &Arguments::new().json("user", user)?).await
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), restbind::Error> {
//!     let client = Client::builder()
//!         .settings(
//!             ConnectionSettings::builder()
//!                 .base_address("https://api.example.com/")?
//!                 .resource_path_prefix("api")
//!                 .timeout(Duration::from_secs(10))
//!                 .retry_attempts(3)
//!                 .build()?,
//!         )
//!         .build()?;
//!
//!     // GET https://api.example.com/api/Users/v1/42
//!     let users = UsersApi(client.handle::<Users>()?);
//!     match users.get(42).await? {
//!         ApiResponse::Success(success) => println!("User: {}", success.payload.name),
//!         ApiResponse::Failure(failure) => eprintln!("{}: {}", failure.status, failure.message),
//!     }
//!
//!     let created = users.create(&NewUser { name: "Alice".to_string() }).await?;
//!     println!("Created in {:?}", created.meta().latency);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Fail-fast schemas** - Every declaration mistake is reported at once, before any request
//! - **Deterministic routes** - `{base}/{prefix}/{resource}/{version}/{endpoint}?{query}`
//! - **Bounded retries** - Timeouts and connection failures are retried up to five attempts
//! - **No exceptions for outcomes** - Error statuses and bad bodies become failure responses
//! - **Lifecycle events** - Observe every attempt through synchronous [`EventSink`]s
//! - **Automatic logging** - Structured logging with `tracing` for observability
//! - **Pluggable seams** - Swap the [`Transport`] or the [`Serializer`]
//! - **Cancellation** - Abort calls with a `CancellationToken`, including during backoff
//!
//! ## Error Handling
//!
//! Construction mistakes are returned as [`Error`]. Everything that happens on
//! the wire is an [`ApiResponse`]:
//!
//! ```no_run
//! use restbind::{ApiHandle, ApiResponse, Arguments, Error, Resource, Status};
//!
//! # async fn example<R: Resource>(users: ApiHandle<R>) -> Result<(), Error> {
//! match users.invoke::<serde_json::Value>("get", &Arguments::new().arg("id", 1)).await {
//!     Ok(ApiResponse::Success(success)) => println!("Success: {:?}", success.payload),
//!     Ok(ApiResponse::Failure(failure)) if failure.status == Status::TimedOut => {
//!         eprintln!("Gave up after {} attempt(s)", failure.meta.attempts);
//!     }
//!     Ok(ApiResponse::Failure(failure)) => {
//!         eprintln!("HTTP error {}: {}", failure.status, failure.meta.raw_body);
//!     }
//!     Err(e) => eprintln!("Could not build the call: {}", e),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Retries
//!
//! ```no_run
//! use restbind::{Backoff, ConnectionSettings};
//! use std::time::Duration;
//!
//! # fn example() -> Result<(), restbind::Error> {
//! let settings = ConnectionSettings::builder()
//!     .base_address("https://api.example.com/")?
//!     .retry_attempts(5)
//!     .backoff(Backoff::Exponential {
//!         initial_delay: Duration::from_millis(100),
//!         max_delay: Duration::from_secs(5),
//!         jitter: true,
//!     })
//!     .build()?;
//! # Ok(())
//! # }
//! ```

mod args;
mod client;
mod config;
mod dispatch;
mod error;
pub mod events;
mod request;
mod response;
pub mod retry;
mod route;
mod schema;
mod serializer;
mod translate;
pub mod transport;

pub use args::{ArgValue, Arguments, DATE_FORMAT, DATE_TIME_FORMAT};
pub use client::{ApiHandle, CallOptions, Client, ClientBuilder};
pub use config::{ConnectionConfig, ConnectionSettings, ConnectionSettingsBuilder, DEFAULT_TIMEOUT};
pub use dispatch::{AttemptOutcome, Dispatch, DispatchEngine};
pub use error::{Error, Result, SchemaError, SchemaProblem, SerializationError};
pub use events::{ApiEvent, ChannelSink, EventRelay, EventSink, FailureKind};
pub use request::{ApiRequest, RequestBuilder, RequestId};
pub use response::{ApiResponse, FailureResponse, ResponseMeta, Status, SuccessResponse};
pub use retry::{Backoff, RetryAttempts};
pub use route::{Route, RouteFactory};
pub use schema::{
    BindingKind, ParameterBinding, Resource, ResourceSchema, ResourceSchemaBuilder, RouteSchema,
    RouteSchemaBuilder, TemplateSegment,
};
pub use serializer::{Content, JsonSerializer, Serializer};
pub use translate::ResponseTranslator;
pub use transport::{
    RawResponse, ReqwestTransport, Transport, TransportFactory, TransportOutcome,
    TransportRequest, CORRELATION_HEADER,
};
