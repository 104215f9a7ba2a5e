//! The client and typed resource handles.
//!
//! A [`Client`] owns everything that lives longer than one call: the
//! connection settings, the serializer, the event relay, the lazily built
//! transport and the schema registry. An [`ApiHandle`] binds one [`Resource`]
//! to a client and is the entry point for hand-written adapters.

use crate::args::Arguments;
use crate::config::ConnectionSettings;
use crate::dispatch::{Dispatch, DispatchEngine};
use crate::events::{ApiEvent, EventRelay, EventSink};
use crate::request::{ApiRequest, RequestBuilder};
use crate::response::ApiResponse;
use crate::schema::{Resource, ResourceSchema, SchemaRegistry};
use crate::serializer::{JsonSerializer, Serializer};
use crate::translate::ResponseTranslator;
use crate::transport::{ReqwestTransport, Transport, TransportFactory};
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

/// A client for one remote API.
///
/// The client is cheap to clone and is designed to be shared. Independently
/// built clients never share schemas or transports.
///
/// # Examples
///
/// ```no_run
/// use restbind::{Arguments, Client, ConnectionSettings, Resource, ResourceSchema,
///     ResourceSchemaBuilder, RouteSchema};
/// use serde::Deserialize;
///
/// #[derive(Debug, Default, Deserialize)]
/// struct User {
///     id: u64,
///     name: String,
/// }
///
/// struct Users;
///
/// impl Resource for Users {
///     fn describe() -> ResourceSchemaBuilder {
///         ResourceSchema::builder("Users").route(RouteSchema::get("get", "{id}").path("id"))
///     }
/// }
///
/// # async fn example() -> Result<(), restbind::Error> {
/// let client = Client::builder()
///     .settings(
///         ConnectionSettings::builder()
///             .base_address("https://api.example.com/")?
///             .retry_attempts(3)
///             .build()?,
///     )
///     .build()?;
///
/// let users = client.handle::<Users>()?;
/// let response = users.invoke::<User>("get", &Arguments::new().arg("id", 42)).await?;
/// if let Some(user) = response.payload() {
///     println!("User: {}", user.name);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    settings: Arc<ConnectionSettings>,
    serializer: Arc<dyn Serializer>,
    relay: EventRelay,
    transport: OnceCell<Arc<dyn Transport>>,
    transport_factory: TransportFactory,
    schemas: SchemaRegistry,
}

impl Client {
    /// Creates a new `ClientBuilder`.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// The connection settings shared by every call.
    pub fn settings(&self) -> &ConnectionSettings {
        &self.inner.settings
    }

    /// The event relay notified by every call.
    pub fn relay(&self) -> &EventRelay {
        &self.inner.relay
    }

    /// Builds and caches the schema for `R` without creating a handle.
    ///
    /// Call this at startup to validate an API surface before any request
    /// is made.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schema`] listing every problem in the declaration.
    pub fn register<R: Resource>(&self) -> Result<()> {
        self.inner.schemas.get_or_build::<R>()?;
        Ok(())
    }

    /// The number of resources whose schema has been built.
    pub fn registered_resources(&self) -> usize {
        self.inner.schemas.len()
    }

    /// Creates a handle for `R`, building its schema on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schema`] if the resource declaration is invalid.
    pub fn handle<R: Resource>(&self) -> Result<ApiHandle<R>> {
        let schema = self.inner.schemas.get_or_build::<R>()?;
        Ok(ApiHandle {
            client: self.clone(),
            schema,
            _resource: PhantomData,
        })
    }

    /// Returns the transport, building it on first use.
    ///
    /// Concurrent first callers wait for a single initialization.
    async fn transport(&self) -> Result<&Arc<dyn Transport>> {
        self.inner
            .transport
            .get_or_try_init(|| async {
                tracing::debug!(
                    base_address = %self.inner.settings.base_address(),
                    "Initializing transport"
                );
                (self.inner.transport_factory)(&self.inner.settings)
            })
            .await
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("settings", &self.inner.settings)
            .field("relay", &self.inner.relay)
            .field("transport_ready", &self.inner.transport.initialized())
            .finish()
    }
}

/// Per-call options.
///
/// ```
/// use restbind::CallOptions;
/// use tokio_util::sync::CancellationToken;
///
/// let token = CancellationToken::new();
/// let options = CallOptions::new()
///     .throw_on_failure(true)
///     .cancellation(token.clone());
/// assert!(options.throws_on_failure());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    throw_on_failure: bool,
    cancellation: Option<CancellationToken>,
}

impl CallOptions {
    /// Options with failures returned as responses and no cancellation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns failure responses as `Err(Error::CallFailed(..))` instead.
    pub fn throw_on_failure(mut self, enabled: bool) -> Self {
        self.throw_on_failure = enabled;
        self
    }

    /// Cancels the call when `token` is cancelled.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Whether failures are returned as errors.
    pub fn throws_on_failure(&self) -> bool {
        self.throw_on_failure
    }

    /// The cancellation token, if any.
    pub fn cancellation_token(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }
}

/// A ready-to-use binding of resource `R` to a client.
///
/// Adapters wrap a handle and call [`invoke`](Self::invoke) or
/// [`invoke_void`](Self::invoke_void) with a method name and arguments.
/// Every call performs exactly one logical request, retries included.
pub struct ApiHandle<R> {
    client: Client,
    schema: Arc<ResourceSchema>,
    _resource: PhantomData<fn() -> R>,
}

impl<R> Clone for ApiHandle<R> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            schema: Arc::clone(&self.schema),
            _resource: PhantomData,
        }
    }
}

impl<R> std::fmt::Debug for ApiHandle<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiHandle")
            .field("resource", &self.schema.name())
            .finish()
    }
}

impl<R: Resource> ApiHandle<R> {
    /// The validated schema of `R`.
    pub fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    /// The client this handle belongs to.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Builds the request for `method` without sending it.
    ///
    /// `T` is the declared response type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownMethod`] if `R` declares no such method, and
    /// the call construction errors of [`RequestBuilder::build`].
    pub fn prepare<T>(&self, method: &str, args: &Arguments) -> Result<ApiRequest> {
        let route = self
            .schema
            .route(method)
            .ok_or_else(|| Error::UnknownMethod {
                resource: self.schema.name().to_string(),
                method: method.to_string(),
            })?;

        let inner = &self.client.inner;
        RequestBuilder::new(&inner.settings, inner.serializer.as_ref())
            .build::<T>(&self.schema, route, args)
    }

    /// Invokes `method` and translates the response into `T`.
    ///
    /// # Errors
    ///
    /// Returns an error only when the request cannot be constructed. Network
    /// failures, error statuses and serialization failures are reported as
    /// [`ApiResponse::Failure`].
    pub async fn invoke<T>(&self, method: &str, args: &Arguments) -> Result<ApiResponse<T>>
    where
        T: DeserializeOwned + Default,
    {
        self.invoke_with(method, args, &CallOptions::default()).await
    }

    /// Like [`invoke`](Self::invoke), with per-call options.
    ///
    /// # Errors
    ///
    /// As [`invoke`](Self::invoke), plus [`Error::CallFailed`] for failure
    /// responses when `throw_on_failure` is set.
    pub async fn invoke_with<T>(
        &self,
        method: &str,
        args: &Arguments,
        options: &CallOptions,
    ) -> Result<ApiResponse<T>>
    where
        T: DeserializeOwned + Default,
    {
        let translator = ResponseTranslator::new(self.client.inner.serializer.as_ref());
        let request = match self.prepare::<T>(method, args) {
            Ok(request) => request,
            Err(Error::Serialization(e)) => return complete(translator.unsent(method, e), options),
            Err(e) => return Err(e),
        };
        let dispatch = self.dispatch(&request, options).await?;
        complete(translator.translate(&request, dispatch), options)
    }

    /// Invokes a method that declares no response payload.
    ///
    /// # Errors
    ///
    /// As [`invoke`](Self::invoke).
    pub async fn invoke_void(&self, method: &str, args: &Arguments) -> Result<ApiResponse<()>> {
        self.invoke_void_with(method, args, &CallOptions::default())
            .await
    }

    /// Like [`invoke_void`](Self::invoke_void), with per-call options.
    ///
    /// # Errors
    ///
    /// As [`invoke_with`](Self::invoke_with).
    pub async fn invoke_void_with(
        &self,
        method: &str,
        args: &Arguments,
        options: &CallOptions,
    ) -> Result<ApiResponse<()>> {
        let translator = ResponseTranslator::new(self.client.inner.serializer.as_ref());
        let request = match self.prepare::<()>(method, args) {
            Ok(request) => request,
            Err(Error::Serialization(e)) => return complete(translator.unsent(method, e), options),
            Err(e) => return Err(e),
        };
        let dispatch = self.dispatch(&request, options).await?;
        complete(translator.translate_void(&request, dispatch), options)
    }

    async fn dispatch(&self, request: &ApiRequest, options: &CallOptions) -> Result<Dispatch> {
        let inner = &self.client.inner;

        inner.relay.publish(ApiEvent::RequestBuilt {
            request_id: request.id(),
            method: request.verb().clone(),
            path: request.path(),
        });

        tracing::debug!(
            request_id = %request.id(),
            resource = %self.schema.name(),
            method = %request.method_name(),
            verb = %request.verb(),
            path = %request.path(),
            "Built request"
        );

        let transport = self.client.transport().await?;
        DispatchEngine::new(&**transport, &inner.settings, &inner.relay)
            .dispatch(request, options.cancellation_token())
            .await
    }
}

fn complete<T>(response: ApiResponse<T>, options: &CallOptions) -> Result<ApiResponse<T>> {
    match response {
        ApiResponse::Failure(failure) if options.throw_on_failure => {
            Err(Error::CallFailed(Box::new(failure)))
        }
        response => Ok(response),
    }
}

/// Builder for configuring and creating a [`Client`].
///
/// Only the connection settings are required. The transport defaults to
/// [`ReqwestTransport`] and the serializer to [`JsonSerializer`].
pub struct ClientBuilder {
    settings: Option<ConnectionSettings>,
    serializer: Arc<dyn Serializer>,
    relay: EventRelay,
    transport_factory: Option<TransportFactory>,
}

impl ClientBuilder {
    /// Creates a new `ClientBuilder` with default settings.
    pub fn new() -> Self {
        Self {
            settings: None,
            serializer: Arc::new(JsonSerializer),
            relay: EventRelay::new(),
            transport_factory: None,
        }
    }

    /// Sets the connection settings.
    pub fn settings(mut self, settings: ConnectionSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Uses an already built transport.
    pub fn transport(self, transport: impl Transport + 'static) -> Self {
        let transport: Arc<dyn Transport> = Arc::new(transport);
        self.transport_factory(move |_| Ok(Arc::clone(&transport)))
    }

    /// Builds the transport from the settings on first use.
    pub fn transport_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&ConnectionSettings) -> Result<Arc<dyn Transport>> + Send + Sync + 'static,
    {
        self.transport_factory = Some(Arc::new(factory));
        self
    }

    /// Sets the body serializer.
    pub fn serializer(mut self, serializer: impl Serializer + 'static) -> Self {
        self.serializer = Arc::new(serializer);
        self
    }

    /// Adds an event sink.
    pub fn event_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.relay = self.relay.with_sink(sink);
        self
    }

    /// Adds a shared event sink.
    pub fn shared_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.relay = self.relay.with_shared_sink(sink);
        self
    }

    /// Builds the configured `Client`.
    ///
    /// # Errors
    ///
    /// Returns an error if no connection settings were provided.
    pub fn build(self) -> Result<Client> {
        let settings = self.settings.ok_or_else(|| {
            Error::Configuration("Connection settings are required".to_string())
        })?;

        let transport_factory = self
            .transport_factory
            .unwrap_or_else(|| Arc::new(reqwest_transport));

        Ok(Client {
            inner: Arc::new(ClientInner {
                settings: Arc::new(settings),
                serializer: self.serializer,
                relay: self.relay,
                transport: OnceCell::new(),
                transport_factory,
                schemas: SchemaRegistry::default(),
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn reqwest_transport(settings: &ConnectionSettings) -> Result<Arc<dyn Transport>> {
    Ok(Arc::new(ReqwestTransport::new(settings)?))
}
