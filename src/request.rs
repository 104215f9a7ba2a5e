//! Transport-agnostic requests and the builder that assembles them.
//!
//! [`RequestBuilder`] turns a route declaration and live arguments into an
//! [`ApiRequest`] without touching the network.

use crate::args::Arguments;
use crate::config::ConnectionSettings;
use crate::route::{Route, RouteFactory};
use crate::schema::{BindingKind, ResourceSchema, RouteSchema};
use crate::serializer::{Content, Serializer};
use crate::{Error, Result};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use std::collections::BTreeMap;
use std::fmt;
use url::Url;
use uuid::Uuid;

/// The identity of one invocation, used as a correlation id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generates a fresh random identity.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A fully built request for one invocation.
///
/// Immutable once built; the dispatch engine consumes it by reference and may
/// send it several times when retrying.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    id: RequestId,
    method_name: String,
    verb: Method,
    route: Route,
    headers: HeaderMap,
    body: Option<Content>,
    response_type: &'static str,
}

impl ApiRequest {
    /// The correlation id.
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// The resource method that produced this request.
    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    /// The HTTP verb.
    pub fn verb(&self) -> &Method {
        &self.verb
    }

    /// The resolved route.
    pub fn route(&self) -> &Route {
        &self.route
    }

    /// The relative path, `resource/version/endpoint`.
    pub fn path(&self) -> String {
        self.route.path()
    }

    /// Query entries.
    pub fn query(&self) -> &BTreeMap<String, String> {
        self.route.query()
    }

    /// Request headers, defaults included.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The serialized body, if any.
    pub fn body(&self) -> Option<&Content> {
        self.body.as_ref()
    }

    /// The name of the declared response type.
    pub fn response_type(&self) -> &'static str {
        self.response_type
    }

    /// The absolute URL of this request.
    ///
    /// # Errors
    ///
    /// Returns an error if the base address cannot carry a path.
    pub fn url(&self, base: &Url) -> Result<Url> {
        self.route.to_url(base)
    }
}

/// Assembles [`ApiRequest`]s.
#[derive(Clone, Copy)]
pub struct RequestBuilder<'a> {
    settings: &'a ConnectionSettings,
    serializer: &'a dyn Serializer,
}

impl<'a> RequestBuilder<'a> {
    /// Creates a builder over the given settings and serializer.
    pub fn new(settings: &'a ConnectionSettings, serializer: &'a dyn Serializer) -> Self {
        Self {
            settings,
            serializer,
        }
    }

    /// Builds the request for one invocation of `route`.
    ///
    /// `T` is the declared response type; only its name is recorded.
    ///
    /// # Errors
    ///
    /// Returns the route errors of [`RouteFactory::build`], [`Error::InvalidHeader`]
    /// for header values that cannot be sent, and [`Error::Serialization`] when
    /// the body cannot be serialized.
    pub fn build<T>(
        &self,
        resource: &ResourceSchema,
        route: &RouteSchema,
        args: &Arguments,
    ) -> Result<ApiRequest> {
        let resolved = RouteFactory::new(self.settings).build(resource, route, args)?;

        let mut headers = self.settings.default_headers().clone();
        let mut body = None;

        for binding in route.bindings() {
            let Some(value) = args.get(binding.name()).filter(|value| !value.is_null()) else {
                continue;
            };

            match binding.kind() {
                BindingKind::Header { key } => {
                    let text = value.to_param_string().unwrap_or_default();
                    let name = HeaderName::try_from(key.as_str()).map_err(|e| {
                        Error::InvalidHeader {
                            header: key.clone(),
                            reason: e.to_string(),
                        }
                    })?;
                    let value = HeaderValue::try_from(text).map_err(|e| Error::InvalidHeader {
                        header: key.clone(),
                        reason: e.to_string(),
                    })?;
                    headers.insert(name, value);
                }
                BindingKind::Body => {
                    body = Some(self.serializer.serialize(&value.to_json())?);
                }
                BindingKind::Path | BindingKind::Query { .. } => {}
            }
        }

        Ok(ApiRequest {
            id: RequestId::new(),
            method_name: route.method_name().to_string(),
            verb: route.verb().clone(),
            route: resolved,
            headers,
            body,
            response_type: std::any::type_name::<T>(),
        })
    }
}
