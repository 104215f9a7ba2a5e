//! Resource schemas: the static shape of every method on a resource.
//!
//! A resource is declared once through [`Resource::describe`], which returns a
//! [`ResourceSchemaBuilder`]. Building it validates every route and reports all
//! authoring mistakes at once as a [`SchemaError`], so an API surface can be
//! checked at startup instead of failing on first call.
//!
//! # Examples
//!
//! ```
//! use restbind::{Resource, ResourceSchema, ResourceSchemaBuilder, RouteSchema};
//!
//! struct Users;
//!
//! impl Resource for Users {
//!     fn describe() -> ResourceSchemaBuilder {
//!         ResourceSchema::builder("Users")
//!             .version("v1")
//!             .route(RouteSchema::get("article_link", "{id}/Link/Article/{articleId}")
//!                 .path("id")
//!                 .path("articleId"))
//!             .route(RouteSchema::get("search", "search")
//!                 .query_as("firstName", "first")
//!                 .query("lastName"))
//!     }
//! }
//!
//! let schema = Users::describe().build().unwrap();
//! assert_eq!(schema.routes().len(), 2);
//! ```

use crate::error::{SchemaError, SchemaProblem};
use http::{HeaderName, Method};
use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

/// A resource interface that can describe its own schema.
///
/// Implement this on the adapter type (or a marker type) for each API
/// interface. The description is evaluated once per client and cached.
pub trait Resource: Send + Sync + 'static {
    /// Declares the resource and its routes.
    fn describe() -> ResourceSchemaBuilder;
}

/// Where a parameter goes in the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingKind {
    /// Substituted into the `{name}` placeholder of the same name.
    Path,
    /// Added to the query map, under `name` if given, else the parameter name.
    Query {
        /// Overrides the query key.
        name: Option<String>,
    },
    /// Copied into the header map under `key`.
    Header {
        /// The header key.
        key: String,
    },
    /// Serialized as the request body.
    Body,
}

/// How one method parameter maps to a request slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterBinding {
    name: String,
    kind: BindingKind,
}

impl ParameterBinding {
    /// Creates a binding.
    pub fn new(name: impl Into<String>, kind: BindingKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// The parameter name, matched against argument names.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The binding kind.
    pub fn kind(&self) -> &BindingKind {
        &self.kind
    }

    /// The query key for query bindings.
    pub fn query_key(&self) -> Option<&str> {
        match &self.kind {
            BindingKind::Query { name } => Some(name.as_deref().unwrap_or(&self.name)),
            _ => None,
        }
    }
}

/// One `/`-separated token of a route template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSegment {
    /// Literal text.
    Literal(String),
    /// A `{name}` or `{name?}` placeholder.
    Placeholder {
        /// The placeholder name.
        name: String,
        /// Whether the placeholder may resolve to an empty segment.
        optional: bool,
    },
}

/// A validated method declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSchema {
    method_name: String,
    verb: Method,
    template: String,
    version: Option<String>,
    bindings: Vec<ParameterBinding>,
    segments: Vec<TemplateSegment>,
}

impl RouteSchema {
    /// Starts declaring a method with any verb.
    pub fn new(
        method_name: impl Into<String>,
        verb: Method,
        template: impl Into<String>,
    ) -> RouteSchemaBuilder {
        RouteSchemaBuilder {
            method_name: method_name.into(),
            verb,
            template: template.into(),
            version: None,
            bindings: Vec::new(),
        }
    }

    /// Starts declaring a `GET` method.
    pub fn get(method_name: impl Into<String>, template: impl Into<String>) -> RouteSchemaBuilder {
        Self::new(method_name, Method::GET, template)
    }

    /// Starts declaring a `POST` method.
    pub fn post(method_name: impl Into<String>, template: impl Into<String>) -> RouteSchemaBuilder {
        Self::new(method_name, Method::POST, template)
    }

    /// Starts declaring a `PUT` method.
    pub fn put(method_name: impl Into<String>, template: impl Into<String>) -> RouteSchemaBuilder {
        Self::new(method_name, Method::PUT, template)
    }

    /// Starts declaring a `PATCH` method.
    pub fn patch(
        method_name: impl Into<String>,
        template: impl Into<String>,
    ) -> RouteSchemaBuilder {
        Self::new(method_name, Method::PATCH, template)
    }

    /// Starts declaring a `DELETE` method.
    pub fn delete(
        method_name: impl Into<String>,
        template: impl Into<String>,
    ) -> RouteSchemaBuilder {
        Self::new(method_name, Method::DELETE, template)
    }

    /// The method name adapters invoke.
    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    /// The HTTP verb.
    pub fn verb(&self) -> &Method {
        &self.verb
    }

    /// The template as declared.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// The method-level version override.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Bindings in declaration order.
    pub fn bindings(&self) -> &[ParameterBinding] {
        &self.bindings
    }

    /// The parsed template.
    pub fn segments(&self) -> &[TemplateSegment] {
        &self.segments
    }

    /// Looks up a binding by parameter name.
    pub fn binding(&self, name: &str) -> Option<&ParameterBinding> {
        self.bindings.iter().find(|binding| binding.name == name)
    }

    /// The body binding, if the method has one.
    pub fn body_binding(&self) -> Option<&ParameterBinding> {
        self.bindings
            .iter()
            .find(|binding| binding.kind == BindingKind::Body)
    }

    fn normalized_template(&self) -> String {
        self.template
            .split('/')
            .filter(|token| !token.is_empty())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// The normalized template with every placeholder reduced to `{}`.
    ///
    /// Two routes with the same verb and shape match the same URLs.
    fn route_shape(&self) -> String {
        self.template
            .split('/')
            .filter(|token| !token.is_empty())
            .map(|token| {
                if token.starts_with('{') && token.ends_with('}') {
                    "{}"
                } else {
                    token
                }
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Unvalidated method declaration. Validated by [`ResourceSchemaBuilder::build`].
#[derive(Debug, Clone)]
pub struct RouteSchemaBuilder {
    method_name: String,
    verb: Method,
    template: String,
    version: Option<String>,
    bindings: Vec<ParameterBinding>,
}

impl RouteSchemaBuilder {
    /// Overrides the resource version for this method.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Binds a parameter to the placeholder of the same name.
    pub fn path(self, name: impl Into<String>) -> Self {
        self.bind(name, BindingKind::Path)
    }

    /// Binds a parameter to a query entry keyed by its own name.
    pub fn query(self, name: impl Into<String>) -> Self {
        self.bind(name, BindingKind::Query { name: None })
    }

    /// Binds a parameter to a query entry with an explicit key.
    pub fn query_as(self, name: impl Into<String>, key: impl Into<String>) -> Self {
        self.bind(
            name,
            BindingKind::Query {
                name: Some(key.into()),
            },
        )
    }

    /// Binds a parameter to a header.
    pub fn header(self, name: impl Into<String>, key: impl Into<String>) -> Self {
        self.bind(name, BindingKind::Header { key: key.into() })
    }

    /// Binds a parameter to the request body.
    pub fn body(self, name: impl Into<String>) -> Self {
        self.bind(name, BindingKind::Body)
    }

    /// Adds an explicit binding.
    pub fn bind(mut self, name: impl Into<String>, kind: BindingKind) -> Self {
        self.bindings.push(ParameterBinding::new(name, kind));
        self
    }

    fn validate(self, problems: &mut Vec<SchemaProblem>) -> RouteSchema {
        let method = self.method_name.clone();
        let segments = parse_template(&method, &self.template, problems);

        let mut parameters = HashSet::new();
        let mut query_keys = HashSet::new();
        let mut body_count = 0;

        for binding in &self.bindings {
            if !parameters.insert(binding.name.as_str()) {
                problems.push(SchemaProblem::DuplicateParameter {
                    method: method.clone(),
                    parameter: binding.name.clone(),
                });
            }

            match &binding.kind {
                BindingKind::Path => {
                    let has_placeholder = segments.iter().any(|segment| {
                        matches!(
                            segment,
                            TemplateSegment::Placeholder { name, .. } if *name == binding.name
                        )
                    });
                    if !has_placeholder {
                        problems.push(SchemaProblem::UnboundPathParameter {
                            method: method.clone(),
                            parameter: binding.name.clone(),
                        });
                    }
                }
                BindingKind::Query { .. } => {
                    let key = binding.query_key().unwrap_or(&binding.name);
                    if !query_keys.insert(key.to_string()) {
                        problems.push(SchemaProblem::QueryKeyCollision {
                            method: method.clone(),
                            key: key.to_string(),
                        });
                    }
                }
                BindingKind::Header { key } => {
                    if key.is_empty() || HeaderName::try_from(key.as_str()).is_err() {
                        problems.push(SchemaProblem::InvalidHeaderKey {
                            method: method.clone(),
                            parameter: binding.name.clone(),
                            key: key.clone(),
                        });
                    }
                }
                BindingKind::Body => body_count += 1,
            }
        }

        if body_count > 1 {
            problems.push(SchemaProblem::MultipleBodyBindings {
                method: method.clone(),
                count: body_count,
            });
        }

        for segment in &segments {
            if let TemplateSegment::Placeholder { name, .. } = segment {
                let bound = self
                    .bindings
                    .iter()
                    .any(|binding| binding.kind == BindingKind::Path && binding.name == *name);
                if !bound {
                    problems.push(SchemaProblem::UnmappedPlaceholder {
                        method: method.clone(),
                        placeholder: name.clone(),
                    });
                }
            }
        }

        RouteSchema {
            method_name: self.method_name,
            verb: self.verb,
            template: self.template,
            version: self.version.filter(|version| !version.is_empty()),
            bindings: self.bindings,
            segments,
        }
    }
}

fn parse_template(
    method: &str,
    template: &str,
    problems: &mut Vec<SchemaProblem>,
) -> Vec<TemplateSegment> {
    let mut segments = Vec::new();
    let mut seen = HashSet::new();

    for token in template.split('/').filter(|token| !token.is_empty()) {
        let placeholder = token
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'));

        let segment = match placeholder {
            Some(inner) => {
                let (name, optional) = match inner.strip_suffix('?') {
                    Some(name) => (name, true),
                    None => (inner, false),
                };
                if name.is_empty() || name.contains(['{', '}', '?']) {
                    problems.push(SchemaProblem::MalformedTemplate {
                        method: method.to_string(),
                        token: token.to_string(),
                    });
                    continue;
                }
                if !seen.insert(name.to_string()) {
                    problems.push(SchemaProblem::DuplicatePlaceholder {
                        method: method.to_string(),
                        placeholder: name.to_string(),
                    });
                    continue;
                }
                TemplateSegment::Placeholder {
                    name: name.to_string(),
                    optional,
                }
            }
            None if token.contains(['{', '}']) => {
                problems.push(SchemaProblem::MalformedTemplate {
                    method: method.to_string(),
                    token: token.to_string(),
                });
                continue;
            }
            None => TemplateSegment::Literal(token.to_string()),
        };
        segments.push(segment);
    }

    segments
}

/// The validated shape of one resource interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSchema {
    name: String,
    version: Option<String>,
    routes: Vec<RouteSchema>,
}

impl ResourceSchema {
    /// Starts declaring a resource.
    pub fn builder(name: impl Into<String>) -> ResourceSchemaBuilder {
        ResourceSchemaBuilder {
            name: name.into(),
            version: None,
            routes: Vec::new(),
        }
    }

    /// The resource name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The interface-level version segment.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Every route, in declaration order.
    pub fn routes(&self) -> &[RouteSchema] {
        &self.routes
    }

    /// Looks up a route by method name.
    pub fn route(&self, method_name: &str) -> Option<&RouteSchema> {
        self.routes
            .iter()
            .find(|route| route.method_name == method_name)
    }
}

/// Unvalidated resource declaration.
#[derive(Debug, Clone)]
pub struct ResourceSchemaBuilder {
    name: String,
    version: Option<String>,
    routes: Vec<RouteSchemaBuilder>,
}

impl ResourceSchemaBuilder {
    /// Sets the interface-level version segment.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Adds a method.
    pub fn route(mut self, route: RouteSchemaBuilder) -> Self {
        self.routes.push(route);
        self
    }

    /// Validates the declaration.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] listing every problem found.
    pub fn build(self) -> Result<ResourceSchema, SchemaError> {
        let mut problems = Vec::new();

        if self.name.trim().is_empty() {
            problems.push(SchemaProblem::EmptyResourceName);
        }

        let mut routes: Vec<RouteSchema> = Vec::with_capacity(self.routes.len());
        let mut methods = HashSet::new();
        let mut templates: HashMap<(Method, String), String> = HashMap::new();

        for builder in self.routes {
            let route = builder.validate(&mut problems);

            if !methods.insert(route.method_name.clone()) {
                problems.push(SchemaProblem::DuplicateMethod {
                    method: route.method_name.clone(),
                });
            }

            let key = (route.verb.clone(), route.route_shape());
            match templates.get(&key) {
                Some(first) => problems.push(SchemaProblem::DuplicateRoute {
                    verb: key.0.to_string(),
                    template: route.normalized_template(),
                    first: first.clone(),
                    second: route.method_name.clone(),
                }),
                None => {
                    templates.insert(key, route.method_name.clone());
                }
            }

            routes.push(route);
        }

        if !problems.is_empty() {
            tracing::error!(
                resource = %self.name,
                problems = problems.len(),
                "Resource schema failed validation"
            );
            return Err(SchemaError::new(self.name, problems));
        }

        tracing::debug!(resource = %self.name, routes = routes.len(), "Resource schema built");

        Ok(ResourceSchema {
            name: self.name,
            version: self.version.filter(|version| !version.is_empty()),
            routes,
        })
    }
}

/// Schemas built by one client, keyed by resource type.
///
/// Append-only: a schema is built outside the lock, and if another caller won
/// the race the freshly built copy is discarded.
#[derive(Debug, Default)]
pub(crate) struct SchemaRegistry {
    schemas: RwLock<HashMap<TypeId, Arc<ResourceSchema>>>,
}

impl SchemaRegistry {
    pub(crate) fn get_or_build<R: Resource>(&self) -> Result<Arc<ResourceSchema>, SchemaError> {
        let key = TypeId::of::<R>();

        {
            let schemas = self.schemas.read().unwrap_or_else(|e| e.into_inner());
            if let Some(schema) = schemas.get(&key) {
                return Ok(Arc::clone(schema));
            }
        }

        let built = Arc::new(R::describe().build()?);

        let mut schemas = self.schemas.write().unwrap_or_else(|e| e.into_inner());
        Ok(Arc::clone(schemas.entry(key).or_insert(built)))
    }

    pub(crate) fn len(&self) -> usize {
        self.schemas.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn problems(builder: ResourceSchemaBuilder) -> Vec<SchemaProblem> {
        builder.build().unwrap_err().problems().to_vec()
    }

    #[test]
    fn parses_placeholders_and_literals() {
        let schema = ResourceSchema::builder("Users")
            .route(
                RouteSchema::get("link", "/{id}/Link/Article/{articleId?}/")
                    .path("id")
                    .path("articleId"),
            )
            .build()
            .unwrap();

        let route = schema.route("link").unwrap();
        assert_eq!(
            route.segments(),
            &[
                TemplateSegment::Placeholder {
                    name: "id".to_string(),
                    optional: false
                },
                TemplateSegment::Literal("Link".to_string()),
                TemplateSegment::Literal("Article".to_string()),
                TemplateSegment::Placeholder {
                    name: "articleId".to_string(),
                    optional: true
                },
            ]
        );
    }

    #[test]
    fn unmapped_placeholder_is_rejected() {
        let found = problems(
            ResourceSchema::builder("Users").route(RouteSchema::get("get", "{id}").query("id")),
        );
        assert_eq!(
            found,
            vec![SchemaProblem::UnmappedPlaceholder {
                method: "get".to_string(),
                placeholder: "id".to_string()
            }]
        );
    }

    #[test]
    fn path_binding_without_placeholder_is_rejected() {
        let found = problems(
            ResourceSchema::builder("Users").route(RouteSchema::get("get", "all").path("id")),
        );
        assert!(matches!(
            found.as_slice(),
            [SchemaProblem::UnboundPathParameter { parameter, .. }] if parameter == "id"
        ));
    }

    #[test]
    fn placeholder_names_are_case_sensitive() {
        let found = problems(
            ResourceSchema::builder("Users").route(RouteSchema::get("get", "{Id}").path("id")),
        );
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn multiple_bodies_are_rejected() {
        let found = problems(
            ResourceSchema::builder("Users")
                .route(RouteSchema::post("create", "").body("a").body("b")),
        );
        assert!(found.contains(&SchemaProblem::MultipleBodyBindings {
            method: "create".to_string(),
            count: 2
        }));
    }

    #[test]
    fn duplicate_templates_are_rejected_after_normalization() {
        let found = problems(
            ResourceSchema::builder("Users")
                .route(RouteSchema::get("a", "items/{id}").path("id"))
                .route(RouteSchema::get("b", "/items//{id}/").path("id"))
                .route(RouteSchema::delete("c", "items/{id}").path("id")),
        );
        assert_eq!(
            found,
            vec![SchemaProblem::DuplicateRoute {
                verb: "GET".to_string(),
                template: "items/{id}".to_string(),
                first: "a".to_string(),
                second: "b".to_string()
            }]
        );
    }

    #[test]
    fn placeholder_names_do_not_distinguish_routes() {
        let found = problems(
            ResourceSchema::builder("Items")
                .route(RouteSchema::get("by_id", "items/{id}").path("id"))
                .route(RouteSchema::get("by_key", "items/{key}").path("key"))
                .route(RouteSchema::put("save", "{id}").path("id"))
                .route(RouteSchema::put("save_maybe", "{id?}").path("id")),
        );
        assert_eq!(
            found,
            vec![
                SchemaProblem::DuplicateRoute {
                    verb: "GET".to_string(),
                    template: "items/{key}".to_string(),
                    first: "by_id".to_string(),
                    second: "by_key".to_string()
                },
                SchemaProblem::DuplicateRoute {
                    verb: "PUT".to_string(),
                    template: "{id?}".to_string(),
                    first: "save".to_string(),
                    second: "save_maybe".to_string()
                },
            ]
        );
    }

    #[test]
    fn query_key_collisions_are_rejected() {
        let found = problems(
            ResourceSchema::builder("Users").route(
                RouteSchema::get("search", "search")
                    .query_as("firstName", "name")
                    .query("name"),
            ),
        );
        assert!(matches!(
            found.as_slice(),
            [SchemaProblem::QueryKeyCollision { key, .. }] if key == "name"
        ));
    }

    #[test]
    fn every_problem_is_reported_together() {
        let err = ResourceSchema::builder("")
            .route(RouteSchema::get("a", "{x}/{x}").path("x"))
            .route(RouteSchema::get("a", "bad{token").header("h", ""))
            .build()
            .unwrap_err();

        let found = err.problems();
        assert!(found.contains(&SchemaProblem::EmptyResourceName));
        assert!(found.contains(&SchemaProblem::DuplicatePlaceholder {
            method: "a".to_string(),
            placeholder: "x".to_string()
        }));
        assert!(found.contains(&SchemaProblem::MalformedTemplate {
            method: "a".to_string(),
            token: "bad{token".to_string()
        }));
        assert!(found.contains(&SchemaProblem::InvalidHeaderKey {
            method: "a".to_string(),
            parameter: "h".to_string(),
            key: String::new()
        }));
        assert!(found.contains(&SchemaProblem::DuplicateMethod {
            method: "a".to_string()
        }));
    }

    #[test]
    fn method_version_overrides_are_kept() {
        let schema = ResourceSchema::builder("Users")
            .version("v1")
            .route(RouteSchema::get("legacy", "old").version("v0"))
            .route(RouteSchema::get("current", "new"))
            .build()
            .unwrap();

        assert_eq!(schema.version(), Some("v1"));
        assert_eq!(schema.route("legacy").unwrap().version(), Some("v0"));
        assert_eq!(schema.route("current").unwrap().version(), None);
    }

    struct Articles;

    impl Resource for Articles {
        fn describe() -> ResourceSchemaBuilder {
            ResourceSchema::builder("Articles").route(RouteSchema::get("list", ""))
        }
    }

    #[test]
    fn registry_builds_once_per_type() {
        let registry = SchemaRegistry::default();
        let first = registry.get_or_build::<Articles>().unwrap();
        let second = registry.get_or_build::<Articles>().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }
}
