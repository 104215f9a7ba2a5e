//! Route construction: template substitution, segment composition and queries.

use crate::args::Arguments;
use crate::config::ConnectionSettings;
use crate::schema::{BindingKind, ResourceSchema, RouteSchema, TemplateSegment};
use crate::{Error, Result};
use std::collections::BTreeMap;
use url::Url;

/// A concrete route for one invocation.
///
/// Segments are kept unencoded; they are percent-encoded one by one when the
/// final URL is built, so a value containing `/` stays a single segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    resource: Vec<String>,
    version: Option<String>,
    endpoint: Vec<String>,
    query: BTreeMap<String, String>,
}

impl Route {
    /// Prefix and resource name segments.
    pub fn resource_segments(&self) -> &[String] {
        &self.resource
    }

    /// The version segment, if any.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// The substituted template segments.
    pub fn endpoint_segments(&self) -> &[String] {
        &self.endpoint
    }

    /// The substituted template joined with `/`.
    pub fn endpoint(&self) -> String {
        self.endpoint.join("/")
    }

    /// Query entries, ordered by key.
    pub fn query(&self) -> &BTreeMap<String, String> {
        &self.query
    }

    /// Every segment in order: resource, version, endpoint.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.resource
            .iter()
            .map(String::as_str)
            .chain(self.version.as_deref())
            .chain(self.endpoint.iter().map(String::as_str))
    }

    /// The relative path, `resource/version/endpoint`, without a leading `/`.
    pub fn path(&self) -> String {
        self.segments().collect::<Vec<_>>().join("/")
    }

    /// Resolves the route against a base address.
    ///
    /// # Errors
    ///
    /// Returns an error if the base address cannot carry a path.
    pub fn to_url(&self, base: &Url) -> Result<Url> {
        let mut url = base.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                Error::Configuration(format!("Base address `{}` cannot carry a path", base))
            })?;
            path.pop_if_empty().extend(self.segments());
        }
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(self.query.iter());
        }
        Ok(url)
    }
}

fn split_segments(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// Builds [`Route`]s for one connection.
///
/// The factory is pure: the same schema and arguments always produce the same
/// route.
#[derive(Debug, Clone, Copy)]
pub struct RouteFactory<'a> {
    settings: &'a ConnectionSettings,
}

impl<'a> RouteFactory<'a> {
    /// Creates a factory over the given settings.
    pub fn new(settings: &'a ConnectionSettings) -> Self {
        Self { settings }
    }

    /// Substitutes the route template and collects query entries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnboundArgument`] for arguments the method does not
    /// bind, and [`Error::MissingRouteValue`] when a required placeholder has
    /// no value.
    ///
    /// # Examples
    ///
    /// ```
    /// use restbind::{Arguments, ConnectionSettings, ResourceSchema, RouteFactory, RouteSchema};
    ///
    /// # fn main() -> Result<(), restbind::Error> {
    /// let settings = ConnectionSettings::builder()
    ///     .base_address("https://api.example.com/")?
    ///     .build()?;
    /// let schema = ResourceSchema::builder("Users")
    ///     .route(RouteSchema::get("link", "{id}/Link/Article/{articleId}")
    ///         .path("id")
    ///         .path("articleId"))
    ///     .build()?;
    ///
    /// let args = Arguments::new().arg("articleId", "1234").arg("id", "5678");
    /// let route = RouteFactory::new(&settings)
    ///     .build(&schema, schema.route("link").unwrap(), &args)?;
    ///
    /// assert_eq!(route.endpoint(), "5678/Link/Article/1234");
    /// assert_eq!(route.path(), "Users/5678/Link/Article/1234");
    /// # Ok(())
    /// # }
    /// ```
    pub fn build(
        &self,
        resource: &ResourceSchema,
        route: &RouteSchema,
        args: &Arguments,
    ) -> Result<Route> {
        for name in args.names() {
            if route.binding(name).is_none() {
                return Err(Error::UnboundArgument {
                    method: route.method_name().to_string(),
                    argument: name.to_string(),
                });
            }
        }

        let mut segments: Vec<String> = self
            .settings
            .resource_path_prefix()
            .map(|prefix| split_segments(prefix).collect())
            .unwrap_or_default();
        let name = self.settings.resource_name().unwrap_or(resource.name());
        segments.extend(split_segments(name));

        let version = route
            .version()
            .or(resource.version())
            .map(|version| version.trim_matches('/').to_string())
            .filter(|version| !version.is_empty());

        Ok(Route {
            resource: segments,
            version,
            endpoint: self.substitute(route, args)?,
            query: self.query(route, args),
        })
    }

    fn substitute(&self, route: &RouteSchema, args: &Arguments) -> Result<Vec<String>> {
        let mut endpoint = Vec::with_capacity(route.segments().len());

        for segment in route.segments() {
            match segment {
                TemplateSegment::Literal(text) => endpoint.push(text.clone()),
                TemplateSegment::Placeholder { name, optional } => {
                    match args.get(name).and_then(|value| value.to_param_string()) {
                        Some(value) if !value.is_empty() => endpoint.push(value),
                        _ if *optional => {}
                        _ => {
                            return Err(Error::MissingRouteValue {
                                method: route.method_name().to_string(),
                                placeholder: name.clone(),
                            })
                        }
                    }
                }
            }
        }

        Ok(endpoint)
    }

    fn query(&self, route: &RouteSchema, args: &Arguments) -> BTreeMap<String, String> {
        route
            .bindings()
            .iter()
            .filter(|binding| matches!(binding.kind(), BindingKind::Query { .. }))
            .filter_map(|binding| {
                let value = args.get(binding.name())?.to_param_string()?;
                let key = binding.query_key()?;
                Some((key.to_string(), value))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ConnectionSettings {
        ConnectionSettings::builder()
            .base_address("https://api.example.com/base/")
            .unwrap()
            .build()
            .unwrap()
    }

    fn users() -> ResourceSchema {
        ResourceSchema::builder("Users")
            .version("v1")
            .route(
                RouteSchema::get("link", "{id}/Link/Article/{articleId}")
                    .path("id")
                    .path("articleId"),
            )
            .route(
                RouteSchema::get("search", "search")
                    .query_as("firstName", "first")
                    .query("lastName"),
            )
            .route(
                RouteSchema::get("page", "pages/{page?}/items")
                    .path("page")
                    .version("v2"),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn template_order_wins_over_argument_order() {
        let settings = settings();
        let schema = users();
        let args = Arguments::new().arg("articleId", "1234").arg("id", "5678");

        let route = RouteFactory::new(&settings)
            .build(&schema, schema.route("link").unwrap(), &args)
            .unwrap();

        assert_eq!(route.endpoint(), "5678/Link/Article/1234");
        assert_eq!(route.path(), "Users/v1/5678/Link/Article/1234");
    }

    #[test]
    fn query_uses_override_names_and_skips_nulls() {
        let settings = settings();
        let schema = users();
        let route_schema = schema.route("search").unwrap();

        let args = Arguments::new().arg("firstName", "john").arg("lastName", "smith");
        let route = RouteFactory::new(&settings)
            .build(&schema, route_schema, &args)
            .unwrap();
        let expected: BTreeMap<String, String> = [("first", "john"), ("lastName", "smith")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(route.query(), &expected);

        let args = Arguments::new()
            .arg("firstName", "john")
            .arg("lastName", None::<String>);
        let route = RouteFactory::new(&settings)
            .build(&schema, route_schema, &args)
            .unwrap();
        assert_eq!(route.query().len(), 1);
    }

    #[test]
    fn optional_placeholder_collapses() {
        let settings = settings();
        let schema = users();
        let route = RouteFactory::new(&settings)
            .build(&schema, schema.route("page").unwrap(), &Arguments::new())
            .unwrap();

        assert_eq!(route.path(), "Users/v2/pages/items");
    }

    #[test]
    fn missing_required_value_is_rejected() {
        let settings = settings();
        let schema = users();
        let args = Arguments::new().arg("id", "5678");

        let err = RouteFactory::new(&settings)
            .build(&schema, schema.route("link").unwrap(), &args)
            .unwrap_err();

        assert!(matches!(
            err,
            Error::MissingRouteValue { placeholder, .. } if placeholder == "articleId"
        ));
    }

    #[test]
    fn unknown_arguments_are_rejected() {
        let settings = settings();
        let schema = users();
        let args = Arguments::new().arg("firstname", "john");

        let err = RouteFactory::new(&settings)
            .build(&schema, schema.route("search").unwrap(), &args)
            .unwrap_err();

        assert!(matches!(err, Error::UnboundArgument { argument, .. } if argument == "firstname"));
    }

    #[test]
    fn prefix_and_name_override_are_normalized() {
        let settings = ConnectionSettings::builder()
            .base_address("https://api.example.com/")
            .unwrap()
            .resource_path_prefix("/api//public/")
            .resource_name("people")
            .build()
            .unwrap();
        let schema = users();
        let args = Arguments::new().arg("id", 1).arg("articleId", 2);

        let route = RouteFactory::new(&settings)
            .build(&schema, schema.route("link").unwrap(), &args)
            .unwrap();

        assert_eq!(route.path(), "api/public/people/v1/1/Link/Article/2");
    }

    #[test]
    fn building_twice_is_identical() {
        let settings = settings();
        let schema = users();
        let args = Arguments::new().arg("firstName", "a b").arg("lastName", "c&d");
        let factory = RouteFactory::new(&settings);

        let first = factory
            .build(&schema, schema.route("search").unwrap(), &args)
            .unwrap();
        let second = factory
            .build(&schema, schema.route("search").unwrap(), &args)
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(
            first.to_url(settings.base_address()).unwrap().as_str(),
            second.to_url(settings.base_address()).unwrap().as_str()
        );
    }

    #[test]
    fn url_encodes_each_segment() {
        let settings = settings();
        let schema = users();
        let args = Arguments::new().arg("id", "a/b c").arg("articleId", "9");

        let route = RouteFactory::new(&settings)
            .build(&schema, schema.route("link").unwrap(), &args)
            .unwrap();
        let url = route.to_url(settings.base_address()).unwrap();

        assert_eq!(
            url.as_str(),
            "https://api.example.com/base/Users/v1/a%2Fb%20c/Link/Article/9"
        );
    }
}
