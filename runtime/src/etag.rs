//! Entity-tag memoization.
//!
//! The cache maps a request path to the last entity tag the server sent for
//! it. While tags are enabled, a cached tag turns the next call to the same
//! path into a conditional request; a `304 Not Modified` answer is then routed
//! to the action's not-modified callback instead of its failure handler.
//!
//! Entries are never evicted.

use crate::config::MiddlewareConfig;
use composable_api_core::transport::Headers;
use composable_api_core::{ApiError, MiddlewareEvent, Response, StoreAccess, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Handed to a custom conditional-header builder
pub struct ETagMatchContext<A, S> {
    /// Cached tag for the path
    pub etag: String,
    /// Request path (without base URL)
    pub path: String,
    /// Store access
    pub store: StoreAccess<A, S>,
}

impl<A, S> ETagMatchContext<A, S> {
    /// Current state snapshot
    #[must_use]
    pub fn state(&self) -> S {
        self.store.get_state()
    }
}

impl<A, S> fmt::Debug for ETagMatchContext<A, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ETagMatchContext")
            .field("etag", &self.etag)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Path to entity tag table
///
/// Cloning shares the underlying table.
#[derive(Debug, Clone, Default)]
pub struct ETagCache {
    tags: Arc<Mutex<HashMap<String, String>>>,
}

impl ETagCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag cached for `path`
    #[must_use]
    pub fn get(&self, path: &str) -> Option<String> {
        self.tags
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(path)
            .cloned()
    }

    /// Store a tag, replacing any previous one
    pub fn insert(&self, path: impl Into<String>, etag: impl Into<String>) {
        self.tags
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(path.into(), etag.into());
    }

    /// Number of cached paths
    #[must_use]
    pub fn len(&self) -> usize {
        self.tags
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether nothing is cached
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lower-case every header name
#[must_use]
pub fn normalize_headers(headers: &Headers) -> Headers {
    headers
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value.clone()))
        .collect()
}

/// Conditional-request headers for a call to `path`
///
/// Empty unless tags are enabled and a tag is cached for `path`. A custom
/// builder's output is used verbatim; otherwise `If-None-Match` and
/// `Cache-Control` are sent.
///
/// # Errors
///
/// Returns [`ApiError::InvalidETagHeaders`] when the custom builder returns
/// anything but an object of strings.
pub fn conditional_headers<A, S>(
    config: &MiddlewareConfig<A, S>,
    cache: &ETagCache,
    path: &str,
    store: &StoreAccess<A, S>,
) -> Result<Headers, ApiError> {
    if !config.use_etags() {
        return Ok(Headers::new());
    }
    let Some(etag) = cache.get(path) else {
        return Ok(Headers::new());
    };

    let Some(builder) = config.etag_headers() else {
        let mut headers = Headers::new();
        headers.insert("If-None-Match".to_string(), etag);
        headers.insert(
            "Cache-Control".to_string(),
            "private, must-revalidate".to_string(),
        );
        return Ok(headers);
    };

    let output = builder(&ETagMatchContext {
        etag,
        path: path.to_string(),
        store: store.clone(),
    });

    let Value::Object(fields) = &output else {
        return Err(ApiError::InvalidETagHeaders(output));
    };

    fields
        .iter()
        .map(|(name, value)| match value {
            Value::String(value) => Ok((name.clone(), value.clone())),
            _ => Err(ApiError::InvalidETagHeaders(output.clone())),
        })
        .collect()
}

/// Remember the entity tag of a classified response
///
/// Header names are matched case-insensitively. When a creation type is
/// configured, an [`MiddlewareEvent::ETagCreated`] action is dispatched for
/// every tag stored. Never fails; the response is returned unchanged.
pub fn record<A, S>(
    response: Response,
    path: &str,
    config: &MiddlewareConfig<A, S>,
    cache: &ETagCache,
    store: &StoreAccess<A, S>,
) -> Response
where
    A: From<MiddlewareEvent>,
{
    if !config.use_etags() || response.headers.is_empty() {
        return response;
    }

    let headers = normalize_headers(&response.headers);
    let Some(etag) = headers.get("etag") else {
        return response;
    };

    cache.insert(path, etag.clone());
    metrics::counter!("api.etag.stored").increment(1);
    tracing::debug!(path, etag = %etag, "Stored entity tag");

    if let Some(kind) = config.etag_creation_type() {
        store.dispatch(A::from(MiddlewareEvent::ETagCreated {
            kind: kind.to_string(),
            etag: etag.clone(),
            key: path.to_string(),
        }));
    }

    response
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use crate::config::MiddlewareOptions;
    use serde_json::json;
    use std::sync::Mutex;

    type Store = StoreAccess<MiddlewareEvent, ()>;

    fn recording_store() -> (Store, Arc<Mutex<Vec<MiddlewareEvent>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let store = StoreAccess::from_fns(move |a| sink.lock().unwrap().push(a), || ());
        (store, seen)
    }

    #[test]
    fn test_no_headers_without_cached_tag() {
        let config = MiddlewareOptions::new().use_etags(true).build().unwrap();
        let (store, _) = recording_store();
        let headers = conditional_headers(&config, &ETagCache::new(), "/users", &store).unwrap();
        assert!(headers.is_empty());
    }

    #[test]
    fn test_no_headers_when_disabled() {
        let config = MiddlewareOptions::new().build().unwrap();
        let cache = ETagCache::new();
        cache.insert("/users", "abc");
        let (store, _) = recording_store();
        assert!(conditional_headers(&config, &cache, "/users", &store).unwrap().is_empty());
    }

    #[test]
    fn test_round_trip_produces_default_headers() {
        let config = MiddlewareOptions::new()
            .use_etags(true)
            .dispatch_etag_creation_type("ETAG_CREATED")
            .build()
            .unwrap();
        let cache = ETagCache::new();
        let (store, seen) = recording_store();

        let response = Response::new(200, json!({})).with_header("ETag", "abc");
        let returned = record(response.clone(), "/users", &config, &cache, &store);
        assert_eq!(returned, response);

        let headers = conditional_headers(&config, &cache, "/users", &store).unwrap();
        assert_eq!(headers.get("If-None-Match").unwrap(), "abc");
        assert_eq!(headers.get("Cache-Control").unwrap(), "private, must-revalidate");

        assert_eq!(
            *seen.lock().unwrap(),
            vec![MiddlewareEvent::ETagCreated {
                kind: "ETAG_CREATED".to_string(),
                etag: "abc".to_string(),
                key: "/users".to_string(),
            }]
        );
    }

    #[test]
    fn test_custom_builder_used_verbatim() {
        let config = MiddlewareOptions::new()
            .use_etags(true)
            .matching_etag_headers(|ctx| json!({"X-Tag": format!("W/{}", ctx.etag)}))
            .build()
            .unwrap();
        let cache = ETagCache::new();
        cache.insert("/users", "abc");
        let (store, _) = recording_store();

        let headers = conditional_headers(&config, &cache, "/users", &store).unwrap();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("X-Tag").unwrap(), "W/abc");
    }

    #[test]
    fn test_custom_builder_must_return_strings() {
        let config = MiddlewareOptions::new()
            .use_etags(true)
            .matching_etag_headers(|_| json!({"X-Tag": 1}))
            .build()
            .unwrap();
        let cache = ETagCache::new();
        cache.insert("/users", "abc");
        let (store, _) = recording_store();

        let error = conditional_headers(&config, &cache, "/users", &store).unwrap_err();
        assert_eq!(error, ApiError::InvalidETagHeaders(json!({"X-Tag": 1})));
    }

    #[test]
    fn test_record_without_tag_is_passthrough() {
        let config = MiddlewareOptions::new().use_etags(true).build().unwrap();
        let cache = ETagCache::new();
        let (store, seen) = recording_store();

        record(Response::new(200, json!({})), "/users", &config, &cache, &store);
        assert!(cache.is_empty());
        assert!(seen.lock().unwrap().is_empty());
    }
}
