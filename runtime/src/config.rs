//! Middleware options.
//!
//! Options come in two halves. [`MiddlewareSettings`] holds the data-only
//! options and can be loaded from TOML. Function options (custom status
//! classifier, custom entity-tag headers) are attached through
//! [`MiddlewareOptions`]' builder. [`MiddlewareOptions::build`] validates
//! everything and produces the immutable [`MiddlewareConfig`] the runtime
//! reads from.
//!
//! # Example
//!
//! ```
//! use composable_api_runtime::config::MiddlewareOptions;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MiddlewareOptions::<(), ()>::from_toml_str(
//!     r#"
//!     base = "https://api.example.com/"
//!     use_etags = true
//!     custom_success_responses = [418]
//!     "#,
//! )?
//! .build()?;
//!
//! assert_eq!(config.base(), "https://api.example.com");
//! # Ok(())
//! # }
//! ```

use crate::auth::StateSelector;
use crate::etag::ETagMatchContext;
use composable_api_core::{ApiError, Response, StoreAccess, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Custom status classifier
///
/// `Ok(Some(true))` accepts the response, `Ok(Some(false))` falls through to
/// the default rules, `Ok(None)` is an invalid decision and `Err` is
/// propagated as-is.
pub type StatusClassifierFn<A, S> =
    Arc<dyn Fn(&Response, &StoreAccess<A, S>) -> Result<Option<bool>, ApiError> + Send + Sync>;

/// Custom conditional-request header builder
///
/// Must return a JSON object of string values.
pub type ETagHeadersFn<A, S> = Arc<dyn Fn(&ETagMatchContext<A, S>) -> Value + Send + Sync>;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// One or more options failed validation
    #[error("Invalid middleware options:{}", .errors.iter().map(|e| format!("\n - {e}")).collect::<String>())]
    Invalid {
        /// Every problem found
        errors: Vec<String>,
    },

    /// The TOML source could not be parsed
    #[error("Failed to parse middleware options: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Sentinel action kinds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Constants {
    /// Kind of API action descriptors
    pub api: String,
    /// Kind of the default failure action
    pub api_error: String,
    /// Kind of the coroutine completion action without a value
    pub api_void: String,
}

impl Default for Constants {
    fn default() -> Self {
        Self {
            api: "API".to_string(),
            api_error: "API_ERROR".to_string(),
            api_void: "API_VOID".to_string(),
        }
    }
}

/// Credential enrichment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthConfig {
    /// Header name to `#path.to.state` template
    Headers(BTreeMap<String, String>),
    /// State paths merged into the request parameters
    Selectors(Vec<StateSelector>),
}

/// Where the effective status code is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusSource {
    /// `data.status`, falling back to the transport status
    BodyThenTransport,
    /// `data.status` only
    BodyOnly,
    /// The transport status only
    TransportOnly,
}

/// Data-only options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MiddlewareSettings {
    /// URL prefix; a trailing slash is stripped
    pub base: String,
    /// Sentinel action kinds
    pub constants: Constants,
    /// Credential enrichment
    pub auth: Option<AuthConfig>,
    /// Fall back to the transport status when the body has none
    pub fallback_to_transport_status: bool,
    /// Ignore the body status entirely
    pub use_only_transport_status: bool,
    /// Non-2xx statuses treated as success
    pub custom_success_responses: Vec<u16>,
    /// Send conditional requests and cache entity tags
    pub use_etags: bool,
    /// Kind of the action dispatched when a new entity tag is stored
    pub dispatch_etag_creation_type: Option<String>,
    /// Dispatch the REQUEST type before issuing a call
    pub emit_request_type: bool,
    /// Hand the full response to every success handler
    pub use_full_response_object: bool,
    /// Log cancellations as warnings instead of errors
    pub warn_on_cancellation: bool,
}

impl Default for MiddlewareSettings {
    fn default() -> Self {
        Self {
            base: String::new(),
            constants: Constants::default(),
            auth: None,
            fallback_to_transport_status: true,
            use_only_transport_status: false,
            custom_success_responses: Vec::new(),
            use_etags: false,
            dispatch_etag_creation_type: None,
            emit_request_type: false,
            use_full_response_object: false,
            warn_on_cancellation: false,
        }
    }
}

impl MiddlewareSettings {
    /// Collect every validation problem
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for (name, value) in [
            ("constants.api", &self.constants.api),
            ("constants.api_error", &self.constants.api_error),
            ("constants.api_void", &self.constants.api_void),
        ] {
            if value.trim().is_empty() {
                errors.push(format!("{name} must not be empty"));
            }
        }

        for status in &self.custom_success_responses {
            if !(100..=599).contains(status) {
                errors.push(format!(
                    "custom_success_responses contains invalid status code {status}"
                ));
            }
        }

        if let Some(kind) = &self.dispatch_etag_creation_type {
            if kind.trim().is_empty() {
                errors.push("dispatch_etag_creation_type must not be empty".to_string());
            }
        }

        match &self.auth {
            Some(AuthConfig::Headers(headers)) => {
                if headers.is_empty() {
                    errors.push("auth.headers must not be empty".to_string());
                }
                for (name, template) in headers {
                    if name.trim().is_empty() {
                        errors.push("auth.headers contains an empty header name".to_string());
                    }
                    if template.is_empty() {
                        errors.push(format!("auth.headers.{name} must not be empty"));
                    }
                }
            }
            Some(AuthConfig::Selectors(selectors)) => {
                if selectors.is_empty() {
                    errors.push("auth.selectors must not be empty".to_string());
                }
                for selector in selectors {
                    if selector.path.split('.').any(str::is_empty) {
                        errors.push(format!(
                            "auth.selectors contains invalid path `{}`",
                            selector.path
                        ));
                    }
                }
            }
            None => {}
        }

        errors
    }

    /// Effective status precedence
    #[must_use]
    pub const fn status_source(&self) -> StatusSource {
        if self.use_only_transport_status {
            StatusSource::TransportOnly
        } else if self.fallback_to_transport_status {
            StatusSource::BodyThenTransport
        } else {
            StatusSource::BodyOnly
        }
    }
}

/// Options builder
pub struct MiddlewareOptions<A, S> {
    settings: MiddlewareSettings,
    handle_status_responses: Option<StatusClassifierFn<A, S>>,
    matching_etag_headers: Option<ETagHeadersFn<A, S>>,
}

impl<A, S> MiddlewareOptions<A, S> {
    /// Default options
    #[must_use]
    pub fn new() -> Self {
        Self::from_settings(MiddlewareSettings::default())
    }

    /// Start from data-only settings
    #[must_use]
    pub const fn from_settings(settings: MiddlewareSettings) -> Self {
        Self {
            settings,
            handle_status_responses: None,
            matching_etag_headers: None,
        }
    }

    /// Load data-only settings from TOML
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(Self::from_settings(toml::from_str(source)?))
    }

    /// Data-only settings
    #[must_use]
    pub const fn settings(&self) -> &MiddlewareSettings {
        &self.settings
    }

    /// Set the URL prefix
    #[must_use]
    pub fn base(mut self, base: impl Into<String>) -> Self {
        self.settings.base = base.into();
        self
    }

    /// Set the sentinel kinds
    #[must_use]
    pub fn constants(mut self, constants: Constants) -> Self {
        self.settings.constants = constants;
        self
    }

    /// Set credential enrichment
    #[must_use]
    pub fn auth(mut self, auth: AuthConfig) -> Self {
        self.settings.auth = Some(auth);
        self
    }

    /// Install a custom status classifier
    #[must_use]
    pub fn handle_status_responses<F>(mut self, f: F) -> Self
    where
        F: Fn(&Response, &StoreAccess<A, S>) -> Result<Option<bool>, ApiError>
            + Send
            + Sync
            + 'static,
    {
        self.handle_status_responses = Some(Arc::new(f));
        self
    }

    /// Fall back to the transport status when the body has none
    #[must_use]
    pub const fn fallback_to_transport_status(mut self, enabled: bool) -> Self {
        self.settings.fallback_to_transport_status = enabled;
        self
    }

    /// Ignore the body status entirely
    #[must_use]
    pub const fn use_only_transport_status(mut self, enabled: bool) -> Self {
        self.settings.use_only_transport_status = enabled;
        self
    }

    /// Treat these non-2xx statuses as success
    #[must_use]
    pub fn custom_success_responses(mut self, statuses: Vec<u16>) -> Self {
        self.settings.custom_success_responses = statuses;
        self
    }

    /// Enable conditional requests
    #[must_use]
    pub const fn use_etags(mut self, enabled: bool) -> Self {
        self.settings.use_etags = enabled;
        self
    }

    /// Dispatch an action of this kind whenever a new entity tag is stored
    #[must_use]
    pub fn dispatch_etag_creation_type(mut self, kind: impl Into<String>) -> Self {
        self.settings.dispatch_etag_creation_type = Some(kind.into());
        self
    }

    /// Install a custom conditional-request header builder
    #[must_use]
    pub fn matching_etag_headers<F>(mut self, f: F) -> Self
    where
        F: Fn(&ETagMatchContext<A, S>) -> Value + Send + Sync + 'static,
    {
        self.matching_etag_headers = Some(Arc::new(f));
        self
    }

    /// Dispatch the REQUEST type before issuing a call
    #[must_use]
    pub const fn emit_request_type(mut self, enabled: bool) -> Self {
        self.settings.emit_request_type = enabled;
        self
    }

    /// Hand the full response to every success handler
    #[must_use]
    pub const fn use_full_response_object(mut self, enabled: bool) -> Self {
        self.settings.use_full_response_object = enabled;
        self
    }

    /// Log cancellations as warnings
    #[must_use]
    pub const fn warn_on_cancellation(mut self, enabled: bool) -> Self {
        self.settings.warn_on_cancellation = enabled;
        self
    }

    /// Validate into an immutable configuration
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] listing every problem found.
    pub fn build(self) -> Result<MiddlewareConfig<A, S>, ConfigError> {
        let errors = self.settings.validate();
        if !errors.is_empty() {
            return Err(ConfigError::Invalid { errors });
        }

        let mut settings = self.settings;
        if settings.base.ends_with('/') {
            settings.base.pop();
        }

        Ok(MiddlewareConfig {
            status_source: settings.status_source(),
            settings,
            status_classifier: self.handle_status_responses,
            etag_headers: self.matching_etag_headers,
        })
    }
}

impl<A, S> Default for MiddlewareOptions<A, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, S> fmt::Debug for MiddlewareOptions<A, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareOptions")
            .field("settings", &self.settings)
            .field("handle_status_responses", &self.handle_status_responses.is_some())
            .field("matching_etag_headers", &self.matching_etag_headers.is_some())
            .finish()
    }
}

/// Validated, immutable middleware configuration
pub struct MiddlewareConfig<A, S> {
    settings: MiddlewareSettings,
    status_source: StatusSource,
    status_classifier: Option<StatusClassifierFn<A, S>>,
    etag_headers: Option<ETagHeadersFn<A, S>>,
}

impl<A, S> MiddlewareConfig<A, S> {
    /// URL prefix without trailing slash
    #[must_use]
    pub fn base(&self) -> &str {
        &self.settings.base
    }

    /// Sentinel kinds
    #[must_use]
    pub const fn constants(&self) -> &Constants {
        &self.settings.constants
    }

    /// Credential enrichment
    #[must_use]
    pub const fn auth(&self) -> Option<&AuthConfig> {
        self.settings.auth.as_ref()
    }

    /// Effective status precedence
    #[must_use]
    pub const fn status_source(&self) -> StatusSource {
        self.status_source
    }

    /// Non-2xx statuses treated as success
    #[must_use]
    pub fn custom_success_responses(&self) -> &[u16] {
        &self.settings.custom_success_responses
    }

    /// Whether conditional requests are enabled
    #[must_use]
    pub const fn use_etags(&self) -> bool {
        self.settings.use_etags
    }

    /// Kind of the entity-tag creation action
    #[must_use]
    pub fn etag_creation_type(&self) -> Option<&str> {
        self.settings.dispatch_etag_creation_type.as_deref()
    }

    /// Whether the REQUEST type is dispatched before issuance
    #[must_use]
    pub const fn emit_request_type(&self) -> bool {
        self.settings.emit_request_type
    }

    /// Whether every success handler gets the full response
    #[must_use]
    pub const fn use_full_response_object(&self) -> bool {
        self.settings.use_full_response_object
    }

    /// Whether cancellations are logged as warnings
    #[must_use]
    pub const fn warn_on_cancellation(&self) -> bool {
        self.settings.warn_on_cancellation
    }

    /// Custom status classifier
    #[must_use]
    pub const fn status_classifier(&self) -> Option<&StatusClassifierFn<A, S>> {
        self.status_classifier.as_ref()
    }

    /// Custom conditional-request header builder
    #[must_use]
    pub const fn etag_headers(&self) -> Option<&ETagHeadersFn<A, S>> {
        self.etag_headers.as_ref()
    }

    /// The validated settings
    #[must_use]
    pub const fn settings(&self) -> &MiddlewareSettings {
        &self.settings
    }
}

impl<A, S> fmt::Debug for MiddlewareConfig<A, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareConfig")
            .field("settings", &self.settings)
            .field("status_source", &self.status_source)
            .field("status_classifier", &self.status_classifier.is_some())
            .field("etag_headers", &self.etag_headers.is_some())
            .finish()
    }
}
