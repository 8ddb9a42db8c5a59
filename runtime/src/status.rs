//! Response status classification.
//!
//! Decides whether a response the transport accepted is a success. The
//! effective status may come from the body's `status` field, the transport, or
//! both, depending on [`StatusSource`]. After the status check the body is
//! inspected for `error`/`errors` fields, which turn an otherwise successful
//! response into a failure.

use crate::config::{MiddlewareConfig, StatusSource};
use composable_api_core::{ApiError, Response, StoreAccess, Value};

/// Status code carried in the body's `status` field
///
/// Missing, zero or non-numeric values count as absent.
#[must_use]
pub fn body_status(response: &Response) -> Option<u16> {
    response
        .data
        .get("status")
        .and_then(Value::as_u64)
        .filter(|status| *status != 0)
        .and_then(|status| u16::try_from(status).ok())
}

/// Status used for classification
#[must_use]
pub fn effective_status(response: &Response, source: StatusSource) -> Option<u16> {
    match source {
        StatusSource::BodyThenTransport => body_status(response).or(Some(response.status)),
        StatusSource::BodyOnly => body_status(response),
        StatusSource::TransportOnly => Some(response.status),
    }
}

/// Reject bodies carrying `error` or `errors`
///
/// # Errors
///
/// [`ApiError::SingleError`] for a string `error` without an `errors` array,
/// [`ApiError::MultipleErrors`] for a non-empty `errors` array.
pub fn inspect_body(body: &Value) -> Result<(), ApiError> {
    let errors = body.get("errors");

    if let Some(Value::String(error)) = body.get("error") {
        if !matches!(errors, Some(Value::Array(_))) {
            return Err(ApiError::SingleError(error.clone()));
        }
    }

    match errors {
        Some(Value::Array(errors)) if !errors.is_empty() => {
            Err(ApiError::MultipleErrors(errors.clone()))
        }
        _ => Ok(()),
    }
}

/// Classify a response
///
/// A custom classifier deciding `true` accepts the response outright;
/// deciding `false` falls through to the default rules.
///
/// # Errors
///
/// - [`ApiError::InvalidClassifierReturn`] when the custom classifier makes
///   no decision; any error it returns is propagated verbatim
/// - [`ApiError::NotModified`] for an effective status of 304
/// - [`ApiError::BadStatusCode`] for any other status outside `200..300`
///   that is not allow-listed
/// - the errors of [`inspect_body`]
pub fn classify<A, S>(
    response: Response,
    config: &MiddlewareConfig<A, S>,
    store: &StoreAccess<A, S>,
) -> Result<Response, ApiError> {
    if let Some(classifier) = config.status_classifier() {
        match classifier(&response, store)? {
            Some(true) => return Ok(response),
            Some(false) => {}
            None => return Err(ApiError::InvalidClassifierReturn),
        }
    }

    let status = effective_status(&response, config.status_source());
    let accepted = status.is_some_and(|status| {
        (200..300).contains(&status) || config.custom_success_responses().contains(&status)
    });

    if !accepted {
        tracing::debug!(?status, transport_status = response.status, "Rejecting response status");
        return Err(if status == Some(304) {
            ApiError::NotModified {
                message: "Response returned with status 304".to_string(),
                response: Some(Box::new(response)),
            }
        } else {
            ApiError::BadStatusCode {
                status,
                response: Box::new(response),
            }
        });
    }

    inspect_body(&response.data)?;
    Ok(response)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use crate::config::MiddlewareOptions;
    use serde_json::json;

    type Config = MiddlewareConfig<(), ()>;

    fn store() -> StoreAccess<(), ()> {
        StoreAccess::from_fns(|()| {}, || ())
    }

    fn default_config() -> Config {
        MiddlewareOptions::new().build().unwrap()
    }

    #[test]
    fn test_plain_success_is_idempotent() {
        let config = default_config();
        let response = Response::new(200, json!({"user": {"name": "Alejandro"}}));

        let once = classify(response.clone(), &config, &store()).unwrap();
        let twice = classify(once.clone(), &config, &store()).unwrap();
        assert_eq!(once, response);
        assert_eq!(twice, response);
    }

    #[test]
    fn test_body_status_takes_precedence() {
        let config = default_config();
        let response = Response::new(200, json!({"status": 500}));
        let error = classify(response, &config, &store()).unwrap_err();
        assert!(matches!(error, ApiError::BadStatusCode { status: Some(500), .. }));
    }

    #[test]
    fn test_zero_body_status_falls_back() {
        let response = Response::new(201, json!({"status": 0}));
        assert_eq!(effective_status(&response, StatusSource::BodyThenTransport), Some(201));
        assert_eq!(effective_status(&response, StatusSource::BodyOnly), None);
    }

    #[test]
    fn test_body_only_without_status_is_bad() {
        let config: Config = MiddlewareOptions::new()
            .fallback_to_transport_status(false)
            .build()
            .unwrap();
        let error = classify(Response::new(200, json!({})), &config, &store()).unwrap_err();
        assert!(matches!(error, ApiError::BadStatusCode { status: None, .. }));
    }

    #[test]
    fn test_transport_only_ignores_body() {
        let config: Config = MiddlewareOptions::new()
            .use_only_transport_status(true)
            .build()
            .unwrap();
        let response = Response::new(200, json!({"status": 500}));
        assert!(classify(response, &config, &store()).is_ok());
    }

    #[test]
    fn test_allow_listed_status() {
        let config: Config = MiddlewareOptions::new()
            .custom_success_responses(vec![409])
            .build()
            .unwrap();
        let response = Response::new(200, json!({"status": 409}));
        assert!(classify(response, &config, &store()).is_ok());
    }

    #[test]
    fn test_not_modified() {
        let error =
            classify(Response::new(200, json!({"status": 304})), &default_config(), &store())
                .unwrap_err();
        assert!(error.is_not_modified());
        assert!(error.response().is_some());
    }

    #[test]
    fn test_error_fields() {
        let config = default_config();

        let single = classify(Response::new(200, json!({"error": "nope"})), &config, &store());
        assert_eq!(single.unwrap_err(), ApiError::SingleError("nope".to_string()));

        let multiple = classify(Response::new(200, json!({"errors": ["bad"]})), &config, &store());
        assert_eq!(multiple.unwrap_err(), ApiError::MultipleErrors(vec![json!("bad")]));

        let both = classify(
            Response::new(200, json!({"error": "nope", "errors": []})),
            &config,
            &store(),
        );
        assert!(both.is_ok());
    }

    #[test]
    fn test_custom_classifier_decisions() {
        let accept: Config = MiddlewareOptions::new()
            .handle_status_responses(|_, _| Ok(Some(true)))
            .build()
            .unwrap();
        let response = Response::new(200, json!({"status": 500, "errors": ["x"]}));
        assert!(classify(response.clone(), &accept, &store()).is_ok());

        let fall_through: Config = MiddlewareOptions::new()
            .handle_status_responses(|_, _| Ok(Some(false)))
            .build()
            .unwrap();
        let error = classify(Response::new(200, json!({"errors": ["x"]})), &fall_through, &store());
        assert!(matches!(error, Err(ApiError::MultipleErrors(_))));

        let undecided: Config = MiddlewareOptions::new()
            .handle_status_responses(|_, _| Ok(None))
            .build()
            .unwrap();
        let error = classify(response.clone(), &undecided, &store()).unwrap_err();
        assert_eq!(error, ApiError::InvalidClassifierReturn);

        let failing: Config = MiddlewareOptions::new()
            .handle_status_responses(|_, _| Err(ApiError::SingleError("custom".to_string())))
            .build()
            .unwrap();
        let error = classify(response, &failing, &store()).unwrap_err();
        assert_eq!(error, ApiError::SingleError("custom".to_string()));
    }
}
