//! Request body shaping.
//!
//! Decides where the parameters of a call travel: `get` sends them as query
//! parameters, every other recognized method sends them as the body.

use composable_api_core::action::Params;
use composable_api_core::{ApiError, Method, RequestBody};

/// Resolve a method name and place the parameters accordingly
///
/// # Errors
///
/// Returns [`ApiError::InvalidMethod`] when `method` is not one of
/// [`Method::NAMES`]. Matching is case-sensitive.
pub fn shape(method: &str, params: Params) -> Result<(Method, RequestBody), ApiError> {
    let method: Method = method.parse()?;
    let body = if method.has_body() {
        RequestBody::Data(params)
    } else {
        RequestBody::Query(params)
    };
    Ok((method, body))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn params() -> Params {
        let mut params = Params::new();
        params.insert("id".to_string(), json!(7));
        params
    }

    #[test]
    fn test_get_uses_query() {
        let (method, body) = shape("get", params()).unwrap();
        assert_eq!(method, Method::Get);
        assert_eq!(body, RequestBody::Query(params()));
    }

    #[test]
    fn test_post_uses_body() {
        let (method, body) = shape("post", params()).unwrap();
        assert_eq!(method, Method::Post);
        assert_eq!(body, RequestBody::Data(params()));
    }

    #[test]
    fn test_unknown_method_is_rejected() {
        let error = shape("fetch", params()).unwrap_err();
        assert!(error.is_configuration());
        assert_eq!(
            error.to_string(),
            "Expected method to be any of the following methods: get,delete,post,put,patch, got instead fetch"
        );
    }

    proptest! {
        #[test]
        fn prop_non_get_methods_carry_body(name in prop::sample::select(Method::NAMES[1..].to_vec())) {
            let (_, body) = shape(name, params()).unwrap();
            prop_assert_eq!(body, RequestBody::Data(params()));
        }

        #[test]
        fn prop_unrecognized_names_fail(name in "[A-Za-z]{1,8}") {
            prop_assume!(!Method::NAMES.contains(&name.as_str()));
            prop_assert!(shape(&name, Params::new()).is_err());
        }
    }
}
