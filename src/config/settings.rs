//! API-wide settings: URL templates, CORS, error verbosity, body limits.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub url_prefix: String,
    /// Collection URL. Placeholders: `{prefix}`, `{type}`.
    pub resource_url_fmt: String,
    /// Instance URL. Placeholders: `{prefix}`, `{type}`, `{id}`.
    pub instance_url_fmt: String,
    /// Placeholders: `{prefix}`, `{table}`, `{method}`.
    pub classmethod_url_fmt: String,
    /// Placeholders: `{prefix}`, `{table}`, `{id}`, `{method}`.
    pub instancemethod_url_fmt: String,
    /// Placeholders: `{parent}` (parent instance URL), `{rel}`.
    pub relationship_url_fmt: String,
    pub object_id_suffix: String,
    /// Served as `<api_spec_url>.json` and `<api_spec_url>.html`.
    pub api_spec_url: String,
    /// `Access-Control-Allow-Origin` value; `None` disables the header.
    pub cors_domain: Option<String>,
    /// Expose unclassified error messages instead of "Unknown Error".
    pub verbose_errors: bool,
    pub max_body_bytes: usize,
    pub title: String,
    pub version: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        ApiSettings {
            url_prefix: "/api".into(),
            resource_url_fmt: "{prefix}/{type}/".into(),
            instance_url_fmt: "{prefix}/{type}/{id}".into(),
            classmethod_url_fmt: "{prefix}/{table}/{method}".into(),
            instancemethod_url_fmt: "{prefix}/{table}/{id}/{method}".into(),
            relationship_url_fmt: "{parent}/{rel}".into(),
            object_id_suffix: "Id".into(),
            api_spec_url: "/api/swagger".into(),
            cors_domain: Some("*".into()),
            verbose_errors: false,
            max_body_bytes: 2 * 1024 * 1024,
            title: "JSON:API".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

impl ApiSettings {
    /// Defaults overridden by `JSONAPI_*` environment variables.
    pub fn from_env() -> Self {
        let mut s = ApiSettings::default();
        if let Ok(v) = std::env::var("JSONAPI_URL_PREFIX") {
            s.url_prefix = v;
        }
        if let Ok(v) = std::env::var("JSONAPI_SPEC_URL") {
            s.api_spec_url = v;
        }
        match std::env::var("JSONAPI_CORS_DOMAIN") {
            Ok(v) if v.is_empty() => s.cors_domain = None,
            Ok(v) => s.cors_domain = Some(v),
            Err(_) => {}
        }
        if let Ok(v) = std::env::var("JSONAPI_VERBOSE_ERRORS") {
            s.verbose_errors = matches!(v.as_str(), "1" | "true" | "yes");
        }
        if let Some(n) = std::env::var("JSONAPI_MAX_BODY_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            s.max_body_bytes = n;
        }
        if let Ok(v) = std::env::var("JSONAPI_TITLE") {
            s.title = v;
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let s: ApiSettings =
            serde_json::from_str(r#"{"url_prefix":"/v2","verbose_errors":true}"#).unwrap();
        assert_eq!(s.url_prefix, "/v2");
        assert!(s.verbose_errors);
        assert_eq!(s.object_id_suffix, "Id");
        assert_eq!(s.cors_domain.as_deref(), Some("*"));
    }
}
