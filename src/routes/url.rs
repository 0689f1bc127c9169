//! URL templates for exposed resources, built from the configured format strings.

use crate::config::ApiSettings;

/// Replace `{key}` placeholders in a format string.
pub fn fill(fmt: &str, values: &[(&str, &str)]) -> String {
    values.iter().fold(fmt.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{}}}", key), value)
    })
}

/// Base prefix joined with an extra prefix given at exposure time.
pub fn join_prefix(base: &str, extra: &str) -> String {
    let base = base.trim_end_matches('/');
    let extra = extra.trim_matches('/');
    if extra.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, extra)
    }
}

/// Endpoint name, e.g. `-api.Widget` or `v2-api.WidgetId`.
pub fn endpoint(extra_prefix: &str, name: &str) -> String {
    format!("{}-api.{}", extra_prefix.trim_matches('/'), name)
}

fn placeholder(param: &str) -> String {
    format!("{{{}}}", param)
}

pub fn collection(settings: &ApiSettings, prefix: &str, type_name: &str) -> String {
    fill(
        &settings.resource_url_fmt,
        &[("prefix", prefix), ("type", type_name)],
    )
}

pub fn instance(settings: &ApiSettings, prefix: &str, type_name: &str, id_param: &str) -> String {
    fill(
        &settings.instance_url_fmt,
        &[("prefix", prefix), ("type", type_name), ("id", &placeholder(id_param))],
    )
}

pub fn class_method(settings: &ApiSettings, prefix: &str, table: &str, method: &str) -> String {
    fill(
        &settings.classmethod_url_fmt,
        &[("prefix", prefix), ("table", table), ("method", method)],
    )
}

pub fn instance_method(
    settings: &ApiSettings,
    prefix: &str,
    table: &str,
    id_param: &str,
    method: &str,
) -> String {
    fill(
        &settings.instancemethod_url_fmt,
        &[
            ("prefix", prefix),
            ("table", table),
            ("id", &placeholder(id_param)),
            ("method", method),
        ],
    )
}

/// Relationship root under the parent's instance template.
pub fn relationship(settings: &ApiSettings, parent_instance: &str, rel: &str) -> String {
    fill(
        &settings.relationship_url_fmt,
        &[("parent", parent_instance), ("rel", rel)],
    )
}

/// Relationship root plus the child id placeholder.
pub fn relationship_child(root: &str, child_param: &str) -> String {
    format!("{}/{}", root.trim_end_matches('/'), placeholder(child_param))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_formats_produce_expected_templates() {
        let s = ApiSettings::default();
        let prefix = join_prefix(&s.url_prefix, "");
        assert_eq!(collection(&s, &prefix, "Widget"), "/api/Widget/");
        let inst = instance(&s, &prefix, "Widget", "WidgetId");
        assert_eq!(inst, "/api/Widget/{WidgetId}");
        assert_eq!(class_method(&s, &prefix, "widgets", "count"), "/api/widgets/count");
        assert_eq!(
            instance_method(&s, &prefix, "widgets", "WidgetId", "touch"),
            "/api/widgets/{WidgetId}/touch"
        );
        let root = relationship(&s, &inst, "parts");
        assert_eq!(root, "/api/Widget/{WidgetId}/parts");
        assert_eq!(relationship_child(&root, "PartId"), "/api/Widget/{WidgetId}/parts/{PartId}");
    }

    #[test]
    fn prefixes_join_without_double_slashes() {
        assert_eq!(join_prefix("/api/", "/v2/"), "/api/v2");
        assert_eq!(join_prefix("/api", ""), "/api");
        assert_eq!(endpoint("", "Widget"), "-api.Widget");
        assert_eq!(endpoint("/v2", "WidgetId"), "v2-api.WidgetId");
    }
}
