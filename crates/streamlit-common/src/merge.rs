//! 深度合并工具
//!
//! 用于把 Hub 界面中用户输入的附加 spec 合并到基础 spec 上：
//! 两侧都是映射时递归合并，其他任何类型都直接覆盖。

use serde_json::Value;

/// 把 `overrides` 深度合并到 `base`
pub fn deep_merge(base: &mut Value, overrides: Value) {
    match (base, overrides) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            for (key, value) in override_map {
                let nested = value.is_object() && base_map.get(&key).map_or(false, Value::is_object);
                if nested {
                    if let Some(existing) = base_map.get_mut(&key) {
                        deep_merge(existing, value);
                    }
                } else {
                    base_map.insert(key, value);
                }
            }
        }
        (base, overrides) => *base = overrides,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_maps_merge_and_scalars_overwrite() {
        let mut base = json!({
            "repo": "https://example.com/a.git",
            "ref": "main",
            "codeDir": "app",
        });
        deep_merge(
            &mut base,
            json!({"replicas": 3, "ingress": {"annotations": {"x": "y"}}}),
        );

        assert_eq!(base["repo"], "https://example.com/a.git");
        assert_eq!(base["ref"], "main");
        assert_eq!(base["codeDir"], "app");
        assert_eq!(base["replicas"], 3);
        assert_eq!(base["ingress"]["annotations"]["x"], "y");
    }

    #[test]
    fn test_nested_merge_keeps_sibling_keys() {
        let mut base = json!({"ingress": {"annotations": {"a": "1"}, "ingressClassName": "nginx"}});
        deep_merge(&mut base, json!({"ingress": {"annotations": {"b": "2"}}}));

        assert_eq!(
            base,
            json!({"ingress": {"annotations": {"a": "1", "b": "2"}, "ingressClassName": "nginx"}})
        );
    }

    #[test]
    fn test_lists_and_type_changes_overwrite() {
        let mut base = json!({"additionalEnv": [{"name": "A"}], "ingress": {"annotations": {}}});
        deep_merge(
            &mut base,
            json!({"additionalEnv": [{"name": "B"}], "ingress": "disabled"}),
        );

        assert_eq!(base["additionalEnv"], json!([{"name": "B"}]));
        assert_eq!(base["ingress"], "disabled");
    }

    #[test]
    fn test_base_fields_can_be_overridden() {
        let mut base = json!({"repo": "https://example.com/a.git", "ref": "main"});
        deep_merge(&mut base, json!({"ref": "release"}));
        assert_eq!(base["ref"], "release");
    }
}
