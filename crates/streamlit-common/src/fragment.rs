//! 资源片段的原样解码
//!
//! `additionalEnv`、`additionalVolumes` 等片段最终要原样写入子资源。k8s-openapi 的类型
//! 在解码时会丢弃不认识的字段，并给缺失的必填字段填入空值，所以解码后需要把结果重新
//! 序列化，与输入逐项比对，确认没有任何内容被改写。

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// 把片段解码为 Kubernetes 类型，内容被改写时返回原因
pub fn decode_fragment<T>(item: &Value) -> Result<T, String>
where
    T: DeserializeOwned + Serialize,
{
    let fragment: T = serde_json::from_value(item.clone()).map_err(|e| e.to_string())?;
    let decoded = serde_json::to_value(&fragment).map_err(|e| e.to_string())?;

    match fragment_mismatch(item, &decoded) {
        Some(reason) => Err(reason),
        None => Ok(fragment),
    }
}

/// 比较输入片段与解码后重新序列化的结果，返回第一处差异
///
/// 输入中值为 `null` 的键视同缺省。
pub fn fragment_mismatch(original: &Value, decoded: &Value) -> Option<String> {
    first_difference("", original, decoded)
}

fn first_difference(path: &str, original: &Value, decoded: &Value) -> Option<String> {
    match (original, decoded) {
        (Value::Object(original), Value::Object(decoded)) => {
            for (key, value) in original {
                if value.is_null() {
                    continue;
                }
                let child = join(path, key);
                match decoded.get(key) {
                    None => return Some(format!("无法识别的字段 {}", child)),
                    Some(decoded) => {
                        if let Some(reason) = first_difference(&child, value, decoded) {
                            return Some(reason);
                        }
                    }
                }
            }
            decoded
                .keys()
                .find(|key| original.get(*key).map_or(true, Value::is_null))
                .map(|key| format!("缺少必填字段 {}", join(path, key)))
        }
        (Value::Array(original), Value::Array(decoded)) if original.len() == decoded.len() => original
            .iter()
            .zip(decoded)
            .enumerate()
            .find_map(|(index, (a, b))| first_difference(&format!("{}[{}]", path, index), a, b)),
        _ if original == decoded => None,
        _ => Some(format!("字段 {} 的值无法原样保留", path)),
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{EnvVar, Volume, VolumeMount};
    use serde_json::json;

    #[test]
    fn test_supported_fragments_decode() {
        let volume: Volume = decode_fragment(&json!({
            "name": "creds",
            "secret": {"secretName": "git-creds", "defaultMode": 256},
        }))
        .unwrap();
        assert_eq!(volume.name, "creds");

        let mount: VolumeMount =
            decode_fragment(&json!({"name": "creds", "mountPath": "/etc/creds", "readOnly": true}))
                .unwrap();
        assert_eq!(mount.read_only, Some(true));

        let env: EnvVar = decode_fragment(&json!({"name": "MODE", "value": null})).unwrap();
        assert_eq!(env.value, None);
    }

    #[test]
    fn test_unrecognized_volume_source_is_rejected() {
        let err = decode_fragment::<Volume>(&json!({
            "name": "img",
            "image": {"reference": "quay.io/x:1"},
        }))
        .unwrap_err();
        assert!(err.contains("image"));
    }

    #[test]
    fn test_misspelled_key_is_rejected() {
        let err = decode_fragment::<VolumeMount>(&json!({"name": "img", "mountpath": "/data"}))
            .unwrap_err();
        assert!(err.contains("mountpath"));
    }

    #[test]
    fn test_missing_required_name_is_rejected() {
        let err = decode_fragment::<EnvVar>(&json!({"value": "no-name"})).unwrap_err();
        assert!(err.contains("name"));
    }

    #[test]
    fn test_nested_difference_reports_path() {
        let original = json!([{"name": "a", "secret": {"secretName": "s", "mode": 1}}]);
        let decoded = json!([{"name": "a", "secret": {"secretName": "s"}}]);
        let reason = fragment_mismatch(&original, &decoded).unwrap();
        assert!(reason.contains("[0].secret.mode"));
    }
}
