//! StreamlitApp 规范模型
//!
//! 该模块把自定义资源中未类型化的 `spec` 载荷解析为带默认值、已规范化的
//! [`StreamlitAppSpec`]。校验会收集全部字段违规后一次性返回，便于用户一次修正。
//! 路径类字段在类型检查通过之后才去除首尾的 `/`，规范化不会掩盖缺失或类型错误。

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{EnvVar, Volume, VolumeMount};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{FieldViolation, SpecValidationError, ViolationKind};
use crate::fragment::decode_fragment;

/// 默认入口脚本
pub const DEFAULT_ENTRYPOINT: &str = "main.py";
/// 默认依赖文件（相对 codeDir）
pub const DEFAULT_REQUIREMENTS: &str = "requirements.txt";
/// 默认运行时镜像
pub const DEFAULT_IMAGE: &str = "python:3.11.14-slim";
/// 默认副本数
pub const DEFAULT_REPLICAS: i32 = 1;
/// 默认 ServiceAccount
pub const DEFAULT_SERVICE_ACCOUNT: &str = "default";
/// 默认 IngressClass
pub const DEFAULT_INGRESS_CLASS: &str = "nginx";

const KNOWN_FIELDS: &[&str] = &[
    "repo",
    "ref",
    "codeDir",
    "entrypoint",
    "requirements",
    "image",
    "replicas",
    "enableServiceLinks",
    "serviceAccountName",
    "additionalLabels",
    "additionalEnv",
    "additionalVolumes",
    "additionalVolumeMounts",
    "ingress",
];

const KNOWN_INGRESS_FIELDS: &[&str] = &["annotations", "ingressClassName"];

/// Ingress 配置
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressSpec {
    /// Ingress 注解
    pub annotations: BTreeMap<String, String>,
    /// IngressClass 名称
    pub ingress_class_name: String,
}

impl Default for IngressSpec {
    fn default() -> Self {
        Self {
            annotations: BTreeMap::new(),
            ingress_class_name: DEFAULT_INGRESS_CLASS.to_string(),
        }
    }
}

/// 已校验、已填充默认值的 StreamlitApp 规范
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamlitAppSpec {
    /// Git 仓库地址
    pub repo: String,
    /// 分支或标签
    #[serde(rename = "ref")]
    pub git_ref: String,
    /// 仓库内的代码目录
    pub code_dir: String,
    /// 入口脚本
    pub entrypoint: String,
    /// 依赖文件
    pub requirements: String,
    /// 应用容器镜像
    pub image: String,
    /// 副本数，至少为 1
    pub replicas: i32,
    pub enable_service_links: bool,
    pub service_account_name: String,
    /// 附加标签，不会覆盖身份标签
    pub additional_labels: BTreeMap<String, String>,
    /// 附加环境变量，追加在固定变量之后
    pub additional_env: Vec<EnvVar>,
    pub additional_volumes: Vec<Volume>,
    pub additional_volume_mounts: Vec<VolumeMount>,
    pub ingress: IngressSpec,
}

impl StreamlitAppSpec {
    /// 从未类型化的载荷解析规范
    ///
    /// 载荷缺失或为 `null` 时按空映射处理，此时所有必填字段都会报告缺失。
    pub fn from_payload(payload: Option<&Value>) -> Result<Self, SpecValidationError> {
        let empty = Map::new();
        let map = match payload {
            None | Some(Value::Null) => &empty,
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(SpecValidationError::single(
                    "spec",
                    ViolationKind::WrongType {
                        expected: "mapping",
                    },
                ))
            }
        };

        let mut collector = Collector::default();
        collector.reject_unknown("", map, KNOWN_FIELDS);

        let repo = collector.required_string(map, "repo", true);
        let git_ref = collector.required_string(map, "ref", true);
        let code_dir = normalize_path(&collector.required_string(map, "codeDir", false));
        let entrypoint = normalize_path(&collector.string_or(map, "entrypoint", DEFAULT_ENTRYPOINT));
        let requirements =
            normalize_path(&collector.string_or(map, "requirements", DEFAULT_REQUIREMENTS));
        let image = collector.string_or(map, "image", DEFAULT_IMAGE);
        let replicas = collector.replicas(map);
        let enable_service_links = collector.bool_or(map, "enableServiceLinks", false);
        let service_account_name =
            collector.string_or(map, "serviceAccountName", DEFAULT_SERVICE_ACCOUNT);
        let additional_labels = collector.string_map(map, "additionalLabels", "additionalLabels");
        let additional_env = collector.fragments::<EnvVar>(map, "additionalEnv");
        let additional_volumes = collector.fragments::<Volume>(map, "additionalVolumes");
        let additional_volume_mounts =
            collector.fragments::<VolumeMount>(map, "additionalVolumeMounts");
        let ingress = collector.ingress(map);

        collector.finish()?;

        Ok(Self {
            repo,
            git_ref,
            code_dir,
            entrypoint,
            requirements,
            image,
            replicas,
            enable_service_links,
            service_account_name,
            additional_labels,
            additional_env,
            additional_volumes,
            additional_volume_mounts,
            ingress,
        })
    }

    /// 输出完整（含默认值）的 spec 载荷
    pub fn to_payload(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

/// 去除路径首尾的 `/`，保留中间的分隔符
pub fn normalize_path(value: &str) -> String {
    value.trim_matches('/').to_string()
}

/// 整数值，允许小数部分为零的浮点数（如 `3.0`）
fn integral(value: &Value) -> Option<i64> {
    if let Some(value) = value.as_i64() {
        return Some(value);
    }
    match value.as_f64() {
        Some(value) if value.fract() == 0.0 && value.abs() < i64::MAX as f64 => Some(value as i64),
        _ => None,
    }
}

/// 违规收集器
#[derive(Default)]
struct Collector {
    violations: Vec<FieldViolation>,
}

impl Collector {
    fn push(&mut self, field: impl Into<String>, kind: ViolationKind) {
        self.violations.push(FieldViolation::new(field, kind));
    }

    fn finish(self) -> Result<(), SpecValidationError> {
        if self.violations.is_empty() {
            Ok(())
        } else {
            Err(SpecValidationError {
                violations: self.violations,
            })
        }
    }

    fn reject_unknown(&mut self, prefix: &str, map: &Map<String, Value>, known: &[&str]) {
        for key in map.keys() {
            if !known.contains(&key.as_str()) {
                self.push(format!("{}{}", prefix, key), ViolationKind::Unknown);
            }
        }
    }

    fn required_string(&mut self, map: &Map<String, Value>, key: &str, non_empty: bool) -> String {
        match map.get(key) {
            None | Some(Value::Null) => {
                self.push(key, ViolationKind::Missing);
                String::new()
            }
            Some(Value::String(value)) => {
                if non_empty && value.trim().is_empty() {
                    self.push(key, ViolationKind::OutOfRange("不能为空".to_string()));
                }
                value.clone()
            }
            Some(_) => {
                self.push(key, ViolationKind::WrongType { expected: "string" });
                String::new()
            }
        }
    }

    fn string_or(&mut self, map: &Map<String, Value>, key: &str, default: &str) -> String {
        match map.get(key) {
            None | Some(Value::Null) => default.to_string(),
            Some(Value::String(value)) => value.clone(),
            Some(_) => {
                self.push(key, ViolationKind::WrongType { expected: "string" });
                default.to_string()
            }
        }
    }

    fn bool_or(&mut self, map: &Map<String, Value>, key: &str, default: bool) -> bool {
        match map.get(key) {
            None | Some(Value::Null) => default,
            Some(Value::Bool(value)) => *value,
            Some(_) => {
                self.push(key, ViolationKind::WrongType { expected: "boolean" });
                default
            }
        }
    }

    fn replicas(&mut self, map: &Map<String, Value>) -> i32 {
        let value = match map.get("replicas") {
            None | Some(Value::Null) => return DEFAULT_REPLICAS,
            Some(value) => value,
        };

        match integral(value) {
            Some(replicas) if replicas < 1 => {
                self.push(
                    "replicas",
                    ViolationKind::OutOfRange(format!("必须大于等于 1，实际为 {}", replicas)),
                );
                DEFAULT_REPLICAS
            }
            Some(replicas) => match i32::try_from(replicas) {
                Ok(replicas) => replicas,
                Err(_) => {
                    self.push(
                        "replicas",
                        ViolationKind::OutOfRange(format!("超出 32 位整数范围: {}", replicas)),
                    );
                    DEFAULT_REPLICAS
                }
            },
            None => {
                self.push("replicas", ViolationKind::WrongType { expected: "integer" });
                DEFAULT_REPLICAS
            }
        }
    }

    fn string_map(
        &mut self,
        map: &Map<String, Value>,
        key: &str,
        path: &str,
    ) -> BTreeMap<String, String> {
        let mut result = BTreeMap::new();
        match map.get(key) {
            None | Some(Value::Null) => {}
            Some(Value::Object(entries)) => {
                for (name, value) in entries {
                    match value {
                        Value::String(value) => {
                            result.insert(name.clone(), value.clone());
                        }
                        _ => self.push(
                            format!("{}.{}", path, name),
                            ViolationKind::WrongType { expected: "string" },
                        ),
                    }
                }
            }
            Some(_) => self.push(path, ViolationKind::WrongType { expected: "mapping" }),
        }
        result
    }

    /// 附加的资源片段：必须能原样解码为对应的 Kubernetes 类型，其余交给 API Server 校验
    fn fragments<T: DeserializeOwned + Serialize>(&mut self, map: &Map<String, Value>, key: &str) -> Vec<T> {
        let items = match map.get(key) {
            None | Some(Value::Null) => return Vec::new(),
            Some(Value::Array(items)) => items,
            Some(_) => {
                self.push(key, ViolationKind::WrongType { expected: "sequence" });
                return Vec::new();
            }
        };

        let mut fragments = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let path = format!("{}[{}]", key, index);
            if !item.is_object() {
                self.push(path, ViolationKind::WrongType { expected: "mapping" });
                continue;
            }
            match decode_fragment::<T>(item) {
                Ok(fragment) => fragments.push(fragment),
                Err(reason) => self.push(path, ViolationKind::Malformed(reason)),
            }
        }
        fragments
    }

    fn ingress(&mut self, map: &Map<String, Value>) -> IngressSpec {
        let ingress = match map.get("ingress") {
            None | Some(Value::Null) => return IngressSpec::default(),
            Some(Value::Object(ingress)) => ingress,
            Some(_) => {
                self.push("ingress", ViolationKind::WrongType { expected: "mapping" });
                return IngressSpec::default();
            }
        };

        self.reject_unknown("ingress.", ingress, KNOWN_INGRESS_FIELDS);
        let annotations = self.string_map(ingress, "annotations", "ingress.annotations");
        let ingress_class_name = match ingress.get("ingressClassName") {
            None | Some(Value::Null) => DEFAULT_INGRESS_CLASS.to_string(),
            Some(Value::String(name)) => name.clone(),
            Some(_) => {
                self.push(
                    "ingress.ingressClassName",
                    ViolationKind::WrongType { expected: "string" },
                );
                DEFAULT_INGRESS_CLASS.to_string()
            }
        };

        IngressSpec {
            annotations,
            ingress_class_name,
        }
    }
}
