//! 自定义资源定义模块
//!
//! 该模块定义 StreamlitApp 自定义资源。`spec` 以未类型化的映射接收，
//! 由 [`streamlit_common::StreamlitAppSpec::from_payload`] 负责校验，
//! 这样格式错误的规范会通过 status 与事件反馈给用户，而不是在 watch 阶段被静默丢弃。

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::{
    CustomResourceDefinition, CustomResourceValidation, JSONSchemaProps,
};
use kube::{CustomResource, CustomResourceExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use streamlit_common::RecordedIdentity;

/// StreamlitApp 规范的原始载荷
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[kube(
    group = "fetch.com",
    version = "v1",
    kind = "StreamlitApp",
    plural = "streamlit-apps",
    shortname = "stapp",
    namespaced
)]
#[kube(status = "StreamlitAppStatus")]
#[kube(schema = "disabled")]
#[kube(printcolumn = r#"{"name":"Host","type":"string","jsonPath":".status.dns-name"}"#)]
#[kube(printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#)]
pub struct RawAppSpec {
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// 协调阶段
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppPhase {
    /// 三个子资源都已按当前规范创建或替换
    Reconciled,
    /// 永久失败，等待修正后的规范
    Failed,
}

/// StreamlitApp 状态
///
/// 子资源名称在首次创建成功时写入，之后每次更新都用来核对命名约定。
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct StreamlitAppStatus {
    pub deployment_name: Option<String>,
    pub service_name: Option<String>,
    pub ingress_name: Option<String>,
    #[serde(rename = "streamlit-app-name")]
    pub app_name: Option<String>,
    pub dns_name: Option<String>,
    pub phase: Option<AppPhase>,
    pub message: Option<String>,
    /// 最近一次处理完成（成功或永久失败）的 metadata.generation
    pub observed_generation: Option<i64>,
}

impl StreamlitAppStatus {
    /// 协调成功后的状态
    pub fn reconciled(identity: &RecordedIdentity, generation: Option<i64>) -> Self {
        Self {
            deployment_name: Some(identity.deployment_name.clone()),
            service_name: Some(identity.service_name.clone()),
            ingress_name: Some(identity.ingress_name.clone()),
            app_name: Some(identity.app_name.clone()),
            dns_name: Some(identity.dns_name.clone()),
            phase: Some(AppPhase::Reconciled),
            message: None,
            observed_generation: generation,
        }
    }

    /// 永久失败后的状态，保留已记录的子资源身份
    pub fn failed(previous: Option<&Self>, message: String, generation: Option<i64>) -> Self {
        Self {
            phase: Some(AppPhase::Failed),
            message: Some(message),
            observed_generation: generation,
            ..previous.cloned().unwrap_or_default()
        }
    }

    /// status 中记录的身份，尚未创建过子资源时为 `None`
    pub fn recorded_identity(&self) -> Option<RecordedIdentity> {
        let deployment_name = self.deployment_name.clone()?;
        Some(RecordedIdentity {
            app_name: self.app_name.clone().unwrap_or_default(),
            deployment_name,
            service_name: self.service_name.clone().unwrap_or_default(),
            ingress_name: self.ingress_name.clone().unwrap_or_default(),
            dns_name: self.dns_name.clone().unwrap_or_default(),
        })
    }
}

impl StreamlitApp {
    /// 以 JSON 值的形式返回 spec 载荷
    pub fn spec_payload(&self) -> Value {
        Value::Object(self.spec.fields.clone())
    }
}

/// 生成带 OpenAPI 结构的 CRD
///
/// spec 与 status 都保留未知字段，具体校验由控制器完成。
pub fn crd() -> CustomResourceDefinition {
    let mut crd = StreamlitApp::crd();
    for version in &mut crd.spec.versions {
        version.schema = Some(CustomResourceValidation {
            open_api_v3_schema: Some(open_api_schema()),
        });
    }
    crd
}

fn open_api_schema() -> JSONSchemaProps {
    let preserved = |description: &str| JSONSchemaProps {
        type_: Some("object".to_string()),
        description: Some(description.to_string()),
        x_kubernetes_preserve_unknown_fields: Some(true),
        ..Default::default()
    };

    let mut properties = BTreeMap::new();
    properties.insert(
        "spec".to_string(),
        preserved("StreamlitApp 规范：repo、ref、codeDir 以及可选的覆盖项"),
    );
    properties.insert(
        "status".to_string(),
        preserved("控制器记录的子资源身份与协调状态"),
    );

    JSONSchemaProps {
        type_: Some("object".to_string()),
        required: Some(vec!["spec".to_string()]),
        properties: Some(properties),
        ..Default::default()
    }
}
