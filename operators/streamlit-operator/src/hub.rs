//! Hub 客户端模块
//!
//! 管理界面使用的操作：列出、创建、删除 StreamlitApp，以及删除应用的 Pod 以强制重启。
//! 创建时用户填写的附加规范（YAML）会深度合并到基础规范上，合并结果在提交前先做一次校验。

use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use kube::{
    api::{Api, DeleteParams, ListParams, PostParams},
    Client, ResourceExt,
};
use serde_json::{json, Map, Value};
use streamlit_common::{deep_merge, StreamlitAppSpec};
use tracing::info;

use crate::config::OperatorConfig;
use crate::crd::{RawAppSpec, StreamlitApp};
use crate::error::{OperatorError, Result};

/// 新建应用请求
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewAppRequest {
    pub name: String,
    pub repo: String,
    pub git_ref: String,
    pub code_dir: String,
    /// 附加规范（YAML 映射），可为空
    pub additional_spec: String,
}

/// 解析附加规范，空文本或 `null` 视为空映射
pub fn parse_additional_spec(yaml: &str) -> Result<Value> {
    if yaml.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }

    match serde_yaml::from_str::<Value>(yaml)? {
        Value::Null => Ok(Value::Object(Map::new())),
        value @ Value::Object(_) => Ok(value),
        _ => Err(OperatorError::InvalidRequest(
            "附加规范必须是 YAML 映射".to_string(),
        )),
    }
}

/// 由请求构造 StreamlitApp
pub fn build_app(request: &NewAppRequest, namespace: &str) -> Result<StreamlitApp> {
    for (field, value) in [
        ("name", &request.name),
        ("repo", &request.repo),
        ("ref", &request.git_ref),
        ("codeDir", &request.code_dir),
    ] {
        if value.trim().is_empty() {
            return Err(OperatorError::InvalidRequest(format!("{} 不能为空", field)));
        }
    }

    let mut spec = json!({
        "repo": request.repo,
        "ref": request.git_ref,
        "codeDir": request.code_dir,
    });
    deep_merge(&mut spec, parse_additional_spec(&request.additional_spec)?);
    StreamlitAppSpec::from_payload(Some(&spec))?;

    let fields = match spec {
        Value::Object(fields) => fields,
        _ => return Err(OperatorError::InvalidRequest("规范必须是映射".to_string())),
    };

    let mut app = StreamlitApp::new(&request.name, RawAppSpec { fields });
    app.metadata.namespace = Some(namespace.to_string());
    Ok(app)
}

/// Hub 客户端
pub struct HubClient {
    apps: Api<StreamlitApp>,
    pods: Api<Pod>,
    config: Arc<OperatorConfig>,
}

impl HubClient {
    pub fn new(client: Client, config: Arc<OperatorConfig>) -> Self {
        Self {
            apps: Api::namespaced(client.clone(), &config.namespace),
            pods: Api::namespaced(client, &config.namespace),
            config,
        }
    }

    /// 列出命名空间中的全部应用名称
    pub async fn list_app_names(&self) -> Result<Vec<String>> {
        let apps = self.apps.list(&ListParams::default()).await?;
        Ok(apps.items.iter().map(|app| app.name_any()).collect())
    }

    /// 创建应用
    pub async fn create_app(&self, request: &NewAppRequest) -> Result<StreamlitApp> {
        let app = build_app(request, &self.config.namespace)?;
        let created = self.apps.create(&PostParams::default(), &app).await?;
        info!("已创建 StreamlitApp {}", created.name_any());
        Ok(created)
    }

    /// 删除应用，子资源按前台级联方式回收
    pub async fn delete_app(&self, name: &str) -> Result<()> {
        self.apps.delete(name, &DeleteParams::foreground()).await?;
        info!("已删除 StreamlitApp {}", name);
        Ok(())
    }

    /// 删除应用的全部 Pod，由 Deployment 重新拉起，返回删除的数量
    pub async fn restart_app(&self, name: &str) -> Result<usize> {
        let selector = format!("app={}", name);
        let pods = self.pods.list(&ListParams::default().labels(&selector)).await?;

        for pod in &pods.items {
            self.pods
                .delete(&pod.name_any(), &DeleteParams::foreground())
                .await?;
            info!("已删除 Pod {}", pod.name_any());
        }

        Ok(pods.items.len())
    }

    /// 应用的访问地址
    pub fn app_url(&self, name: &str) -> String {
        format!("https://{}", self.config.identity_for(name).dns_name)
    }
}
