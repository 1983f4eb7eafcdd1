//! 事件处理模块
//!
//! kube 控制器按“水平触发”方式投递协调请求，本模块把每次投递显式归类为
//! 创建、更新、无变化或删除中，并定义处理创建与更新事件的接口。

use async_trait::async_trait;
use streamlit_common::RecordedIdentity;

use crate::crd::StreamlitApp;
use crate::error::Result;

/// StreamlitApp 事件类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// 尚未创建过子资源
    Create,
    /// 已有子资源，携带 status 中记录的身份
    Update(RecordedIdentity),
    /// 当前 generation 已处理完成（成功或永久失败）
    Unchanged,
    /// 已设置删除时间戳，子资源由级联删除回收
    Deleting,
}

impl AppEvent {
    /// 根据 generation 与 status 归类一次协调请求
    pub fn classify(app: &StreamlitApp) -> Self {
        if app.metadata.deletion_timestamp.is_some() {
            return AppEvent::Deleting;
        }

        let status = app.status.as_ref();

        let observed = status.and_then(|s| s.observed_generation);
        if observed.is_some() && observed == app.metadata.generation {
            return AppEvent::Unchanged;
        }

        match status.and_then(|s| s.recorded_identity()) {
            Some(recorded) => AppEvent::Update(recorded),
            None => AppEvent::Create,
        }
    }

    /// 写入日志与事件的动作名
    pub fn action(&self) -> &'static str {
        match self {
            AppEvent::Create => "Create",
            AppEvent::Update(_) => "Update",
            AppEvent::Unchanged | AppEvent::Deleting => "None",
        }
    }
}

/// 创建与更新事件的处理接口
#[async_trait]
pub trait AppEventHandler {
    /// 处理创建事件，返回新建子资源的身份
    async fn on_create(&self, app: &StreamlitApp) -> Result<RecordedIdentity>;

    /// 处理更新事件，返回替换后子资源的身份
    async fn on_update(
        &self,
        app: &StreamlitApp,
        recorded: &RecordedIdentity,
    ) -> Result<RecordedIdentity>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn app(generation: i64, status: serde_json::Value) -> StreamlitApp {
        serde_json::from_value(json!({
            "apiVersion": "fetch.com/v1",
            "kind": "StreamlitApp",
            "metadata": {"name": "demo", "namespace": "streamlit", "generation": generation},
            "spec": {"repo": "https://example.com/a.git", "ref": "main", "codeDir": "app"},
            "status": status,
        }))
        .unwrap()
    }

    #[test]
    fn test_new_resource_is_create() {
        assert_eq!(AppEvent::classify(&app(1, serde_json::Value::Null)), AppEvent::Create);
        assert_eq!(AppEvent::classify(&app(1, json!({}))), AppEvent::Create);
    }

    #[test]
    fn test_failed_create_with_new_generation_is_create_again() {
        let status = json!({"phase": "Failed", "message": "repo: 缺失", "observed-generation": 1});
        assert_eq!(AppEvent::classify(&app(1, status.clone())), AppEvent::Unchanged);
        assert_eq!(AppEvent::classify(&app(2, status)), AppEvent::Create);
    }

    #[test]
    fn test_deletion_takes_precedence_over_new_generation() {
        let mut value = serde_json::to_value(app(2, json!({
            "deployment-name": "demo",
            "observed-generation": 1,
        })))
        .unwrap();
        value["metadata"]["deletionTimestamp"] = json!("2026-10-19T08:00:00Z");
        value["metadata"]["finalizers"] = json!(["foregroundDeletion"]);
        let deleting: StreamlitApp = serde_json::from_value(value).unwrap();

        assert_eq!(AppEvent::classify(&deleting), AppEvent::Deleting);
        assert_eq!(AppEvent::classify(&app(1, serde_json::Value::Null)), AppEvent::Create);
    }

    #[test]
    fn test_recorded_identity_means_update() {
        let status = json!({
            "deployment-name": "demo",
            "service-name": "demo-service",
            "ingress-name": "demo-ing",
            "streamlit-app-name": "demo",
            "dns-name": "demo-streamlit.example.com",
            "phase": "Reconciled",
            "observed-generation": 1,
        });

        assert_eq!(AppEvent::classify(&app(1, status.clone())), AppEvent::Unchanged);
        match AppEvent::classify(&app(2, status)) {
            AppEvent::Update(recorded) => {
                assert_eq!(recorded.deployment_name, "demo");
                assert_eq!(recorded.dns_name, "demo-streamlit.example.com");
            }
            other => panic!("期望更新事件，实际为 {:?}", other),
        }
    }
}
