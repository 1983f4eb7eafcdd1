//! 集群 API 模块
//!
//! 协调器与启动引导只通过 [`ClusterApi`] 访问集群，测试中以 mock 替换。
//! [`KubeClusterApi`] 是基于 kube 客户端的实现，所有调用都限定在受管命名空间内。

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ObjectReference, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::NamespaceResourceScope;
use kube::{
    api::{Api, Patch, PatchParams, PostParams},
    runtime::events::{Event, EventType, Recorder, Reporter},
    Client, Resource,
};
use serde_json::json;
use tracing::debug;

use crate::crd::{StreamlitApp, StreamlitAppStatus};
use crate::templating::ChildResource;

/// 事件上报时使用的控制器名称
pub const CONTROLLER_NAME: &str = "streamlit-operator";

/// 事件级别
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoteType {
    Normal,
    Warning,
}

/// 附加到 StreamlitApp 上的 Kubernetes 事件
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventNote {
    pub type_: NoteType,
    pub reason: String,
    pub action: String,
    pub note: String,
}

impl EventNote {
    pub fn normal(reason: &str, action: &str, note: impl Into<String>) -> Self {
        Self {
            type_: NoteType::Normal,
            reason: reason.to_string(),
            action: action.to_string(),
            note: note.into(),
        }
    }

    pub fn warning(reason: &str, action: &str, note: impl Into<String>) -> Self {
        Self {
            type_: NoteType::Warning,
            reason: reason.to_string(),
            action: action.to_string(),
            note: note.into(),
        }
    }
}

/// 集群 API 接缝
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// 创建子资源，返回 API Server 接受后的对象
    async fn create_child(&self, child: ChildResource) -> Result<ChildResource, kube::Error>;

    /// 以完整文档替换子资源
    async fn replace_child(&self, child: ChildResource) -> Result<ChildResource, kube::Error>;

    /// 合并写入 StreamlitApp 的 status
    async fn patch_app_status(
        &self,
        name: String,
        status: StreamlitAppStatus,
    ) -> Result<(), kube::Error>;

    /// 发布 Kubernetes 事件
    async fn record_event(
        &self,
        reference: ObjectReference,
        note: EventNote,
    ) -> Result<(), kube::Error>;

    /// 合并更新已有的 StreamlitApp
    async fn patch_app(&self, name: String, app: StreamlitApp) -> Result<StreamlitApp, kube::Error>;

    /// 创建 StreamlitApp
    async fn create_app(&self, app: StreamlitApp) -> Result<StreamlitApp, kube::Error>;
}

/// 基于 kube 客户端的集群 API
#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
    namespace: String,
    reporter: Reporter,
}

impl KubeClusterApi {
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            reporter: Reporter {
                controller: CONTROLLER_NAME.to_string(),
                instance: std::env::var("POD_NAME").ok(),
            },
        }
    }

    fn api<K>(&self) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), &self.namespace)
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn create_child(&self, child: ChildResource) -> Result<ChildResource, kube::Error> {
        let params = PostParams::default();
        debug!("创建 {} {}/{}", child.kind(), self.namespace, child.name());

        let created = match child {
            ChildResource::Deployment(deployment) => ChildResource::Deployment(
                self.api::<Deployment>().create(&params, &deployment).await?,
            ),
            ChildResource::Service(service) => {
                ChildResource::Service(self.api::<Service>().create(&params, &service).await?)
            }
            ChildResource::Ingress(ingress) => {
                ChildResource::Ingress(self.api::<Ingress>().create(&params, &ingress).await?)
            }
        };

        Ok(created)
    }

    async fn replace_child(&self, child: ChildResource) -> Result<ChildResource, kube::Error> {
        let params = PostParams::default();
        let name = child.name();
        debug!("替换 {} {}/{}", child.kind(), self.namespace, name);

        let replaced = match child {
            ChildResource::Deployment(deployment) => ChildResource::Deployment(
                self.api::<Deployment>()
                    .replace(&name, &params, &deployment)
                    .await?,
            ),
            ChildResource::Service(service) => ChildResource::Service(
                self.api::<Service>().replace(&name, &params, &service).await?,
            ),
            ChildResource::Ingress(ingress) => ChildResource::Ingress(
                self.api::<Ingress>().replace(&name, &params, &ingress).await?,
            ),
        };

        Ok(replaced)
    }

    async fn patch_app_status(
        &self,
        name: String,
        status: StreamlitAppStatus,
    ) -> Result<(), kube::Error> {
        // 写入完整的 status，值为 null 的字段会被清除
        let patch = json!({ "status": status });
        self.api::<StreamlitApp>()
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn record_event(
        &self,
        reference: ObjectReference,
        note: EventNote,
    ) -> Result<(), kube::Error> {
        let recorder = Recorder::new(self.client.clone(), self.reporter.clone(), reference);
        recorder
            .publish(Event {
                type_: match note.type_ {
                    NoteType::Normal => EventType::Normal,
                    NoteType::Warning => EventType::Warning,
                },
                reason: note.reason,
                note: Some(note.note),
                action: note.action,
                secondary: None,
            })
            .await
    }

    async fn patch_app(&self, name: String, app: StreamlitApp) -> Result<StreamlitApp, kube::Error> {
        self.api::<StreamlitApp>()
            .patch(&name, &PatchParams::default(), &Patch::Merge(&app))
            .await
    }

    async fn create_app(&self, app: StreamlitApp) -> Result<StreamlitApp, kube::Error> {
        self.api::<StreamlitApp>()
            .create(&PostParams::default(), &app)
            .await
    }
}
