//! 资源协调模块
//!
//! 该模块实现 StreamlitApp 的协调状态机：
//! 创建事件校验规范后依次创建 Deployment、Service、Ingress 并记录身份；
//! 更新事件先核对 status 中记录的身份，再按同样顺序整体替换三个子资源。
//! 规范校验失败与命名约定被破坏属于永久失败，写入 status 与事件后不再重试；
//! 集群 API 错误以告警事件挂到资源上，再交给控制器的错误策略重新排队。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{runtime::controller::Action, Resource, ResourceExt};
use streamlit_common::{RecordedIdentity, StreamlitAppSpec};
use tracing::{debug, error, info, warn};

use crate::cluster::{ClusterApi, EventNote};
use crate::config::OperatorConfig;
use crate::crd::{StreamlitApp, StreamlitAppStatus};
use crate::error::{OperatorError, Result};
use crate::event_handler::{AppEvent, AppEventHandler};
use crate::templating::{template_all, ChildResource};

/// 集群 API 错误后的重试间隔
pub const RETRY_INTERVAL: Duration = Duration::from_secs(60);

/// 协调器
pub struct Reconciler<C> {
    /// 集群 API
    cluster: C,
    /// 只读的 Operator 配置
    config: Arc<OperatorConfig>,
}

impl<C: ClusterApi> Reconciler<C> {
    /// 创建新的协调器
    pub fn new(cluster: C, config: Arc<OperatorConfig>) -> Self {
        Self { cluster, config }
    }

    /// 协调 StreamlitApp 资源
    pub async fn reconcile(&self, app: &StreamlitApp) -> Result<Action> {
        let name = app.name_any();
        let event = AppEvent::classify(app);

        let outcome = match &event {
            AppEvent::Unchanged => {
                debug!("StreamlitApp {} 的当前版本已处理，无需协调", name);
                return Ok(Action::await_change());
            }
            AppEvent::Deleting => {
                debug!("StreamlitApp {} 正在删除，子资源交由垃圾回收处理", name);
                return Ok(Action::await_change());
            }
            AppEvent::Create => {
                info!("处理 StreamlitApp {} 的创建事件", name);
                self.on_create(app).await
            }
            AppEvent::Update(recorded) => {
                info!("处理 StreamlitApp {} 的更新事件", name);
                self.on_update(app, recorded).await
            }
        };

        match outcome {
            Ok(identity) => {
                let status = StreamlitAppStatus::reconciled(&identity, app.metadata.generation);
                self.cluster.patch_app_status(name.clone(), status).await?;

                let (reason, note) = match &event {
                    AppEvent::Update(_) => ("Replaced", "已替换 Deployment、Service 与 Ingress"),
                    _ => ("Created", "已创建 Deployment、Service 与 Ingress"),
                };
                self.publish(app, EventNote::normal(reason, event.action(), note))
                    .await;

                info!("StreamlitApp {} 协调完成，访问地址 {}", name, identity.dns_name);
                Ok(Action::await_change())
            }
            Err(error) if error.is_permanent() => self.fail_permanently(app, &event, error).await,
            Err(error) => {
                // status 保持不变，下次重试仍按同一事件处理
                let note = EventNote::warning(error.reason(), event.action(), error.to_string());
                self.publish(app, note).await;
                Err(error)
            }
        }
    }

    /// 永久失败：写入 status 与告警事件，等待用户修正规范
    async fn fail_permanently(
        &self,
        app: &StreamlitApp,
        event: &AppEvent,
        error: OperatorError,
    ) -> Result<Action> {
        let name = app.name_any();
        let message = error.to_string();
        warn!("StreamlitApp {} 协调永久失败: {}", name, message);

        let status =
            StreamlitAppStatus::failed(app.status.as_ref(), message.clone(), app.metadata.generation);
        self.cluster.patch_app_status(name, status).await?;
        self.publish(app, EventNote::warning(error.reason(), event.action(), message))
            .await;

        Ok(Action::await_change())
    }

    /// 发布事件，失败时只记录日志
    async fn publish(&self, app: &StreamlitApp, note: EventNote) {
        let reference = app.object_ref(&());
        if let Err(e) = self.cluster.record_event(reference, note).await {
            warn!("为 StreamlitApp {} 发布事件失败: {}", app.name_any(), e);
        }
    }

    /// 处理错误
    pub fn handle_error(&self, app: &StreamlitApp, error: &OperatorError) -> Action {
        let name = app.name_any();

        if error.is_permanent() {
            error!("StreamlitApp {} 协调失败，等待规范变更: {}", name, error);
            return Action::await_change();
        }

        error!("协调 StreamlitApp {} 失败: {}", name, error);

        // 短时间后重试
        Action::requeue(RETRY_INTERVAL)
    }
}

#[async_trait]
impl<C: ClusterApi> AppEventHandler for Reconciler<C> {
    async fn on_create(&self, app: &StreamlitApp) -> Result<RecordedIdentity> {
        let name = app.name_any();
        let spec = validate(app)?;
        let identity = self.config.identity_for(&name);
        let children = template_all(&identity, &spec, &self.config).adopt(owner_reference(app)?);

        let mut recorded = RecordedIdentity::from(&identity);
        for child in children.into_ordered() {
            let kind = child.kind();
            let created = self.cluster.create_child(child).await?;
            info!("已创建 {} {}", kind, created.name());
            record_name(&mut recorded, &created);
        }

        Ok(recorded)
    }

    async fn on_update(
        &self,
        app: &StreamlitApp,
        recorded: &RecordedIdentity,
    ) -> Result<RecordedIdentity> {
        let name = app.name_any();
        let spec = validate(app)?;
        let identity = self.config.identity_for(&name);
        identity.verify(recorded)?;

        let children = template_all(&identity, &spec, &self.config).adopt(owner_reference(app)?);

        let mut replaced_identity = RecordedIdentity::from(&identity);
        for child in children.into_ordered() {
            let kind = child.kind();
            let replaced = self.cluster.replace_child(child).await?;
            info!("已替换 {} {}", kind, replaced.name());
            record_name(&mut replaced_identity, &replaced);
        }

        Ok(replaced_identity)
    }
}

fn validate(app: &StreamlitApp) -> Result<StreamlitAppSpec> {
    Ok(StreamlitAppSpec::from_payload(Some(&app.spec_payload()))?)
}

/// 以父资源为控制者的 OwnerReference
fn owner_reference(app: &StreamlitApp) -> Result<OwnerReference> {
    let mut owner = app
        .controller_owner_ref(&())
        .ok_or(OperatorError::MissingObjectKey("metadata.uid"))?;
    owner.block_owner_deletion = Some(true);
    Ok(owner)
}

fn record_name(recorded: &mut RecordedIdentity, child: &ChildResource) {
    let name = child.name();
    match child {
        ChildResource::Deployment(_) => recorded.deployment_name = name,
        ChildResource::Service(_) => recorded.service_name = name,
        ChildResource::Ingress(_) => recorded.ingress_name = name,
    }
}
