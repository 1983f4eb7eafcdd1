//! 控制器模块
//!
//! 该模块把协调器接入 kube 运行时的控制器循环：只监听受管命名空间中的 StreamlitApp，
//! 同一资源的协调由运行时串行化，不同资源之间并发执行。

use anyhow::{Context as _, Result};
use futures::StreamExt;
use kube::{
    api::{Api, ListParams},
    client::Client,
    runtime::{
        controller::{Action, Controller as KubeController},
        watcher,
    },
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cluster::KubeClusterApi;
use crate::config::OperatorConfig;
use crate::crd::StreamlitApp;
use crate::error::OperatorError;
use crate::reconcile::Reconciler;

/// 控制器上下文
pub struct Context {
    /// 协调器
    pub reconciler: Reconciler<KubeClusterApi>,
}

async fn reconcile(app: Arc<StreamlitApp>, ctx: Arc<Context>) -> Result<Action, OperatorError> {
    ctx.reconciler.reconcile(&app).await
}

fn error_policy(app: Arc<StreamlitApp>, error: &OperatorError, ctx: Arc<Context>) -> Action {
    ctx.reconciler.handle_error(&app, error)
}

/// StreamlitApp 控制器
pub struct AppController {
    /// Kubernetes 客户端
    client: Client,
    config: Arc<OperatorConfig>,
}

impl AppController {
    /// 创建新的控制器
    pub fn new(client: Client, config: Arc<OperatorConfig>) -> Self {
        Self { client, config }
    }

    /// 运行控制器，直到收到退出信号
    pub async fn run(self) -> Result<()> {
        let namespace = self.config.namespace.clone();
        let apps: Api<StreamlitApp> = Api::namespaced(self.client.clone(), &namespace);

        // CRD 未安装时尽早失败
        apps.list(&ListParams::default().limit(1))
            .await
            .context("无法列出 StreamlitApp，请确认 CRD 已安装且具有访问权限")?;

        let context = Arc::new(Context {
            reconciler: Reconciler::new(
                KubeClusterApi::new(self.client.clone(), namespace.clone()),
                self.config.clone(),
            ),
        });

        info!("启动 StreamlitApp 控制器，监听命名空间 {}", namespace);

        KubeController::new(apps, watcher::Config::default())
            .shutdown_on_signal()
            .run(reconcile, error_policy, context)
            .for_each(|result| async move {
                match result {
                    Ok((object, _)) => debug!("协调成功: {}", object.name),
                    Err(e) => warn!("协调错误: {}", e),
                }
            })
            .await;

        info!("StreamlitApp 控制器已停止");

        Ok(())
    }
}
