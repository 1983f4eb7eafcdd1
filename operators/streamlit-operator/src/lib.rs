//! Streamlit Operator - 以 Kubernetes Operator 方式托管 Streamlit 应用
//!
//! 该模块实现 StreamlitApp 自定义资源的控制器：校验规范，生成运行应用与 git-sync 边车的
//! Deployment、Service 与 Ingress，并在创建与更新时保持子资源与规范一致。
//! 启动时会先确保 hub 管理界面实例存在。

pub mod bootstrap;
pub mod cluster;
pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod event_handler;
pub mod hub;
pub mod reconcile;
pub mod templating;

use anyhow::{Context, Result};
use kube::Client;
use std::sync::Arc;
use tracing::info;

use crate::cluster::KubeClusterApi;
use crate::config::OperatorConfig;

/// Operator 主结构体
pub struct StreamlitOperator {
    /// Kubernetes 客户端
    client: Client,
    /// 只读配置
    config: Arc<OperatorConfig>,
}

impl StreamlitOperator {
    /// 创建新的 Operator 实例
    pub async fn new(config: OperatorConfig) -> Result<Self> {
        // 创建 Kubernetes 客户端
        let client = Client::try_default()
            .await
            .context("无法创建 Kubernetes 客户端")?;

        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    /// 启动 Operator，直到收到退出信号
    pub async fn start(&self) -> Result<()> {
        let cluster = KubeClusterApi::new(self.client.clone(), self.config.namespace.clone());

        // hub 无法更新时不能继续运行
        bootstrap::ensure_hub(&cluster, &self.config)
            .await
            .context("初始化 hub 实例失败")?;
        info!("hub 实例已就绪");

        controller::AppController::new(self.client.clone(), self.config.clone())
            .run()
            .await
    }
}
