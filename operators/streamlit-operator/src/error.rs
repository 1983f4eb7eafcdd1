//! 错误处理模块
//!
//! 该模块定义 Operator 的统一错误类型，区分永久性错误（规范校验失败、命名约定被破坏）
//! 与可重试的集群 API 错误。永久性错误写入资源 status 并停止重试，
//! 其余错误交给控制器的错误策略重新排队。

use streamlit_common::{NamingInvariantViolation, SpecValidationError};
use thiserror::Error;

/// Operator 统一错误类型
#[derive(Error, Debug)]
pub enum OperatorError {
    /// Kubernetes API 错误
    #[error("Kubernetes API 错误: {0}")]
    Kube(#[from] kube::Error),

    /// 规范校验失败
    #[error(transparent)]
    InvalidSpec(#[from] SpecValidationError),

    /// 命名约定被破坏
    #[error(transparent)]
    NamingInvariant(#[from] NamingInvariantViolation),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 请求参数无效
    #[error("请求无效: {0}")]
    InvalidRequest(String),

    /// 资源缺少必要的元数据
    #[error("资源缺少必要字段: {0}")]
    MissingObjectKey(&'static str),

    /// YAML 错误
    #[error("YAML 错误: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Operator 结果类型别名
pub type Result<T> = std::result::Result<T, OperatorError>;

impl OperatorError {
    /// 是否为永久性错误（需要修正规范或人工干预，不自动重试）
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            OperatorError::InvalidSpec(_) | OperatorError::NamingInvariant(_)
        )
    }

    /// 写入 Kubernetes 事件时使用的原因
    pub fn reason(&self) -> &'static str {
        match self {
            OperatorError::InvalidSpec(_) => "SpecValidationFailed",
            OperatorError::NamingInvariant(_) => "NamingInvariantViolated",
            OperatorError::Kube(_) => "ClusterApiError",
            _ => "ReconcileFailed",
        }
    }
}

/// API Server 返回 404
pub fn is_not_found(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(response) if response.code == 404)
}

#[cfg(test)]
pub(crate) fn api_error(code: u16, reason: &str) -> kube::Error {
    kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{} ({})", reason, code),
        reason: reason.to_string(),
        code,
    })
}
