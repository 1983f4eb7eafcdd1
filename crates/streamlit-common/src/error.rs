//! 错误处理模块
//!
//! 该模块定义 StreamlitApp 规范校验与命名约定检查的错误类型。
//! 这两类错误都是永久性的：必须修正规范或由管理员介入，控制器不会自动重试。

use std::fmt;
use thiserror::Error;

/// 字段违规类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationKind {
    /// 缺少必填字段
    Missing,
    /// 类型不匹配
    WrongType {
        /// 期望的类型描述
        expected: &'static str,
    },
    /// 取值超出允许范围
    OutOfRange(String),
    /// 未知字段
    Unknown,
    /// 资源片段无法解析
    Malformed(String),
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationKind::Missing => write!(f, "缺少必填字段"),
            ViolationKind::WrongType { expected } => write!(f, "类型错误，期望 {}", expected),
            ViolationKind::OutOfRange(reason) => write!(f, "取值无效: {}", reason),
            ViolationKind::Unknown => write!(f, "未知字段"),
            ViolationKind::Malformed(reason) => write!(f, "片段格式错误: {}", reason),
        }
    }
}

/// 单个字段的违规记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    /// 字段路径，例如 `repo`、`ingress.annotations`、`additionalEnv[1]`
    pub field: String,
    /// 违规类型
    pub kind: ViolationKind,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, kind: ViolationKind) -> Self {
        Self {
            field: field.into(),
            kind,
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.kind)
    }
}

/// 规范校验错误，包含全部违规字段
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("规范校验失败: {}", render_violations(.violations))]
pub struct SpecValidationError {
    /// 违规字段列表，按发现顺序排列
    pub violations: Vec<FieldViolation>,
}

impl SpecValidationError {
    /// 只包含一个违规字段的错误
    pub fn single(field: impl Into<String>, kind: ViolationKind) -> Self {
        Self {
            violations: vec![FieldViolation::new(field, kind)],
        }
    }

    /// 是否包含指定字段的违规
    pub fn has_field(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }

    /// 指定字段的违规类型
    pub fn kind_of(&self, field: &str) -> Option<&ViolationKind> {
        self.violations
            .iter()
            .find(|v| v.field == field)
            .map(|v| &v.kind)
    }
}

fn render_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// 命名约定被破坏
///
/// status 中记录的子资源名称与当前命名方案推导出的名称不一致，
/// 说明子资源在控制器之外被修改，或者命名配置在资源生命周期中发生了变化。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("命名约定不一致: status 中记录的 {field} 为 {recorded:?}，当前推导结果为 {expected:?}")]
pub struct NamingInvariantViolation {
    /// status 中的字段名
    pub field: &'static str,
    /// status 中记录的值
    pub recorded: String,
    /// 当前推导出的值
    pub expected: String,
}
