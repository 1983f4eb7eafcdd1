//! Streamlit Operator Common - 跨模块共享的领域模型
//!
//! 该模块提供 StreamlitApp 规范的校验与默认值填充、子资源命名推导、
//! 深度合并工具以及统一的校验错误类型。这里的函数都不访问集群。

pub mod error;
pub mod fragment;
pub mod merge;
pub mod models;

/// 重新导出常用类型，方便使用
pub use error::{FieldViolation, NamingInvariantViolation, SpecValidationError, ViolationKind};
pub use fragment::{decode_fragment, fragment_mismatch};
pub use merge::deep_merge;
pub use models::identity::*;
pub use models::spec::*;
