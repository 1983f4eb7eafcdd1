//! 数据模型模块
//!
//! 该模块定义 StreamlitApp 的规范模型与身份推导模型。

pub mod spec;
pub mod identity;
