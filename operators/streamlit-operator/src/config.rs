//! 配置管理模块
//!
//! 该模块负责加载 Operator 的 YAML 配置文件。配置在进程启动时读取一次，
//! 之后以 `Arc<OperatorConfig>` 的形式只读地传入模板、命名与启动引导等组件。

use k8s_openapi::api::core::v1::{EnvVar, Volume, VolumeMount};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use streamlit_common::{fragment_mismatch, AppIdentity};
use tracing::debug;

use crate::error::{OperatorError, Result};

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "/config/config.yaml";

/// git-sync 鉴权配置
///
/// 三组片段原样注入每个受管工作负载的 git-sync 容器。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitSyncAuthConfig {
    /// 环境变量片段
    #[serde(default)]
    pub env: Vec<EnvVar>,
    /// 卷挂载片段
    #[serde(default)]
    pub volume_mounts: Vec<VolumeMount>,
    /// 卷片段
    #[serde(default)]
    pub volumes: Vec<Volume>,
}

impl GitSyncAuthConfig {
    /// 确认解码没有改写任何片段
    fn check_verbatim(&self, raw: Option<&Value>) -> Result<()> {
        let raw = match raw {
            Some(Value::Object(raw)) => raw,
            _ => return Ok(()),
        };

        let decoded = [
            ("env", serde_json::to_value(&self.env)),
            ("volumeMounts", serde_json::to_value(&self.volume_mounts)),
            ("volumes", serde_json::to_value(&self.volumes)),
        ];
        for (key, value) in decoded {
            let original = match raw.get(key) {
                None | Some(Value::Null) => continue,
                Some(original) => original,
            };
            let value = value.map_err(|e| {
                OperatorError::Config(format!("gitSyncAuthConfig.{} 无法序列化: {}", key, e))
            })?;
            if let Some(reason) = fragment_mismatch(original, &value) {
                return Err(OperatorError::Config(format!(
                    "gitSyncAuthConfig.{} 无法原样注入: {}",
                    key, reason
                )));
            }
        }
        Ok(())
    }
}

/// Operator 配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorConfig {
    /// 基础 DNS 记录，例如 `example.com`
    pub base_dns_record: String,
    /// 应用域名后缀
    #[serde(default = "default_suffix")]
    pub suffix: String,
    /// Hub 应用所在的 Git 仓库
    #[serde(default = "default_git_repo")]
    pub git_repo: String,
    /// Hub 应用的分支
    #[serde(default = "default_git_ref")]
    pub git_ref: String,
    /// 受管命名空间
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub git_sync_auth_config: GitSyncAuthConfig,
}

fn default_suffix() -> String {
    "-streamlit".to_string()
}

fn default_git_repo() -> String {
    "https://github.com/tbourton/streamlit-operator.git".to_string()
}

fn default_git_ref() -> String {
    "main".to_string()
}

fn default_namespace() -> String {
    "streamlit".to_string()
}

impl OperatorConfig {
    /// 从文件加载配置
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            OperatorError::Config(format!("无法读取配置文件 {}: {}", path.display(), e))
        })?;

        let config = Self::from_yaml_str(&content)?;
        debug!("从 {} 加载配置成功", path.display());

        Ok(config)
    }

    /// 从 YAML 文本解析配置
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        let raw: Value = serde_yaml::from_str(content)?;
        config
            .git_sync_auth_config
            .check_verbatim(raw.get("gitSyncAuthConfig"))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.base_dns_record.trim().is_empty() {
            return Err(OperatorError::Config("baseDnsRecord 不能为空".to_string()));
        }
        if self.namespace.trim().is_empty() {
            return Err(OperatorError::Config("namespace 不能为空".to_string()));
        }
        Ok(())
    }

    /// 按当前配置推导应用身份
    pub fn identity_for(&self, name: &str) -> AppIdentity {
        AppIdentity::derive(name, &self.suffix, &self.base_dns_record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_defaults() {
        let config = OperatorConfig::from_yaml_str("baseDnsRecord: example.com\n").unwrap();

        assert_eq!(config.base_dns_record, "example.com");
        assert_eq!(config.suffix, "-streamlit");
        assert_eq!(config.git_ref, "main");
        assert_eq!(config.namespace, "streamlit");
        assert_eq!(config.git_sync_auth_config, GitSyncAuthConfig::default());
    }

    #[test]
    fn test_git_sync_auth_fragments() {
        let yaml = r#"
baseDnsRecord: apps.internal
suffix: -st
gitRepo: git@github.com:org/hub.git
gitRef: release
gitSyncAuthConfig:
  env:
    - name: GITSYNC_SSH_KEY_FILE
      value: /etc/git-secret/ssh
  volumeMounts:
    - name: git-secret
      mountPath: /etc/git-secret
      readOnly: true
  volumes:
    - name: git-secret
      secret:
        secretName: git-creds
        defaultMode: 256
"#;
        let config = OperatorConfig::from_yaml_str(yaml).unwrap();
        let auth = &config.git_sync_auth_config;

        assert_eq!(config.suffix, "-st");
        assert_eq!(config.git_repo, "git@github.com:org/hub.git");
        assert_eq!(auth.env[0].name, "GITSYNC_SSH_KEY_FILE");
        assert_eq!(auth.volume_mounts[0].mount_path, "/etc/git-secret");
        assert_eq!(auth.volume_mounts[0].read_only, Some(true));
        let secret = auth.volumes[0].secret.as_ref().unwrap();
        assert_eq!(secret.secret_name.as_deref(), Some("git-creds"));
        assert_eq!(secret.default_mode, Some(256));
    }

    #[test]
    fn test_rewritten_auth_fragments_are_rejected() {
        let yaml = r#"
baseDnsRecord: example.com
gitSyncAuthConfig:
  volumeMounts:
    - name: git-secret
      mountpath: /etc/git-secret
"#;
        match OperatorConfig::from_yaml_str(yaml) {
            Err(OperatorError::Config(message)) => {
                assert!(message.contains("volumeMounts"));
                assert!(message.contains("mountpath"));
            }
            other => panic!("期望配置错误，实际为 {:?}", other),
        }

        let yaml = "baseDnsRecord: example.com\ngitSyncAuthConfig:\n  env:\n    - value: x\n";
        assert!(matches!(
            OperatorConfig::from_yaml_str(yaml),
            Err(OperatorError::Config(_))
        ));
    }

    #[test]
    fn test_missing_base_dns_record_is_rejected() {
        assert!(OperatorConfig::from_yaml_str("suffix: -x\n").is_err());
        assert!(matches!(
            OperatorConfig::from_yaml_str("baseDnsRecord: ''\n"),
            Err(OperatorError::Config(_))
        ));
    }

    #[test]
    fn test_identity_uses_config() {
        let config = OperatorConfig::from_yaml_str("baseDnsRecord: example.com\n").unwrap();
        assert_eq!(config.identity_for("demo").dns_name, "demo-streamlit.example.com");
    }

    #[test]
    fn test_load_missing_file() {
        let err = OperatorConfig::load("/nonexistent/streamlit/config.yaml").unwrap_err();
        assert!(matches!(err, OperatorError::Config(_)));
    }
}
