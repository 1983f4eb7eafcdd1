//! 启动引导模块
//!
//! Operator 启动时确保 hub 实例存在并指向当前配置的管理界面代码。
//! 先尝试原地更新，资源不存在（404）时再创建，其余错误都会中止启动。

use serde_json::{json, Value};
use streamlit_common::StreamlitAppSpec;
use tracing::info;

use crate::cluster::ClusterApi;
use crate::config::OperatorConfig;
use crate::crd::{RawAppSpec, StreamlitApp};
use crate::error::{is_not_found, OperatorError, Result};

/// hub 实例名称
pub const HUB_NAME: &str = "hub";
/// hub 代码在仓库中的目录
pub const HUB_CODE_DIR: &str = "streamlit-hub";
/// hub 使用的 ServiceAccount，需要管理 StreamlitApp 与 Pod 的权限
pub const HUB_SERVICE_ACCOUNT: &str = "streamlit-serviceaccount";

/// 生成 hub 的 StreamlitApp 清单
pub fn hub_manifest(config: &OperatorConfig) -> Result<StreamlitApp> {
    let payload = json!({
        "repo": config.git_repo,
        "ref": config.git_ref,
        "codeDir": HUB_CODE_DIR,
        "serviceAccountName": HUB_SERVICE_ACCOUNT,
        "additionalEnv": [
            {"name": "STREAMLIT_HUB_SUFFIX", "value": config.suffix},
            {"name": "STREAMLIT_HUB_BASE_DNS_RECORD", "value": config.base_dns_record},
        ],
    });
    StreamlitAppSpec::from_payload(Some(&payload))?;

    let fields = match payload {
        Value::Object(fields) => fields,
        _ => return Err(OperatorError::Config("hub 规范必须是映射".to_string())),
    };

    let mut app = StreamlitApp::new(HUB_NAME, RawAppSpec { fields });
    app.metadata.namespace = Some(config.namespace.clone());
    Ok(app)
}

/// 确保 hub 实例存在且为最新
pub async fn ensure_hub<C: ClusterApi>(cluster: &C, config: &OperatorConfig) -> Result<StreamlitApp> {
    let hub = hub_manifest(config)?;

    match cluster.patch_app(HUB_NAME.to_string(), hub.clone()).await {
        Ok(patched) => {
            info!("已更新 StreamlitApp {}/{}", config.namespace, HUB_NAME);
            Ok(patched)
        }
        Err(e) if is_not_found(&e) => {
            info!("StreamlitApp {} 不存在，将创建", HUB_NAME);
            let created = cluster.create_app(hub).await?;
            info!("已创建 StreamlitApp {}/{}", config.namespace, HUB_NAME);
            Ok(created)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MockClusterApi;
    use crate::error::api_error;
    use mockall::Sequence;

    fn config() -> OperatorConfig {
        OperatorConfig::from_yaml_str(
            "baseDnsRecord: example.com\ngitRepo: https://example.com/hub.git\ngitRef: v2\n",
        )
        .unwrap()
    }

    #[test]
    fn test_hub_manifest() {
        let hub = hub_manifest(&config()).unwrap();
        assert_eq!(hub.metadata.name.as_deref(), Some("hub"));
        assert_eq!(hub.metadata.namespace.as_deref(), Some("streamlit"));

        let spec = StreamlitAppSpec::from_payload(Some(&hub.spec_payload())).unwrap();
        assert_eq!(spec.repo, "https://example.com/hub.git");
        assert_eq!(spec.git_ref, "v2");
        assert_eq!(spec.code_dir, "streamlit-hub");
        assert_eq!(spec.service_account_name, "streamlit-serviceaccount");
        let env: Vec<_> = spec
            .additional_env
            .iter()
            .map(|e| (e.name.as_str(), e.value.as_deref().unwrap_or_default()))
            .collect();
        assert_eq!(
            env,
            vec![
                ("STREAMLIT_HUB_SUFFIX", "-streamlit"),
                ("STREAMLIT_HUB_BASE_DNS_RECORD", "example.com"),
            ]
        );
    }

    #[tokio::test]
    async fn test_existing_hub_is_patched() {
        let mut mock = MockClusterApi::new();
        mock.expect_patch_app()
            .withf(|name, app| name == "hub" && app.spec.fields["codeDir"] == "streamlit-hub")
            .times(1)
            .returning(|_, app| Ok(app));
        mock.expect_create_app().never();

        let hub = ensure_hub(&mock, &config()).await.unwrap();
        assert_eq!(hub.metadata.name.as_deref(), Some("hub"));
    }

    #[test_log::test(tokio::test)]
    async fn test_missing_hub_is_created() {
        let mut mock = MockClusterApi::new();
        let mut seq = Sequence::new();
        mock.expect_patch_app()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(api_error(404, "NotFound")));
        mock.expect_create_app()
            .withf(|app| app.metadata.name.as_deref() == Some("hub"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(Ok);

        assert!(ensure_hub(&mock, &config()).await.is_ok());
    }

    #[tokio::test]
    async fn test_other_patch_errors_are_fatal() {
        let mut mock = MockClusterApi::new();
        mock.expect_patch_app()
            .times(1)
            .returning(|_, _| Err(api_error(403, "Forbidden")));
        mock.expect_create_app().never();

        let err = ensure_hub(&mock, &config()).await.unwrap_err();
        assert!(matches!(err, OperatorError::Kube(_)));
    }

    #[tokio::test]
    async fn test_create_failure_is_fatal() {
        let mut mock = MockClusterApi::new();
        mock.expect_patch_app()
            .returning(|_, _| Err(api_error(404, "NotFound")));
        mock.expect_create_app()
            .times(1)
            .returning(|_| Err(api_error(409, "AlreadyExists")));

        assert!(ensure_hub(&mock, &config()).await.is_err());
    }

    #[test]
    fn test_invalid_hub_configuration_is_rejected() {
        let mut config = config();
        config.git_repo = String::new();
        assert!(matches!(
            hub_manifest(&config),
            Err(OperatorError::InvalidSpec(_))
        ));
    }
}
