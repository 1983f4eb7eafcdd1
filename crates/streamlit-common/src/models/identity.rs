//! 身份推导模型
//!
//! 子资源名称与外部 DNS 名称都是 StreamlitApp 名称加上 Operator 配置的纯函数。
//! 每次协调都重新推导，status 中只保存用于核对的确认值。

use crate::error::NamingInvariantViolation;

/// Service 名称后缀
pub const SERVICE_NAME_SUFFIX: &str = "-service";
/// Ingress 名称后缀
pub const INGRESS_NAME_SUFFIX: &str = "-ing";

/// Service 名称
pub fn service_name(name: &str) -> String {
    format!("{}{}", name, SERVICE_NAME_SUFFIX)
}

/// Ingress 名称
pub fn ingress_name(name: &str) -> String {
    format!("{}{}", name, INGRESS_NAME_SUFFIX)
}

/// 外部访问域名：`<name><suffix>.<baseDnsRecord>`
pub fn dns_name(name: &str, suffix: &str, base_dns_record: &str) -> String {
    format!("{}{}.{}", name, suffix, base_dns_record)
}

/// 由名称推导出的应用身份
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AppIdentity {
    /// StreamlitApp 名称
    pub app_name: String,
    /// Deployment 名称（与应用同名）
    pub deployment_name: String,
    pub service_name: String,
    pub ingress_name: String,
    /// 外部访问域名
    pub dns_name: String,
}

impl AppIdentity {
    /// 推导应用身份
    pub fn derive(name: &str, suffix: &str, base_dns_record: &str) -> Self {
        Self {
            app_name: name.to_string(),
            deployment_name: name.to_string(),
            service_name: service_name(name),
            ingress_name: ingress_name(name),
            dns_name: dns_name(name, suffix, base_dns_record),
        }
    }

    /// 核对 status 中记录的身份与当前推导结果
    ///
    /// 任一字段不一致都是硬性错误，调用方必须中止本次更新。
    pub fn verify(&self, recorded: &RecordedIdentity) -> Result<(), NamingInvariantViolation> {
        let checks = [
            ("streamlit-app-name", &recorded.app_name, &self.app_name),
            ("deployment-name", &recorded.deployment_name, &self.deployment_name),
            ("service-name", &recorded.service_name, &self.service_name),
            ("ingress-name", &recorded.ingress_name, &self.ingress_name),
            ("dns-name", &recorded.dns_name, &self.dns_name),
        ];

        for (field, recorded, expected) in checks {
            if recorded != expected {
                return Err(NamingInvariantViolation {
                    field,
                    recorded: recorded.clone(),
                    expected: expected.clone(),
                });
            }
        }

        Ok(())
    }
}

/// status 中记录的身份
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordedIdentity {
    pub app_name: String,
    pub deployment_name: String,
    pub service_name: String,
    pub ingress_name: String,
    pub dns_name: String,
}

impl From<&AppIdentity> for RecordedIdentity {
    fn from(identity: &AppIdentity) -> Self {
        Self {
            app_name: identity.app_name.clone(),
            deployment_name: identity.deployment_name.clone(),
            service_name: identity.service_name.clone(),
            ingress_name: identity.ingress_name.clone(),
            dns_name: identity.dns_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("demo")]
    #[case("hub")]
    #[case("my-app-2")]
    fn test_derived_names(#[case] name: &str) {
        let identity = AppIdentity::derive(name, "-streamlit", "example.com");

        assert_eq!(identity.app_name, name);
        assert_eq!(identity.deployment_name, name);
        assert_eq!(identity.service_name, format!("{}-service", name));
        assert_eq!(identity.ingress_name, format!("{}-ing", name));
        assert_eq!(identity.dns_name, format!("{}-streamlit.example.com", name));
        assert_eq!(identity, AppIdentity::derive(name, "-streamlit", "example.com"));
    }

    #[test]
    fn test_verify_accepts_own_record() {
        let identity = AppIdentity::derive("demo", "-streamlit", "example.com");
        assert!(identity.verify(&RecordedIdentity::from(&identity)).is_ok());
    }

    #[test]
    fn test_verify_rejects_diverged_deployment_name() {
        let identity = AppIdentity::derive("demo", "-streamlit", "example.com");
        let mut recorded = RecordedIdentity::from(&identity);
        recorded.deployment_name = "demo-old".to_string();

        let err = identity.verify(&recorded).unwrap_err();
        assert_eq!(err.field, "deployment-name");
        assert_eq!(err.recorded, "demo-old");
        assert_eq!(err.expected, "demo");
    }

    #[test]
    fn test_verify_rejects_changed_dns_configuration() {
        let before = AppIdentity::derive("demo", "-streamlit", "example.com");
        let after = AppIdentity::derive("demo", "-st", "example.com");

        let err = after.verify(&RecordedIdentity::from(&before)).unwrap_err();
        assert_eq!(err.field, "dns-name");
    }
}
