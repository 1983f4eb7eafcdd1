//! 清单模板模块
//!
//! 该模块由已校验的规范、推导出的身份与 Operator 配置生成三个子资源：
//! 运行应用与 git-sync 边车的 Deployment、ClusterIP Service 以及对外暴露的 Ingress。
//! 模板是纯函数，相同输入总是得到完全相同的文档。

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{
    Deployment, DeploymentSpec, DeploymentStrategy, RollingUpdateDeployment,
};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, EmptyDirVolumeSource, EnvVar, HTTPGetAction,
    PodSecurityContext, PodSpec, PodTemplateSpec, Probe, SecurityContext, Service, ServicePort,
    ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec as IngressResourceSpec, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::Serialize;
use streamlit_common::{AppIdentity, StreamlitAppSpec};

use crate::config::{GitSyncAuthConfig, OperatorConfig};

/// 应用容器名称
pub const APP_CONTAINER_NAME: &str = "streamlit";
/// 应用监听端口
pub const APP_PORT: i32 = 80;
/// 启动脚本
pub const LAUNCH_COMMAND: &str = "/app/launch/launch.sh";
/// 启动脚本所在的 ConfigMap
pub const LAUNCH_CONFIG_MAP: &str = "streamlit-launch-script";
/// 健康检查路径
pub const HEALTH_PATH: &str = "/_stcore/health";
/// git-sync 边车镜像
pub const GIT_SYNC_IMAGE: &str = "registry.k8s.io/git-sync/git-sync:v4.5.0";
/// git-sync 镜像内置用户，同时用作 Pod 的 fsGroup，保证挂载的 SSH 密钥可读
pub const GIT_SYNC_USER: i64 = 65533;

const GIT_SYNC_CONTAINER_NAME: &str = "git-sync";
const GIT_SYNC_ROOT: &str = "/tmp/code";
const GIT_SYNC_LINK: &str = "repo";
const CODE_VOLUME: &str = "code";
const LAUNCH_VOLUME: &str = "launch";
const IDENTITY_LABEL: &str = "app";
const NAME_LABEL: &str = "app.kubernetes.io/name";

/// 一次协调涉及的子资源
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChildResource {
    Deployment(Deployment),
    Service(Service),
    Ingress(Ingress),
}

impl ChildResource {
    /// 资源类型名
    pub fn kind(&self) -> &'static str {
        match self {
            ChildResource::Deployment(_) => "Deployment",
            ChildResource::Service(_) => "Service",
            ChildResource::Ingress(_) => "Ingress",
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            ChildResource::Deployment(deployment) => &deployment.metadata,
            ChildResource::Service(service) => &service.metadata,
            ChildResource::Ingress(ingress) => &ingress.metadata,
        }
    }

    /// 资源名称
    pub fn name(&self) -> String {
        self.metadata().name.clone().unwrap_or_default()
    }
}

/// 模板生成的三个子资源
#[derive(Clone, Debug, PartialEq)]
pub struct ChildManifests {
    pub deployment: Deployment,
    pub service: Service,
    pub ingress: Ingress,
}

impl ChildManifests {
    /// 将父资源设置为三个子资源的控制者，删除父资源时子资源随之回收
    pub fn adopt(mut self, owner: OwnerReference) -> Self {
        for metadata in [
            &mut self.deployment.metadata,
            &mut self.service.metadata,
            &mut self.ingress.metadata,
        ] {
            metadata.owner_references = Some(vec![owner.clone()]);
        }
        self
    }

    /// 按协调顺序返回子资源：Deployment、Service、Ingress
    pub fn into_ordered(self) -> [ChildResource; 3] {
        [
            ChildResource::Deployment(self.deployment),
            ChildResource::Service(self.service),
            ChildResource::Ingress(self.ingress),
        ]
    }
}

/// 生成全部子资源
pub fn template_all(
    identity: &AppIdentity,
    spec: &StreamlitAppSpec,
    config: &OperatorConfig,
) -> ChildManifests {
    ChildManifests {
        deployment: template_deployment(
            &identity.deployment_name,
            spec,
            &config.git_sync_auth_config,
            &config.namespace,
        ),
        service: template_service(&identity.app_name, &config.namespace),
        ingress: template_ingress(&identity.app_name, spec, &identity.dns_name, &config.namespace),
    }
}

fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

fn mount(name: &str, path: &str) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        ..Default::default()
    }
}

fn health_probe(failure_threshold: i32, initial_delay_seconds: Option<i32>) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(HEALTH_PATH.to_string()),
            port: IntOrString::Int(APP_PORT),
            ..Default::default()
        }),
        failure_threshold: Some(failure_threshold),
        period_seconds: Some(10),
        initial_delay_seconds,
        ..Default::default()
    }
}

/// 附加标签在下，身份标签在上
fn labels_with(
    additional: &BTreeMap<String, String>,
    identity: &[(&str, &str)],
) -> BTreeMap<String, String> {
    let mut labels = additional.clone();
    for (key, value) in identity {
        labels.insert(key.to_string(), value.to_string());
    }
    labels
}

fn selector_labels(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(IDENTITY_LABEL.to_string(), name.to_string())])
}

fn common_env() -> Vec<EnvVar> {
    vec![env("DEBIAN_FRONTEND", "noninteractive")]
}

fn app_container(spec: &StreamlitAppSpec) -> Container {
    let mut env_vars = vec![
        env("IN_HUB", "True"),
        env("CODE_DIR", format!("{}/{}", GIT_SYNC_LINK, spec.code_dir)),
        env("ENTRYPOINT", spec.entrypoint.as_str()),
        env("REQUIREMENTS", spec.requirements.as_str()),
    ];
    env_vars.extend(common_env());
    env_vars.extend(spec.additional_env.iter().cloned());

    let mut volume_mounts = vec![mount(CODE_VOLUME, "/app"), mount(LAUNCH_VOLUME, "/app/launch")];
    volume_mounts.extend(spec.additional_volume_mounts.iter().cloned());

    Container {
        name: APP_CONTAINER_NAME.to_string(),
        image: Some(spec.image.clone()),
        command: Some(vec![LAUNCH_COMMAND.to_string()]),
        env: Some(env_vars),
        ports: Some(vec![ContainerPort {
            container_port: APP_PORT,
            ..Default::default()
        }]),
        volume_mounts: Some(volume_mounts),
        liveness_probe: Some(health_probe(3, None)),
        readiness_probe: Some(health_probe(3, None)),
        startup_probe: Some(health_probe(30, Some(5))),
        ..Default::default()
    }
}

fn git_sync_container(spec: &StreamlitAppSpec, auth: &GitSyncAuthConfig) -> Container {
    let mut volume_mounts = auth.volume_mounts.clone();
    volume_mounts.push(mount(CODE_VOLUME, GIT_SYNC_ROOT));

    let mut env_vars = vec![
        env("GITSYNC_REPO", spec.repo.as_str()),
        env("GITSYNC_REF", spec.git_ref.as_str()),
        env("GITSYNC_ROOT", GIT_SYNC_ROOT),
        env("GITSYNC_LINK", GIT_SYNC_LINK),
        env("GITSYNC_SSH_KNOWN_HOSTS", "true"),
        env("GITSYNC_PERIOD", "10s"),
        env("GITSYNC_MAX_FAILURES", "6"),
    ];
    env_vars.extend(auth.env.iter().cloned());
    env_vars.extend(common_env());

    Container {
        name: GIT_SYNC_CONTAINER_NAME.to_string(),
        image: Some(GIT_SYNC_IMAGE.to_string()),
        env: Some(env_vars),
        volume_mounts: Some(volume_mounts),
        security_context: Some(SecurityContext {
            run_as_user: Some(GIT_SYNC_USER),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn pod_volumes(spec: &StreamlitAppSpec, auth: &GitSyncAuthConfig) -> Vec<Volume> {
    let mut volumes = vec![
        Volume {
            name: CODE_VOLUME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        },
        Volume {
            name: LAUNCH_VOLUME.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: Some(LAUNCH_CONFIG_MAP.to_string()),
                default_mode: Some(0o500),
                ..Default::default()
            }),
            ..Default::default()
        },
    ];
    volumes.extend(auth.volumes.iter().cloned());
    volumes.extend(spec.additional_volumes.iter().cloned());
    volumes
}

/// 生成 Deployment
pub fn template_deployment(
    name: &str,
    spec: &StreamlitAppSpec,
    auth: &GitSyncAuthConfig,
    namespace: &str,
) -> Deployment {
    let metadata_labels = labels_with(&spec.additional_labels, &[(IDENTITY_LABEL, name)]);
    let pod_labels = labels_with(
        &spec.additional_labels,
        &[(IDENTITY_LABEL, name), (NAME_LABEL, name)],
    );

    Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(metadata_labels),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(spec.replicas),
            selector: LabelSelector {
                match_labels: Some(selector_labels(name)),
                ..Default::default()
            },
            strategy: Some(DeploymentStrategy {
                type_: Some("RollingUpdate".to_string()),
                rolling_update: Some(RollingUpdateDeployment {
                    max_unavailable: Some(IntOrString::Int(1)),
                    max_surge: Some(IntOrString::Int(0)),
                }),
            }),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    enable_service_links: Some(spec.enable_service_links),
                    service_account_name: Some(spec.service_account_name.clone()),
                    security_context: Some(PodSecurityContext {
                        fs_group: Some(GIT_SYNC_USER),
                        ..Default::default()
                    }),
                    containers: vec![app_container(spec), git_sync_container(spec, auth)],
                    volumes: Some(pod_volumes(spec, auth)),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// 生成 Service
pub fn template_service(name: &str, namespace: &str) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(streamlit_common::service_name(name)),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(selector_labels(name)),
            ports: Some(vec![ServicePort {
                name: Some("http-port".to_string()),
                port: APP_PORT,
                target_port: Some(IntOrString::Int(APP_PORT)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// 生成 Ingress
pub fn template_ingress(
    name: &str,
    spec: &StreamlitAppSpec,
    dns_name: &str,
    namespace: &str,
) -> Ingress {
    let backend = IngressBackend {
        service: Some(IngressServiceBackend {
            name: streamlit_common::service_name(name),
            port: Some(ServiceBackendPort {
                number: Some(APP_PORT),
                ..Default::default()
            }),
        }),
        ..Default::default()
    };

    Ingress {
        metadata: ObjectMeta {
            name: Some(streamlit_common::ingress_name(name)),
            namespace: Some(namespace.to_string()),
            annotations: Some(spec.ingress.annotations.clone()),
            ..Default::default()
        },
        spec: Some(IngressResourceSpec {
            ingress_class_name: Some(spec.ingress.ingress_class_name.clone()),
            rules: Some(vec![IngressRule {
                host: Some(dns_name.to_string()),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some("/".to_string()),
                        path_type: "ImplementationSpecific".to_string(),
                        backend,
                    }],
                }),
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
