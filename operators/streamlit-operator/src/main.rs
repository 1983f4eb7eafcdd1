//! Streamlit Operator 命令行入口
//!
//! 默认运行控制器；另提供打印 CRD、离线渲染清单与管理应用的子命令。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use kube::Client;
use serde_json::Value;
use streamlit_common::StreamlitAppSpec;
use tracing::info;
use tracing_subscriber::EnvFilter;

use streamlit_operator::config::{OperatorConfig, DEFAULT_CONFIG_PATH};
use streamlit_operator::crd::{self, RawAppSpec, StreamlitApp};
use streamlit_operator::hub::{HubClient, NewAppRequest};
use streamlit_operator::templating::template_all;
use streamlit_operator::StreamlitOperator;

/// Streamlit Operator
#[derive(Parser, Debug)]
#[command(name = "streamlit-operator")]
#[command(about = "以 git 仓库为来源托管 Streamlit 应用的 Kubernetes Operator")]
#[command(version)]
struct Cli {
    /// 配置文件路径
    #[arg(long, env = "STREAMLIT_OPERATOR_CONFIG", default_value = DEFAULT_CONFIG_PATH, global = true)]
    config: PathBuf,

    /// 日志级别（trace、debug、info、warn、error），设置 RUST_LOG 时以其为准
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// 输出 JSON 格式日志
    #[arg(long, env = "LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 运行控制器（默认）
    Run,
    /// 打印 CRD 的 YAML
    Crd,
    /// 离线渲染 StreamlitApp 及其子资源
    Render(RenderArgs),
    /// 管理 StreamlitApp
    #[command(subcommand)]
    Apps(AppsCommand),
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// 应用名称
    #[arg(long)]
    name: String,
    /// 规范文件（YAML），内容为 spec 映射
    #[arg(long)]
    spec: PathBuf,
}

#[derive(Subcommand, Debug)]
enum AppsCommand {
    /// 列出全部应用及访问地址
    List,
    /// 创建应用
    Create {
        name: String,
        #[arg(long)]
        repo: String,
        #[arg(long = "ref", default_value = "main")]
        git_ref: String,
        #[arg(long)]
        code_dir: String,
        /// 附加规范（YAML 映射），深度合并到基础规范上
        #[arg(long, default_value = "")]
        additional_spec: String,
    },
    /// 删除应用
    Delete { name: String },
    /// 删除应用的 Pod 以强制重启
    Restart { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(&cli.config).await,
        Command::Crd => print_crd(),
        Command::Render(args) => render(&cli.config, &args),
        Command::Apps(command) => apps(&cli.config, command).await,
    }
}

/// 初始化日志
fn init_logging(cli: &Cli) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .context("无效的日志级别")?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<OperatorConfig> {
    OperatorConfig::load(path).with_context(|| format!("加载配置 {} 失败", path.display()))
}

async fn run(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        namespace = %config.namespace,
        "启动 Streamlit Operator"
    );

    let operator = StreamlitOperator::new(config).await?;
    operator.start().await
}

fn print_crd() -> Result<()> {
    let yaml = serde_yaml::to_string(&crd::crd()).context("序列化 CRD 失败")?;
    print!("{}", yaml);
    Ok(())
}

/// 输出补全默认值后的 StreamlitApp 与三个子资源，文档之间以 `---` 分隔
fn render(config_path: &Path, args: &RenderArgs) -> Result<()> {
    let config = load_config(config_path)?;
    let content = std::fs::read_to_string(&args.spec)
        .with_context(|| format!("无法读取规范文件 {}", args.spec.display()))?;
    let payload: Value = serde_yaml::from_str(&content).context("规范文件不是有效的 YAML")?;

    let spec = StreamlitAppSpec::from_payload(Some(&payload))?;
    let identity = config.identity_for(&args.name);

    let fields = match spec.to_payload()? {
        Value::Object(fields) => fields,
        _ => anyhow::bail!("规范必须是映射"),
    };
    let mut app = StreamlitApp::new(&args.name, RawAppSpec { fields });
    app.metadata.namespace = Some(config.namespace.clone());

    let mut documents = vec![serde_yaml::to_string(&app)?];
    for child in template_all(&identity, &spec, &config).into_ordered() {
        documents.push(serde_yaml::to_string(&child)?);
    }

    print!("{}", documents.join("---\n"));
    Ok(())
}

async fn apps(config_path: &Path, command: AppsCommand) -> Result<()> {
    let config = Arc::new(load_config(config_path)?);
    let client = Client::try_default()
        .await
        .context("无法创建 Kubernetes 客户端")?;
    let hub = HubClient::new(client, config);

    match command {
        AppsCommand::List => {
            for name in hub.list_app_names().await? {
                println!("{}\t{}", name, hub.app_url(&name));
            }
        }
        AppsCommand::Create {
            name,
            repo,
            git_ref,
            code_dir,
            additional_spec,
        } => {
            let request = NewAppRequest {
                name,
                repo,
                git_ref,
                code_dir,
                additional_spec,
            };
            let app = hub.create_app(&request).await?;
            println!("{}", hub.app_url(&app.metadata.name.unwrap_or_default()));
        }
        AppsCommand::Delete { name } => hub.delete_app(&name).await?,
        AppsCommand::Restart { name } => {
            let count = hub.restart_app(&name).await?;
            println!("已删除 {} 个 Pod", count);
        }
    }

    Ok(())
}
