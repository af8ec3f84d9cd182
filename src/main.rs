use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use market_cap_monitor::config::{
    DEFAULT_ENDPOINT, DEFAULT_FIELD_KEY, DEFAULT_PLACEHOLDER, DEFAULT_USER_AGENT,
};
use market_cap_monitor::{Config, HttpSource, PlaceholderServer, RefreshLoop, create_cache};
use std::future::Future;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};

type ServerResult = std::result::Result<Result<()>, JoinError>;

/// 服务停止的原因
#[derive(Debug)]
enum Stop {
    Signal,
    ServerExited(ServerResult),
}

/// 市值占位符服务
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 服务器绑定地址 (默认: ::，支持 IPv4 和 IPv6)
    #[arg(short, long, default_value = "::")]
    address: String,

    /// 服务器端口 (默认: 8080)
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// 抓取地址
    #[arg(short, long, default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// 请求携带的 User-Agent
    #[arg(long, default_value = DEFAULT_USER_AGENT)]
    user_agent: String,

    /// 要提取的字段名
    #[arg(short, long, default_value = DEFAULT_FIELD_KEY)]
    field: String,

    /// 刷新周期秒数 (默认: 300)
    #[arg(short, long, default_value_t = 300)]
    interval: u64,

    /// 单次请求超时秒数 (默认: 10)
    #[arg(short, long, default_value_t = 10)]
    timeout: u64,

    /// 占位符名称
    #[arg(long, default_value = DEFAULT_PLACEHOLDER)]
    placeholder: String,

    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志系统
    init_logger(&args.log_level);

    info!("市值占位符服务启动中...");

    // 从命令行参数创建配置
    let config = Config {
        bind_address: args.address,
        port: args.port,
        endpoint: args.endpoint,
        user_agent: args.user_agent,
        field_key: args.field,
        refresh_seconds: args.interval,
        timeout_seconds: args.timeout,
        placeholder: args.placeholder,
    };
    config.validate().context("配置无效")?;

    info!(
        "配置信息 - 地址: {}, 端口: {}, 抓取: {}, 字段: {}, 周期: {} 秒, 超时: {} 秒",
        config.bind_address,
        config.port,
        config.endpoint,
        config.field_key,
        config.refresh_seconds,
        config.timeout_seconds
    );

    let cache = create_cache();

    let source = HttpSource::new(&config.endpoint, &config.user_agent, config.timeout())
        .context("HTTP 客户端创建失败")?;
    let refresh = RefreshLoop::new(
        source,
        &config.field_key,
        config.refresh_period(),
        cache.clone(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let refresh_handle = tokio::spawn(refresh.run(shutdown_rx.clone()));

    let server = PlaceholderServer::new(cache, &config.placeholder);
    let addr = config.address()?;
    info!(
        "占位符 %{}% 将在 http://{addr}/placeholder/{} 提供",
        config.placeholder, config.placeholder
    );

    let mut server_shutdown = shutdown_rx;
    let mut server_handle = tokio::spawn(server.run(addr, async move {
        let _ = server_shutdown.changed().await;
    }));

    let server_result = match wait_for_stop(&mut server_handle, tokio::signal::ctrl_c()).await {
        Stop::Signal => {
            info!("收到关闭信号，停止调度");
            None
        }
        Stop::ServerExited(result) => {
            log_server_exit(&result);
            Some(result)
        }
    };
    let _ = shutdown_tx.send(true);

    let server_result = match server_result {
        Some(result) => result,
        None => server_handle.await,
    };

    // 正在进行的刷新会自然完成
    refresh_handle.await.context("刷新任务异常退出")?;
    server_result.context("服务器任务异常退出")??;

    info!("服务已关闭");

    Ok(())
}

/// 初始化日志系统
fn init_logger(level: &str) {
    match env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .try_init()
    {
        Ok(_) => info!("日志系统初始化成功，级别: {level}"),
        Err(e) => eprintln!("日志系统初始化失败: {e}"),
    }
}

/// 等待关闭信号或服务器退出
///
/// 信号监听注册失败时不会立即关闭，而是继续等待服务器退出。
async fn wait_for_stop<F>(server: &mut JoinHandle<Result<()>>, signal: F) -> Stop
where
    F: Future<Output = std::io::Result<()>>,
{
    let signal_error = tokio::select! {
        signal = signal => match signal {
            Ok(()) => return Stop::Signal,
            Err(e) => e,
        },
        result = &mut *server => return Stop::ServerExited(result),
    };

    warn!("无法监听 Ctrl-C: {signal_error}，将在服务器退出时关闭");
    Stop::ServerExited(server.await)
}

/// 记录服务器提前退出的原因
fn log_server_exit(result: &ServerResult) {
    match result {
        Ok(Ok(())) => warn!("服务器已退出，停止调度"),
        Ok(Err(e)) => error!("服务器异常退出: {e:#}，停止调度"),
        Err(e) => error!("服务器任务崩溃: {e}，停止调度"),
    }
}
