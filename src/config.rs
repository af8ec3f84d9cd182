use anyhow::{Result, bail};
use std::net::SocketAddr;
use std::time::Duration;

/// 默认抓取地址（pump.fun 代币接口）
pub const DEFAULT_ENDPOINT: &str =
    "https://frontend-api.pump.fun/coins/58BMhEDSY1ySm7g87zDU63bbeP9SPpkoYSKroD19pump";
/// 默认 User-Agent，部分站点会拒绝匿名请求
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; MarketCapFetcher/1.0; +https://pump.fun)";
pub const DEFAULT_FIELD_KEY: &str = "usd_market_cap";
pub const DEFAULT_PLACEHOLDER: &str = "mymarketcap";
/// 刷新周期上限：一年
pub const MAX_REFRESH_SECONDS: u64 = 86_400 * 365;
/// 单次请求超时上限：一小时
pub const MAX_TIMEOUT_SECONDS: u64 = 3_600;

/// 配置结构
#[derive(Debug, Clone)]
pub struct Config {
    /// 服务端绑定地址
    pub bind_address: String,
    /// 服务端端口
    pub port: u16,
    /// 抓取地址
    pub endpoint: String,
    /// 请求携带的 User-Agent
    pub user_agent: String,
    /// 要提取的字段名
    pub field_key: String,
    /// 刷新周期（秒）
    pub refresh_seconds: u64,
    /// 单次请求超时（秒）
    pub timeout_seconds: u64,
    /// 占位符名称
    pub placeholder: String,
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            field_key: DEFAULT_FIELD_KEY.to_string(),
            refresh_seconds: 300, // 5 分钟
            timeout_seconds: 10,
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
        }
    }
}

impl Config {
    /// 构建服务器地址
    pub fn address(&self) -> Result<SocketAddr> {
        // IPv6 地址需要加方括号
        let host = if self.bind_address.contains(':') && !self.bind_address.starts_with('[') {
            format!("[{}]", self.bind_address)
        } else {
            self.bind_address.clone()
        };
        let addr = format!("{host}:{}", self.port);
        addr.parse::<SocketAddr>()
            .map_err(|e| anyhow::anyhow!("无效的地址格式 {addr}: {e}"))
    }

    #[inline]
    pub fn refresh_period(&self) -> Duration {
        Duration::from_secs(self.refresh_seconds)
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// 启动前校验配置
    pub fn validate(&self) -> Result<()> {
        if self.refresh_seconds == 0 || self.refresh_seconds > MAX_REFRESH_SECONDS {
            bail!(
                "刷新周期必须在 1 到 {MAX_REFRESH_SECONDS} 秒之间: {}",
                self.refresh_seconds
            );
        }
        if self.timeout_seconds == 0 || self.timeout_seconds > MAX_TIMEOUT_SECONDS {
            bail!(
                "请求超时必须在 1 到 {MAX_TIMEOUT_SECONDS} 秒之间: {}",
                self.timeout_seconds
            );
        }
        if self.field_key.is_empty() {
            bail!("字段名不能为空");
        }
        if self.placeholder.is_empty() || self.placeholder.contains('/') {
            bail!("占位符名称无效: {:?}", self.placeholder);
        }
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            bail!("抓取地址必须以 http:// 或 https:// 开头: {}", self.endpoint);
        }
        self.address()?;
        Ok(())
    }
}
