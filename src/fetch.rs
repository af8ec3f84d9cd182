use log::debug;
use std::future::Future;
use std::time::Duration;

/// 抓取错误类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// 连接或读取超时
    Timeout,
    /// 非 2xx 状态码
    BadStatus(u16),
    /// 其他传输层错误
    ConnectionFailure(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = error.status() {
            FetchError::BadStatus(status.as_u16())
        } else {
            FetchError::ConnectionFailure(error.to_string())
        }
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Timeout => write!(f, "请求超时"),
            FetchError::BadStatus(code) => write!(f, "异常状态码: {code}"),
            FetchError::ConnectionFailure(s) => write!(f, "连接失败: {s}"),
        }
    }
}

impl std::error::Error for FetchError {}

pub type Result<T> = std::result::Result<T, FetchError>;

/// 原始数据来源
///
/// 每次调用完成一次完整的请求往返，不做重试。
pub trait Source: Send + Sync + 'static {
    fn fetch(&self) -> impl Future<Output = Result<String>> + Send;
}

/// 基于 HTTP GET 的数据来源
pub struct HttpSource {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSource {
    /// 创建 HTTP 数据来源
    ///
    /// `timeout` 同时约束建立连接与读取完整响应体。连接池被关闭，
    /// 每次请求结束后连接都会释放。
    pub fn new(endpoint: &str, user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(timeout)
            .timeout(timeout)
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| FetchError::ConnectionFailure(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    /// 目标地址
    #[inline]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Source for HttpSource {
    async fn fetch(&self) -> Result<String> {
        let response = self.client.get(&self.endpoint).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::BadStatus(status.as_u16()));
        }

        let body = response.text().await?;
        debug!("从 {} 获取 {} 字节", self.endpoint, body.len());
        Ok(body)
    }
}
