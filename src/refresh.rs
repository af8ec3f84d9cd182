//! 定时刷新任务
//!
//! 每个周期依次执行 抓取 → 提取 → 格式化 → 写入缓存。任一阶段失败都会把
//! 缓存改写为 [`SENTINEL`]，错误只记录日志，不会中断后续周期。

use crate::cache::{CacheRef, SENTINEL};
use crate::extract::{ExtractError, extract};
use crate::fetch::{FetchError, Source};
use crate::format::format_display;
use log::{debug, info, warn};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// 单次刷新的错误
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshError {
    Fetch(FetchError),
    Extract(ExtractError),
}

impl From<FetchError> for RefreshError {
    #[inline]
    fn from(error: FetchError) -> Self {
        RefreshError::Fetch(error)
    }
}

impl From<ExtractError> for RefreshError {
    #[inline]
    fn from(error: ExtractError) -> Self {
        RefreshError::Extract(error)
    }
}

impl std::fmt::Display for RefreshError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefreshError::Fetch(e) => write!(f, "抓取失败: {e}"),
            RefreshError::Extract(e) => write!(f, "提取失败: {e}"),
        }
    }
}

impl std::error::Error for RefreshError {}

/// 刷新任务
pub struct RefreshLoop<S> {
    source: S,
    field_key: String,
    period: Duration,
    cache: CacheRef,
}

impl<S: Source> RefreshLoop<S> {
    pub fn new(source: S, field_key: &str, period: Duration, cache: CacheRef) -> Self {
        Self {
            source,
            field_key: field_key.to_string(),
            period,
            cache,
        }
    }

    /// 抓取并计算展示值，不触碰缓存
    async fn derive(&self) -> Result<String, RefreshError> {
        let raw = self.source.fetch().await?;
        let reading = extract(&raw, &self.field_key)?;
        Ok(format_display(reading))
    }

    /// 执行一次刷新并返回写入缓存的值
    pub async fn tick(&self) -> String {
        let value = match self.derive().await {
            Ok(value) => {
                debug!("市值已更新为 {value}");
                value
            }
            Err(e) => {
                warn!("刷新失败，缓存置为 {SENTINEL}: {e}");
                SENTINEL.to_string()
            }
        };
        self.cache.update(&value);
        value
    }

    /// 立即执行一次，之后每隔 `period` 执行一次，直到收到关闭信号
    ///
    /// 周期从上一次开始时刻算起；若单次耗时超过周期，下一次紧接着开始。
    /// 关闭信号只会阻止后续调度，不会打断正在进行的刷新。
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("刷新任务启动，周期 {} 秒", self.period.as_secs());

        loop {
            if *shutdown.borrow() {
                break;
            }

            let started = Instant::now();
            self.tick().await;

            if wait_until(next_deadline(started, self.period), &mut shutdown).await {
                break;
            }
        }

        info!("刷新任务已停止");
    }
}

/// 溢出时的兜底等待时长（约 30 年）
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// 下一次刷新的开始时刻，周期过大时退化为遥远的将来
fn next_deadline(started: Instant, period: Duration) -> Instant {
    started
        .checked_add(period)
        .or_else(|| started.checked_add(FAR_FUTURE))
        .unwrap_or(started)
}

/// 等待到 `deadline`；收到关闭信号时提前返回 `true`
async fn wait_until(deadline: Instant, shutdown: &mut watch::Receiver<bool>) -> bool {
    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => return false,
            changed = shutdown.changed() => {
                // 发送端被丢弃同样视为关闭
                if changed.is_err() {
                    return true;
                }
            }
        }
        if *shutdown.borrow() {
            return true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::create_cache;
    use crate::fetch;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const KEY: &str = "usd_market_cap";

    /// 按顺序返回预设结果的数据来源，耗尽后重复最后一个
    #[derive(Clone)]
    struct ScriptedSource {
        script: Arc<Mutex<VecDeque<fetch::Result<String>>>>,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedSource {
        fn new(script: Vec<fetch::Result<String>>) -> Self {
            Self {
                script: Arc::new(Mutex::new(script.into())),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Source for ScriptedSource {
        async fn fetch(&self) -> fetch::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                script.front().cloned().unwrap()
            }
        }
    }

    fn ok(body: &str) -> fetch::Result<String> {
        Ok(body.to_string())
    }

    fn refresh_loop(script: Vec<fetch::Result<String>>) -> (RefreshLoop<ScriptedSource>, CacheRef) {
        let cache = create_cache();
        let source = ScriptedSource::new(script);
        let refresh = RefreshLoop::new(source, KEY, Duration::from_secs(300), cache.clone());
        (refresh, cache)
    }

    #[tokio::test]
    async fn test_tick_success_then_timeout() {
        let (refresh, cache) = refresh_loop(vec![
            ok(r#"{"usd_market_cap":2500000,"other":1}"#),
            Err(FetchError::Timeout),
        ]);

        assert_eq!(refresh.tick().await, "$2.50M");
        assert_eq!(&*cache.get(), "$2.50M");

        assert_eq!(refresh.tick().await, SENTINEL);
        assert_eq!(&*cache.get(), SENTINEL);
    }

    #[tokio::test]
    async fn test_tick_bad_status_overwrites_previous_value() {
        let (refresh, cache) = refresh_loop(vec![
            ok(r#"{"usd_market_cap":19794.950585}"#),
            Err(FetchError::BadStatus(503)),
        ]);

        refresh.tick().await;
        assert_eq!(&*cache.get(), "$19.79K");

        refresh.tick().await;
        assert_eq!(&*cache.get(), SENTINEL);
        assert_eq!(cache.generation(), 2);
    }

    #[tokio::test]
    async fn test_tick_extract_failures_write_sentinel() {
        let (refresh, cache) = refresh_loop(vec![
            ok(r#"{"usd_market_cap":1000}"#),
            ok(r#"{"market_cap":1000}"#),
            ok(r#"{"usd_market_cap":1000}"#),
            ok(r#"{"usd_market_cap":null}"#),
            ok(r#"{"usd_market_cap":1.2.3}"#),
        ]);

        assert_eq!(refresh.tick().await, "$1.00K");
        assert_eq!(refresh.tick().await, SENTINEL);
        assert_eq!(refresh.tick().await, "$1.00K");
        assert_eq!(refresh.tick().await, SENTINEL);
        assert_eq!(&*cache.get(), SENTINEL);
        assert_eq!(refresh.tick().await, SENTINEL);
    }

    #[tokio::test]
    async fn test_derive_reports_stage() {
        let (refresh, _cache) = refresh_loop(vec![ok("<html></html>")]);
        assert_eq!(
            refresh.derive().await,
            Err(RefreshError::Extract(ExtractError::FieldNotFound(
                KEY.to_string()
            )))
        );

        let (refresh, _cache) =
            refresh_loop(vec![Err(FetchError::ConnectionFailure("refused".into()))]);
        assert!(matches!(
            refresh.derive().await,
            Err(RefreshError::Fetch(FetchError::ConnectionFailure(_)))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ticks_immediately_then_every_period() {
        let cache = create_cache();
        let source = ScriptedSource::new(vec![ok(r#"{"usd_market_cap":2500000}"#)]);
        let period = Duration::from_secs(300);
        let refresh = RefreshLoop::new(source.clone(), KEY, period, cache.clone());

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(refresh.run(rx));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(source.calls(), 1);
        assert_eq!(&*cache.get(), "$2.50M");

        tokio::time::sleep(period).await;
        assert_eq!(source.calls(), 2);

        tokio::time::sleep(period * 2).await;
        assert_eq!(source.calls(), 4);

        tx.send(true).unwrap();
        handle.await.unwrap();

        tokio::time::sleep(period * 3).await;
        assert_eq!(source.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_keeps_going_after_failures() {
        let cache = create_cache();
        let source = ScriptedSource::new(vec![
            Err(FetchError::Timeout),
            Err(FetchError::BadStatus(500)),
            ok(r#"{"usd_market_cap":7250000000}"#),
        ]);
        let period = Duration::from_secs(60);
        let refresh = RefreshLoop::new(source.clone(), KEY, period, cache.clone());

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(refresh.run(rx));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(&*cache.get(), SENTINEL);

        tokio::time::sleep(period * 2).await;
        assert_eq!(source.calls(), 3);
        assert_eq!(&*cache.get(), "$7.25B");

        drop(tx);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_survives_huge_period() {
        let cache = create_cache();
        let source = ScriptedSource::new(vec![ok(r#"{"usd_market_cap":2500000}"#)]);
        let refresh = RefreshLoop::new(
            source.clone(),
            KEY,
            Duration::from_secs(u64::MAX),
            cache.clone(),
        );

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(refresh.run(rx));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(source.calls(), 1);
        assert_eq!(&*cache.get(), "$2.50M");

        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[test]
    fn test_next_deadline_saturates() {
        let now = Instant::now();
        assert_eq!(
            next_deadline(now, Duration::from_secs(300)),
            now + Duration::from_secs(300)
        );
        assert!(next_deadline(now, Duration::MAX) > now);
    }

    #[tokio::test]
    async fn test_run_stops_when_already_shut_down() {
        let (refresh, cache) = refresh_loop(vec![ok(r#"{"usd_market_cap":1}"#)]);
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        refresh.run(rx).await;
        assert_eq!(&*cache.get(), SENTINEL);
        assert_eq!(cache.generation(), 0);
    }

    #[test]
    fn test_refresh_error_display() {
        let err = RefreshError::from(FetchError::Timeout);
        assert_eq!(err.to_string(), "抓取失败: 请求超时");

        let err = RefreshError::from(ExtractError::NoNumericValue);
        assert_eq!(err.to_string(), "提取失败: 字段之后没有数值");
    }
}
