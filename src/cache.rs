use arc_swap::ArcSwap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// 无数据时的占位值
pub const SENTINEL: &str = "N/A";

/// 展示值缓存
///
/// 只保存一份最新的展示字符串。写入方先构造好完整的新值，再以一次原子
/// 指针替换发布；读取方只增加引用计数，读写双方互不等待。
pub struct DisplayCache {
    current: ArcSwap<String>,
    last_update: AtomicU64,
    generation: AtomicU64,
}

impl DisplayCache {
    /// 创建新的缓存实例，初始值为 [`SENTINEL`]
    #[inline]
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(SENTINEL.to_string()),
            last_update: AtomicU64::new(0),
            generation: AtomicU64::new(0),
        }
    }

    /// 读取当前展示值
    #[inline]
    pub fn get(&self) -> Arc<String> {
        self.current.load_full()
    }

    /// 原子替换展示值，空字符串按 [`SENTINEL`] 处理
    pub fn update(&self, value: &str) {
        let value = if value.is_empty() { SENTINEL } else { value };
        let old = self.current.swap(Arc::new(value.to_string()));
        // 仍被读取方持有的旧值随最后一个引用释放
        drop(old);

        self.last_update.store(now_millis(), Ordering::Release);
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// 最近一次写入的时间（毫秒级 Unix 时间戳），从未写入时为 `None`
    pub fn last_update_millis(&self) -> Option<u64> {
        match self.last_update.load(Ordering::Acquire) {
            0 => None,
            ts => Some(ts),
        }
    }

    /// 距离最近一次写入过去的毫秒数
    pub fn age_millis(&self) -> Option<u64> {
        self.last_update_millis()
            .map(|ts| now_millis().saturating_sub(ts))
    }

    /// 已完成的写入次数
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

impl Default for DisplayCache {
    fn default() -> Self {
        Self::new()
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// 缓存类型别名
pub type CacheRef = Arc<DisplayCache>;

/// 创建缓存实例的便捷函数
#[inline]
pub fn create_cache() -> CacheRef {
    Arc::new(DisplayCache::new())
}
