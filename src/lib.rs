//! 市值占位符服务库
//!
//! 后台任务定时抓取远端接口中的市值字段，格式化后写入无阻塞缓存，
//! 供任意多的调用方随时读取。

pub mod cache;
pub mod config;
pub mod extract;
pub mod fetch;
pub mod format;
pub mod refresh;
pub mod server;

// 重新导出主要的公共类型
pub use cache::{CacheRef, DisplayCache, SENTINEL, create_cache};
pub use config::Config;
pub use extract::{ExtractError, extract};
pub use fetch::{FetchError, HttpSource, Source};
pub use format::format_display;
pub use refresh::{RefreshError, RefreshLoop};
pub use server::PlaceholderServer;
