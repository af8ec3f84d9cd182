use crate::cache::CacheRef;
use anyhow::Result;
use hyper::header::{CACHE_CONTROL, CONTENT_TYPE, HeaderValue};
use hyper::http::StatusCode;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server};
use log::{error, info, warn};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

/// 占位符路由前缀
const PLACEHOLDER_PREFIX: &str = "/placeholder/";

/// 占位符服务器
///
/// 以 `GET /placeholder/<名称>` 暴露缓存中的展示值，供模板系统按名称查询。
pub struct PlaceholderServer {
    cache: CacheRef,
    placeholder: Arc<str>,
}

impl PlaceholderServer {
    /// 创建新的占位符服务器实例
    #[inline]
    pub fn new(cache: CacheRef, placeholder: &str) -> Self {
        Self {
            cache,
            placeholder: Arc::from(placeholder),
        }
    }

    /// 运行服务器，`shutdown` 完成后停止接受新连接
    pub async fn run(self, addr: SocketAddr, shutdown: impl Future<Output = ()>) -> Result<()> {
        let cache = self.cache;
        let placeholder = self.placeholder;

        let make_svc = make_service_fn(move |_conn| {
            let cache = cache.clone();
            let placeholder = placeholder.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    Self::handle_request(req, cache.clone(), placeholder.clone())
                }))
            }
        });

        let server = Server::try_bind(&addr)
            .map_err(|e| anyhow::anyhow!("无法绑定 {addr}: {e}"))?
            .http1_keepalive(true)
            .tcp_nodelay(true)
            .serve(make_svc);

        info!("服务器运行在: http://{}", server.local_addr());

        server
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| {
                error!("服务器错误: {e}");
                anyhow::anyhow!("服务器运行错误: {e}")
            })?;

        info!("服务器正常关闭");
        Ok(())
    }

    /// 处理 HTTP 请求
    async fn handle_request(
        req: Request<Body>,
        cache: CacheRef,
        placeholder: Arc<str>,
    ) -> std::result::Result<Response<Body>, Infallible> {
        if req.method() != &Method::GET {
            return Ok(Self::serve_404());
        }

        let path = req.uri().path();
        if path == "/health" {
            return Ok(Self::serve_health(&cache));
        }

        match path.strip_prefix(PLACEHOLDER_PREFIX) {
            Some(rest) if Self::matches_placeholder(rest, &placeholder) => {
                Ok(Self::serve_value(&cache))
            }
            _ => Ok(Self::serve_404()),
        }
    }

    /// `<名称>` 或 `<名称>/<参数>` 均可，参数被忽略
    #[inline]
    fn matches_placeholder(rest: &str, placeholder: &str) -> bool {
        match rest.split_once('/') {
            Some((name, _params)) => name == placeholder,
            None => rest == placeholder,
        }
    }

    /// 返回当前展示值
    #[inline]
    fn serve_value(cache: &CacheRef) -> Response<Body> {
        let value = cache.get();
        Self::text(StatusCode::OK, Body::from(value.to_string()))
    }

    /// 提供健康检查端点，附带距上次刷新的毫秒数
    fn serve_health(cache: &CacheRef) -> Response<Body> {
        let mut response = Self::text(StatusCode::OK, Body::from("OK"));
        if let Some(age) = cache.age_millis() {
            response
                .headers_mut()
                .insert("x-refresh-age-ms", HeaderValue::from(age));
        }
        response
    }

    /// 提供 404 页面
    #[inline]
    fn serve_404() -> Response<Body> {
        warn!("请求了不存在的页面");
        Self::text(StatusCode::NOT_FOUND, Body::from("页面未找到"))
    }

    fn text(status: StatusCode, body: Body) -> Response<Body> {
        let mut response = Response::new(body);
        *response.status_mut() = status;
        let headers = response.headers_mut();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        response
    }
}
