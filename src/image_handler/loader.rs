//! # 加载与校验模块
//!
//! ## 设计思路
//!
//! 统一处理不同来源（URL / Base64 / 本地文件）的原始字节加载，并在“尽可能早”的阶段执行输入校验。
//! 目标是尽快失败，减少不必要内存与 CPU 消耗。
//!
//! ## 实现思路
//!
//! - URL：协议校验 + 可选代理改写 + Bearer 凭据 + 内容类型 + 体积校验 + 流式下载。
//! - Base64：格式解析 + 解码前体积预估 + 解码后体积限制。
//! - 文件：存在性 + metadata 体积限制 + 读取。
//! - 网络错误统一映射到 `ImageError`，便于上层决定降级策略（占位图 / 原图）。
//! - 不做自动重试：失败即交给调用方处理，由用户决定是否重新触发。

use std::path::Path;
use std::time::{Duration, Instant};

use super::handler::CachedFetch;
use super::source::RawImageData;
use super::{ImageConfig, ImageError, ImageHandler, data_url};

const STREAM_SIGNATURE_PROBE_BYTES: usize = 4096;
const BUFFER_INITIAL_CAPACITY: usize = 16 * 1024;

impl ImageHandler {
    /// 从 URL 加载图片原始字节。
    pub(super) async fn load_from_url(
        &self,
        url: &str,
        config: &ImageConfig,
    ) -> Result<RawImageData, ImageError> {
        log::info!("🌐 开始下载签名图片 - URL: {}", Self::redact_url_for_log(url));

        Self::validate_url_scheme(url)?;
        let bytes = self.download_with_validation(url, config).await?;
        Self::validate_image_signature(&bytes)?;

        Ok(RawImageData {
            bytes,
            source_hint: "url",
        })
    }

    /// 从 Base64 / Data URL 加载图片原始字节。
    pub(super) fn load_from_base64(
        &self,
        data: &str,
        config: &ImageConfig,
    ) -> Result<RawImageData, ImageError> {
        log::debug!("📝 开始处理 base64 图片");

        let bytes = Self::parse_base64_with_limit(data, config.max_file_size)?;

        if bytes.len() as u64 > config.max_file_size {
            return Err(ImageError::ResourceLimit(format!(
                "Base64 解码后体积过大：{:.2} MB（限制：{:.2} MB）",
                bytes.len() as f64 / 1024.0 / 1024.0,
                config.max_file_size as f64 / 1024.0 / 1024.0
            )));
        }
        Self::validate_image_signature(&bytes)?;

        Ok(RawImageData {
            bytes,
            source_hint: "base64",
        })
    }

    /// 从本地路径加载图片原始字节。
    pub(super) fn load_from_file(
        &self,
        path: &str,
        config: &ImageConfig,
    ) -> Result<RawImageData, ImageError> {
        log::info!("📁 开始读取本地图片 - 路径: {}", path);

        let file_path = Path::new(path);
        if !file_path.exists() {
            return Err(ImageError::FileSystem(format!("文件不存在：{}", path)));
        }

        let metadata = std::fs::metadata(file_path)
            .map_err(|e| ImageError::FileSystem(format!("无法读取文件信息：{}", e)))?;

        if metadata.len() > config.max_file_size {
            return Err(ImageError::ResourceLimit(format!(
                "文件过大：{:.2} MB（限制：{:.2} MB）",
                metadata.len() as f64 / 1024.0 / 1024.0,
                config.max_file_size as f64 / 1024.0 / 1024.0
            )));
        }

        let bytes = std::fs::read(file_path)
            .map_err(|e| ImageError::FileSystem(format!("无法读取图片文件：{}", e)))?;
        Self::validate_image_signature(&bytes)?;

        Ok(RawImageData {
            bytes,
            source_hint: "file",
        })
    }

    /// 执行带校验的网络下载。
    ///
    /// 使用流式读取，避免一次性读入导致内存峰值过高；命中短期缓存时直接返回。
    pub(super) async fn download_with_validation(
        &self,
        url: &str,
        config: &ImageConfig,
    ) -> Result<Vec<u8>, ImageError> {
        let target = reqwest::Url::parse(url)
            .map_err(|e| ImageError::InvalidFormat(format!("URL 格式错误：{}", e)))?;
        let cache_key = target.to_string();

        if let Some(cached) = self.get_cached_fetch(&cache_key, config) {
            log::debug!("♻️ 命中下载缓存 - URL: {}", Self::redact_url_for_log(&cache_key));
            return Ok(cached);
        }

        let request_url = Self::build_request_url(&target, config)?;
        let client = Self::build_http_client(config)?;

        log::debug!("📡 发送 HTTP 请求...");
        let mut request = client.get(request_url.clone()).header(
            reqwest::header::ACCEPT,
            "image/avif,image/webp,image/apng,image/*,*/*;q=0.8",
        );
        if let Some(token) = config.bearer_token.as_deref().filter(|t| !t.is_empty()) {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Self::map_reqwest_error(e, request_url.as_str(), config))?;

        if !response.status().is_success() {
            return Err(ImageError::Network(format!(
                "HTTP {}: {}",
                response.status().as_u16(),
                Self::status_message(response.status().as_u16())
            )));
        }

        if let Some(ct) = response.headers().get(reqwest::header::CONTENT_TYPE) {
            if let Ok(ct_str) = ct.to_str() {
                if !Self::is_image_content_type(ct_str) {
                    return Err(ImageError::InvalidFormat(format!("不是图片类型：{}", ct_str)));
                }
            }
        }

        let total_len = response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|cl| cl.to_str().ok())
            .and_then(|cl| cl.parse::<u64>().ok());

        if let Some(size) = total_len {
            if size > config.max_file_size {
                return Err(ImageError::ResourceLimit(format!(
                    "文件过大：{:.2} MB（限制：{:.2} MB）",
                    size as f64 / 1024.0 / 1024.0,
                    config.max_file_size as f64 / 1024.0 / 1024.0
                )));
            }
        }

        let initial_capacity = total_len
            .map(|len| len.min(config.max_file_size).min(usize::MAX as u64) as usize)
            .filter(|len| *len > 0)
            .unwrap_or(BUFFER_INITIAL_CAPACITY);
        let mut buffer = Vec::with_capacity(initial_capacity);
        let mut response = response;
        let mut total: u64 = 0;
        let mut signature_validated = false;
        let mut received_first_chunk = false;

        loop {
            let read_timeout = if received_first_chunk {
                Duration::from_millis(config.stream_chunk_timeout_ms)
            } else {
                Duration::from_millis(config.stream_first_byte_timeout_ms)
            };

            let next_chunk_result = tokio::time::timeout(read_timeout, response.chunk())
                .await
                .map_err(|_| {
                    if received_first_chunk {
                        ImageError::Timeout("下载数据流读取超时".to_string())
                    } else {
                        ImageError::Timeout("下载首包超时".to_string())
                    }
                })?;

            let Some(chunk) = next_chunk_result
                .map_err(|e| ImageError::Network(format!("下载失败：{}", e)))?
            else {
                break;
            };

            received_first_chunk = true;

            total = total.saturating_add(chunk.len() as u64);
            if total > config.max_file_size {
                return Err(ImageError::ResourceLimit("下载后文件超过大小限制".to_string()));
            }
            buffer.extend_from_slice(&chunk);

            if !signature_validated {
                signature_validated =
                    Self::validate_stream_signature_probe(&buffer, STREAM_SIGNATURE_PROBE_BYTES)?;
            }
        }

        if !signature_validated {
            Self::validate_image_signature(&buffer)?;
        }

        log::debug!("✅ 下载完成 - {} bytes", total);
        self.store_fetch_cache(&cache_key, &buffer, config);

        Ok(buffer)
    }

    /// 配置了代理时，将目标地址改写为 `{proxy}?url=<目标>`。
    fn build_request_url(
        target: &reqwest::Url,
        config: &ImageConfig,
    ) -> Result<reqwest::Url, ImageError> {
        let Some(proxy) = config.image_proxy_url.as_deref().filter(|p| !p.trim().is_empty()) else {
            return Ok(target.clone());
        };

        let mut proxied = reqwest::Url::parse(proxy.trim())
            .map_err(|e| ImageError::InvalidFormat(format!("代理地址格式错误：{}", e)))?;
        proxied.query_pairs_mut().append_pair("url", target.as_str());
        Ok(proxied)
    }

    fn build_http_client(config: &ImageConfig) -> Result<reqwest::Client, ImageError> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(config.download_timeout))
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .build()
            .map_err(|e| ImageError::Network(format!("无法创建 HTTP 客户端：{}", e)))
    }

    /// 仅允许 HTTP/HTTPS。
    fn validate_url_scheme(url: &str) -> Result<(), ImageError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| ImageError::InvalidFormat(format!("URL 格式错误：{}", e)))?;

        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ImageError::InvalidFormat("仅支持 HTTP/HTTPS".to_string()));
        }

        if parsed.host_str().is_none() {
            return Err(ImageError::InvalidFormat("URL 缺少主机地址".to_string()));
        }

        Ok(())
    }

    fn is_image_content_type(content_type: &str) -> bool {
        content_type
            .split(';')
            .next()
            .map(|base| base.trim().to_ascii_lowercase().starts_with("image/"))
            .unwrap_or(false)
    }

    pub(crate) fn redact_url_for_log(url: &str) -> String {
        let Ok(parsed) = reqwest::Url::parse(url) else {
            return "<invalid-url>".to_string();
        };

        let host = parsed.host_str().unwrap_or("<unknown-host>");
        let port = parsed.port().map(|p| format!(":{}", p)).unwrap_or_default();
        let path = parsed.path();

        format!("{}://{}{}{}", parsed.scheme(), host, port, path)
    }

    fn get_cached_fetch(&self, url: &str, config: &ImageConfig) -> Option<Vec<u8>> {
        let mut cache = self.fetch_cache.lock().ok()?;
        let ttl = Duration::from_secs(config.fetch_cache_ttl_secs);

        let expired = cache.peek(url).is_some_and(|item| item.created_at.elapsed() > ttl);
        if expired {
            cache.pop(url);
            return None;
        }

        cache.get(url).map(|item| item.bytes.clone())
    }

    fn store_fetch_cache(&self, url: &str, bytes: &[u8], config: &ImageConfig) {
        if bytes.is_empty() || config.fetch_cache_ttl_secs == 0 {
            return;
        }

        let Ok(mut cache) = self.fetch_cache.lock() else {
            return;
        };

        cache.put(
            url.to_string(),
            CachedFetch {
                created_at: Instant::now(),
                bytes: bytes.to_vec(),
            },
        );
    }

    /// 估算 base64 解码后体积上限，用于在真正解码前拒绝超大输入。
    fn estimate_base64_decoded_upper_bound_len(base64_data: &str) -> Result<u64, ImageError> {
        let len = base64_data.trim().len() as u64;
        let groups = len
            .checked_add(3)
            .ok_or_else(|| ImageError::ResourceLimit("Base64 输入长度溢出".to_string()))?
            / 4;

        groups
            .checked_mul(3)
            .ok_or_else(|| ImageError::ResourceLimit("Base64 解码体积估算溢出".to_string()))
    }

    fn parse_base64_with_limit(data: &str, max_file_size: u64) -> Result<Vec<u8>, ImageError> {
        let normalized = data.trim();

        let payload = if data_url::is_data_url(normalized) {
            let (_, payload_start) = data_url::split_header(normalized)?;
            &normalized[payload_start..]
        } else {
            normalized
        };

        let estimated_len = Self::estimate_base64_decoded_upper_bound_len(payload)?;
        if estimated_len > max_file_size {
            return Err(ImageError::ResourceLimit(format!(
                "Base64 预计解码体积过大：{:.2} MB（限制：{:.2} MB）",
                estimated_len as f64 / 1024.0 / 1024.0,
                max_file_size as f64 / 1024.0 / 1024.0
            )));
        }

        if data_url::is_data_url(normalized) {
            return data_url::parse(normalized).map(|parsed| {
                log::debug!("📝 Data URL 声明类型：{}", parsed.mime.as_deref().unwrap_or("未声明"));
                parsed.bytes
            });
        }

        base64::Engine::decode(&base64::engine::general_purpose::STANDARD, payload)
            .map_err(|e| ImageError::Decode(format!("Base64 解码失败：{}", e)))
    }

    /// 统一映射 reqwest 错误到业务错误。
    fn map_reqwest_error(e: reqwest::Error, url: &str, config: &ImageConfig) -> ImageError {
        let err_msg = e.to_string().replace(url, &Self::redact_url_for_log(url));

        if e.is_timeout() {
            ImageError::Timeout(format!("下载超时（{}秒）", config.download_timeout))
        } else if e.is_connect() {
            ImageError::Network(format!("无法连接：{}", err_msg))
        } else {
            ImageError::Network(format!("请求失败：{}", err_msg))
        }
    }

    /// 常见 HTTP 状态码本地化文案。
    fn status_message(code: u16) -> &'static str {
        match code {
            401 => "未授权",
            404 => "未找到",
            403 => "访问被拒绝",
            500..=599 => "服务器错误",
            _ => "请求失败",
        }
    }

    /// 通过文件签名（magic bytes）校验输入是否为图片。
    pub(crate) fn validate_image_signature(bytes: &[u8]) -> Result<(), ImageError> {
        if bytes.is_empty() {
            return Err(ImageError::InvalidFormat("图片内容为空".to_string()));
        }

        let kind = infer::get(bytes)
            .ok_or_else(|| ImageError::InvalidFormat("无法识别图片类型".to_string()))?;

        if kind.matcher_type() != infer::MatcherType::Image {
            return Err(ImageError::InvalidFormat(format!(
                "文件签名不是图片类型：{}",
                kind.mime_type()
            )));
        }

        Ok(())
    }

    /// 流式下载阶段的签名探测：尽早识别并拒绝非图片内容。
    ///
    /// 返回值：
    /// - `Ok(true)`：已识别为图片，可视为完成签名校验
    /// - `Ok(false)`：当前字节不足以判断，继续下载
    /// - `Err(...)`：已识别为非图片，或达到探测上限仍无法识别
    fn validate_stream_signature_probe(bytes: &[u8], probe_limit: usize) -> Result<bool, ImageError> {
        if bytes.is_empty() {
            return Ok(false);
        }

        if let Some(kind) = infer::get(bytes) {
            if kind.matcher_type() != infer::MatcherType::Image {
                return Err(ImageError::InvalidFormat(format!(
                    "下载内容不是图片类型：{}",
                    kind.mime_type()
                )));
            }
            return Ok(true);
        }

        if bytes.len() >= probe_limit {
            return Err(ImageError::InvalidFormat(format!(
                "下载前 {} 字节内无法识别图片类型",
                probe_limit
            )));
        }

        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    const PNG_SIGNATURE: [u8; 12] = [137, 80, 78, 71, 13, 10, 26, 10, 0, 0, 0, 13];

    /// 单次应答的本地 HTTP 服务，返回收到的请求头文本。
    fn serve_once(status_line: &'static str, content_type: &'static str, body: Vec<u8>) -> (u16, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server failed");
        let port = listener.local_addr().expect("read local addr failed").port();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept failed");

            let mut req_buf = [0u8; 4096];
            let n = stream.read(&mut req_buf).unwrap_or(0);
            let request = String::from_utf8_lossy(&req_buf[..n]).to_string();

            let headers = format!(
                "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status_line,
                content_type,
                body.len()
            );
            stream.write_all(headers.as_bytes()).expect("write headers failed");
            stream.write_all(&body).expect("write body failed");
            stream.flush().expect("flush failed");
            request
        });

        (port, handle)
    }

    #[test]
    fn load_from_base64_rejects_non_image_payload() {
        let handler = ImageHandler::new(ImageConfig::default()).expect("handler init failed");
        let config = ImageConfig::default();

        let result = handler.load_from_base64("SGVsbG8=", &config);

        assert!(matches!(result, Err(ImageError::InvalidFormat(_))));
    }

    #[test]
    fn parse_base64_with_limit_rejects_large_payload_before_decode() {
        let huge = format!("data:image/png;base64,{}", "A".repeat(1024 * 1024));
        let result = ImageHandler::parse_base64_with_limit(&huge, 32);

        assert!(matches!(result, Err(ImageError::ResourceLimit(_))));
    }

    #[test]
    fn content_type_parser_accepts_image_with_params() {
        assert!(ImageHandler::is_image_content_type("image/png; charset=utf-8"));
        assert!(ImageHandler::is_image_content_type("IMAGE/JPEG"));
        assert!(!ImageHandler::is_image_content_type("text/html; charset=utf-8"));
    }

    #[test]
    fn redact_url_for_log_removes_query_and_fragment() {
        let redacted = ImageHandler::redact_url_for_log(
            "https://example.com:8443/ttd/123.png?token=abc123#hash",
        );

        assert_eq!(redacted, "https://example.com:8443/ttd/123.png");
    }

    #[test]
    fn scheme_validation_rejects_non_http() {
        assert!(ImageHandler::validate_url_scheme("ftp://example.com/a.png").is_err());
        assert!(ImageHandler::validate_url_scheme("not a url").is_err());
        assert!(ImageHandler::validate_url_scheme("https://example.com/a.png").is_ok());
    }

    #[test]
    fn proxy_rewrites_target_into_query() {
        let mut config = ImageConfig::default();
        config.image_proxy_url = Some("https://proxy.internal/fetch-image".to_string());
        let target = reqwest::Url::parse("https://files.internal/ttd/1.png").expect("parse failed");

        let rewritten = ImageHandler::build_request_url(&target, &config).expect("rewrite failed");

        assert_eq!(rewritten.host_str(), Some("proxy.internal"));
        let pairs: Vec<(String, String)> = rewritten.query_pairs().into_owned().collect();
        assert_eq!(pairs, vec![("url".to_string(), "https://files.internal/ttd/1.png".to_string())]);
    }

    #[test]
    fn stream_signature_probe_recognizes_png_header() {
        let result = ImageHandler::validate_stream_signature_probe(&PNG_SIGNATURE, 64);

        assert!(matches!(result, Ok(true)));
    }

    #[test]
    fn stream_signature_probe_rejects_non_image_payload() {
        let payload = b"%PDF-1.7 not a signature";
        let result = ImageHandler::validate_stream_signature_probe(payload, 64);

        assert!(matches!(result, Err(ImageError::InvalidFormat(_))));
    }

    #[tokio::test]
    async fn load_from_url_rejects_non_image_body_even_when_content_type_is_image() {
        let (port, server) = serve_once("200 OK", "image/png", b"hello world".to_vec());

        let handler = ImageHandler::new(ImageConfig::default()).expect("handler init failed");
        let config = ImageConfig::default();

        let url = format!("http://127.0.0.1:{}/fake.png", port);
        let result = handler.load_from_url(&url, &config).await;

        server.join().expect("server thread failed");

        assert!(matches!(result, Err(ImageError::InvalidFormat(_))));
    }

    #[tokio::test]
    async fn load_from_url_rejects_html_content_type() {
        let (port, server) = serve_once("200 OK", "text/html", b"<html></html>".to_vec());

        let handler = ImageHandler::new(ImageConfig::default()).expect("handler init failed");
        let config = ImageConfig::default();
        let url = format!("http://127.0.0.1:{}/login", port);

        let result = handler.load_from_url(&url, &config).await;
        server.join().expect("server thread failed");

        assert!(matches!(result, Err(ImageError::InvalidFormat(_))));
    }

    #[tokio::test]
    async fn load_from_url_maps_non_success_status_to_network_error() {
        let (port, server) = serve_once("404 Not Found", "text/plain", b"missing".to_vec());

        let handler = ImageHandler::new(ImageConfig::default()).expect("handler init failed");
        let config = ImageConfig::default();
        let url = format!("http://127.0.0.1:{}/ttd/404.png", port);

        let result = handler.load_from_url(&url, &config).await;
        server.join().expect("server thread failed");

        assert!(matches!(result, Err(ImageError::Network(msg)) if msg.contains("404")));
    }

    #[tokio::test]
    async fn download_sends_bearer_token_and_caches_result() {
        let (port, server) = serve_once("200 OK", "image/png", PNG_SIGNATURE.to_vec());

        let handler = ImageHandler::new(ImageConfig::default()).expect("handler init failed");
        let mut config = ImageConfig::default();
        config.bearer_token = Some("secret-token".to_string());
        let url = format!("http://127.0.0.1:{}/ttd/a.png", port);

        let first = handler
            .download_with_validation(&url, &config)
            .await
            .expect("first download should succeed");
        let request = server.join().expect("server thread failed");

        // 服务端只应答一次，第二次必须命中缓存。
        let second = handler
            .download_with_validation(&url, &config)
            .await
            .expect("cached download should succeed");

        assert!(request.to_ascii_lowercase().contains("authorization: bearer secret-token"));
        assert_eq!(first, second);
    }
}
