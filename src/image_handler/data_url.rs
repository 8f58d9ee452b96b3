//! # Data URL 编解码
//!
//! 处理 `data:<mime>[;参数];base64,<负载>` 形式的字符串。
//! 非 base64 编码的 Data URL 不在签名链路中出现，直接拒绝。

use base64::{Engine as _, engine::general_purpose};
use once_cell::sync::Lazy;
use regex::Regex;

use super::ImageError;

static DATA_URL_HEADER: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"(?i)^data:(?P<mime>[a-z0-9.+-]+/[a-z0-9.+-]+)?(?P<params>(?:;[^;,]*)*),").ok()
});

/// 解析后的 Data URL。
pub(crate) struct ParsedDataUrl {
    pub(crate) mime: Option<String>,
    pub(crate) bytes: Vec<u8>,
}

/// 是否为 Data URL（只看前缀，不做完整校验）。
pub fn is_data_url(input: &str) -> bool {
    input.trim_start().get(..5).is_some_and(|p| p.eq_ignore_ascii_case("data:"))
}

/// 解析 Data URL 并解码 base64 负载。
pub(crate) fn parse(input: &str) -> Result<ParsedDataUrl, ImageError> {
    let input = input.trim();
    let (mime, payload_start) = split_header(input)?;
    let payload = &input[payload_start..];

    let bytes = general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| ImageError::Decode(format!("Base64 解码失败：{}", e)))?;

    Ok(ParsedDataUrl { mime, bytes })
}

/// 只解析头部，返回 MIME 与负载起始偏移，供体积预估使用。
pub(crate) fn split_header(input: &str) -> Result<(Option<String>, usize), ImageError> {
    let regex = DATA_URL_HEADER
        .as_ref()
        .ok_or_else(|| ImageError::InvalidFormat("Data URL 解析器初始化失败".to_string()))?;

    let caps = regex
        .captures(input)
        .ok_or_else(|| ImageError::InvalidFormat("不是合法的 Data URL".to_string()))?;

    let params = caps.name("params").map(|m| m.as_str()).unwrap_or_default();
    let is_base64 = params
        .split(';')
        .any(|p| p.trim().eq_ignore_ascii_case("base64"));
    if !is_base64 {
        return Err(ImageError::InvalidFormat("缺少 base64 标记".to_string()));
    }

    let mime = caps.name("mime").map(|m| m.as_str().to_ascii_lowercase());
    let header_len = caps.get(0).map(|m| m.end()).unwrap_or_default();
    Ok((mime, header_len))
}

/// 将 PNG 字节编码为 Data URL。
pub fn encode_png(bytes: &[u8]) -> String {
    encode("image/png", bytes)
}

pub fn encode(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, general_purpose::STANDARD.encode(bytes))
}
