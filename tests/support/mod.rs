//! 集成测试共用工具：本地一次性 HTTP 服务与测试图片。

#![allow(dead_code)]

use std::io::{Cursor, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

use base64::{Engine as _, engine::general_purpose};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

/// 预先排好的一条应答。
pub struct Reply {
    pub status_line: &'static str,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn json(body: &str) -> Self {
        Self { status_line: "200 OK", content_type: "application/json", body: body.as_bytes().to_vec() }
    }

    pub fn status(status_line: &'static str) -> Self {
        Self { status_line, content_type: "application/json", body: b"{}".to_vec() }
    }

    pub fn png(bytes: Vec<u8>) -> Self {
        Self { status_line: "200 OK", content_type: "image/png", body: bytes }
    }
}

/// 按顺序应答 `replies`，每个连接一条；返回端口与收到的请求文本。
pub fn serve(replies: Vec<Reply>) -> (u16, thread::JoinHandle<Vec<String>>) {
    let (port, raw) = serve_raw(replies);
    let handle = thread::spawn(move || {
        raw.join()
            .expect("server thread failed")
            .iter()
            .map(|request| String::from_utf8_lossy(request).to_string())
            .collect()
    });
    (port, handle)
}

/// 同 [`serve`]，但保留请求的原始字节（用于检查上传的 PNG）。
pub fn serve_raw(replies: Vec<Reply>) -> (u16, thread::JoinHandle<Vec<Vec<u8>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server failed");
    let port = listener.local_addr().expect("read local addr failed").port();

    let handle = thread::spawn(move || {
        let mut requests = Vec::new();
        for reply in replies {
            let (mut stream, _) = listener.accept().expect("accept failed");
            requests.push(read_request(&mut stream));

            let headers = format!(
                "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                reply.status_line,
                reply.content_type,
                reply.body.len()
            );
            stream.write_all(headers.as_bytes()).expect("write headers failed");
            stream.write_all(&reply.body).expect("write body failed");
            stream.flush().expect("flush failed");
        }
        requests
    });

    (port, handle)
}

fn read_request(stream: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf).to_string();
        let Some(header_end) = text.find("\r\n\r\n") else {
            continue;
        };
        let headers = text[..header_end].to_ascii_lowercase();
        if headers.contains("transfer-encoding: chunked") {
            if text.ends_with("0\r\n\r\n") {
                break;
            }
            continue;
        }
        let content_length = headers
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if buf.len() >= header_end + 4 + content_length {
            break;
        }
    }
    buf
}

/// 解码 PNG Data URL 为 RGBA 画布。
pub fn decode_data_url(data_url: &str) -> RgbaImage {
    let (_, payload) = data_url.split_once(',').expect("data url must carry a payload");
    let bytes = general_purpose::STANDARD.decode(payload).expect("payload must be base64");
    image::load_from_memory_with_format(&bytes, ImageFormat::Png)
        .expect("output must be png")
        .to_rgba8()
}

/// 从 multipart 请求体中取出第一个 PNG 文件。
pub fn extract_png(request: &[u8]) -> RgbaImage {
    const MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";
    let start = request
        .windows(MAGIC.len())
        .position(|window| window == MAGIC)
        .expect("request must contain a png");
    let iend = request[start..]
        .windows(4)
        .position(|window| window == b"IEND")
        .expect("png must be complete");
    // IEND 类型码后还有 4 字节 CRC
    let end = start + iend + 8;

    image::load_from_memory_with_format(&request[start..end], ImageFormat::Png)
        .expect("uploaded file must be png")
        .to_rgba8()
}

pub fn encode_png(canvas: &RgbaImage) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(canvas.clone())
        .write_to(&mut cursor, ImageFormat::Png)
        .expect("encode test image failed");
    cursor.into_inner()
}

pub fn png_data_url(canvas: &RgbaImage) -> String {
    ttd_signature::image_handler::data_url::encode_png(&encode_png(canvas))
}

/// 白纸上一笔蓝色墨迹。
pub fn signature_scan(width: u32, height: u32) -> RgbaImage {
    let mut canvas = RgbaImage::from_pixel(width, height, Rgba([248, 248, 246, 255]));
    for x in width / 4..width * 3 / 4 {
        let y = height / 2 + (x % 5);
        canvas.put_pixel(x, y.min(height - 1), Rgba([25, 45, 140, 255]));
    }
    canvas
}
