//! 签名流水线端到端场景：通过公开 API 驱动裁剪与透明化。

mod support;

use image::{Rgba, RgbaImage};
use support::{Reply, decode_data_url, encode_png, png_data_url, serve, signature_scan};
use ttd_signature::image_handler::{
    CropSpec, ImageConfig, ImageHandler, ImagePerformanceProfile, ImageSource, SignatureService,
    TransparencySettings, fallback_placeholder,
};

const ALL_PROFILES: [ImagePerformanceProfile; 3] = [
    ImagePerformanceProfile::Quality,
    ImagePerformanceProfile::Balanced,
    ImagePerformanceProfile::Speed,
];

fn handler() -> ImageHandler {
    ImageHandler::new(ImageConfig::default()).expect("handler init failed")
}

#[tokio::test]
async fn mid_gray_square_is_fully_transparent_and_keeps_size() {
    let input = png_data_url(&RgbaImage::from_pixel(100, 100, Rgba([150, 150, 150, 255])));

    let output = handler().make_transparent(&input, &TransparencySettings::default()).await;
    let pixels = decode_data_url(&output);

    assert_eq!(pixels.dimensions(), (100, 100));
    assert!(pixels.pixels().all(|p| p[3] == 0));
}

#[tokio::test]
async fn single_ink_pixel_yields_padded_21px_square() {
    let mut canvas = RgbaImage::from_pixel(50, 50, Rgba([255, 255, 255, 255]));
    canvas.put_pixel(25, 25, Rgba([0, 0, 0, 255]));
    let settings = TransparencySettings { black_threshold: 0, ..TransparencySettings::default() };

    let output = handler().make_transparent(&png_data_url(&canvas), &settings).await;
    let pixels = decode_data_url(&output);

    assert_eq!(pixels.dimensions(), (21, 21));
    assert_eq!(pixels.get_pixel(10, 10), &Rgba([0, 0, 0, 255]));
}

#[tokio::test]
async fn wide_blank_scan_keeps_full_size_in_every_profile() {
    let input = png_data_url(&RgbaImage::from_pixel(3600, 200, Rgba([255, 255, 255, 255])));

    for profile in ALL_PROFILES {
        let handler = handler();
        handler.set_performance_profile(profile).expect("set profile failed");

        let output = handler.make_transparent(&input, &TransparencySettings::default()).await;
        let pixels = decode_data_url(&output);

        assert_eq!(pixels.dimensions(), (3600, 200), "profile {:?}", profile);
    }
}

#[tokio::test]
async fn wide_scan_autocrop_is_in_source_pixels_in_every_profile() {
    let mut canvas = RgbaImage::from_pixel(3600, 200, Rgba([255, 255, 255, 255]));
    for x in 1000..=2000 {
        for y in 99..=101 {
            canvas.put_pixel(x, y, Rgba([20, 40, 160, 255]));
        }
    }
    let source = ImageSource::Base64(png_data_url(&canvas));

    let mut outputs = Vec::new();
    for profile in ALL_PROFILES {
        let handler = handler();
        handler.set_performance_profile(profile).expect("set profile failed");

        let image = handler
            .make_transparent_image(&source, &TransparencySettings::default())
            .await
            .expect("transparency should succeed");
        let pixels = image.decode_rgba().expect("decode failed");

        // 墨迹 x: 1000..=2000, y: 99..=101，外扩 10
        assert_eq!(pixels.dimensions(), (1021, 23), "profile {:?}", profile);
        outputs.push(pixels.into_raw());
    }

    assert!(outputs.windows(2).all(|pair| pair[0] == pair[1]));
}

#[tokio::test]
async fn full_crop_without_rotation_is_pixel_identical() {
    let scan = signature_scan(64, 32);
    let source = ImageSource::Base64(png_data_url(&scan));

    let output = handler().apply_crop(&source, &CropSpec::full(64, 32)).await;
    let cropped = decode_data_url(&output);

    assert_eq!(cropped.as_raw(), scan.as_raw());
}

#[tokio::test]
async fn crop_of_local_file_matches_requested_size() {
    let dir = std::env::temp_dir().join(format!(
        "ttd-pipeline-{}",
        chrono::Local::now().timestamp_nanos_opt().unwrap_or_default()
    ));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    let path = dir.join("scan.png");
    std::fs::write(&path, encode_png(&signature_scan(120, 60))).expect("write scan");

    let crop = CropSpec { x: 5.0, y: -10.0, width: 90, height: 70, rotation_degrees: -15.0, zoom_factor: 2.0 };
    let image = handler()
        .crop_image(&ImageSource::FilePath(path.to_string_lossy().to_string()), &crop)
        .await
        .expect("crop should succeed");

    assert_eq!((image.width(), image.height()), (90, 70));
    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn zero_sized_crop_degrades_to_empty_string() {
    let source = ImageSource::Base64(png_data_url(&signature_scan(20, 20)));
    let crop = CropSpec { width: 0, ..CropSpec::full(20, 20) };

    assert!(handler().apply_crop(&source, &crop).await.is_empty());
}

#[tokio::test]
async fn remote_404_degrades_to_placeholder() {
    let (port, server) = serve(vec![Reply::status("404 Not Found")]);
    let url = format!("http://127.0.0.1:{}/ttd/missing.png", port);

    let output = handler().make_transparent(&url, &TransparencySettings::default()).await;
    server.join().expect("server thread failed");

    assert_eq!(output, fallback_placeholder());
}

#[tokio::test]
async fn remote_signature_is_fetched_through_proxy_with_token() {
    let (port, server) = serve(vec![Reply::png(encode_png(&signature_scan(80, 40)))]);
    let mut config = ImageConfig::default();
    config.image_proxy_url = Some(format!("http://127.0.0.1:{}/proxy/image", port));
    config.bearer_token = Some("tok".to_string());
    let handler = ImageHandler::new(config).expect("handler init failed");

    let output = handler
        .make_transparent("https://files.example/ttd/12345.png", &TransparencySettings::default())
        .await;
    let requests = server.join().expect("server thread failed");

    assert!(decode_data_url(&output).width() < 80);
    assert!(requests[0].starts_with("GET /proxy/image?url=https%3A%2F%2Ffiles.example%2Fttd%2F12345.png "));
    assert!(requests[0].to_ascii_lowercase().contains("authorization: bearer tok"));
}

#[tokio::test]
async fn undecodable_data_url_is_returned_unchanged() {
    let broken = "data:image/png;base64,iVBORw0KGgoAAAAN";

    let output = handler().make_transparent(broken, &TransparencySettings::default()).await;

    assert_eq!(output, broken);
}

#[tokio::test]
async fn service_process_crops_then_trims_to_ink() {
    let service = SignatureService::new().expect("service init failed");
    let source = ImageSource::Base64(png_data_url(&signature_scan(200, 100)));

    let processed = service
        .process("req", &source, &CropSpec::full(200, 100), TransparencySettings::default())
        .await
        .expect("process should succeed");

    // 墨迹 x: 50..150, y: 50..=54，外扩 10
    assert_eq!((processed.width(), processed.height()), (120, 25));
}
