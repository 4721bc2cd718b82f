use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{DynamicImage, ImageOutputFormat, RgbImage};
use report_renderer::service::{ErrorCategory, RequestStage};
use report_renderer::{
    AssetStore, PageSetup, RenderContext, ReportService, ServiceConfig, StartupError,
};

fn png_base64(width: u32, height: u32) -> String {
    let img = DynamicImage::ImageRgb8(RgbImage::new(width, height));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageOutputFormat::Png).unwrap();
    STANDARD.encode(out.into_inner())
}

fn service(queue_depth: usize) -> ReportService {
    let context = RenderContext::new(AssetStore::standard(), PageSetup::default());
    ReportService::new(context, 2, queue_depth).unwrap()
}

fn report_json() -> String {
    format!(
        r#"{{
            "title": "Jane Doe - Interview Report",
            "sections": [
                {{"heading": "1) Overview", "blocks": [
                    {{"type": "text", "content": "A short summary of the interview."}},
                    {{"type": "image", "asset": "chart-1", "width": 105, "caption": "Scores"}}
                ]}},
                {{"heading": "2) Questions", "blocks": [
                    {{"type": "table", "columns": ["Question", "Answer"],
                      "rows": [["Tell us about yourself", "I build things."]]}}
                ]}}
            ],
            "footer": {{"lines": [{{"text": "Example Corp", "style": "footer-strong"}}],
                       "page_numbers": true}},
            "attachments": {{"chart-1": "{}"}}
        }}"#,
        png_base64(140, 70)
    )
}

#[test]
fn valid_request_yields_a_pdf() {
    let service = service(4);
    let document = service.handle_request(report_json().as_bytes()).unwrap();
    assert!(document.bytes.starts_with(b"%PDF-"));
    assert_eq!(document.page_count, 1);
    assert_eq!(document.filename, "Jane Doe - Interview Report.pdf");
    assert!(document
        .content_disposition()
        .starts_with("attachment; filename=\"Jane Doe - Interview Report.pdf\""));

    let doc = lopdf::Document::load_mem(&document.bytes).unwrap();
    assert_eq!(doc.get_pages().len(), 1);
    assert_eq!(service.in_flight(), 0);
}

#[test]
fn malformed_payload_is_a_client_error() {
    let service = service(4);
    let response = service.handle_request(b"{\"sections\": [").unwrap_err();
    assert_eq!(response.status, 400);
    assert_eq!(response.category, ErrorCategory::Client);
    assert_eq!(response.error, "validation");
    assert_eq!(response.stage, RequestStage::Received);
}

#[test]
fn unresolved_asset_is_reported_as_such() {
    let service = service(4);
    let payload = br#"{"sections": [{"blocks": [
        {"type": "text", "content": "Hello", "font": "missing-font"}
    ]}]}"#;
    let response = service.handle_request(payload).unwrap_err();
    assert_eq!(response.status, 422);
    assert_eq!(response.error, "asset_not_found");
    assert_eq!(response.stage, RequestStage::Validated);
    assert!(response.message.contains("missing-font"));
}

#[test]
fn ragged_table_is_a_layout_error() {
    let service = service(4);
    let payload = br#"{"sections": [{"blocks": [
        {"type": "table", "columns": ["A", "B"], "rows": [["1", "2"], ["3"]]}
    ]}]}"#;
    let response = service.handle_request(payload).unwrap_err();
    assert_eq!(response.status, 422);
    assert_eq!(response.error, "layout");
    assert!(response.is_client_error());
}

#[test]
fn full_queue_rejects_new_work() {
    let service = service(1);
    let first = service.submit(report_json().into_bytes()).unwrap();
    // the first report may already be finished; only a held slot must reject
    match service.submit(report_json().into_bytes()) {
        Ok(second) => {
            assert!(first.wait().is_ok());
            assert!(second.wait().is_ok());
        }
        Err(busy) => {
            assert_eq!(busy.status, 503);
            assert_eq!(busy.error, "busy");
            assert_eq!(busy.category, ErrorCategory::Server);
            assert!(first.wait().is_ok());
        }
    }
    assert_eq!(service.in_flight(), 0);
    assert!(service.handle_request(report_json().as_bytes()).is_ok());
}

#[test]
fn concurrent_requests_are_independent() {
    let service = service(16);
    let pending: Vec<_> = (0..8)
        .map(|i| {
            let payload = format!(
                r#"{{"title": "Report {}", "sections": [{{"blocks": [{{"type": "text", "content": "Body {}"}}]}}]}}"#,
                i, i
            );
            service.submit(payload.into_bytes()).unwrap()
        })
        .collect();
    for (i, report) in pending.into_iter().enumerate() {
        let document = report.wait().unwrap();
        assert_eq!(document.filename, format!("Report {}.pdf", i));
    }
}

#[test]
fn dropped_request_releases_its_slot() {
    let service = service(2);
    let pending = service.submit(report_json().into_bytes()).unwrap();
    drop(pending);
    // whatever stage the worker reached, the slot comes back
    for _ in 0..500 {
        if service.in_flight() == 0 {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
    assert_eq!(service.in_flight(), 0);
}

#[test]
fn service_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let logo = dir.path().join("company-logo.png");
    std::fs::write(&logo, STANDARD.decode(png_base64(40, 20)).unwrap()).unwrap();
    let dump = dir.path().join("dump");
    let config_path = dir.path().join("service.json");
    std::fs::write(
        &config_path,
        format!(
            r#"{{"logo": {:?}, "required_assets": ["logo"], "page_size": "Letter",
                 "workers": 1, "debug_dump_dir": {:?}}}"#,
            logo.to_string_lossy(),
            dump.to_string_lossy()
        ),
    )
    .unwrap();

    let config = ServiceConfig::from_file(&config_path).unwrap();
    let service = ReportService::from_config(&config).unwrap();
    assert!(service.context().assets.contains("logo"));

    let payload = br#"{"watermark": {"asset": "logo"},
        "sections": [{"blocks": [{"type": "image", "asset": "logo"}]}]}"#;
    let document = service.handle_request(payload).unwrap();
    assert_eq!(document.page_count, 1);
    let dumps: Vec<_> = std::fs::read_dir(&dump).unwrap().collect();
    assert_eq!(dumps.len(), 1);
}

#[test]
fn missing_required_asset_fails_startup() {
    let config = ServiceConfig {
        required_assets: vec!["logo".into()],
        ..ServiceConfig::default()
    };
    assert!(matches!(
        ReportService::from_config(&config),
        Err(StartupError::Assets(_))
    ));
}
