mod common;

use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::path::Path;
use tempfile::tempdir;

use common::ScriptedClient;
use formsynth::avm::AvmReportGenerator;
use formsynth::config::SynthConfig;
use formsynth::config::RenderConfig;
use formsynth::render::{RenderCapabilities, ReportRenderer};
use formsynth::GenerationFailure;

fn payload(address: &str) -> Value {
    json!({
        "report_info": {
            "report_id": "AVM-7781",
            "report_date": "2024-05-10",
            "effective_date": "2024-05-09",
            "prepared_by": "Sam Ortiz",
            "client_name": "Lakeside Credit Union",
            "appraiser_license": "CA-AR-041122"
        },
        "property": {
            "address": address,
            "city": "Fresno",
            "state": "CA",
            "zip_code": "93704",
            "apn": "417-221-09",
            "property_type": "Single Family",
            "year_built": 1987,
            "square_feet": 1860,
            "lot_size": 7405,
            "bedrooms": 3,
            "bathrooms": 2,
            "garage": "2-car",
            "pool": "Yes",
            "condition": "Average",
            "occupancy": "Owner"
        },
        "valuation": {
            "estimated_value": 412000,
            "value_range_low": 395000,
            "value_range_high": 429000,
            "confidence_score": 84,
            "price_per_sqft": 221.51,
            "methodology": "Sales comparison approach",
            "data_sources": "MLS, county assessor"
        },
        "comparables": [
            {
                "comp_number": 1,
                "address": "1410 W Shields Ave",
                "sale_date": "2024-03-02",
                "sale_price": 405000,
                "square_feet": 1820,
                "bedrooms": 3,
                "bathrooms": 2,
                "distance": "0.3 mi",
                "adjusted_price": 409500
            }
        ],
        "market_analysis": {
            "median_price_per_sqft": 218,
            "days_on_market_avg": 27,
            "price_trend_6m": "-0.8%",
            "inventory_level": "Moderate",
            "market_conditions": "Stable",
            "absorption_rate": "2.7 months"
        },
        "neighborhood_info": {
            "school_district": "Fresno Unified",
            "school_rating": 6,
            "crime_rate": "Moderate",
            "walkability_score": 48
        },
        "risk_factors": ["Flat roof section"],
        "disclaimers": ["Automated estimate only"],
        "hoa_details": {"monthly_dues": 45}
    })
}

fn generator(client: &ScriptedClient) -> AvmReportGenerator<'_, ScriptedClient> {
    generator_with(client, ReportRenderer::HtmlOnly)
}

fn generator_with(client: &ScriptedClient, renderer: ReportRenderer) -> AvmReportGenerator<'_, ScriptedClient> {
    AvmReportGenerator::new(
        client,
        "gpt-4o-mini",
        "Write an AVM report.",
        &SynthConfig::default().generation,
        renderer,
        150,
    )
}

/// Renderer backed by stand-in converter and rasterizer scripts
#[cfg(unix)]
fn stub_renderer(tools: &Path, converter_body: &str) -> ReportRenderer {
    let config = RenderConfig {
        html_to_pdf_tool: common::stub_tool(
            tools,
            "wkhtmltopdf",
            &format!("case \"$1\" in --version) exit 0;; esac\n{}", converter_body),
        ),
        rasterizer_tool: common::stub_tool(
            tools,
            "pdftoppm",
            "case \"$1\" in -v) exit 0;; esac\necho png > \"$last-1.png\"",
        ),
        ..SynthConfig::default().render
    };
    RenderCapabilities::detect(&config).report_renderer()
}

fn file_names(dir: &Path) -> BTreeSet<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

#[tokio::test]
async fn html_only_reports_contain_exactly_json_and_html() {
    let temp_dir = tempdir().unwrap();
    let client = ScriptedClient::new()
        .reply(payload("1 First St").to_string())
        .reply(payload("2 Second St").to_string())
        .reply(payload("3 Third St").to_string());

    let (summary, reports) = generator(&client).generate_batch(3, temp_dir.path()).await.unwrap();

    assert!(summary.all_succeeded());
    assert_eq!(reports.len(), 3);
    assert_eq!(file_names(temp_dir.path()).len(), 3);

    for report in &reports {
        assert!(report.id.starts_with("AVM_"));
        let expected: BTreeSet<String> = [format!("{}.json", report.id), format!("{}.html", report.id)]
            .into_iter()
            .collect();
        assert_eq!(file_names(&report.dir), expected);
        assert!(report.pdf.is_none());
        assert!(report.images.is_empty());
    }
}

#[tokio::test]
async fn every_top_level_key_survives_json_and_html() {
    let temp_dir = tempdir().unwrap();
    let client = ScriptedClient::new().reply(format!("```json\n{}\n```", payload("77 Elm Ct")));

    let report = generator(&client).generate_report(temp_dir.path()).await.unwrap();

    let saved: Value = serde_json::from_str(&std::fs::read_to_string(&report.json).unwrap()).unwrap();
    let original = payload("77 Elm Ct");
    let saved_keys: Vec<&String> = saved.as_object().unwrap().keys().collect();
    let original_keys: Vec<&String> = original.as_object().unwrap().keys().collect();
    assert_eq!(saved_keys, original_keys);

    let html = std::fs::read_to_string(&report.html).unwrap();
    for key in original.as_object().unwrap().keys() {
        assert!(html.contains(&format!("data-section=\"{}\"", key)), "{} missing from HTML", key);
    }
    assert!(html.contains("77 Elm Ct"));
    assert!(html.contains("$412,000"));
    assert!(html.contains("trend-negative"));
}

#[tokio::test]
async fn prompt_carries_a_variability_seed() {
    let temp_dir = tempdir().unwrap();
    let client = ScriptedClient::new().reply(payload("5 Oak Ln").to_string());

    generator(&client).generate_report(temp_dir.path()).await.unwrap();

    let requests = client.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].user_text().starts_with("Write an AVM report."));
    assert!(requests[0].user_text().contains("### VARIABILITY\nRandomization seed: "));
    assert!(requests[0].system.contains("real estate appraiser"));
    assert!((requests[0].temperature - 0.9).abs() < f32::EPSILON);
}

#[tokio::test]
async fn failed_reports_are_skipped_without_leaving_directories() {
    let temp_dir = tempdir().unwrap();
    let mut incomplete = payload("9 Pine Rd");
    incomplete.as_object_mut().unwrap().remove("valuation");

    let client = ScriptedClient::new()
        .reply(payload("8 Birch Way").to_string())
        .fail(GenerationFailure::Status)
        .reply(incomplete.to_string())
        .reply("this is not json");

    let (summary, reports) = generator(&client).generate_batch(4, temp_dir.path()).await.unwrap();

    assert_eq!(summary.total, 4);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed(), 3);
    assert_eq!(reports.len(), 1);
    assert_eq!(file_names(temp_dir.path()).len(), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn rendered_reports_contain_json_html_pdf_and_page_image() {
    let temp_dir = tempdir().unwrap();
    let out = temp_dir.path().join("reports");
    let renderer = stub_renderer(&temp_dir.path().join("tools"), "echo '%PDF-1.4' > \"$last\"");
    assert_eq!(renderer.name(), "html+pdf+images");

    let client = ScriptedClient::new()
        .reply(payload("10 Cedar Dr").to_string())
        .reply(payload("11 Cedar Dr").to_string())
        .reply(payload("12 Cedar Dr").to_string());

    let (summary, reports) = generator_with(&client, renderer).generate_batch(3, &out).await.unwrap();

    assert!(summary.all_succeeded());
    assert_eq!(file_names(&out).len(), 3);
    for report in &reports {
        let expected: BTreeSet<String> = [
            format!("{}.json", report.id),
            format!("{}.html", report.id),
            format!("{}.pdf", report.id),
            "images".to_string(),
        ]
        .into_iter()
        .collect();
        assert_eq!(file_names(&report.dir), expected);
        assert_eq!(file_names(&report.dir.join("images")), BTreeSet::from(["Page1.png".to_string()]));
        assert_eq!(report.pdf.as_deref(), Some(report.dir.join(format!("{}.pdf", report.id)).as_path()));
        assert_eq!(report.images, vec![report.dir.join("images").join("Page1.png")]);
    }
}

#[cfg(unix)]
#[tokio::test]
async fn converter_failure_keeps_json_and_html() {
    let temp_dir = tempdir().unwrap();
    let out = temp_dir.path().join("reports");
    let renderer = stub_renderer(&temp_dir.path().join("tools"), "exit 1");
    let client = ScriptedClient::new().reply(payload("13 Cedar Dr").to_string());

    let report = generator_with(&client, renderer).generate_report(&out).await.unwrap();

    let expected: BTreeSet<String> = [format!("{}.json", report.id), format!("{}.html", report.id)]
        .into_iter()
        .collect();
    assert_eq!(file_names(&report.dir), expected);
    assert!(report.pdf.is_none());
    assert!(report.images.is_empty());
}
