//! Synthetic property valuation (AVM) reports

pub mod model;
pub mod template;

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::ai::parse::parse_object;
use crate::ai::{variability_seed, CompletionClient, CompletionRequest};
use crate::batch::{run_batch, BatchSummary};
use crate::config::GenerationConfig;
use crate::error::SynthResult;
use crate::output::{make_directory, ArtifactSet};
use crate::render::ReportRenderer;

pub use model::AvmReport;
pub use template::render_report;

const APPRAISER_SYSTEM_PROMPT: &str = "You are a professional real estate appraiser generating comprehensive AVM reports with realistic, mathematically consistent data.";

/// Paths of everything written for one report
#[derive(Debug, Clone)]
pub struct GeneratedReport {
    pub id: String,
    pub dir: PathBuf,
    pub json: PathBuf,
    pub html: PathBuf,
    pub pdf: Option<PathBuf>,
    pub images: Vec<PathBuf>,
}

pub struct AvmReportGenerator<'a, C: CompletionClient> {
    client: &'a C,
    deployment: String,
    prompt: String,
    temperature: f32,
    max_tokens: u32,
    renderer: ReportRenderer,
    page_dpi: u32,
}

impl<'a, C: CompletionClient> AvmReportGenerator<'a, C> {
    pub fn new(
        client: &'a C,
        deployment: impl Into<String>,
        prompt: impl Into<String>,
        generation: &GenerationConfig,
        renderer: ReportRenderer,
        page_dpi: u32,
    ) -> Self {
        info!("🏠 AVM report generator ready (renderer: {})", renderer.name());
        Self {
            client,
            deployment: deployment.into(),
            prompt: prompt.into(),
            temperature: generation.avm_temperature,
            max_tokens: generation.avm_max_tokens,
            renderer,
            page_dpi,
        }
    }

    /// Ask the completion service for one report payload and validate it
    pub async fn generate_data(&self) -> SynthResult<AvmReport> {
        let seed = variability_seed();
        info!("Generating AVM data with seed: {}", seed);

        let request = CompletionRequest::text(
            self.deployment.as_str(),
            APPRAISER_SYSTEM_PROMPT,
            format!("{}\n\n### VARIABILITY\nRandomization seed: {}", self.prompt, seed),
        )
        .with_sampling(self.temperature, self.max_tokens);

        let completion = self.client.complete(&request).await?;
        AvmReport::from_json(parse_object(&completion.content)?)
    }

    /// Generate, validate and write one report under `output_dir/<report id>/`
    pub async fn generate_report(&self, output_dir: &Path) -> SynthResult<GeneratedReport> {
        let report = self.generate_data().await?;

        let artifacts = ArtifactSet::create(output_dir, "AVM")?;
        info!("Generating AVM report: {} ({})", artifacts.id, report.address());

        let json = artifacts.write_json(&report.raw)?;
        let html = artifacts.write_html(&render_report(&report)?)?;

        let rendered = match self
            .renderer
            .render(&html, &artifacts.path("pdf"), &artifacts.images_dir(), self.page_dpi)
        {
            Ok(rendered) => rendered,
            Err(e) => {
                warn!("⚠️  Rendering failed for {}, keeping JSON and HTML: {}", artifacts.id, e);
                Default::default()
            }
        };

        info!("✅ AVM report generated successfully: {}", artifacts.id);
        Ok(GeneratedReport {
            id: artifacts.id,
            dir: artifacts.dir,
            json,
            html,
            pdf: rendered.pdf,
            images: rendered.images,
        })
    }

    /// Generate `count` reports, continuing past failed ones
    pub async fn generate_batch(&self, count: usize, output_dir: &Path) -> SynthResult<(BatchSummary, Vec<GeneratedReport>)> {
        make_directory(output_dir)?;
        info!("Starting batch generation of {} AVM reports", count);

        let numbers: Vec<usize> = (1..=count).collect();
        let (summary, generated) = run_batch(
            &numbers,
            |n| format!("report {}/{}", n, count),
            move |_, _| self.generate_report(output_dir),
        )
        .await?;

        info!("Batch generation completed. Generated {}/{} reports", summary.succeeded, count);
        Ok((summary, generated))
    }
}
