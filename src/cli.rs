use std::path::Path;
use tracing::{info, warn};

use crate::ai::CompletionClient;
use crate::avm::AvmReportGenerator;
use crate::batch::{discover_pdfs, run_batch, BatchSummary};
use crate::config::AiCredentials;
use crate::context::RunContext;
use crate::error::{SynthError, SynthResult};
use crate::pipeline::{DocumentOutcome, FormPipeline};

/// Generate variants for a single fillable PDF
pub async fn single_command<C: CompletionClient>(
    context: &RunContext,
    client: &C,
    credentials: &AiCredentials,
    input_pdf: &Path,
) -> SynthResult<DocumentOutcome> {
    info!("📄 Single document mode: {:?}", input_pdf);
    if !input_pdf.is_file() {
        return Err(SynthError::configuration(format!(
            "Input PDF does not exist: {}",
            input_pdf.display()
        )));
    }

    let pipeline = FormPipeline::new(
        context,
        client,
        &credentials.data_deployment,
        &credentials.vision_deployment,
    );
    let outcome = pipeline.process_document(input_pdf).await?;

    println!("🎉 Generation Complete!");
    println!("   Document: {}", outcome.document_type);
    println!("   Variants generated: {}", outcome.variants.len());
    println!("   Variants failed: {}", outcome.failed_variants);
    println!("   Output directory: {:?}", outcome.output_dir);
    if let Some(report) = &outcome.validation_report {
        println!("   Validation report: {:?}", report);
    }
    Ok(outcome)
}

/// Generate variants for every PDF in a directory, continuing past failed documents
pub async fn batch_command<C: CompletionClient>(
    context: &RunContext,
    client: &C,
    credentials: &AiCredentials,
    batch_directory: &Path,
) -> SynthResult<BatchSummary> {
    info!("📁 Batch mode: {:?}", batch_directory);
    let pdfs = discover_pdfs(batch_directory)?;
    if pdfs.is_empty() {
        warn!("No PDF files found in {:?}", batch_directory);
        return Ok(BatchSummary::default());
    }

    let pipeline = FormPipeline::new(
        context,
        client,
        &credentials.data_deployment,
        &credentials.vision_deployment,
    );
    let pipeline = &pipeline;
    let (summary, _) = run_batch(
        &pdfs,
        |pdf| pdf.file_name().unwrap_or_default().to_string_lossy().into_owned(),
        move |_, pdf| pipeline.process_document(pdf),
    )
    .await?;

    summary.log("BATCH PROCESSING");
    print_summary("Batch Processing", &summary);
    Ok(summary)
}

/// Generate `num_reports` AVM reports under the output directory
pub async fn avm_command<C: CompletionClient>(
    context: &RunContext,
    client: &C,
    credentials: &AiCredentials,
    num_reports: usize,
) -> SynthResult<BatchSummary> {
    if num_reports == 0 {
        return Err(SynthError::configuration("--num_reports must be at least 1"));
    }
    info!("🏠 AVM mode: {} reports", num_reports);

    let generator = AvmReportGenerator::new(
        client,
        credentials.data_deployment.as_str(),
        context.prompts.avm_prompt()?,
        &context.config.generation,
        context.capabilities.report_renderer(),
        context.config.render.report_page_dpi,
    );
    let (summary, reports) = generator.generate_batch(num_reports, &context.output_root).await?;

    summary.log("AVM REPORT GENERATION");
    print_summary("AVM Report Generation", &summary);
    for report in &reports {
        println!("   ✓ {} -> {:?}", report.id, report.dir);
    }
    Ok(summary)
}

fn print_summary(title: &str, summary: &BatchSummary) {
    println!("\n{}", "=".repeat(50));
    println!("🎉 {} Complete!", title);
    println!("   Successfully processed: {}", summary.succeeded);
    println!("   Failed: {}", summary.failed());
    println!("   Total: {}", summary.total);
    for failure in &summary.failures {
        println!("   ✗ {}: {}", failure.item, failure.error);
    }
    println!("{}", "=".repeat(50));
}
