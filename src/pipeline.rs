//! Per-document form pipeline: catalog -> labels -> variants -> filled PDFs

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::ai::CompletionClient;
use crate::context::RunContext;
use crate::error::{SynthError, SynthResult};
use crate::generator::SyntheticDataGenerator;
use crate::log_item_failure;
use crate::mapping::FieldMap;
use crate::output::{make_directory, run_stamp};
use crate::pdf::fields::document_stem;
use crate::pdf::{fill_form, overlay_field_names, FieldCatalog};
use crate::persona::{Persona, PersonaStore};
use crate::prompts::format_prompt;
use crate::render::PageNaming;
use crate::validation::{verify_fill, ValidationReport};

/// Files written for one variant of one document
#[derive(Debug, Clone)]
pub struct VariantOutput {
    pub sample_id: String,
    pub json: PathBuf,
    pub pdf: PathBuf,
    pub images: Vec<PathBuf>,
    pub consolidated: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct DocumentOutcome {
    pub document_type: String,
    pub output_dir: PathBuf,
    pub variants: Vec<VariantOutput>,
    pub failed_variants: usize,
    pub validation_report: Option<PathBuf>,
}

struct DocumentDirs {
    root: PathBuf,
    json: PathBuf,
    pdf: PathBuf,
    images: PathBuf,
}

impl DocumentDirs {
    fn create(output_root: &Path, document_type: &str) -> SynthResult<Self> {
        let root = output_root.join(document_type);
        let dirs = Self {
            json: root.join("json_data"),
            pdf: root.join("pdf_data"),
            images: root.join("image_data"),
            root,
        };
        for dir in [&dirs.json, &dirs.pdf, &dirs.images] {
            make_directory(dir)?;
        }
        Ok(dirs)
    }
}

pub struct FormPipeline<'a, C: CompletionClient> {
    context: &'a RunContext,
    generator: SyntheticDataGenerator<'a, C>,
    personas: PersonaStore,
}

impl<'a, C: CompletionClient> FormPipeline<'a, C> {
    pub fn new(context: &'a RunContext, client: &'a C, data_deployment: &str, vision_deployment: &str) -> Self {
        Self {
            context,
            generator: SyntheticDataGenerator::new(
                client,
                data_deployment,
                vision_deployment,
                context.config.generation.clone(),
            ),
            personas: PersonaStore::new(&context.output_root),
        }
    }

    /// Generate every variant for one fillable PDF.
    ///
    /// A failed variant is logged and skipped; the document only fails when
    /// its setup fails or no variant could be produced.
    pub async fn process_document(&self, pdf: &Path) -> SynthResult<DocumentOutcome> {
        let document_type = document_stem(pdf);
        let dirs = DocumentDirs::create(&self.context.output_root, &document_type)?;

        info!("-------------------------------------");
        info!("Processing: {}", document_type);
        info!("PDF Path: {:?}", pdf);
        info!("Output Directory: {:?}", dirs.root);
        info!("-------------------------------------");

        let catalog = FieldCatalog::load_or_extract(pdf)?;
        let labels = self.load_or_generate_labels(pdf, &document_type, &catalog).await?;

        let data_prompt = format_prompt(
            &self.context.prompts.default.data_generation,
            &[
                ("document_type", document_type.as_str()),
                ("field_mappings_json", catalog.to_pretty_json().as_str()),
                ("human_readable_labels", labels.to_pretty_json().as_str()),
            ],
        )?;

        let mut report = (!self.context.disable_validation).then(|| ValidationReport::new(&dirs.root, &document_type));
        let total = self.context.number_of_variants;
        let mut variants = Vec::with_capacity(total);
        let mut first_error = None;

        for index in 1..=total {
            let flag = format!("{} - Sample [ {} / {} ]", document_type, index, total);
            info!("Generating {}!", flag);

            let job = VariantJob {
                source: pdf,
                document_type: &document_type,
                dirs: &dirs,
                catalog: &catalog,
                labels: &labels,
                prompt: &data_prompt,
                index,
                flag: &flag,
            };
            match self.generate_variant(&job, report.as_mut()).await {
                Ok(variant) => {
                    info!("{} has been generated successfully!", flag);
                    variants.push(variant);
                }
                Err(e) if !e.is_recoverable() => return Err(e),
                Err(e) => {
                    log_item_failure!(e, flag);
                    first_error.get_or_insert(e);
                }
            }
        }

        let failed_variants = total - variants.len();
        if variants.is_empty() {
            if let Some(e) = first_error {
                return Err(e);
            }
        }

        let validation_report = match report {
            Some(report) => {
                report.log_summary();
                match report.save() {
                    Ok(path) => Some(path),
                    Err(e) => {
                        warn!("Failed to save validation report: {}", e);
                        None
                    }
                }
            }
            None => None,
        };

        info!("Completed processing {}!", document_type);
        Ok(DocumentOutcome {
            document_type,
            output_dir: dirs.root,
            variants,
            failed_variants,
            validation_report,
        })
    }

    async fn load_or_generate_labels(&self, pdf: &Path, document_type: &str, catalog: &FieldCatalog) -> SynthResult<FieldMap> {
        let labels_path = FieldMap::sidecar_path(pdf);
        if labels_path.exists() {
            info!("Human readable labels already exist!");
            let labels = FieldMap::load(&labels_path)?.align_to(catalog);
            if labels.is_empty() {
                return Err(SynthError::document_format(
                    labels_path.display().to_string(),
                    "no label names a field of this document",
                ));
            }
            return Ok(labels);
        }

        let prompt = &self.context.prompts.default.human_readable_labels;
        if prompt.trim().is_empty() {
            return Err(SynthError::configuration("prompt file has no default.humanReadableLabels prompt"));
        }

        let page_images = self.field_name_images(pdf, document_type);
        let labels = self
            .generator
            .generate_labels(document_type, prompt, catalog, &page_images)
            .await?;
        labels.save(&labels_path)?;
        Ok(labels)
    }

    /// Page images of a copy of the form where every field shows its own name.
    /// Empty when no rasterizer is available or rendering fails.
    fn field_name_images(&self, pdf: &Path, document_type: &str) -> Vec<PathBuf> {
        let root = &self.context.output_root;
        let overlay = root.join(format!("{}_filled_with_field_names.pdf", document_type));
        if let Err(e) = overlay_field_names(pdf, &overlay, self.context.field_font_size) {
            warn!("⚠️  Could not write field-name overlay for {}: {}", document_type, e);
            return Vec::new();
        }

        let Some(rasterizer) = &self.context.capabilities.rasterizer else {
            warn!("No rasterizer: labels for {} will be generated from field names only", document_type);
            return Vec::new();
        };
        let images_dir = root.join(format!("{}_fieldname_images", document_type));
        match rasterizer.rasterize(
            &overlay,
            &images_dir,
            self.context.config.render.field_name_page_dpi,
            PageNaming::Snake,
        ) {
            Ok(images) => images,
            Err(e) => {
                warn!("⚠️  Could not render field-name images for {}: {}", document_type, e);
                Vec::new()
            }
        }
    }

    async fn generate_variant(&self, job: &VariantJob<'_>, report: Option<&mut ValidationReport>) -> SynthResult<VariantOutput> {
        let consistent = self.context.config.generation.persona_consistency;
        let persona = if consistent {
            self.personas.load(job.index)
        } else {
            Persona::default()
        };
        let prompt = match persona.prompt_block() {
            Some(block) => format!("{}{}", job.prompt, block),
            None => job.prompt.to_string(),
        };

        let record = self
            .generator
            .generate_record(job.document_type, &prompt, job.catalog, job.labels, job.flag)
            .await?;
        if consistent {
            self.personas.update(job.index, &record)?;
        }

        let sample_id = format!("Sample{}_{}_{}", job.index, run_stamp(), uuid::Uuid::new_v4());
        let json = job.dirs.json.join(&sample_id).join(format!("{}.json", job.document_type));
        let pdf = job.dirs.pdf.join(&sample_id).join(format!("{}.pdf", job.document_type));

        record.save(&json, job.flag)?;
        fill_form(job.source, &record.values_by_identifier(), &pdf)?;

        if let Some(report) = report {
            report.add_sample(verify_fill(&pdf, &record, &sample_id)?);
        }

        let images = match &self.context.capabilities.rasterizer {
            Some(rasterizer) => {
                let dir = job.dirs.images.join(&sample_id);
                rasterizer
                    .rasterize(&pdf, &dir, self.context.config.render.form_page_dpi, PageNaming::Title)
                    .unwrap_or_else(|e| {
                        warn!("⚠️  Could not render page images for {}: {}", job.flag, e);
                        Vec::new()
                    })
            }
            None => Vec::new(),
        };

        let consolidated = self.copy_to_consolidated(&pdf, job);
        Ok(VariantOutput {
            sample_id,
            json,
            pdf,
            images,
            consolidated,
        })
    }

    fn copy_to_consolidated(&self, pdf: &Path, job: &VariantJob<'_>) -> Option<PathBuf> {
        let dir = self.context.output_root.join("consolidated_pdfs");
        let target = dir.join(format!("{}_Sample{}.pdf", job.document_type, job.index));
        let copied = make_directory(&dir).and_then(|_| {
            std::fs::copy(pdf, &target).map_err(|e| SynthError::write(target.display().to_string(), e))
        });
        match copied {
            Ok(_) => {
                info!("Copied filled PDF to consolidated folder: {:?}", target.file_name().unwrap_or_default());
                Some(target)
            }
            Err(e) => {
                warn!("Failed to copy PDF to consolidated folder: {}", e);
                None
            }
        }
    }
}

struct VariantJob<'j> {
    source: &'j Path,
    document_type: &'j str,
    dirs: &'j DocumentDirs,
    catalog: &'j FieldCatalog,
    labels: &'j FieldMap,
    prompt: &'j str,
    index: usize,
    flag: &'j str,
}
