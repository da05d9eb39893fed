use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

use crate::config::{RenderConfig, RenderMode};
use crate::error::{SynthError, SynthResult};
use crate::logging::PerformanceTimer;
use crate::output::make_directory;

fn tool_responds(tool: &str, version_flag: &str) -> bool {
    // pdftoppm prints its version to stderr and some builds exit non-zero, so
    // being able to start the binary is enough
    match Command::new(tool).arg(version_flag).output() {
        Ok(_) => true,
        Err(e) => {
            debug!("{} not usable: {}", tool, e);
            false
        }
    }
}

/// HTML to PDF through `wkhtmltopdf`
#[derive(Debug, Clone)]
pub struct HtmlToPdf {
    tool: String,
}

impl HtmlToPdf {
    pub fn probe(tool: &str) -> Option<Self> {
        tool_responds(tool, "--version").then(|| Self { tool: tool.to_string() })
    }

    pub fn convert(&self, html: &Path, pdf: &Path) -> SynthResult<PathBuf> {
        let _timer = PerformanceTimer::start(format!("{} {:?}", self.tool, html.file_name().unwrap_or_default()));
        let output = Command::new(&self.tool)
            .args(["--quiet", "--page-size", "Letter"])
            .args(["--margin-top", "0.75in", "--margin-right", "0.75in"])
            .args(["--margin-bottom", "0.75in", "--margin-left", "0.75in"])
            .args(["--encoding", "UTF-8", "--no-outline", "--enable-local-file-access"])
            .arg(html)
            .arg(pdf)
            .output()
            .map_err(|e| SynthError::renderer_unavailable(&self.tool, e.to_string()))?;

        if !output.status.success() || !pdf.exists() {
            return Err(SynthError::write(
                pdf.display().to_string(),
                std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("{} failed: {}", self.tool, String::from_utf8_lossy(&output.stderr).trim()),
                ),
            ));
        }
        info!("📄 PDF generated using {}: {:?}", self.tool, pdf);
        Ok(pdf.to_path_buf())
    }
}

/// How rasterized pages are named
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageNaming {
    /// `Page1.png`, `Page2.png`, ...
    Title,
    /// `page_1.png`, `page_2.png`, ...
    Snake,
}

impl PageNaming {
    fn file_name(&self, page: usize) -> String {
        match self {
            PageNaming::Title => format!("Page{}.png", page),
            PageNaming::Snake => format!("page_{}.png", page),
        }
    }
}

const RASTER_PREFIX: &str = "raster";

/// PDF pages to PNG through `pdftoppm`
#[derive(Debug, Clone)]
pub struct Rasterizer {
    tool: String,
}

impl Rasterizer {
    pub fn probe(tool: &str) -> Option<Self> {
        tool_responds(tool, "-v").then(|| Self { tool: tool.to_string() })
    }

    /// Render every page of `pdf` into `out_dir`, returning the images in page order
    pub fn rasterize(&self, pdf: &Path, out_dir: &Path, dpi: u32, naming: PageNaming) -> SynthResult<Vec<PathBuf>> {
        let _timer = PerformanceTimer::start(format!("rasterize {:?}", pdf.file_name().unwrap_or_default()));
        make_directory(out_dir)?;

        let output = Command::new(&self.tool)
            .arg("-png")
            .arg("-r")
            .arg(dpi.to_string())
            .arg(pdf)
            .arg(out_dir.join(RASTER_PREFIX))
            .output()
            .map_err(|e| SynthError::renderer_unavailable(&self.tool, e.to_string()))?;

        if !output.status.success() {
            return Err(SynthError::write(
                out_dir.display().to_string(),
                std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("{} failed: {}", self.tool, String::from_utf8_lossy(&output.stderr).trim()),
                ),
            ));
        }

        // pdftoppm writes raster-1.png or raster-01.png depending on page count
        let mut pages: Vec<(usize, PathBuf)> = fs::read_dir(out_dir)
            .map_err(|e| SynthError::file_io(out_dir.display().to_string(), e))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter_map(|path| {
                let stem = path.file_stem()?.to_str()?;
                let number = stem.strip_prefix(RASTER_PREFIX)?.strip_prefix('-')?.parse().ok()?;
                (path.extension()? == "png").then_some((number, path))
            })
            .collect();
        pages.sort_by_key(|(number, _)| *number);

        let mut images = Vec::with_capacity(pages.len());
        for (number, path) in pages {
            let target = out_dir.join(naming.file_name(number));
            fs::rename(&path, &target).map_err(|e| SynthError::write(target.display().to_string(), e))?;
            images.push(target);
        }

        info!("🖼️  PDF was converted to {} images in {:?}", images.len(), out_dir);
        Ok(images)
    }
}

/// External tools found on this host, detected once per run
#[derive(Debug, Clone, Default)]
pub struct RenderCapabilities {
    pub html_to_pdf: Option<HtmlToPdf>,
    pub rasterizer: Option<Rasterizer>,
}

impl RenderCapabilities {
    pub fn detect(config: &RenderConfig) -> Self {
        let (want_pdf, want_images) = match config.mode {
            RenderMode::Html => (false, false),
            RenderMode::Pdf => (true, false),
            RenderMode::Images | RenderMode::Auto => (true, true),
        };

        let html_to_pdf = if want_pdf { HtmlToPdf::probe(&config.html_to_pdf_tool) } else { None };
        let rasterizer = if want_images { Rasterizer::probe(&config.rasterizer_tool) } else { None };

        if want_pdf && html_to_pdf.is_none() {
            warn!(
                "⚠️  {} not found: reports will be written as JSON and HTML only",
                config.html_to_pdf_tool
            );
        }
        if want_images && rasterizer.is_none() {
            warn!("⚠️  {} not found: no page images will be written", config.rasterizer_tool);
        }

        Self { html_to_pdf, rasterizer }
    }

    pub fn report_renderer(&self) -> ReportRenderer {
        match (&self.html_to_pdf, &self.rasterizer) {
            (Some(pdf), Some(raster)) => ReportRenderer::HtmlPdfImages {
                pdf: pdf.clone(),
                raster: raster.clone(),
            },
            (Some(pdf), None) => ReportRenderer::HtmlPdf { pdf: pdf.clone() },
            (None, _) => ReportRenderer::HtmlOnly,
        }
    }
}

/// Formats a report is written in beyond JSON and HTML
#[derive(Debug, Clone, Default)]
pub enum ReportRenderer {
    #[default]
    HtmlOnly,
    HtmlPdf {
        pdf: HtmlToPdf,
    },
    HtmlPdfImages {
        pdf: HtmlToPdf,
        raster: Rasterizer,
    },
}

/// Extra files produced from a report's HTML
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedArtifacts {
    pub pdf: Option<PathBuf>,
    pub images: Vec<PathBuf>,
}

impl ReportRenderer {
    pub fn name(&self) -> &'static str {
        match self {
            ReportRenderer::HtmlOnly => "html",
            ReportRenderer::HtmlPdf { .. } => "html+pdf",
            ReportRenderer::HtmlPdfImages { .. } => "html+pdf+images",
        }
    }

    /// Render the PDF (and page images) next to an already written HTML file
    pub fn render(&self, html: &Path, pdf: &Path, images_dir: &Path, dpi: u32) -> SynthResult<RenderedArtifacts> {
        match self {
            ReportRenderer::HtmlOnly => Ok(RenderedArtifacts::default()),
            ReportRenderer::HtmlPdf { pdf: converter } => Ok(RenderedArtifacts {
                pdf: Some(converter.convert(html, pdf)?),
                images: Vec::new(),
            }),
            ReportRenderer::HtmlPdfImages { pdf: converter, raster } => {
                let pdf = converter.convert(html, pdf)?;
                let images = raster.rasterize(&pdf, images_dir, dpi, PageNaming::Title)?;
                Ok(RenderedArtifacts { pdf: Some(pdf), images })
            }
        }
    }
}
