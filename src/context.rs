use std::path::{Path, PathBuf};

use crate::config::SynthConfig;
use crate::prompts::PromptLibrary;
use crate::render::RenderCapabilities;

/// Everything a run needs, built once in `main` and lent to each component
#[derive(Debug, Clone)]
pub struct RunContext {
    pub config: SynthConfig,
    pub prompts: PromptLibrary,
    pub output_root: PathBuf,
    pub capabilities: RenderCapabilities,
    pub number_of_variants: usize,
    pub disable_validation: bool,
    pub field_font_size: u32,
}

impl RunContext {
    /// Probes the render tools named in `config`
    pub fn new(config: SynthConfig, prompts: PromptLibrary, output_root: &Path) -> Self {
        let capabilities = RenderCapabilities::detect(&config.render);
        Self::with_capabilities(config, prompts, output_root, capabilities)
    }

    pub fn with_capabilities(
        config: SynthConfig,
        prompts: PromptLibrary,
        output_root: &Path,
        capabilities: RenderCapabilities,
    ) -> Self {
        Self {
            config,
            prompts,
            output_root: output_root.to_path_buf(),
            capabilities,
            number_of_variants: 5,
            disable_validation: false,
            field_font_size: 8,
        }
    }

    pub fn with_variants(mut self, number_of_variants: usize) -> Self {
        self.number_of_variants = number_of_variants;
        self
    }

    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.disable_validation = !enabled;
        self
    }

    pub fn with_field_font_size(mut self, size: u32) -> Self {
        self.field_font_size = size;
        self
    }
}
