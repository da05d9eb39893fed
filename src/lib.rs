// Public module exports for the formsynth binary and integration tests
pub mod error;
pub mod config;
pub mod logging;
pub mod output;
pub mod prompts;
pub mod ai;
pub mod pdf;
pub mod mapping;
pub mod record;
pub mod persona;
pub mod render;
pub mod avm;
pub mod batch;
pub mod generator;
pub mod validation;
pub mod context;
pub mod pipeline;
pub mod cli;

pub use error::{GenerationFailure, SynthError, SynthResult};
