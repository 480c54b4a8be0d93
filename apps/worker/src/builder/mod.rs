// Document Builder: resume payload -> LaTeX source -> compiled PDF.
// Stateless from the worker's point of view; all job bookkeeping lives in the processor.

pub mod compiler;
pub mod escape;
pub mod resume;
pub mod template;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use compiler::LatexCompiler;
pub use resume::ResumeDocument;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("resume payload must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("resume payload does not fit the template: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("{0} must not be empty")]
    Empty(&'static str),
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("LaTeX toolchain '{0}' is not installed")]
    ToolchainMissing(String),

    #[error("LaTeX exited with status {code:?}:\n{log_tail}")]
    Failed {
        code: Option<i32>,
        log_tail: String,
    },

    #[error("LaTeX did not finish within {0:?}")]
    Timeout(Duration),

    #[error("LaTeX reported success but produced no PDF at {0}")]
    MissingOutput(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The two operations the job processor needs from a document backend.
#[async_trait]
pub trait DocumentBuilder: Send + Sync {
    /// Deterministic payload -> document source.
    fn render(&self, payload: &Value) -> Result<String, RenderError>;

    /// Compiles a source file written by the caller; returns the artifact path.
    async fn compile(&self, source_path: &Path) -> Result<PathBuf, CompileError>;
}

/// LaTeX backend: built-in resume layout compiled with an external toolchain.
pub struct LatexBuilder {
    compiler: LatexCompiler,
}

impl LatexBuilder {
    pub fn new(compiler: LatexCompiler) -> Self {
        Self { compiler }
    }
}

#[async_trait]
impl DocumentBuilder for LatexBuilder {
    fn render(&self, payload: &Value) -> Result<String, RenderError> {
        let document = ResumeDocument::from_payload(payload)?;
        Ok(template::render_latex(&document))
    }

    async fn compile(&self, source_path: &Path) -> Result<PathBuf, CompileError> {
        self.compiler.compile(source_path).await
    }
}
