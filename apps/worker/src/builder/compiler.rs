use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use super::CompileError;

/// Side files a LaTeX run leaves next to the PDF.
const AUX_EXTENSIONS: &[&str] = &["aux", "log", "out"];
/// Lines of compiler output kept in the error for diagnosis.
const LOG_TAIL_LINES: usize = 20;

/// Runs an external LaTeX toolchain (`pdflatex` by default).
#[derive(Debug, Clone)]
pub struct LatexCompiler {
    latex_bin: String,
    timeout: Duration,
}

impl LatexCompiler {
    pub fn new(latex_bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            latex_bin: latex_bin.into(),
            timeout,
        }
    }

    /// Compiles `source_path` into a PDF placed next to it.
    pub async fn compile(&self, source_path: &Path) -> Result<PathBuf, CompileError> {
        let output_dir = source_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut command = Command::new(&self.latex_bin);
        command
            .arg("-interaction=nonstopmode")
            .arg("-halt-on-error")
            .arg(format!("-output-directory={}", output_dir.display()))
            .arg(source_path)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        debug!("Running {} on {}", self.latex_bin, source_path.display());

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Err(_) => return Err(CompileError::Timeout(self.timeout)),
            Ok(Err(e)) if e.kind() == ErrorKind::NotFound => {
                return Err(CompileError::ToolchainMissing(self.latex_bin.clone()))
            }
            Ok(result) => result?,
        };

        remove_side_files(source_path).await;

        if !output.status.success() {
            return Err(CompileError::Failed {
                code: output.status.code(),
                log_tail: tail(&String::from_utf8_lossy(&output.stdout), LOG_TAIL_LINES),
            });
        }

        let pdf_path = source_path.with_extension("pdf");
        if !tokio::fs::try_exists(&pdf_path).await.unwrap_or(false) {
            return Err(CompileError::MissingOutput(pdf_path));
        }
        Ok(pdf_path)
    }
}

async fn remove_side_files(source_path: &Path) {
    for ext in AUX_EXTENSIONS {
        let path = source_path.with_extension(ext);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove {}: {e}", path.display()),
        }
    }
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}
