//! External tools and text-layer stripping.
//!
//! Removing a text layer while keeping a page's appearance is delegated to
//! Ghostscript (`-dFILTERTEXT`); post-processing hands the PDF to a
//! user-supplied script. Both sit behind [`ExternalTool`], which has exactly
//! two outcomes: the output path, or a [`ToolFailure`] that says whether the
//! tool was missing or ran and failed. The two map to distinct user-facing
//! errors, [`OcrError::DependencyMissing`] and
//! [`OcrError::ExternalProcessFailed`].
//!
//! After a strip the result is always reloaded. A file that will not load is
//! a [`OcrError::ReloadFailed`]; the unstripped original is never handed
//! back in its place.

use crate::config::StripDestination;
use crate::document::Document;
use crate::error::OcrError;
use crate::pipeline::engine::PdfEngine;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Suffix added to the file stem of a stripped copy.
pub const STRIPPED_SUFFIX: &str = "_OCR_Removed";

const GHOSTSCRIPT_HINT: &str =
    "Install Ghostscript: brew install ghostscript (macOS) or apt install ghostscript (Debian/Ubuntu).";

/// Why an external tool produced no output.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolFailure {
    #[error("'{tool}' is not installed. {hint}")]
    Unavailable { tool: String, hint: String },

    #[error("'{tool}' failed: {diagnostic}")]
    Failed { tool: String, diagnostic: String },
}

impl From<ToolFailure> for OcrError {
    fn from(f: ToolFailure) -> Self {
        match f {
            ToolFailure::Unavailable { tool, hint } => OcrError::DependencyMissing { tool, hint },
            ToolFailure::Failed { tool, diagnostic } => {
                OcrError::ExternalProcessFailed { tool, diagnostic }
            }
        }
    }
}

/// A process that turns one file into another.
#[async_trait]
pub trait ExternalTool: Send + Sync {
    fn name(&self) -> &'static str;

    /// Produce `output` from `input`; returns the path actually written.
    async fn run(&self, input: &Path, output: &Path) -> Result<PathBuf, ToolFailure>;
}

/// Find an executable `program`: paths are checked directly, bare names are
/// looked up on `PATH`. Files without execute permission do not count.
pub fn locate_program(program: &Path) -> Option<PathBuf> {
    which::which(program).ok()
}

async fn run_process(
    tool: &str,
    program: &Path,
    args: &[OsString],
    input: &Path,
    output: &Path,
) -> Result<PathBuf, ToolFailure> {
    if output == input {
        return Err(ToolFailure::Failed {
            tool: tool.to_string(),
            diagnostic: format!("output would overwrite the input {}", input.display()),
        });
    }
    // Success is judged by the output appearing, so a leftover from an
    // earlier run must not be there.
    match tokio::fs::remove_file(output).await {
        Ok(()) => debug!("Removed stale {}", output.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(ToolFailure::Failed {
                tool: tool.to_string(),
                diagnostic: format!("could not replace stale {}: {e}", output.display()),
            })
        }
    }

    debug!("Running {} {:?}", program.display(), args);
    let out = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| ToolFailure::Failed {
            tool: tool.to_string(),
            diagnostic: format!("could not start {}: {e}", program.display()),
        })?;

    let stderr = String::from_utf8_lossy(&out.stderr);
    if !out.status.success() {
        let stdout = String::from_utf8_lossy(&out.stdout);
        let diagnostic = [stderr.trim(), stdout.trim()]
            .into_iter()
            .find(|s| !s.is_empty())
            .unwrap_or("no output");
        return Err(ToolFailure::Failed {
            tool: tool.to_string(),
            diagnostic: format!("exit status {}: {}", out.status, diagnostic),
        });
    }
    if !stderr.trim().is_empty() {
        warn!("{} stderr: {}", tool, stderr.trim());
    }
    if !output.exists() {
        return Err(ToolFailure::Failed {
            tool: tool.to_string(),
            diagnostic: format!("exited successfully but wrote no {}", output.display()),
        });
    }
    Ok(output.to_path_buf())
}

// ── Ghostscript ──────────────────────────────────────────────────────────

/// Text-layer removal with `gs -o OUT -sDEVICE=pdfwrite -dFILTERTEXT IN`.
#[derive(Debug, Clone)]
pub struct GhostscriptTool {
    candidates: Vec<PathBuf>,
}

impl Default for GhostscriptTool {
    fn default() -> Self {
        Self {
            candidates: vec![
                PathBuf::from("/opt/homebrew/bin/gs"),
                PathBuf::from("/usr/local/bin/gs"),
                PathBuf::from("gs"),
            ],
        }
    }
}

impl GhostscriptTool {
    /// Use exactly this executable.
    pub fn at(program: impl Into<PathBuf>) -> Self {
        Self {
            candidates: vec![program.into()],
        }
    }

    pub fn locate(&self) -> Option<PathBuf> {
        self.candidates.iter().find_map(|c| locate_program(c))
    }

    pub fn command_args(input: &Path, output: &Path) -> Vec<OsString> {
        vec![
            "-o".into(),
            output.as_os_str().to_owned(),
            "-sDEVICE=pdfwrite".into(),
            "-dFILTERTEXT".into(),
            input.as_os_str().to_owned(),
        ]
    }
}

#[async_trait]
impl ExternalTool for GhostscriptTool {
    fn name(&self) -> &'static str {
        "ghostscript"
    }

    async fn run(&self, input: &Path, output: &Path) -> Result<PathBuf, ToolFailure> {
        let program = self.locate().ok_or_else(|| ToolFailure::Unavailable {
            tool: "gs".into(),
            hint: GHOSTSCRIPT_HINT.into(),
        })?;
        run_process(
            "gs",
            &program,
            &Self::command_args(input, output),
            input,
            output,
        )
        .await
    }
}

// ── Post-process script ──────────────────────────────────────────────────

/// Runs `INTERPRETER SCRIPT <input> <output>`, or `SCRIPT <input> <output>`
/// when no interpreter is set.
#[derive(Debug, Clone)]
pub struct ScriptTool {
    interpreter: Option<PathBuf>,
    script: PathBuf,
}

impl ScriptTool {
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: None,
            script: script.into(),
        }
    }

    /// `python3 SCRIPT …`
    pub fn python(script: impl Into<PathBuf>) -> Self {
        Self::new(script).with_interpreter("python3")
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<PathBuf>) -> Self {
        self.interpreter = Some(interpreter.into());
        self
    }
}

#[async_trait]
impl ExternalTool for ScriptTool {
    fn name(&self) -> &'static str {
        "post-process script"
    }

    async fn run(&self, input: &Path, output: &Path) -> Result<PathBuf, ToolFailure> {
        let script_name = self.script.display().to_string();
        if !self.script.is_file() {
            return Err(ToolFailure::Unavailable {
                tool: script_name,
                hint: "Check the --post-process path.".into(),
            });
        }

        let mut args: Vec<OsString> = Vec::new();
        let program = match &self.interpreter {
            Some(interp) => {
                let found = locate_program(interp).ok_or_else(|| ToolFailure::Unavailable {
                    tool: interp.display().to_string(),
                    hint: "Install it or put it on PATH.".into(),
                })?;
                args.push(self.script.as_os_str().to_owned());
                found
            }
            None => {
                // A bare file name would otherwise be searched on PATH.
                let local = if self.script.components().count() == 1 {
                    Path::new(".").join(&self.script)
                } else {
                    self.script.clone()
                };
                locate_program(&local).ok_or_else(|| ToolFailure::Unavailable {
                    tool: script_name.clone(),
                    hint: "Make the script executable (chmod +x) or pass --interpreter.".into(),
                })?
            }
        };
        args.push(input.as_os_str().to_owned());
        args.push(output.as_os_str().to_owned());

        run_process(&script_name, &program, &args, input, output).await
    }
}

// ── Stripper ─────────────────────────────────────────────────────────────

/// A freshly stripped and reloaded document.
#[derive(Debug)]
pub struct StrippedDocument {
    pub document: Document,
    /// The document the text layer was removed from.
    pub original: PathBuf,
    /// Keeps a temporary output directory alive.
    pub workspace: Option<TempDir>,
}

impl StrippedDocument {
    pub fn path(&self) -> &Path {
        self.document.source()
    }
}

/// `<dir>/<stem>_OCR_Removed.pdf` for a given source.
pub fn stripped_path(source: &Path, dir: Option<&Path>) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".into());
    let name = format!("{stem}{STRIPPED_SUFFIX}.pdf");
    match dir {
        Some(d) => d.join(name),
        None => source.with_file_name(name),
    }
}

/// Removes the text layer via an [`ExternalTool`] and reloads the result.
pub struct TextLayerStripper {
    tool: Arc<dyn ExternalTool>,
    engine: Arc<dyn PdfEngine>,
    destination: StripDestination,
}

impl TextLayerStripper {
    pub fn new(
        tool: Arc<dyn ExternalTool>,
        engine: Arc<dyn PdfEngine>,
        destination: StripDestination,
    ) -> Self {
        Self {
            tool,
            engine,
            destination,
        }
    }

    pub async fn strip(&self, document: &Document) -> Result<StrippedDocument, OcrError> {
        let source = document.source();
        if !document.is_pdf() {
            return Err(OcrError::StripUnsupported {
                path: source.to_path_buf(),
            });
        }

        let (output, workspace) = match self.destination {
            StripDestination::Alongside => (stripped_path(source, None), None),
            StripDestination::TempDir => {
                let dir = TempDir::new()
                    .map_err(|e| OcrError::Internal(format!("temp dir: {e}")))?;
                (stripped_path(source, Some(dir.path())), Some(dir))
            }
        };

        info!(
            "Stripping text layer: {} → {}",
            source.display(),
            output.display()
        );
        let written = self.tool.run(source, &output).await?;

        let engine = Arc::clone(&self.engine);
        let reload_path = written.clone();
        let reloaded = tokio::task::spawn_blocking(move || engine.load(&reload_path, None))
            .await
            .map_err(|e| OcrError::ReloadFailed {
                path: written.clone(),
                detail: format!("reload task panicked: {e}"),
            })?
            .map_err(|e| OcrError::ReloadFailed {
                path: written.clone(),
                detail: e.to_string(),
            })?;

        info!(
            "Stripped copy loaded: {} pages from {}",
            reloaded.page_count(),
            written.display()
        );
        Ok(StrippedDocument {
            document: reloaded,
            original: source.to_path_buf(),
            workspace,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ghostscript_args_are_exact() {
        let args = GhostscriptTool::command_args(Path::new("in.pdf"), Path::new("out.pdf"));
        let args: Vec<_> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec!["-o", "out.pdf", "-sDEVICE=pdfwrite", "-dFILTERTEXT", "in.pdf"]
        );
    }

    #[test]
    fn stripped_path_uses_suffix() {
        assert_eq!(
            stripped_path(Path::new("/docs/scan.pdf"), None),
            PathBuf::from("/docs/scan_OCR_Removed.pdf")
        );
        assert_eq!(
            stripped_path(Path::new("/docs/scan.pdf"), Some(Path::new("/tmp/x"))),
            PathBuf::from("/tmp/x/scan_OCR_Removed.pdf")
        );
    }

    #[test]
    fn tool_failures_map_to_taxonomy() {
        let missing: OcrError = ToolFailure::Unavailable {
            tool: "gs".into(),
            hint: GHOSTSCRIPT_HINT.into(),
        }
        .into();
        assert!(matches!(missing, OcrError::DependencyMissing { .. }));
        assert!(missing.to_string().contains("brew install ghostscript"));

        let failed: OcrError = ToolFailure::Failed {
            tool: "gs".into(),
            diagnostic: "exit status 1".into(),
        }
        .into();
        assert!(matches!(failed, OcrError::ExternalProcessFailed { .. }));
    }

    #[tokio::test]
    async fn missing_ghostscript_is_unavailable() {
        let gs = GhostscriptTool::at("/nonexistent/bin/gs");
        let err = gs
            .run(Path::new("in.pdf"), Path::new("out.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolFailure::Unavailable { ref tool, .. } if tool == "gs"));
    }

    #[tokio::test]
    async fn missing_script_is_unavailable() {
        let tool = ScriptTool::python("/nonexistent/ocr.py");
        let err = tool
            .run(Path::new("in.pdf"), Path::new("out.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolFailure::Unavailable { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_script_reports_its_stderr() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fail.sh");
        std::fs::write(&script, "#!/bin/sh\necho 'boom' >&2\nexit 3\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let err = ScriptTool::new(&script)
            .run(Path::new("in.pdf"), &dir.path().join("out.pdf"))
            .await
            .unwrap_err();
        match err {
            ToolFailure::Failed { diagnostic, .. } => assert!(diagnostic.contains("boom")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn script_receives_input_and_output() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("copy.sh");
        std::fs::write(&script, "#!/bin/sh\ncp \"$1\" \"$2\"\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        let input = dir.path().join("in.pdf");
        std::fs::write(&input, b"%PDF-1.4").unwrap();
        let output = dir.path().join("out.pdf");

        let written = ScriptTool::new(&script).run(&input, &output).await.unwrap();
        assert_eq!(written, output);
        assert_eq!(std::fs::read(&output).unwrap(), b"%PDF-1.4");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_executable_ghostscript_is_unavailable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let gs = dir.path().join("gs");
        std::fs::write(&gs, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&gs, std::fs::Permissions::from_mode(0o644)).unwrap();

        let tool = GhostscriptTool::at(&gs);
        assert_eq!(tool.locate(), None);
        let err = tool
            .run(&dir.path().join("in.pdf"), &dir.path().join("out.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolFailure::Unavailable { ref tool, .. } if tool == "gs"));
        let mapped: OcrError = err.into();
        assert!(matches!(mapped, OcrError::DependencyMissing { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_executable_script_without_interpreter_is_unavailable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("post.sh");
        std::fs::write(&script, "#!/bin/sh\ncp \"$1\" \"$2\"\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o644)).unwrap();

        let err = ScriptTool::new(&script)
            .run(&dir.path().join("in.pdf"), &dir.path().join("out.pdf"))
            .await
            .unwrap_err();
        match err {
            ToolFailure::Unavailable { hint, .. } => assert!(hint.contains("chmod +x")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stale_output_is_not_mistaken_for_success() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("noop.sh");
        std::fs::write(&script, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        let input = dir.path().join("scan.pdf");
        std::fs::write(&input, b"%PDF-1.4").unwrap();
        let output = stripped_path(&input, None);
        std::fs::write(&output, b"%PDF-1.7 STALE").unwrap();

        let err = ScriptTool::new(&script).run(&input, &output).await.unwrap_err();
        match err {
            ToolFailure::Failed { diagnostic, .. } => {
                assert!(diagnostic.contains("wrote no"), "{diagnostic}")
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn output_equal_to_input_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("scan.pdf");
        std::fs::write(&input, b"%PDF-1.4").unwrap();

        let err = run_process("gs", Path::new("gs"), &[], &input, &input)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolFailure::Failed { .. }));
        assert_eq!(std::fs::read(&input).unwrap(), b"%PDF-1.4");
    }

    #[tokio::test]
    async fn stripping_an_image_is_rejected() {
        use crate::document::{Page, SourceKind};
        use crate::pipeline::engine::PdfiumEngine;

        let document = Document {
            source: "photo.png".into(),
            kind: SourceKind::Image,
            pages: vec![Page {
                index: 0,
                width: 100.0,
                height: 100.0,
                embedded_text: None,
            }],
        };
        let stripper = TextLayerStripper::new(
            Arc::new(GhostscriptTool::default()),
            Arc::new(PdfiumEngine::default()),
            StripDestination::TempDir,
        );
        let err = stripper.strip(&document).await.unwrap_err();
        assert!(
            matches!(err, OcrError::StripUnsupported { ref path } if path == Path::new("photo.png"))
        );
    }
}
