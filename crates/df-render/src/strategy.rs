use std::ffi::OsStr;
use std::fs;
use std::path::Path;
use std::time::Duration;

use df_parser::{Attribute, GraphDocument};
use tracing::debug;

use crate::RenderError;
use crate::config::{PresentationDefaults, RenderConfig};
use crate::locate::{DiscoveryScope, ExecutableLocator, LocatedExecutable, ProbeEnvironment};
use crate::process::run_with_input;

/// One way of turning a document into PNG bytes.
pub trait RenderStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn render(&self, document: &GraphDocument) -> Result<Vec<u8>, RenderError>;
}

/// Pipes the document, with presentation defaults spliced into the text,
/// through `<exe> -Tpng`.
#[derive(Debug, Clone)]
pub struct ProcessStrategy {
    executable: Option<LocatedExecutable>,
    presentation: PresentationDefaults,
    timeout: Duration,
}

impl ProcessStrategy {
    #[must_use]
    pub fn new(config: &RenderConfig, environment: &ProbeEnvironment) -> Self {
        let executable = ExecutableLocator::new(config, environment).locate();
        Self::with_executable(executable, config)
    }

    #[must_use]
    pub fn with_executable(executable: Option<LocatedExecutable>, config: &RenderConfig) -> Self {
        Self {
            executable,
            presentation: config.presentation.clone(),
            timeout: config.timeout(),
        }
    }

    #[must_use]
    pub fn executable(&self) -> Option<&LocatedExecutable> {
        self.executable.as_ref()
    }
}

impl RenderStrategy for ProcessStrategy {
    fn name(&self) -> &'static str {
        "process"
    }

    fn render(&self, document: &GraphDocument) -> Result<Vec<u8>, RenderError> {
        let executable = self
            .executable
            .as_ref()
            .ok_or(RenderError::ExecutableNotFound)?;
        let text = inject_presentation(document, &self.presentation);
        debug!(
            executable = %executable.path.display(),
            bytes = text.len(),
            "rendering through piped process"
        );
        let output = run_with_input(
            &executable.path,
            &["-Tpng"],
            Some(text.as_bytes()),
            self.timeout,
        )?;
        if !output.status.success() {
            return Err(RenderError::ExitStatus {
                code: output.status.code(),
                stderr: output.stderr_text(),
            });
        }
        Ok(output.stdout)
    }
}

/// Applies presentation defaults through the syntax tree, prints the result
/// to a temporary file and renders it with `<exe> -Tpng -o <out> <in>`.
#[derive(Debug, Clone)]
pub struct LibraryStrategy {
    executable: Option<LocatedExecutable>,
    presentation: PresentationDefaults,
    timeout: Duration,
}

impl LibraryStrategy {
    /// Discovery is limited to the configured path, the override variable
    /// and `PATH`.
    #[must_use]
    pub fn new(config: &RenderConfig, environment: &ProbeEnvironment) -> Self {
        let executable = ExecutableLocator::new(config, environment)
            .with_scope(DiscoveryScope::Narrow)
            .locate();
        Self::with_executable(executable, config)
    }

    #[must_use]
    pub fn with_executable(executable: Option<LocatedExecutable>, config: &RenderConfig) -> Self {
        Self {
            executable,
            presentation: config.presentation.clone(),
            timeout: config.timeout(),
        }
    }

    #[must_use]
    pub fn executable(&self) -> Option<&LocatedExecutable> {
        self.executable.as_ref()
    }

    /// The document as printed for the renderer, defaults applied.
    #[must_use]
    pub fn decorated_text(&self, document: &GraphDocument) -> String {
        let mut graph = document.syntax().clone();
        for (key, value) in &self.presentation.graph {
            graph.set_graph_attribute(key, value);
        }
        graph.set_node_defaults(&self.presentation.node_pairs());
        graph.set_edge_defaults(&self.presentation.edge_pairs());
        graph.to_string()
    }
}

impl RenderStrategy for LibraryStrategy {
    fn name(&self) -> &'static str {
        "library"
    }

    fn render(&self, document: &GraphDocument) -> Result<Vec<u8>, RenderError> {
        let executable = self
            .executable
            .as_ref()
            .ok_or(RenderError::ExecutableNotFound)?;
        let workdir = tempfile::tempdir().map_err(|source| RenderError::Io {
            context: "create render directory".to_string(),
            source,
        })?;
        let input = workdir.path().join("graph.dot");
        let output_path = workdir.path().join("graph.png");
        write_file(&input, self.decorated_text(document).as_bytes())?;

        debug!(
            executable = %executable.path.display(),
            input = %input.display(),
            "rendering through temporary files"
        );
        let args: [&OsStr; 4] = [
            OsStr::new("-Tpng"),
            OsStr::new("-o"),
            output_path.as_os_str(),
            input.as_os_str(),
        ];
        let output = run_with_input(&executable.path, &args, None, self.timeout)?;
        if !output.status.success() {
            return Err(RenderError::ExitStatus {
                code: output.status.code(),
                stderr: output.stderr_text(),
            });
        }
        fs::read(&output_path).map_err(|source| RenderError::Io {
            context: format!("read {}", output_path.display()),
            source,
        })
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), RenderError> {
    fs::write(path, bytes).map_err(|source| RenderError::Io {
        context: format!("write {}", path.display()),
        source,
    })
}

/// Splice defaults into a document: `node [...]` and `edge [...]` at the
/// start of the root body, graph attributes at its end.
///
/// The body span comes from the parse, so braces inside quoted names,
/// HTML labels or comments never move the splice points. Node and edge
/// defaults come first so the document's own statements override them;
/// graph attributes come last and override the document.
#[must_use]
pub fn inject_presentation(document: &GraphDocument, defaults: &PresentationDefaults) -> String {
    let text = document.as_str();
    if defaults.is_empty() {
        return text.to_string();
    }
    let body = document.body_span();

    let mut head = String::new();
    for (target, attributes) in [("node", &defaults.node), ("edge", &defaults.edge)] {
        if attributes.is_empty() {
            continue;
        }
        let list: Vec<String> = attributes
            .iter()
            .map(|(key, value)| Attribute::new(key, value).to_string())
            .collect();
        head.push_str(&format!("\n  {target} [{}];", list.join(", ")));
    }

    let mut tail = String::new();
    for (key, value) in &defaults.graph {
        tail.push_str(&format!("  {};\n", Attribute::new(key, value)));
    }

    let mut out = String::with_capacity(text.len() + head.len() + tail.len() + 2);
    out.push_str(&text[..body.start]);
    out.push_str(&head);
    out.push_str(&text[body.clone()]);
    if !tail.is_empty() {
        out.push('\n');
        out.push_str(&tail);
    }
    out.push_str(&text[body.end..]);
    out
}
