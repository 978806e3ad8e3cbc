use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable naming an explicit `dot` executable.
pub const DEFAULT_OVERRIDE_ENV: &str = "DOTFLOW_GRAPHVIZ_DOT";

/// Fixed layout and style attributes applied to every document before
/// rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresentationDefaults {
    pub graph: BTreeMap<String, String>,
    pub node: BTreeMap<String, String>,
    pub edge: BTreeMap<String, String>,
}

impl Default for PresentationDefaults {
    fn default() -> Self {
        Self {
            graph: attributes(&[
                ("rankdir", "TB"),
                ("splines", "ortho"),
                ("size", "6,6!"),
                ("ratio", "compress"),
                ("dpi", "96"),
            ]),
            node: attributes(&[
                ("shape", "box"),
                ("style", "rounded"),
                ("fontname", "Arial"),
                ("fontsize", "6.5"),
                ("width", "0.6"),
                ("height", "0.4"),
                ("margin", "0.1,0.1"),
            ]),
            edge: attributes(&[
                ("fontname", "Arial"),
                ("fontsize", "6"),
                ("arrowsize", "0.3"),
            ]),
        }
    }
}

impl PresentationDefaults {
    /// No injected attributes; documents render as written.
    #[must_use]
    pub fn none() -> Self {
        Self {
            graph: BTreeMap::new(),
            node: BTreeMap::new(),
            edge: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.is_empty() && self.node.is_empty() && self.edge.is_empty()
    }

    #[must_use]
    pub fn node_pairs(&self) -> Vec<(&str, String)> {
        pairs(&self.node)
    }

    #[must_use]
    pub fn edge_pairs(&self) -> Vec<(&str, String)> {
        pairs(&self.edge)
    }
}

fn attributes(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
        .collect()
}

fn pairs(map: &BTreeMap<String, String>) -> Vec<(&str, String)> {
    map.iter()
        .map(|(key, value)| (key.as_str(), value.clone()))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Pipe the document through the `dot` executable.
    Process,
    /// Apply defaults through the syntax tree and render from a file.
    Library,
}

impl StrategyKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Process => "process",
            Self::Library => "library",
        }
    }
}

/// Everything the renderer needs to know, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Executable name searched for on `PATH` and in bundled directories.
    pub program: String,
    /// Explicit executable path; checked before anything else.
    pub executable: Option<PathBuf>,
    /// Environment variable whose value names an executable.
    pub override_env: String,
    /// Installation paths probed with `-V` before use.
    pub well_known_paths: Vec<PathBuf>,
    /// Directories, relative to the working directory or any ancestor,
    /// that may hold a bundled copy.
    pub bundled_dirs: Vec<PathBuf>,
    /// How many ancestors of the working directory to search.
    pub walk_depth: usize,
    pub timeout_ms: u64,
    /// Strategies in fallback order.
    pub strategies: Vec<StrategyKind>,
    pub presentation: PresentationDefaults,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            program: "dot".to_string(),
            executable: None,
            override_env: DEFAULT_OVERRIDE_ENV.to_string(),
            well_known_paths: default_well_known_paths(),
            bundled_dirs: vec![
                PathBuf::from("graphviz").join("bin"),
                PathBuf::from("vendor").join("graphviz").join("bin"),
                PathBuf::from("bin"),
            ],
            walk_depth: 4,
            timeout_ms: 10_000,
            strategies: vec![StrategyKind::Process, StrategyKind::Library],
            presentation: PresentationDefaults::default(),
        }
    }
}

impl RenderConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Executable file name with the platform suffix.
    #[must_use]
    pub fn program_file_name(&self) -> String {
        let suffix = std::env::consts::EXE_SUFFIX;
        if suffix.is_empty() || self.program.ends_with(suffix) {
            self.program.clone()
        } else {
            format!("{}{suffix}", self.program)
        }
    }
}

fn default_well_known_paths() -> Vec<PathBuf> {
    if cfg!(windows) {
        vec![
            PathBuf::from(r"C:\Program Files\Graphviz\bin\dot.exe"),
            PathBuf::from(r"C:\Program Files (x86)\Graphviz\bin\dot.exe"),
        ]
    } else {
        vec![
            PathBuf::from("/usr/bin/dot"),
            PathBuf::from("/usr/local/bin/dot"),
            PathBuf::from("/opt/homebrew/bin/dot"),
            PathBuf::from("/opt/local/bin/dot"),
        ]
    }
}
