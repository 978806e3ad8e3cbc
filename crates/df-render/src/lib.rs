#![forbid(unsafe_code)]

//! Rasterizing validated DOT documents through Graphviz.
//!
//! A [`Renderer`] tries its strategies in order and returns the first output
//! that is a non-empty PNG. Configuration and the probed environment are
//! plain values handed over at construction.

pub mod config;
pub mod locate;
pub mod process;
mod strategy;

use std::fmt;
use std::io;

use df_core::{ImageFormat, RenderedImage};
use df_parser::GraphDocument;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

pub use config::{DEFAULT_OVERRIDE_ENV, PresentationDefaults, RenderConfig, StrategyKind};
pub use locate::{
    DiscoveryCandidate, DiscoveryScope, DiscoverySource, ExecutableLocator, LocatedExecutable,
    ProbeEnvironment,
};
pub use process::{ProcessError, ProcessOutput};
pub use strategy::{LibraryStrategy, ProcessStrategy, RenderStrategy, inject_presentation};

/// A single strategy's failure, kept for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyAttempt {
    pub strategy: String,
    pub error: String,
}

impl fmt::Display for StrategyAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.strategy, self.error)
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("graphviz executable not found")]
    ExecutableNotFound,
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("renderer exited with status {code:?}: {stderr}")]
    ExitStatus { code: Option<i32>, stderr: String },
    #[error("renderer produced no output")]
    EmptyOutput,
    #[error("renderer output is not a PNG image ({len} bytes)")]
    NotPng { len: usize },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
    #[error("no rendering strategies configured")]
    NoStrategies,
    #[error("all rendering strategies failed: {}", format_attempts(.attempts))]
    AllStrategiesFailed { attempts: Vec<StrategyAttempt> },
}

impl RenderError {
    /// Attempt descriptions in the order they were tried.
    #[must_use]
    pub fn attempt_messages(&self) -> Vec<String> {
        match self {
            Self::AllStrategiesFailed { attempts } => {
                attempts.iter().map(ToString::to_string).collect()
            }
            other => vec![other.to_string()],
        }
    }
}

fn format_attempts(attempts: &[StrategyAttempt]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Ordered fallback over rendering strategies.
pub struct Renderer {
    strategies: Vec<Box<dyn RenderStrategy>>,
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("strategies", &self.strategy_names())
            .finish()
    }
}

impl Renderer {
    #[must_use]
    pub fn new(strategies: Vec<Box<dyn RenderStrategy>>) -> Self {
        Self { strategies }
    }

    /// Build the strategies named in `config`, locating executables once.
    #[must_use]
    pub fn from_config(config: &RenderConfig, environment: &ProbeEnvironment) -> Self {
        let strategies = config
            .strategies
            .iter()
            .map(|kind| -> Box<dyn RenderStrategy> {
                match kind {
                    StrategyKind::Process => Box::new(ProcessStrategy::new(config, environment)),
                    StrategyKind::Library => Box::new(LibraryStrategy::new(config, environment)),
                }
            })
            .collect();
        Self::new(strategies)
    }

    #[must_use]
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|strategy| strategy.name()).collect()
    }

    /// Render `document` with the first strategy that yields a PNG.
    pub fn render(&self, document: &GraphDocument) -> Result<RenderedImage, RenderError> {
        if self.strategies.is_empty() {
            return Err(RenderError::NoStrategies);
        }

        let format = ImageFormat::Png;
        let mut attempts = Vec::with_capacity(self.strategies.len());
        for strategy in &self.strategies {
            let result = strategy.render(document).and_then(|bytes| {
                if bytes.is_empty() {
                    Err(RenderError::EmptyOutput)
                } else if !format.matches(&bytes) {
                    Err(RenderError::NotPng { len: bytes.len() })
                } else {
                    Ok(bytes)
                }
            });

            match result {
                Ok(bytes) => {
                    info!(
                        strategy = strategy.name(),
                        bytes = bytes.len(),
                        "rendered graph"
                    );
                    return Ok(RenderedImage {
                        bytes,
                        format,
                        strategy: strategy.name().to_string(),
                        document_digest: document.digest(),
                    });
                }
                Err(error) => {
                    warn!(strategy = strategy.name(), %error, "render strategy failed");
                    attempts.push(StrategyAttempt {
                        strategy: strategy.name().to_string(),
                        error: error.to_string(),
                    });
                }
            }
        }

        Err(RenderError::AllStrategiesFailed { attempts })
    }
}
