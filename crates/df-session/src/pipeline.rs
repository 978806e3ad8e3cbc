use df_core::{FlowError, Metrics, RenderedImage};
use df_metrics::compute_metrics;
use df_parser::{GraphDocument, PrepareError, Sanitizer, explanation_prefix, prepare_document};
use df_render::{ProbeEnvironment, RenderConfig, Renderer};
use tracing::{debug, warn};

/// Everything one successful pass produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutput {
    pub document: GraphDocument,
    /// Text that preceded the graph in the response, unformatted.
    pub explanation: String,
    pub metrics: Metrics,
    pub image: RenderedImage,
}

/// A failed pass. When only rendering failed, the document and its metrics
/// are still present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineFailure {
    pub error: FlowError,
    pub document: Option<GraphDocument>,
    pub metrics: Option<Metrics>,
}

impl PipelineFailure {
    fn before_document(error: FlowError) -> Self {
        Self {
            error,
            document: None,
            metrics: None,
        }
    }
}

impl From<PrepareError> for PipelineFailure {
    fn from(error: PrepareError) -> Self {
        let message = error.to_string();
        let error = match error {
            PrepareError::Extract(_) => FlowError::Extraction { message },
            PrepareError::Sanitize(_) => FlowError::Sanitization { message },
            PrepareError::Validate(_) => FlowError::Validation { message },
        };
        Self::before_document(error)
    }
}

/// Free text in, document plus metrics plus image out.
#[derive(Debug)]
pub struct Pipeline {
    sanitizer: Sanitizer,
    renderer: Renderer,
}

impl Pipeline {
    #[must_use]
    pub fn new(sanitizer: Sanitizer, renderer: Renderer) -> Self {
        Self {
            sanitizer,
            renderer,
        }
    }

    #[must_use]
    pub fn from_config(config: &RenderConfig, environment: &ProbeEnvironment) -> Self {
        Self::new(
            Sanitizer::default(),
            Renderer::from_config(config, environment),
        )
    }

    #[must_use]
    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    /// Extract, sanitize and validate only.
    pub fn prepare(&self, raw: &str) -> Result<GraphDocument, PipelineFailure> {
        prepare_document(raw, &self.sanitizer).map_err(|error| {
            warn!(stage = error.stage(), %error, "no usable graph in response");
            PipelineFailure::from(error)
        })
    }

    pub fn run(&self, raw: &str) -> Result<PipelineOutput, PipelineFailure> {
        let document = self.prepare(raw)?;
        let metrics = compute_metrics(&document);
        debug!(digest = %document.digest(), "document accepted; rendering");

        match self.renderer.render(&document) {
            Ok(image) => Ok(PipelineOutput {
                explanation: explanation_prefix(raw).to_string(),
                document,
                metrics,
                image,
            }),
            Err(error) => {
                warn!(%error, "visualization failed");
                Err(PipelineFailure {
                    error: FlowError::Render {
                        attempts: error.attempt_messages(),
                    },
                    document: Some(document),
                    metrics: Some(metrics),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use df_core::{FlowError, FlowErrorCode, ImageFormat, Metrics};
    use df_parser::{GraphDocument, Sanitizer};
    use df_render::{RenderError, RenderStrategy, Renderer};

    use super::Pipeline;

    struct Png;

    impl RenderStrategy for Png {
        fn name(&self) -> &'static str {
            "stub"
        }

        fn render(&self, _document: &GraphDocument) -> Result<Vec<u8>, RenderError> {
            Ok(ImageFormat::PNG_SIGNATURE.to_vec())
        }
    }

    fn working() -> Pipeline {
        Pipeline::new(Sanitizer::default(), Renderer::new(vec![Box::new(Png)]))
    }

    #[test]
    fn successful_pass_returns_everything() {
        let output = working()
            .run("Here it is:\ndigraph G { a -> b; b -> c; }")
            .expect("success");
        assert_eq!(output.metrics, Metrics::from_counts(3, 2));
        assert_eq!(output.explanation, "Here it is:");
        assert_eq!(output.image.strategy, "stub");
    }

    #[test]
    fn missing_keyword_is_an_extraction_failure() {
        let failure = working().run("Sorry, no graph today.").expect_err("fails");
        assert_eq!(failure.error.code(), FlowErrorCode::Extraction);
        assert!(failure.document.is_none());
        assert!(failure.metrics.is_none());
    }

    #[test]
    fn validation_failure_is_reported() {
        let failure = working().run("digraph G { a -> ; }").expect_err("fails");
        assert_eq!(failure.error.code(), FlowErrorCode::Validation);
    }

    #[test]
    fn render_failure_keeps_document_and_metrics() {
        let pipeline = Pipeline::new(Sanitizer::default(), Renderer::new(Vec::new()));
        let failure = pipeline
            .run("digraph G { a -> b; b -> c; }")
            .expect_err("no strategies");
        assert!(matches!(failure.error, FlowError::Render { .. }));
        assert_eq!(failure.metrics, Some(Metrics::from_counts(3, 2)));
        assert!(failure.document.is_some());
    }
}
