use df_core::{ConversationTurn, FlowError, Metrics, RenderedImage};
use df_parser::GraphDocument;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::format::format_explanation;
use crate::generator::{GenerationRequest, GenerationSettings, TextGenerator};
use crate::pipeline::{Pipeline, PipelineFailure};
use crate::prompt::{generation_messages, repair_messages};
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Generate,
    Repair,
}

impl Mode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Generate => "generate",
            Self::Repair => "repair",
        }
    }
}

/// A fully successful exchange. The session has already been updated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interaction {
    pub mode: Mode,
    pub document: GraphDocument,
    /// Bulleted explanation, as stored in the session.
    pub explanation: String,
    pub metrics: Metrics,
    pub image: RenderedImage,
}

/// A failed exchange. The session was left as it was.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} failed: {error}", .mode.as_str())]
pub struct InteractionFailure {
    pub mode: Mode,
    pub error: FlowError,
    /// Present only when rendering was the failing step.
    pub document: Option<GraphDocument>,
    pub metrics: Option<Metrics>,
}

impl InteractionFailure {
    fn new(mode: Mode, error: FlowError) -> Self {
        Self {
            mode,
            error,
            document: None,
            metrics: None,
        }
    }

    fn from_pipeline(mode: Mode, failure: PipelineFailure) -> Self {
        Self {
            mode,
            error: failure.error,
            document: failure.document,
            metrics: failure.metrics,
        }
    }

    /// A valid document was produced but no strategy could draw it.
    #[must_use]
    pub fn visualization_failed(&self) -> bool {
        matches!(self.error, FlowError::Render { .. }) && self.document.is_some()
    }
}

/// Drives Generate and Repair exchanges against a [`Session`].
#[derive(Debug)]
pub struct FlowAssistant<G: TextGenerator> {
    generator: G,
    pipeline: Pipeline,
    settings: GenerationSettings,
}

impl<G: TextGenerator> FlowAssistant<G> {
    #[must_use]
    pub fn new(generator: G, pipeline: Pipeline, settings: GenerationSettings) -> Self {
        Self {
            generator,
            pipeline,
            settings,
        }
    }

    #[must_use]
    pub fn generator(&self) -> &G {
        &self.generator
    }

    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    #[must_use]
    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    /// Ask for a new graph describing `user_input`.
    pub fn generate(
        &self,
        session: &mut Session,
        user_input: &str,
    ) -> Result<Interaction, InteractionFailure> {
        let input = user_input.trim();
        if input.is_empty() {
            return Err(InteractionFailure::new(Mode::Generate, FlowError::EmptyInput));
        }
        let messages =
            generation_messages(session.turns(), session.config().history_window, input);
        self.exchange(Mode::Generate, session, input, messages)
    }

    /// Ask for an improved version of the session's current graph.
    pub fn repair(
        &self,
        session: &mut Session,
        feedback: &str,
    ) -> Result<Interaction, InteractionFailure> {
        let Some(current) = session.current_document() else {
            warn!("repair requested before any graph was generated");
            return Err(InteractionFailure::new(
                Mode::Repair,
                FlowError::RepairWithoutDocument,
            ));
        };
        let feedback = feedback.trim();
        if feedback.is_empty() {
            return Err(InteractionFailure::new(Mode::Repair, FlowError::EmptyInput));
        }
        let messages = repair_messages(
            session.turns(),
            session.config().history_window,
            current,
            feedback,
        );
        self.exchange(Mode::Repair, session, feedback, messages)
    }

    fn exchange(
        &self,
        mode: Mode,
        session: &mut Session,
        user_input: &str,
        messages: Vec<ConversationTurn>,
    ) -> Result<Interaction, InteractionFailure> {
        let request = GenerationRequest::new(&self.settings, messages);
        let raw = self.generator.generate(&request).map_err(|error| {
            warn!(mode = mode.as_str(), %error, "text generation failed");
            InteractionFailure::new(
                mode,
                FlowError::Generation {
                    message: error.to_string(),
                },
            )
        })?;

        let output = self
            .pipeline
            .run(&raw)
            .map_err(|failure| InteractionFailure::from_pipeline(mode, failure))?;

        let explanation = format_explanation(&output.explanation);
        session.commit(output.document.clone(), user_input, explanation.clone());
        info!(
            mode = mode.as_str(),
            nodes = output.metrics.node_count,
            edges = output.metrics.edge_count,
            "exchange complete"
        );
        Ok(Interaction {
            mode,
            document: output.document,
            explanation,
            metrics: output.metrics,
            image: output.image,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessBundle {
    pub document: GraphDocument,
    /// Base64 PNG.
    pub image: String,
    pub metrics: Metrics,
    pub explanation: String,
    pub chat_history: Vec<ConversationTurn>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureBundle {
    pub error: String,
    pub code: String,
    pub chat_history: Vec<ConversationTurn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<GraphDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Metrics>,
}

/// The JSON shape handed back to callers after one exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputBundle {
    Success(SuccessBundle),
    Failure(FailureBundle),
}

impl OutputBundle {
    #[must_use]
    pub fn new(outcome: &Result<Interaction, InteractionFailure>, session: &Session) -> Self {
        let chat_history = session.turns().to_vec();
        match outcome {
            Ok(interaction) => Self::Success(SuccessBundle {
                document: interaction.document.clone(),
                image: interaction.image.to_base64(),
                metrics: interaction.metrics,
                explanation: interaction.explanation.clone(),
                chat_history,
            }),
            Err(failure) => Self::Failure(FailureBundle {
                error: failure.error.user_message().to_string(),
                code: failure.error.code().as_str().to_string(),
                chat_history,
                document: failure.document.clone(),
                metrics: failure.metrics,
            }),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}
