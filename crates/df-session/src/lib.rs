#![forbid(unsafe_code)]

//! Conversation layer: prompts, the text-generation collaborator, the
//! extraction-to-render pipeline and per-conversation state.

mod assistant;
mod format;
pub mod generator;
mod pipeline;
mod prompt;
mod session;

pub use assistant::{
    FailureBundle, FlowAssistant, Interaction, InteractionFailure, Mode, OutputBundle,
    SuccessBundle,
};
pub use format::format_explanation;
pub use generator::{
    CommandGenerator, DEFAULT_API_BASE, DEFAULT_API_KEY_ENV, GenerationError, GenerationErrorKind,
    GenerationReply, GenerationRequest, GenerationSettings, GeneratorBackend, GeneratorConfig,
    OpenAiGenerator, ScriptedGenerator, TextGenerator, chat_completion_body,
    parse_chat_completion, status_error,
};
pub use pipeline::{Pipeline, PipelineFailure, PipelineOutput};
pub use prompt::{SYSTEM_PROMPT, generation_messages, repair_messages};
pub use session::{Session, SessionConfig, SessionSnapshot, WELCOME_MESSAGE};
