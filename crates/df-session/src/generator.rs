//! The text-generation collaborator and its implementations: an external
//! command, an OpenAI-compatible chat completion endpoint and a scripted
//! replay for tests.

use std::collections::VecDeque;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use df_core::ConversationTurn;
use df_render::process::{ProcessError, run_with_input};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.1,
            max_tokens: 1000,
        }
    }
}

/// One round trip to the text service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub messages: Vec<ConversationTurn>,
}

impl GenerationRequest {
    #[must_use]
    pub fn new(settings: &GenerationSettings, messages: Vec<ConversationTurn>) -> Self {
        Self {
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            messages,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenerationErrorKind {
    /// Service unreachable or the command failed.
    Unavailable,
    Timeout,
    Quota,
    EmptyResponse,
    /// Reply could not be decoded.
    Malformed,
}

impl GenerationErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unavailable => "unavailable",
            Self::Timeout => "timeout",
            Self::Quota => "quota",
            Self::EmptyResponse => "empty-response",
            Self::Malformed => "malformed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{}: {message}", .kind.as_str())]
pub struct GenerationError {
    pub kind: GenerationErrorKind,
    #[serde(default)]
    pub message: String,
}

impl GenerationError {
    #[must_use]
    pub fn new(kind: GenerationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// `prompt messages -> free text`.
pub trait TextGenerator: Send + Sync {
    fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

impl<T: TextGenerator + ?Sized> TextGenerator for Box<T> {
    fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        (**self).generate(request)
    }
}

/// Reply written by a generator command on stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GenerationReply {
    Text { text: String },
    Error { error: GenerationError },
}

/// Which service answers generation requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GeneratorBackend {
    Command,
    #[serde(rename = "openai")]
    OpenAi,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Unset means `command` when a command is configured, `openai` otherwise.
    pub backend: Option<GeneratorBackend>,
    /// Program that answers one request per invocation.
    pub command: Option<PathBuf>,
    pub args: Vec<String>,
    pub timeout_ms: u64,
    /// Base URL of the chat completion API, without `/chat/completions`.
    pub api_base: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Inline API key; takes precedence over `api_key_env`.
    pub api_key: Option<String>,
    pub settings: GenerationSettings,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            backend: None,
            command: None,
            args: Vec::new(),
            timeout_ms: 60_000,
            api_base: DEFAULT_API_BASE.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            api_key: None,
            settings: GenerationSettings::default(),
        }
    }
}

impl GeneratorConfig {
    #[must_use]
    pub fn resolved_backend(&self) -> GeneratorBackend {
        match (self.backend, &self.command) {
            (Some(backend), _) => backend,
            (None, Some(_)) => GeneratorBackend::Command,
            (None, None) => GeneratorBackend::OpenAi,
        }
    }

    /// Build the configured generator.
    pub fn build(&self) -> Result<Box<dyn TextGenerator>, GenerationError> {
        let backend = self.resolved_backend();
        debug!(?backend, "building text generator");
        match backend {
            GeneratorBackend::Command => CommandGenerator::from_config(self)
                .map(|generator| Box::new(generator) as Box<dyn TextGenerator>)
                .ok_or_else(|| {
                    GenerationError::new(
                        GenerationErrorKind::Unavailable,
                        "the command backend needs `generator.command`",
                    )
                }),
            GeneratorBackend::OpenAi => OpenAiGenerator::from_config(self)
                .map(|generator| Box::new(generator) as Box<dyn TextGenerator>),
        }
    }
}

/// Runs an external program per request: the request goes to stdin as
/// JSON, a [`GenerationReply`] comes back on stdout.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandGenerator {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// `None` when no command is configured.
    #[must_use]
    pub fn from_config(config: &GeneratorConfig) -> Option<Self> {
        let program = config.command.clone()?;
        Some(Self::new(
            program,
            config.args.clone(),
            Duration::from_millis(config.timeout_ms),
        ))
    }
}

impl TextGenerator for CommandGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let payload = serde_json::to_vec(request).map_err(|error| {
            GenerationError::new(GenerationErrorKind::Malformed, error.to_string())
        })?;

        let output = run_with_input(
            &self.program,
            self.args.as_slice(),
            Some(&payload),
            self.timeout,
        )
        .map_err(|error| {
            let kind = match error {
                ProcessError::TimedOut { .. } => GenerationErrorKind::Timeout,
                ProcessError::Spawn { .. } | ProcessError::Io { .. } => {
                    GenerationErrorKind::Unavailable
                }
            };
            GenerationError::new(kind, error.to_string())
        })?;

        if !output.status.success() {
            return Err(GenerationError::new(
                GenerationErrorKind::Unavailable,
                format!(
                    "generator exited with status {:?}: {}",
                    output.status.code(),
                    output.stderr_text()
                ),
            ));
        }

        let reply: GenerationReply = serde_json::from_slice(&output.stdout).map_err(|error| {
            let preview: String = String::from_utf8_lossy(&output.stdout)
                .chars()
                .take(200)
                .collect();
            GenerationError::new(
                GenerationErrorKind::Malformed,
                format!("invalid reply JSON: {error}; stdout starts with {preview:?}"),
            )
        })?;

        match reply {
            GenerationReply::Text { text } => {
                let text = text.trim();
                if text.is_empty() {
                    return Err(GenerationError::new(
                        GenerationErrorKind::EmptyResponse,
                        "generator returned no text",
                    ));
                }
                debug!(bytes = text.len(), "generator replied");
                Ok(text.to_string())
            }
            GenerationReply::Error { error } => Err(error),
        }
    }
}

/// Talks to an OpenAI-compatible `POST {api_base}/chat/completions`.
#[derive(Clone)]
pub struct OpenAiGenerator {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
}

impl fmt::Debug for OpenAiGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiGenerator")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl OpenAiGenerator {
    pub fn new(
        api_base: &str,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| {
                GenerationError::new(
                    GenerationErrorKind::Unavailable,
                    format!("failed to build http client: {error}"),
                )
            })?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", api_base.trim_end_matches('/')),
            api_key: api_key.into(),
        })
    }

    /// Key from `api_key`, falling back to the `api_key_env` variable.
    pub fn from_config(config: &GeneratorConfig) -> Result<Self, GenerationError> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| env::var(&config.api_key_env).ok())
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                GenerationError::new(
                    GenerationErrorKind::Unavailable,
                    format!(
                        "no API key: set `generator.api_key` or the {} environment variable",
                        config.api_key_env
                    ),
                )
            })?;
        Self::new(
            &config.api_base,
            api_key,
            Duration::from_millis(config.timeout_ms),
        )
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl TextGenerator for OpenAiGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&chat_completion_body(request))
            .send()
            .map_err(transport_error)?;
        let status = response.status();
        let body = response.text().map_err(transport_error)?;
        if !status.is_success() {
            let error = status_error(status.as_u16(), &body);
            warn!(status = status.as_u16(), %error, "chat completion failed");
            return Err(error);
        }
        let text = parse_chat_completion(&body)?;
        debug!(model = %request.model, bytes = text.len(), "chat completion replied");
        Ok(text)
    }
}

/// JSON body of a chat completion call.
#[must_use]
pub fn chat_completion_body(request: &GenerationRequest) -> serde_json::Value {
    json!({
        "model": request.model,
        "messages": request.messages,
        "temperature": request.temperature,
        "max_tokens": request.max_tokens,
    })
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<String>,
}

/// Trimmed text of the first choice.
pub fn parse_chat_completion(body: &str) -> Result<String, GenerationError> {
    let completion: ChatCompletion = serde_json::from_str(body).map_err(|error| {
        GenerationError::new(
            GenerationErrorKind::Malformed,
            format!("invalid chat completion JSON: {error}"),
        )
    })?;
    let text = completion
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .unwrap_or_default();
    let text = text.trim();
    if text.is_empty() {
        return Err(GenerationError::new(
            GenerationErrorKind::EmptyResponse,
            "chat completion returned no text",
        ));
    }
    Ok(text.to_string())
}

/// Map a non-success HTTP status and its body to an error.
#[must_use]
pub fn status_error(status: u16, body: &str) -> GenerationError {
    let api_error = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .map(|parsed| parsed.error);
    let quota_code = api_error
        .as_ref()
        .and_then(|error| error.code.as_deref())
        .is_some_and(|code| code == "insufficient_quota");
    let kind = match status {
        429 => GenerationErrorKind::Quota,
        _ if quota_code => GenerationErrorKind::Quota,
        408 | 504 => GenerationErrorKind::Timeout,
        _ => GenerationErrorKind::Unavailable,
    };
    let detail = match api_error {
        Some(error) if !error.message.is_empty() => error.message,
        _ => body.chars().take(200).collect(),
    };
    GenerationError::new(kind, format!("HTTP {status}: {detail}"))
}

fn transport_error(error: reqwest::Error) -> GenerationError {
    let kind = if error.is_timeout() {
        GenerationErrorKind::Timeout
    } else {
        GenerationErrorKind::Unavailable
    };
    GenerationError::new(kind, error.to_string())
}

/// Replays queued replies in order, recording every request it receives.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String, GenerationError>>>,
    requests: Mutex<Vec<GenerationRequest>>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    #[must_use]
    pub fn new<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = Result<String, GenerationError>>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(texts.into_iter().map(|text| Ok(text.into())))
    }

    pub fn push(&self, reply: Result<String, GenerationError>) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(reply);
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl TextGenerator for ScriptedGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| {
                Err(GenerationError::new(
                    GenerationErrorKind::Unavailable,
                    "no scripted reply left",
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use df_core::ConversationTurn;

    use super::{
        GenerationError, GenerationErrorKind, GenerationReply, GenerationRequest,
        GenerationSettings, GeneratorBackend, GeneratorConfig, ScriptedGenerator, TextGenerator,
        chat_completion_body, parse_chat_completion, status_error,
    };

    fn request() -> GenerationRequest {
        GenerationRequest::new(
            &GenerationSettings::default(),
            vec![ConversationTurn::user("make a graph")],
        )
    }

    #[test]
    fn settings_default_to_deterministic_chat_model() {
        let settings = GenerationSettings::default();
        assert_eq!(settings.model, "gpt-3.5-turbo");
        assert!((settings.temperature - 0.1).abs() < f32::EPSILON);
        assert_eq!(settings.max_tokens, 1000);
    }

    #[test]
    fn scripted_generator_replays_in_order() {
        let generator = ScriptedGenerator::with_texts(["first", "second"]);
        assert_eq!(generator.generate(&request()).as_deref(), Ok("first"));
        assert_eq!(generator.generate(&request()).as_deref(), Ok("second"));
        let exhausted = generator.generate(&request()).expect_err("exhausted");
        assert_eq!(exhausted.kind, GenerationErrorKind::Unavailable);
        assert_eq!(generator.calls(), 3);
        assert_eq!(generator.requests().len(), 3);
    }

    #[test]
    fn scripted_generator_replays_errors() {
        let generator = ScriptedGenerator::new([Err(GenerationError::new(
            GenerationErrorKind::Quota,
            "rate limited",
        ))]);
        let error = generator.generate(&request()).expect_err("quota");
        assert_eq!(error.to_string(), "quota: rate limited");
    }

    #[test]
    fn replies_decode_from_either_shape() {
        let text: GenerationReply =
            serde_json::from_str(r#"{"text":"digraph { a }"}"#).expect("text reply");
        assert_eq!(
            text,
            GenerationReply::Text {
                text: "digraph { a }".to_string()
            }
        );
        let error: GenerationReply =
            serde_json::from_str(r#"{"error":{"kind":"timeout"}}"#).expect("error reply");
        assert_eq!(
            error,
            GenerationReply::Error {
                error: GenerationError::new(GenerationErrorKind::Timeout, "")
            }
        );
    }

    #[test]
    fn request_serializes_messages_with_roles() {
        let json = serde_json::to_string(&request()).expect("serialize");
        assert!(json.contains(r#""model":"gpt-3.5-turbo""#));
        assert!(json.contains(r#""messages":[{"role":"user","content":"make a graph"}]"#));
    }

    #[test]
    fn chat_completion_body_carries_settings_and_messages() {
        let body = chat_completion_body(&request());
        assert_eq!(body["model"], "gpt-3.5-turbo");
        assert_eq!(body["max_tokens"], 1000);
        assert!((body["temperature"].as_f64().unwrap_or_default() - 0.1).abs() < 1e-6);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "make a graph");
    }

    #[test]
    fn chat_completion_first_choice_is_trimmed() {
        let body = r#"{
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "  digraph G { a -> b; }\n"}, "finish_reason": "stop"},
                {"index": 1, "message": {"role": "assistant", "content": "ignored"}, "finish_reason": "stop"}
            ],
            "usage": {"prompt_tokens": 10, "completion_tokens": 8, "total_tokens": 18}
        }"#;
        assert_eq!(
            parse_chat_completion(body).as_deref(),
            Ok("digraph G { a -> b; }")
        );
    }

    #[test]
    fn chat_completion_without_text_is_empty_or_malformed() {
        for body in [
            r#"{"choices": []}"#,
            r#"{"choices": [{"message": {"role": "assistant", "content": null}}]}"#,
            r#"{"choices": [{"message": {"role": "assistant", "content": "   "}}]}"#,
        ] {
            let error = parse_chat_completion(body).expect_err("no text");
            assert_eq!(error.kind, GenerationErrorKind::EmptyResponse, "{body}");
        }
        let error = parse_chat_completion("<html>bad gateway</html>").expect_err("not json");
        assert_eq!(error.kind, GenerationErrorKind::Malformed);
    }

    #[test]
    fn http_statuses_map_to_kinds() {
        let rate_limited = r#"{"error": {"message": "Rate limit reached", "type": "requests", "code": "rate_limit_exceeded"}}"#;
        let error = status_error(429, rate_limited);
        assert_eq!(error.kind, GenerationErrorKind::Quota);
        assert_eq!(error.message, "HTTP 429: Rate limit reached");

        let no_quota = r#"{"error": {"message": "You exceeded your current quota", "code": "insufficient_quota"}}"#;
        assert_eq!(status_error(403, no_quota).kind, GenerationErrorKind::Quota);
        assert_eq!(status_error(504, "").kind, GenerationErrorKind::Timeout);

        let error = status_error(401, r#"{"error": {"message": "Incorrect API key provided"}}"#);
        assert_eq!(error.kind, GenerationErrorKind::Unavailable);
        assert!(error.message.contains("Incorrect API key"));

        let error = status_error(502, "upstream connect error");
        assert_eq!(error.kind, GenerationErrorKind::Unavailable);
        assert_eq!(error.message, "HTTP 502: upstream connect error");
    }

    #[test]
    fn backend_follows_configuration() {
        let mut config = GeneratorConfig::default();
        assert_eq!(config.resolved_backend(), GeneratorBackend::OpenAi);
        config.command = Some("/usr/local/bin/ask".into());
        assert_eq!(config.resolved_backend(), GeneratorBackend::Command);
        config.backend = Some(GeneratorBackend::OpenAi);
        assert_eq!(config.resolved_backend(), GeneratorBackend::OpenAi);

        let parsed: GeneratorConfig =
            serde_json::from_str(r#"{"backend": "openai", "api_key_env": "MY_KEY"}"#)
                .expect("config");
        assert_eq!(parsed.backend, Some(GeneratorBackend::OpenAi));
        assert_eq!(parsed.api_base, "https://api.openai.com/v1");
        assert_eq!(parsed.api_key_env, "MY_KEY");
    }

    #[test]
    fn missing_api_key_is_unavailable() {
        let config = GeneratorConfig {
            backend: Some(GeneratorBackend::OpenAi),
            api_key_env: "DOTFLOW_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..GeneratorConfig::default()
        };
        let error = config.build().err().expect("no key");
        assert_eq!(error.kind, GenerationErrorKind::Unavailable);
        assert!(error.message.contains("DOTFLOW_TEST_KEY_THAT_IS_NEVER_SET"));

        let command = GeneratorConfig {
            backend: Some(GeneratorBackend::Command),
            ..GeneratorConfig::default()
        };
        assert_eq!(
            command.build().err().expect("no command").kind,
            GenerationErrorKind::Unavailable
        );
    }

    mod openai {
        use std::io::{BufRead, BufReader, Read, Write};
        use std::net::TcpListener;
        use std::sync::mpsc;
        use std::thread;
        use std::time::Duration;

        use super::request;
        use crate::generator::{
            GenerationErrorKind, GeneratorConfig, OpenAiGenerator, TextGenerator,
        };

        /// Answer one HTTP request with `status` and `body`, returning what
        /// the client sent as `(request line, authorization, body)`.
        fn serve_once(
            status: &'static str,
            body: &'static str,
        ) -> (String, mpsc::Receiver<(String, String, String)>) {
            let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
            let address = listener.local_addr().expect("address");
            let (sender, receiver) = mpsc::channel();
            thread::spawn(move || {
                let (stream, _) = listener.accept().expect("accept");
                let mut reader = BufReader::new(stream.try_clone().expect("clone"));
                let mut request_line = String::new();
                reader.read_line(&mut request_line).expect("request line");
                let mut authorization = String::new();
                let mut length = 0_usize;
                loop {
                    let mut header = String::new();
                    reader.read_line(&mut header).expect("header");
                    let header = header.trim_end();
                    if header.is_empty() {
                        break;
                    }
                    let Some((name, value)) = header.split_once(':') else {
                        continue;
                    };
                    match name.to_ascii_lowercase().as_str() {
                        "authorization" => authorization = value.trim().to_string(),
                        "content-length" => length = value.trim().parse().expect("length"),
                        _ => {}
                    }
                }
                let mut payload = vec![0; length];
                reader.read_exact(&mut payload).expect("body");
                let mut stream = stream;
                write!(
                    stream,
                    "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                )
                .expect("respond");
                sender
                    .send((
                        request_line.trim_end().to_string(),
                        authorization,
                        String::from_utf8_lossy(&payload).into_owned(),
                    ))
                    .ok();
            });
            (format!("http://{address}/v1/"), receiver)
        }

        #[test]
        fn posts_chat_completion_with_bearer_key() {
            let (api_base, seen) = serve_once(
                "200 OK",
                r#"{"choices":[{"message":{"role":"assistant","content":"digraph G { a -> b; }"}}]}"#,
            );
            let config = GeneratorConfig {
                api_base,
                api_key: Some("sk-test".to_string()),
                timeout_ms: 5_000,
                ..GeneratorConfig::default()
            };
            let generator = OpenAiGenerator::from_config(&config).expect("generator");
            assert!(generator.endpoint().ends_with("/v1/chat/completions"));
            assert_eq!(
                generator.generate(&request()).as_deref(),
                Ok("digraph G { a -> b; }")
            );

            let (request_line, authorization, body) =
                seen.recv_timeout(Duration::from_secs(5)).expect("request seen");
            assert_eq!(request_line, "POST /v1/chat/completions HTTP/1.1");
            assert_eq!(authorization, "Bearer sk-test");
            let body: serde_json::Value = serde_json::from_str(&body).expect("json body");
            assert_eq!(body["model"], "gpt-3.5-turbo");
            assert_eq!(body["messages"][0]["content"], "make a graph");
        }

        #[test]
        fn rate_limit_response_is_quota() {
            let (api_base, _seen) = serve_once(
                "429 Too Many Requests",
                r#"{"error":{"message":"Rate limit reached","code":"rate_limit_exceeded"}}"#,
            );
            let generator =
                OpenAiGenerator::new(&api_base, "sk-test", Duration::from_secs(5)).expect("client");
            let error = generator.generate(&request()).expect_err("rate limited");
            assert_eq!(error.kind, GenerationErrorKind::Quota);
            assert!(error.message.contains("Rate limit reached"));
        }

        #[test]
        fn unreachable_endpoint_is_unavailable() {
            let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
            let address = listener.local_addr().expect("address");
            drop(listener);
            let generator = OpenAiGenerator::new(
                &format!("http://{address}/v1"),
                "sk-test",
                Duration::from_secs(2),
            )
            .expect("client");
            let error = generator.generate(&request()).expect_err("connection refused");
            assert_eq!(error.kind, GenerationErrorKind::Unavailable);
        }
    }

    #[cfg(unix)]
    mod command {
        use std::fs;
        use std::os::unix::fs::PermissionsExt;
        use std::path::{Path, PathBuf};
        use std::time::Duration;

        use super::request;
        use crate::generator::{CommandGenerator, GenerationErrorKind, TextGenerator};

        fn script(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("generator");
            fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
            path
        }

        #[test]
        fn command_reply_text_is_trimmed() {
            let dir = tempfile::tempdir().expect("tempdir");
            let program = script(
                dir.path(),
                r#"cat > /dev/null
printf '{"text":"  digraph G { a -> b; }\\n"}'"#,
            );
            let generator = CommandGenerator::new(program, Vec::new(), Duration::from_secs(5));
            assert_eq!(
                generator.generate(&request()).as_deref(),
                Ok("digraph G { a -> b; }")
            );
        }

        #[test]
        fn command_failures_map_to_kinds() {
            let dir = tempfile::tempdir().expect("tempdir");

            let failing = script(dir.path(), "cat > /dev/null\necho boom >&2\nexit 2");
            let error = CommandGenerator::new(failing, Vec::new(), Duration::from_secs(5))
                .generate(&request())
                .expect_err("non-zero exit");
            assert_eq!(error.kind, GenerationErrorKind::Unavailable);
            assert!(error.message.contains("boom"));

            let garbage = dir.path().join("garbage");
            fs::write(&garbage, "#!/bin/sh\ncat > /dev/null\necho not json\n").expect("write");
            fs::set_permissions(&garbage, fs::Permissions::from_mode(0o755)).expect("chmod");
            let error = CommandGenerator::new(garbage, Vec::new(), Duration::from_secs(5))
                .generate(&request())
                .expect_err("bad json");
            assert_eq!(error.kind, GenerationErrorKind::Malformed);

            let empty = dir.path().join("empty");
            fs::write(&empty, "#!/bin/sh\ncat > /dev/null\necho '{\"text\":\"   \"}'\n")
                .expect("write");
            fs::set_permissions(&empty, fs::Permissions::from_mode(0o755)).expect("chmod");
            let error = CommandGenerator::new(empty, Vec::new(), Duration::from_secs(5))
                .generate(&request())
                .expect_err("blank text");
            assert_eq!(error.kind, GenerationErrorKind::EmptyResponse);
        }

        #[test]
        fn slow_command_times_out() {
            let dir = tempfile::tempdir().expect("tempdir");
            let program = script(dir.path(), "exec sleep 5");
            let error = CommandGenerator::new(program, Vec::new(), Duration::from_millis(150))
                .generate(&request())
                .expect_err("timeout");
            assert_eq!(error.kind, GenerationErrorKind::Timeout);
        }

        #[test]
        fn missing_command_is_unavailable() {
            let error = CommandGenerator::new(
                "/nonexistent/dotflow-generator",
                Vec::new(),
                Duration::from_secs(1),
            )
            .generate(&request())
            .expect_err("missing");
            assert_eq!(error.kind, GenerationErrorKind::Unavailable);
        }
    }
}
