#![forbid(unsafe_code)]

//! dotflow CLI - turn free-text graph descriptions into validated, rendered DOT.
//!
//! # Commands
//!
//! - `extract`: Print the `digraph` block found in a response
//! - `sanitize`: Print the extracted block after textual repairs
//! - `validate`: Check a response or document against the DOT grammar
//! - `metrics`: Node count, edge count and cyclomatic complexity
//! - `render`: Rasterize to PNG through Graphviz
//! - `locate`: Show where the Graphviz executable was looked for
//! - `process`: Run the full pipeline on a saved response and print the output bundle
//! - `chat`: Interactive generate/repair loop against a generator command or
//!   an OpenAI-compatible chat completion API

use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand, ValueEnum};
use df_core::Metrics;
use df_metrics::analyze;
use df_parser::{
    PrepareError, Sanitizer, ValidationError, extract_candidate, parse_evidence_json,
    prepare_document,
};
use df_render::{
    DiscoveryScope, ExecutableLocator, LocatedExecutable, ProbeEnvironment, RenderConfig,
};
use df_session::{
    FlowAssistant, GeneratorConfig, Interaction, InteractionFailure, OutputBundle, Pipeline,
    ScriptedGenerator, Session, SessionConfig, SessionSnapshot,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// dotflow CLI - turn free-text graph descriptions into validated, rendered DOT.
#[derive(Debug, Parser)]
#[command(
    name = "dotflow",
    version,
    about = "Turn free-text graph descriptions into validated, rendered DOT",
    long_about = "Recovers a Graphviz digraph from free text, repairs common defects,\n\
        validates it against the DOT grammar, computes structural metrics and\n\
        renders it to PNG through the dot executable."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging (can be repeated for more detail: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log line format
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    /// Configuration file (TOML, or YAML for .yaml/.yml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the first brace-balanced digraph block of a response.
    Extract {
        /// Input file path or "-" for stdin. Anything else is taken as inline text.
        #[arg(default_value = "-")]
        input: String,
    },

    /// Print the extracted block after sanitizing it.
    Sanitize {
        #[arg(default_value = "-")]
        input: String,
    },

    /// Validate a response or document and report the outcome.
    Validate {
        #[arg(default_value = "-")]
        input: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compute graph metrics.
    Metrics {
        #[arg(default_value = "-")]
        input: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Include components, self-loops and collapsed duplicates
        #[arg(long)]
        report: bool,
    },

    /// Render to PNG.
    Render {
        #[arg(default_value = "-")]
        input: String,

        /// Output file path. If omitted, writes to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write base64 text instead of raw bytes
        #[arg(long)]
        base64: bool,
    },

    /// Report Graphviz executable discovery.
    Locate {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the whole pipeline on a saved response and print the output bundle.
    Process {
        #[arg(default_value = "-")]
        input: String,

        /// Request text recorded in the chat history
        #[arg(long, default_value = "offline replay")]
        prompt: String,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Interactive session: plain lines generate, /repair refines.
    Chat {
        /// Snapshot file to resume from
        #[arg(long)]
        resume: Option<PathBuf>,

        /// Where each successful render is written
        #[arg(long, default_value = "dotflow-graph.png")]
        image: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

/// Contents of the `--config` file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct CliConfig {
    render: RenderConfig,
    generator: GeneratorConfig,
    session: SessionConfig,
}

/// Result of validating a response.
#[derive(Debug, Serialize)]
struct ValidateResult {
    valid: bool,
    stage: Option<String>,
    graph_name: Option<String>,
    digest: Option<String>,
    node_count: usize,
    edge_count: usize,
    errors: Vec<ValidationIssue>,
}

#[derive(Debug, Serialize)]
struct ValidationIssue {
    message: String,
    line: Option<usize>,
    column: Option<usize>,
}

#[derive(Debug, Serialize)]
struct LocateResult {
    located: Option<LocatedExecutable>,
    narrow: Option<LocatedExecutable>,
    candidates: Vec<df_render::DiscoveryCandidate>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(error) = init_tracing(cli.verbose, cli.quiet, cli.log_format) {
        eprintln!("dotflow: logging is disabled: {error}");
    }
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Extract { input } => cmd_extract(&input),
        Command::Sanitize { input } => cmd_sanitize(&input),
        Command::Validate { input, json } => cmd_validate(&input, json),
        Command::Metrics {
            input,
            json,
            report,
        } => cmd_metrics(&input, json, report),
        Command::Render {
            input,
            output,
            base64,
        } => cmd_render(&config, &input, output.as_deref(), base64),
        Command::Locate { json } => cmd_locate(&config, json),
        Command::Process {
            input,
            prompt,
            pretty,
        } => cmd_process(&config, &input, &prompt, pretty),
        Command::Chat { resume, image } => cmd_chat(&config, resume.as_deref(), &image),
    }
}

fn init_tracing(
    verbose: u8,
    quiet: bool,
    format: LogFormat,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .without_time();
    match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
}

fn load_config(path: Option<&Path>) -> Result<CliConfig> {
    let Some(path) = path else {
        return Ok(CliConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    let config = parse_config(path, &text)
        .with_context(|| format!("Invalid config: {}", path.display()))?;
    debug!(path = %path.display(), "loaded configuration");
    Ok(config)
}

fn parse_config(path: &Path, text: &str) -> Result<CliConfig> {
    let yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
    if yaml {
        Ok(serde_yaml::from_str(text)?)
    } else {
        Ok(toml::from_str(text)?)
    }
}

fn load_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read from stdin")?;
        Ok(buffer)
    } else if Path::new(input).exists() {
        fs::read_to_string(input).context(format!("Failed to read file: {input}"))
    } else {
        // Treat as inline text
        Ok(input.to_string())
    }
}

fn write_output_bytes(output: Option<&Path>, content: &[u8]) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, content)
                .with_context(|| format!("Failed to write to: {}", path.display()))?;
            info!("Wrote output to: {}", path.display());
        }
        None => {
            io::stdout()
                .write_all(content)
                .context("Failed to write to stdout")?;
        }
    }
    Ok(())
}

fn build_pipeline(config: &RenderConfig) -> Pipeline {
    let environment = ProbeEnvironment::capture(config);
    Pipeline::from_config(config, &environment)
}

// =============================================================================
// Commands: extract, sanitize
// =============================================================================

fn cmd_extract(input: &str) -> Result<()> {
    let raw = load_input(input)?;
    let candidate = extract_candidate(&raw)?;
    println!("{candidate}");
    Ok(())
}

fn cmd_sanitize(input: &str) -> Result<()> {
    let raw = load_input(input)?;
    let candidate = extract_candidate(&raw)?;
    let sanitized = Sanitizer::default().apply(&candidate)?;
    println!("{sanitized}");
    Ok(())
}

// =============================================================================
// Command: validate
// =============================================================================

fn cmd_validate(input: &str, json_output: bool) -> Result<()> {
    let raw = load_input(input)?;
    let result = validate_result(&raw);

    if json_output {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        if result.valid {
            println!(
                "✓ Valid digraph{}",
                result
                    .graph_name
                    .as_deref()
                    .map(|name| format!(" {name}"))
                    .unwrap_or_default()
            );
            println!("  Nodes: {}", result.node_count);
            println!("  Edges: {}", result.edge_count);
        } else {
            println!(
                "✗ Invalid graph description ({})",
                result.stage.as_deref().unwrap_or("unknown stage")
            );
        }
        for issue in &result.errors {
            let location = match (issue.line, issue.column) {
                (Some(line), Some(column)) => format!(" (line {line}, col {column})"),
                _ => String::new(),
            };
            println!("  {}{location}", issue.message);
        }
    }

    if !result.valid {
        std::process::exit(1);
    }
    Ok(())
}

fn validate_result(raw: &str) -> ValidateResult {
    match prepare_document(raw, &Sanitizer::default()) {
        Ok(document) => {
            let parsed = document.parsed_graph();
            ValidateResult {
                valid: true,
                stage: None,
                graph_name: document.graph_name().map(str::to_string),
                digest: Some(document.digest()),
                node_count: parsed.node_count(),
                edge_count: parsed.edge_count(),
                errors: Vec::new(),
            }
        }
        Err(error) => {
            let (line, column) = match &error {
                PrepareError::Validate(ValidationError::Syntax { line, column, .. }) => {
                    (Some(*line), Some(*column))
                }
                _ => (None, None),
            };
            ValidateResult {
                valid: false,
                stage: Some(error.stage().to_string()),
                graph_name: None,
                digest: None,
                node_count: 0,
                edge_count: 0,
                errors: vec![ValidationIssue {
                    message: error.to_string(),
                    line,
                    column,
                }],
            }
        }
    }
}

// =============================================================================
// Command: metrics
// =============================================================================

fn cmd_metrics(input: &str, json_output: bool, report: bool) -> Result<()> {
    let raw = load_input(input)?;
    let document = prepare_document(&raw, &Sanitizer::default())?;
    let analysis = analyze(&document);

    if json_output {
        let output = if report {
            serde_json::to_string_pretty(&analysis)?
        } else {
            serde_json::to_string_pretty(&analysis.metrics)?
        };
        println!("{output}");
        return Ok(());
    }

    print_metrics(&analysis.metrics);
    if report {
        println!("  Components: {}", analysis.components);
        println!("  Self-loops: {}", analysis.self_loops);
        println!("  Collapsed duplicates: {}", analysis.collapsed_duplicates);
        println!("  Isolated nodes: {}", analysis.isolated_nodes);
        debug!(evidence = %parse_evidence_json(&document), "metrics evidence");
    }
    Ok(())
}

fn print_metrics(metrics: &Metrics) {
    println!("  Nodes: {}", metrics.node_count);
    println!("  Edges: {}", metrics.edge_count);
    println!("  Cyclomatic complexity: {}", metrics.cyclomatic_complexity);
}

// =============================================================================
// Command: render
// =============================================================================

fn cmd_render(config: &CliConfig, input: &str, output: Option<&Path>, base64: bool) -> Result<()> {
    let raw = load_input(input)?;
    let pipeline = build_pipeline(&config.render);
    let rendered = pipeline
        .run(&raw)
        .map_err(|failure| anyhow!("{}", failure.error))?;
    info!(
        strategy = %rendered.image.strategy,
        bytes = rendered.image.len(),
        "rendered"
    );

    if base64 {
        let mut text = rendered.image.to_base64();
        text.push('\n');
        write_output_bytes(output, text.as_bytes())
    } else {
        write_output_bytes(output, &rendered.image.bytes)
    }
}

// =============================================================================
// Command: locate
// =============================================================================

fn cmd_locate(config: &CliConfig, json_output: bool) -> Result<()> {
    let environment = ProbeEnvironment::capture(&config.render);
    let locator = ExecutableLocator::new(&config.render, &environment);
    let result = LocateResult {
        located: locator.locate(),
        narrow: locator
            .clone()
            .with_scope(DiscoveryScope::Narrow)
            .locate(),
        candidates: locator.candidates(),
    };

    if json_output {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    match &result.located {
        Some(found) => println!(
            "✓ {} ({})",
            found.path.display(),
            found.source.as_str()
        ),
        None => println!("✗ {} not found", config.render.program_file_name()),
    }
    println!("\nSearched:");
    for candidate in &result.candidates {
        println!("  [{}] {}", candidate.source.as_str(), candidate.path.display());
    }
    Ok(())
}

// =============================================================================
// Command: process
// =============================================================================

fn cmd_process(config: &CliConfig, input: &str, prompt: &str, pretty: bool) -> Result<()> {
    let raw = load_input(input)?;
    let assistant = FlowAssistant::new(
        ScriptedGenerator::with_texts([raw]),
        build_pipeline(&config.render),
        config.generator.settings.clone(),
    );
    let mut session = Session::new(config.session.clone());
    let outcome = assistant.generate(&mut session, prompt);
    let bundle = OutputBundle::new(&outcome, &session);

    let output = if pretty {
        serde_json::to_string_pretty(&bundle)?
    } else {
        serde_json::to_string(&bundle)?
    };
    println!("{output}");

    if !bundle.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

// =============================================================================
// Command: chat
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChatCommand<'a> {
    Generate(&'a str),
    Repair(&'a str),
    Clear,
    History,
    Save(&'a str),
    Quit,
    Blank,
}

impl<'a> ChatCommand<'a> {
    fn parse(line: &'a str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Blank;
        }
        let Some(command) = line.strip_prefix('/') else {
            return Self::Generate(line);
        };
        let (name, rest) = command
            .split_once(char::is_whitespace)
            .map_or((command, ""), |(name, rest)| (name, rest.trim()));
        match name {
            "repair" | "refine" => Self::Repair(rest),
            "clear" => Self::Clear,
            "history" => Self::History,
            "save" => Self::Save(rest),
            "quit" | "exit" => Self::Quit,
            _ => Self::Generate(line),
        }
    }
}

fn cmd_chat(config: &CliConfig, resume: Option<&Path>, image: &Path) -> Result<()> {
    let generator = config.generator.build().with_context(|| {
        format!(
            "chat could not start the {:?} generator backend",
            config.generator.resolved_backend()
        )
    })?;
    let assistant = FlowAssistant::new(
        generator,
        build_pipeline(&config.render),
        config.generator.settings.clone(),
    );

    let mut session = match resume {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read snapshot: {}", path.display()))?;
            let snapshot: SessionSnapshot = serde_json::from_str(&text)
                .with_context(|| format!("Invalid snapshot: {}", path.display()))?;
            Session::from_snapshot(snapshot, config.session.clone())
        }
        None => Session::new(config.session.clone()),
    };

    if let Some(first) = session.turns().first() {
        println!("{}\n", first.content);
    }

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("Failed to read from stdin")?;
        match ChatCommand::parse(&line) {
            ChatCommand::Blank => continue,
            ChatCommand::Quit => break,
            ChatCommand::Clear => {
                session.clear();
                println!("Session cleared.");
            }
            ChatCommand::History => {
                for turn in session.turns() {
                    println!("[{}] {}", turn.role.as_str(), turn.content);
                }
            }
            ChatCommand::Save(path) => {
                if path.is_empty() {
                    println!("Usage: /save <path>");
                    continue;
                }
                let json = serde_json::to_string_pretty(&session.snapshot())?;
                fs::write(path, json).with_context(|| format!("Failed to write to: {path}"))?;
                println!("Saved session to {path}");
            }
            ChatCommand::Generate(text) => {
                let outcome = assistant.generate(&mut session, text);
                report_outcome(&outcome, image)?;
            }
            ChatCommand::Repair(feedback) => {
                let outcome = assistant.repair(&mut session, feedback);
                report_outcome(&outcome, image)?;
            }
        }
    }
    Ok(())
}

fn report_outcome(outcome: &Result<Interaction, InteractionFailure>, image: &Path) -> Result<()> {
    match outcome {
        Ok(interaction) => {
            if !interaction.explanation.is_empty() {
                println!("{}", interaction.explanation);
            }
            print_metrics(&interaction.metrics);
            fs::write(image, &interaction.image.bytes)
                .with_context(|| format!("Failed to write to: {}", image.display()))?;
            println!("  Image: {}\n", image.display());
        }
        Err(failure) => {
            println!("{}", failure.error.user_message());
            if failure.visualization_failed()
                && let Some(metrics) = &failure.metrics
            {
                print_metrics(metrics);
            }
            debug!(code = failure.error.code().as_str(), %failure, "exchange failed");
            println!();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use df_session::GeneratorBackend;

    use super::{ChatCommand, CliConfig, LogFormat, init_tracing, parse_config, validate_result};

    #[test]
    fn chat_commands_parse() {
        assert_eq!(ChatCommand::parse("  "), ChatCommand::Blank);
        assert_eq!(
            ChatCommand::parse("order checkout"),
            ChatCommand::Generate("order checkout")
        );
        assert_eq!(
            ChatCommand::parse("/repair add a retry edge "),
            ChatCommand::Repair("add a retry edge")
        );
        assert_eq!(ChatCommand::parse("/repair"), ChatCommand::Repair(""));
        assert_eq!(ChatCommand::parse("/save out.json"), ChatCommand::Save("out.json"));
        assert_eq!(ChatCommand::parse("/quit"), ChatCommand::Quit);
        assert_eq!(ChatCommand::parse("/history"), ChatCommand::History);
        assert_eq!(ChatCommand::parse("/clear"), ChatCommand::Clear);
        assert_eq!(
            ChatCommand::parse("/unknown thing"),
            ChatCommand::Generate("/unknown thing")
        );
    }

    #[test]
    fn config_reads_toml_and_yaml() {
        let toml = r#"
[render]
timeout_ms = 2500

[generator]
command = "/usr/local/bin/ask"

[generator.settings]
model = "gpt-4o-mini"

[session]
history_window = 3
"#;
        let config = parse_config(Path::new("dotflow.toml"), toml).expect("toml");
        assert_eq!(config.render.timeout_ms, 2500);
        assert_eq!(config.render.program, "dot");
        assert_eq!(config.generator.settings.model, "gpt-4o-mini");
        assert_eq!(config.generator.settings.max_tokens, 1000);
        assert_eq!(config.session.history_window, 3);
        assert_eq!(config.session.max_turns, 50);

        let yaml = "render:\n  program: dot2\nsession:\n  max_turns: 9\n";
        let config = parse_config(Path::new("dotflow.YML"), yaml).expect("yaml");
        assert_eq!(config.render.program, "dot2");
        assert_eq!(config.session.max_turns, 9);
        assert!(config.generator.command.is_none());
    }

    #[test]
    fn config_selects_the_openai_backend() {
        let toml = r#"
[generator]
backend = "openai"
api_base = "https://llm.internal.example/v1"
api_key_env = "DOTFLOW_KEY"
"#;
        let config = parse_config(Path::new("dotflow.toml"), toml).expect("toml");
        assert_eq!(config.generator.resolved_backend(), GeneratorBackend::OpenAi);
        assert_eq!(config.generator.api_base, "https://llm.internal.example/v1");
        assert_eq!(config.generator.api_key_env, "DOTFLOW_KEY");
        assert_eq!(
            CliConfig::default().generator.resolved_backend(),
            GeneratorBackend::OpenAi
        );
    }

    #[test]
    fn second_subscriber_install_reports_failure() {
        let _ = init_tracing(0, true, LogFormat::Text);
        assert!(init_tracing(0, true, LogFormat::Json).is_err());
    }

    #[test]
    fn empty_config_is_default() {
        let config = parse_config(Path::new("empty.toml"), "").expect("empty");
        assert_eq!(config, CliConfig::default());
    }

    #[test]
    fn validate_result_reports_stage_and_position() {
        let ok = validate_result("digraph G { a -> b; b -> c; }");
        assert!(ok.valid);
        assert_eq!(ok.graph_name.as_deref(), Some("G"));
        assert_eq!(ok.node_count, 3);

        let missing = validate_result("no graph here");
        assert!(!missing.valid);
        assert_eq!(missing.stage.as_deref(), Some("extract"));

        let broken = validate_result("digraph G {\n  a -> ;\n}");
        assert_eq!(broken.stage.as_deref(), Some("validate"));
        assert_eq!(broken.errors[0].line, Some(2));
    }
}
