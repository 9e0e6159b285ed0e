//! # fable
//!
//! Command-line front end: inspect compacted memory for a saved game state,
//! or run one structured generation against the configured provider.

#![deny(unsafe_code)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use fable_core::debug_log::{DebugLogEntry, DebugLogSink};
use fable_core::status::{StatusEvent, StatusSink};
use fable_core::world::GameState;
use fable_engine::{Engine, GenerationRequest};
use fable_llm::build_client;
use fable_settings::AppSettings;
use fable_telemetry::{init_telemetry, TelemetryConfig};

/// Narrative simulation AI tooling.
#[derive(Parser, Debug)]
#[command(name = "fable", about = "Narrative simulation AI tooling")]
struct Cli {
    /// Settings file (defaults to `~/.fable/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print compacted memory for a saved game state.
    #[command(subcommand)]
    Memory(MemoryCommand),
    /// Run one structured generation and print the result.
    Ask(AskArgs),
}

#[derive(Subcommand, Debug)]
enum MemoryCommand {
    /// Recent history of the whole world.
    World {
        /// Game state JSON file.
        #[arg(long)]
        state: PathBuf,
    },
    /// What one actor remembers.
    Actor {
        #[arg(long)]
        state: PathBuf,
        /// Character id, `system`, or `env_<locationId>`.
        #[arg(long)]
        actor: String,
    },
}

#[derive(Args, Debug)]
struct AskArgs {
    /// Prompt template file.
    #[arg(long)]
    template: PathBuf,

    /// JSON object substituted into the template.
    #[arg(long)]
    data: Option<String>,

    /// Game state JSON file; adds `worldMemory` (and `memory` with `--character`) to the data.
    #[arg(long)]
    state: Option<PathBuf>,

    /// Character whose context and memory apply.
    #[arg(long, requires = "state")]
    character: Option<String>,

    /// Stream the response and preview one field as it arrives.
    #[arg(long, requires = "field")]
    stream: bool,

    /// Field that must be present in the response (previewed with `--stream`).
    #[arg(long)]
    field: Option<String>,

    /// Echo debug log entries to stderr as JSON lines.
    #[arg(long)]
    debug_log: bool,
}

/// Status events go to the log; there is no UI to color.
struct TraceStatusSink;

impl StatusSink for TraceStatusSink {
    fn emit(&self, event: StatusEvent) {
        debug!(request_id = %event.id, color = ?event.color, "request status");
    }
}

/// Text to print when the streamed preview changes from `printed` to `value`:
/// the new tail, or the whole value on a fresh line if earlier text changed.
fn preview_update(printed: &str, value: &str) -> String {
    match value.strip_prefix(printed) {
        Some(tail) => tail.to_string(),
        None => format!("\n{value}"),
    }
}

fn load_state(path: &Path) -> Result<GameState> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read game state: {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid game state: {}", path.display()))
}

fn load(path: Option<&Path>) -> Result<AppSettings> {
    let settings = match path {
        Some(path) => fable_settings::load_settings_from_path(path),
        None => fable_settings::load_settings(),
    };
    settings.context("Failed to load settings")
}

fn run_memory(settings: &AppSettings, command: &MemoryCommand) -> Result<()> {
    let memory = &settings.memory;
    let text = match command {
        MemoryCommand::World { state } => {
            let state = load_state(state)?;
            fable_memory::build_world_memory(
                &state.history,
                state.round,
                memory.world_rounds,
                memory.token_limit,
                None,
            )
        }
        MemoryCommand::Actor { state, actor } => {
            let state = load_state(state)?;
            fable_memory::build_actor_memory(
                &state.history,
                actor,
                state.actor_location(actor),
                memory.actor_capacity,
                memory.token_limit,
                &state.characters,
                &state.locations,
                None,
            )
        }
    };
    println!("{text}");
    Ok(())
}

async fn run_ask(settings: AppSettings, args: &AskArgs) -> Result<()> {
    let template = std::fs::read_to_string(&args.template)
        .with_context(|| format!("Failed to read template: {}", args.template.display()))?;
    let data: Value = match &args.data {
        Some(raw) => serde_json::from_str(raw).context("--data must be a JSON object")?,
        None => Value::Object(serde_json::Map::new()),
    };
    if !data.is_object() {
        bail!("--data must be a JSON object");
    }
    let state = args.state.as_deref().map(load_state).transpose()?;

    let client = build_client(&settings.ai, &settings.api_keys)?;
    let mut engine = Engine::new(Arc::new(client), settings, Arc::new(TraceStatusSink));
    if args.debug_log {
        let sink = |entry: DebugLogEntry| {
            if let Ok(line) = serde_json::to_string(&entry) {
                eprintln!("{line}");
            }
        };
        engine = engine.with_debug_log(Arc::new(sink) as Arc<dyn DebugLogSink>);
    }

    let mut request = GenerationRequest::new(template).with_data(data);
    if let Some(state) = &state {
        let world = engine.world_memory(state, Some(request.images_mut()));
        request.set("worldMemory", world);
        if let Some(id) = &args.character {
            let character = state
                .character(id)
                .with_context(|| format!("Unknown character: {id}"))?;
            let memory = engine.actor_memory(state, id, Some(request.images_mut()));
            request.set("memory", memory);
            request = request.for_character(character);
        }
    }
    info!(model = engine.client().model(), images = request.images.len(), "request prepared");

    if args.stream {
        let field = args.field.as_deref().unwrap_or_default();
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        let _ = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_interrupt.cancel();
            }
        });

        let mut printed = String::new();
        let mut stdout = std::io::stdout();
        let raw = engine
            .stream_field(
                &request,
                field,
                |value| {
                    let _ = write!(stdout, "{}", preview_update(&printed, value));
                    let _ = stdout.flush();
                    printed = value.to_string();
                },
                cancel,
            )
            .await?;
        println!();
        debug!(raw_len = raw.len(), "stream complete");
        return Ok(());
    }

    let field = args.field.clone();
    let result: Option<Value> = engine
        .generate_json(&request, |value| match &field {
            Some(field) => value.get(field).is_some(),
            None => value.is_object(),
        })
        .await;
    match result {
        Some(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        None => bail!("Generation failed after retries"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load(cli.settings.as_deref())?;
    let _telemetry = init_telemetry(TelemetryConfig::from_level_name(
        &settings.logging.level,
        settings.logging.json,
    ));

    match &cli.command {
        Command::Memory(command) => run_memory(&settings, command),
        Command::Ask(args) => run_ask(settings, args).await,
    }
}
