use std::collections::HashMap;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use retina_block_registry::{BlockRegistry, InitParameters};
use retina_compiler::compile;
use retina_config::WorkflowDefinition;
use retina_engine::{EngineConfig, ExecutionEngine, RuntimeParameters};

/// Retina - A declarative workflow engine for computer-vision pipelines
#[derive(Parser)]
#[command(name = "retina")]
#[command(version, about, long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Compile a workflow and print the execution plan
  Compile {
    /// Path to the workflow definition (JSON)
    workflow_file: PathBuf,

    /// Init parameter as key=value; the value is parsed as JSON when possible
    #[arg(long = "init", value_name = "KEY=VALUE")]
    init: Vec<String>,
  },

  /// Run a workflow with runtime parameters read as a JSON object from stdin
  Run {
    /// Path to the workflow definition (JSON)
    workflow_file: PathBuf,

    /// Maximum number of steps executing at once
    #[arg(long)]
    max_concurrent_steps: Option<usize>,

    /// Init parameter as key=value; the value is parsed as JSON when possible
    #[arg(long = "init", value_name = "KEY=VALUE")]
    init: Vec<String>,
  },

  /// List the available blocks and their contracts
  Blocks,
}

fn main() -> Result<()> {
  init_tracing();
  let cli = Cli::parse();

  match cli.command {
    Some(Commands::Compile {
      workflow_file,
      init,
    }) => compile_workflow(&workflow_file, &init)?,
    Some(Commands::Run {
      workflow_file,
      max_concurrent_steps,
      init,
    }) => run_workflow(&workflow_file, max_concurrent_steps, &init)?,
    Some(Commands::Blocks) => list_blocks()?,
    None => {
      println!("retina - use --help to see available commands");
    }
  }

  Ok(())
}

fn init_tracing() {
  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    )
    .with_writer(io::stderr)
    .init();
}

fn registry() -> Result<BlockRegistry> {
  retina_blocks::builtin_registry().context("failed to register built-in blocks")
}

fn load_definition(workflow_file: &Path) -> Result<WorkflowDefinition> {
  let content = std::fs::read_to_string(workflow_file)
    .with_context(|| format!("failed to read workflow file: {}", workflow_file.display()))?;
  WorkflowDefinition::from_json(&content)
    .with_context(|| format!("failed to parse workflow file: {}", workflow_file.display()))
}

fn parse_init_parameters(pairs: &[String]) -> Result<InitParameters> {
  let mut parameters = InitParameters::new();
  for pair in pairs {
    let Some((key, raw)) = pair.split_once('=') else {
      bail!("invalid init parameter '{pair}', expected KEY=VALUE");
    };
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    parameters.insert(key.to_string(), value);
  }
  Ok(parameters)
}

fn compile_workflow(workflow_file: &Path, init: &[String]) -> Result<()> {
  let definition = load_definition(workflow_file)?;
  let init_parameters = parse_init_parameters(init)?;
  let plan = compile(&definition, &init_parameters, &registry()?).context("invalid workflow")?;

  println!("{}", serde_json::to_string_pretty(&plan)?);
  Ok(())
}

fn run_workflow(
  workflow_file: &Path,
  max_concurrent_steps: Option<usize>,
  init: &[String],
) -> Result<()> {
  let definition = load_definition(workflow_file)?;
  let init_parameters = parse_init_parameters(init)?;
  let config = match max_concurrent_steps {
    Some(n) => EngineConfig::with_max_concurrent_steps(n),
    None => EngineConfig::from_env(),
  };

  let engine = ExecutionEngine::init(&definition, &init_parameters, &registry()?, config)
    .context("invalid workflow")?;
  let runtime_parameters = read_runtime_parameters()?;

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        warn!("interrupt received, cancelling workflow");
        on_interrupt.cancel();
      }
    });

    let results = engine
      .run_async_with_cancel(runtime_parameters, cancel)
      .await
      .context("workflow execution failed")?;

    info!(records = results.len(), "workflow finished");
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok::<(), anyhow::Error>(())
  })
}

fn list_blocks() -> Result<()> {
  let registry = registry()?;
  let manifests: Vec<_> = registry
    .block_types()
    .into_iter()
    .filter_map(|block_type| registry.manifest(block_type))
    .collect();
  println!("{}", serde_json::to_string_pretty(&manifests)?);
  Ok(())
}

fn read_runtime_parameters() -> Result<RuntimeParameters> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    return Ok(HashMap::new());
  }

  let mut input = String::new();
  io::stdin()
    .read_to_string(&mut input)
    .context("failed to read runtime parameters from stdin")?;

  if input.trim().is_empty() {
    return Ok(HashMap::new());
  }
  serde_json::from_str(&input).context("failed to parse runtime parameters JSON from stdin")
}
