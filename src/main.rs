use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use weft_config::{FlowData, Tweaks, apply_tweaks};
use weft_engine::{
  Engine, EngineConfig, INPUT_FIELD_NAME, PassthroughBuilder, Recorder, RunEvent, RunRequest,
};
use weft_graph::{Graph, flatten};
use weft_resolver::StandardResolver;
use weft_storage::{ByteStream, Error as StorageError, FsStorage, Storage};

/// Weft - a dataflow engine for component flows
#[derive(Parser)]
#[command(name = "weft")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.weft)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a flow, echoing each vertex's parameters as its output
  Run {
    /// Path to the flow file (JSON)
    flow_file: PathBuf,

    #[command(flatten)]
    scope: ScopeArgs,

    /// Input value overlaid on input vertices, as key=value
    #[arg(long = "input", value_parser = parse_key_value)]
    inputs: Vec<(String, String)>,

    /// Vertex whose result to print (id or display name); repeatable
    #[arg(long = "output")]
    outputs: Vec<String>,

    /// Per-node template overrides (JSON file)
    #[arg(long)]
    tweaks: Option<PathBuf>,

    /// Write the run's event log to this file
    #[arg(long)]
    record: Option<PathBuf>,

    /// Look up stored variables in the environment
    #[arg(long)]
    env_fallback: bool,
  },

  /// Print the build order of a flow, layer by layer
  Plan {
    /// Path to the flow file (JSON)
    flow_file: PathBuf,

    #[command(flatten)]
    scope: ScopeArgs,
  },

  /// Print a flow with its groups spliced out
  Flatten {
    /// Path to the flow file (JSON)
    flow_file: PathBuf,
  },

  /// Manage the files flows read from storage
  Files {
    #[command(subcommand)]
    action: FilesAction,
  },
}

#[derive(Subcommand)]
enum FilesAction {
  /// Copy a local file into a namespace
  Put {
    /// Namespace to store the file under (usually the flow id)
    namespace: String,

    /// Local file to upload
    path: PathBuf,

    /// Name to store the file as (default: the local file name)
    #[arg(long)]
    name: Option<String>,
  },

  /// List the files in a namespace
  List {
    namespace: String,
  },

  /// Write a stored file to stdout
  Get {
    namespace: String,
    name: String,
  },

  /// Delete a stored file
  Rm {
    namespace: String,
    name: String,
  },
}

#[derive(clap::Args)]
struct ScopeArgs {
  /// Run only this vertex and what depends on it
  #[arg(long, conflicts_with = "stop")]
  start: Option<String>,

  /// Run only this vertex and what it depends on
  #[arg(long)]
  stop: Option<String>,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
  raw
    .split_once('=')
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .ok_or_else(|| format!("expected key=value, got '{raw}'"))
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_env("WEFT_LOG").unwrap_or_else(|_| EnvFilter::new("warn")))
    .with_writer(io::stderr)
    .init();

  let cli = Cli::parse();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".weft"),
  };

  match cli.command {
    Some(Commands::Run {
      flow_file,
      scope,
      inputs,
      outputs,
      tweaks,
      record,
      env_fallback,
    }) => {
      let options = RunOptions {
        flow_file,
        scope,
        inputs,
        outputs,
        tweaks,
        record,
        env_fallback,
        data_dir,
      };
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(run_flow(options))?;
    }
    Some(Commands::Plan { flow_file, scope }) => {
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(plan_flow(flow_file, scope))?;
    }
    Some(Commands::Flatten { flow_file }) => {
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(flatten_flow(flow_file))?;
    }
    Some(Commands::Files { action }) => {
      let storage = FsStorage::new(data_dir.join("files"));
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(manage_files(&storage, action))?;
    }
    None => {
      println!("weft - use --help to see available commands");
    }
  }

  Ok(())
}

struct RunOptions {
  flow_file: PathBuf,
  scope: ScopeArgs,
  inputs: Vec<(String, String)>,
  outputs: Vec<String>,
  tweaks: Option<PathBuf>,
  record: Option<PathBuf>,
  env_fallback: bool,
  data_dir: PathBuf,
}

async fn load_flow(flow_file: &Path) -> Result<FlowData> {
  let content = tokio::fs::read_to_string(flow_file)
    .await
    .with_context(|| format!("failed to read flow file: {}", flow_file.display()))?;
  FlowData::from_json(&content)
    .with_context(|| format!("failed to parse flow file: {}", flow_file.display()))
}

async fn run_flow(options: RunOptions) -> Result<()> {
  let mut flow = load_flow(&options.flow_file).await?;

  if let Some(path) = &options.tweaks {
    let content = tokio::fs::read_to_string(path)
      .await
      .with_context(|| format!("failed to read tweaks file: {}", path.display()))?;
    let tweaks: Tweaks = serde_json::from_str(&content)
      .with_context(|| format!("failed to parse tweaks file: {}", path.display()))?;
    let applied = apply_tweaks(&mut flow, &tweaks);
    info!(applied, "tweaks_applied");
  }

  let graph = Arc::new(Graph::from_flow(&flow).context("failed to build graph")?);
  eprintln!("Loaded flow with {} vertices", graph.len());

  let mut request = RunRequest::new()
    .with_inputs(read_payload_from_stdin()?)
    .with_outputs(options.outputs);
  for (name, value) in options.inputs {
    request = request.with_input(name, value);
  }
  if let Some(start) = options.scope.start {
    request = request.starting_at(start);
  }
  if let Some(stop) = options.scope.stop {
    request = request.stopping_at(stop);
  }

  let cancel = CancellationToken::new();
  let ctrl_c = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      ctrl_c.cancel();
    }
  });
  request = request.with_cancel(cancel);

  let storage = FsStorage::new(options.data_dir.join("files"));
  let config = EngineConfig {
    fallback_to_env_vars: options.env_fallback,
    ..EngineConfig::default()
  };
  let engine = Engine::new(
    Arc::new(PassthroughBuilder),
    Arc::new(StandardResolver::new(storage)),
  )
  .with_config(config);

  let recorder = Arc::new(Recorder::new());
  if options.record.is_some() {
    engine.register_observer(recorder.clone());
  }

  let mut stream = engine.run(graph, request);
  let mut summary = None;
  while let Some(event) = stream.next().await {
    match event.context("flow run failed")? {
      RunEvent::Built(build) => eprintln!("Built {}", build.vertex_id),
      RunEvent::Finished(finished) => summary = Some(finished),
    }
  }
  let Some(summary) = summary else {
    bail!("flow run ended without a summary");
  };

  if let Some(path) = &options.record {
    recorder
      .save(path)
      .await
      .with_context(|| format!("failed to write event log: {}", path.display()))?;
    eprintln!("Event log written to {}", path.display());
  }

  eprintln!("Run completed: {}", summary.run_id);
  eprintln!("Vertices built: {}", summary.call_order.len());
  if !summary.inactive.is_empty() {
    eprintln!("Inactive: {}", summary.inactive.join(", "));
  }

  let output: serde_json::Map<String, serde_json::Value> = summary
    .outputs
    .into_iter()
    .map(|build| {
      let values = build
        .outputs
        .into_iter()
        .map(|(name, output)| (name, output.value))
        .collect();
      (build.vertex_id, serde_json::Value::Object(values))
    })
    .collect();
  println!("{}", serde_json::to_string_pretty(&output)?);

  Ok(())
}

async fn plan_flow(flow_file: PathBuf, scope: ScopeArgs) -> Result<()> {
  let flow = load_flow(&flow_file).await?;
  let graph = Graph::from_flow(&flow).context("failed to build graph")?;

  let lookup = |name: &str| {
    graph
      .vertex_by_name(name)
      .map(|v| v.id.clone())
      .with_context(|| format!("vertex '{name}' not found"))
  };
  let vertices = match (scope.start.as_deref(), scope.stop.as_deref()) {
    (Some(start), _) => Some(graph.downstream_closure(&lookup(start)?)?),
    (_, Some(stop)) => Some(graph.upstream_closure(&lookup(stop)?)?),
    _ => None,
  };

  let layers = graph.layers(vertices.as_ref()).context("failed to order flow")?;
  println!("{}", serde_json::to_string_pretty(&layers)?);
  Ok(())
}

async fn flatten_flow(flow_file: PathBuf) -> Result<()> {
  let flow = load_flow(&flow_file).await?;
  let flat = flatten(&flow).context("failed to flatten flow")?;
  println!("{}", serde_json::to_string_pretty(&flat)?);
  Ok(())
}

async fn manage_files(storage: &dyn Storage, action: FilesAction) -> Result<()> {
  match action {
    FilesAction::Put {
      namespace,
      path,
      name,
    } => {
      let name = match name {
        Some(name) => name,
        None => path
          .file_name()
          .and_then(|n| n.to_str())
          .map(str::to_string)
          .with_context(|| format!("cannot derive a file name from {}", path.display()))?,
      };
      let file = tokio::fs::File::open(&path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))?;
      let data: ByteStream = Box::pin(ReaderStream::new(file).map(|chunk| chunk.map_err(StorageError::from)));
      storage
        .save_file(&namespace, &name, data)
        .await
        .with_context(|| format!("failed to store {namespace}/{name}"))?;
      let size = storage.get_file_size(&namespace, &name).await?;
      info!(namespace = %namespace, file_name = %name, size, "file_stored");
      println!("{}", storage.build_full_path(&namespace, &name)?.display());
    }
    FilesAction::List { namespace } => {
      for name in storage.list_files(&namespace).await? {
        let size = storage.get_file_size(&namespace, &name).await?;
        println!("{size}\t{name}");
      }
    }
    FilesAction::Get { namespace, name } => {
      let mut data = storage
        .get_file(&namespace, &name)
        .await
        .with_context(|| format!("failed to read {namespace}/{name}"))?;
      let mut stdout = tokio::io::stdout();
      while let Some(chunk) = data.next().await {
        stdout.write_all(&chunk?).await?;
      }
      stdout.flush().await?;
    }
    FilesAction::Rm { namespace, name } => {
      storage
        .delete_file(&namespace, &name)
        .await
        .with_context(|| format!("failed to delete {namespace}/{name}"))?;
      info!(namespace = %namespace, file_name = %name, "file_deleted");
    }
  }
  Ok(())
}

/// Stdin payload: a JSON object of inputs, or a bare string taken as the
/// input value.
fn read_payload_from_stdin() -> Result<serde_json::Map<String, serde_json::Value>> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    return Ok(serde_json::Map::new());
  }

  let mut input = String::new();
  io::stdin()
    .read_to_string(&mut input)
    .context("failed to read payload from stdin")?;
  if input.trim().is_empty() {
    return Ok(serde_json::Map::new());
  }

  let payload: serde_json::Value =
    serde_json::from_str(&input).context("failed to parse payload JSON from stdin")?;
  match payload {
    serde_json::Value::Object(map) => Ok(map),
    serde_json::Value::String(text) => {
      let mut map = serde_json::Map::new();
      map.insert(INPUT_FIELD_NAME.to_string(), serde_json::Value::String(text));
      Ok(map)
    }
    other => bail!("stdin payload must be a JSON object or string, got {other}"),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_files_put_list_rm() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FsStorage::new(dir.path().join("files"));
    let upload = dir.path().join("notes.txt");
    tokio::fs::write(&upload, b"hello").await.unwrap();

    manage_files(
      &storage,
      FilesAction::Put {
        namespace: "flow-1".to_string(),
        path: upload,
        name: None,
      },
    )
    .await
    .unwrap();
    assert_eq!(storage.list_files("flow-1").await.unwrap(), vec!["notes.txt"]);
    assert_eq!(storage.get_file_size("flow-1", "notes.txt").await.unwrap(), 5);

    manage_files(
      &storage,
      FilesAction::Rm {
        namespace: "flow-1".to_string(),
        name: "notes.txt".to_string(),
      },
    )
    .await
    .unwrap();
    assert!(storage.list_files("flow-1").await.unwrap().is_empty());

    let missing = manage_files(
      &storage,
      FilesAction::Rm {
        namespace: "flow-1".to_string(),
        name: "notes.txt".to_string(),
      },
    )
    .await;
    assert!(missing.is_err());
  }
}
