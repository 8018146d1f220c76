//! braid-node — operator binary for the Braid consensus engine.
//!
//! Commands:
//!   replay      feed a JSON file of vertices through `process`, in order
//!   twin        build a twin of a raw transaction (new parents or weight)
//!   difficulty  weight required for the next block
//!   meta        consensus metadata of one vertex

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};

use braid_consensus::{ConsensusEngine, VoidedTransition};
use braid_core::clock::SystemClock;
use braid_core::config::ConsensusConfig;
use braid_core::types::VertexId;
use braid_core::vertex::Vertex;
use braid_dag::metadata::VertexMetadata;
use braid_dag::twin::{make_twin, TwinOptions};
use braid_state::SledStore;

#[derive(Parser, Debug)]
#[command(name = "braid-node", version, about = "Braid DAG consensus engine")]
struct Args {
    /// Directory for the persistent DAG store.
    #[arg(long, default_value = "~/.braid/data")]
    data_dir: PathBuf,

    /// Consensus parameters as JSON. Missing fields use network defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process every vertex of a JSON array file, in order.
    Replay {
        #[arg(long)]
        file: PathBuf,
    },
    /// Create a twin of a transaction given as hex-encoded bincode.
    Twin {
        #[arg(long)]
        raw_tx: String,
        /// Two comma-separated parent ids. Default: swap the existing parents.
        #[arg(long, value_delimiter = ',')]
        parents: Vec<String>,
        /// New declared weight.
        #[arg(long)]
        weight: Option<f64>,
        /// Print the twin as JSON instead of raw hex.
        #[arg(long)]
        human: bool,
    },
    /// Weight required for a block on top of `tip` (default: best block).
    Difficulty {
        #[arg(long)]
        tip: Option<String>,
    },
    /// Print the metadata of a vertex.
    Meta {
        #[arg(long)]
        id: String,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,braid_consensus=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    // Twins are built offline; no store needed.
    if let Command::Twin { raw_tx, parents, weight, human } = &args.command {
        return twin(raw_tx, parents, *weight, *human);
    }

    let config = match &args.config {
        Some(path) => ConsensusConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ConsensusConfig::default(),
    };

    // ── Store and engine ──────────────────────────────────────────────────────
    let data_dir = expand_tilde(&args.data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;
    let store = Arc::new(SledStore::open(&data_dir).context("opening DAG store")?);
    let engine = ConsensusEngine::open(Arc::clone(&store), config, Arc::new(SystemClock))
        .context("starting consensus engine")?;

    match args.command {
        Command::Replay { file } => replay(&engine, &file)?,
        Command::Difficulty { tip } => {
            let tip = match tip {
                Some(hex) => parse_id(&hex)?,
                None => engine.best_block().context("store has no blocks")?.id,
            };
            let weight = engine.required_difficulty(&tip)?;
            println!("{}", serde_json::json!({ "tip": tip.to_hex(), "weight": weight }));
        }
        Command::Meta { id } => {
            let id = parse_id(&id)?;
            let meta = engine
                .get_metadata(&id)?
                .with_context(|| format!("vertex {id} not found"))?;
            println!("{}", serde_json::to_string_pretty(&metadata_json(&id, &meta))?);
        }
        Command::Twin { .. } => unreachable!("handled before opening the store"),
    }

    store.flush()?;
    Ok(())
}

fn replay(engine: &ConsensusEngine<SledStore>, file: &Path) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let vertices: Vec<Vertex> =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", file.display()))?;
    info!(count = vertices.len(), "replaying vertices");

    let (mut accepted, mut deferred, mut rejected, mut flips) = (0usize, 0usize, 0usize, 0usize);
    for vertex in vertices {
        let id = vertex.id();
        match engine.process(vertex) {
            Ok(changes) => {
                accepted += 1;
                for change in &changes.changes {
                    if change.transition != VoidedTransition::Unchanged {
                        flips += 1;
                        debug!(vertex = %change.id, transition = ?change.transition, "voided status changed");
                    }
                }
            }
            Err(e) if e.is_fatal() => bail!("fatal error at {id}: {e}"),
            Err(e) if e.is_retryable() => {
                warn!(vertex = %id, error = %e, "vertex deferred");
                deferred += 1;
            }
            Err(e) => {
                warn!(vertex = %id, error = %e, "vertex rejected");
                rejected += 1;
            }
        }
    }

    println!(
        "{}",
        serde_json::json!({
            "accepted": accepted,
            "deferred": deferred,
            "rejected": rejected,
            "status_changes": flips,
            "best_block": engine.best_block().map(|b| b.id.to_hex()),
        })
    );
    Ok(())
}

fn twin(raw_tx: &str, parents: &[String], weight: Option<f64>, human: bool) -> anyhow::Result<()> {
    let bytes = hex::decode(raw_tx.trim()).context("raw tx is not hex")?;
    let tx: Vertex = bincode::deserialize(&bytes).context("decoding raw tx")?;

    let parents = match parents {
        [] => None,
        [a, b] => Some([parse_id(a)?, parse_id(b)?]),
        other => bail!("expected two parents, got {}", other.len()),
    };
    let twin = make_twin(&tx, &TwinOptions { parents, weight })?;

    if human {
        println!("{}", serde_json::to_string_pretty(&vertex_json(&twin))?);
    } else {
        println!("{}", hex::encode(bincode::serialize(&twin)?));
    }
    Ok(())
}

fn parse_id(s: &str) -> anyhow::Result<VertexId> {
    VertexId::from_hex(s.trim()).with_context(|| format!("invalid vertex id {s:?}"))
}

fn hex_ids<'a, I: IntoIterator<Item = &'a VertexId>>(ids: I) -> Vec<String> {
    ids.into_iter().map(VertexId::to_hex).collect()
}

fn metadata_json(id: &VertexId, meta: &VertexMetadata) -> serde_json::Value {
    let spent: serde_json::Map<String, serde_json::Value> = meta
        .spent_outputs
        .iter()
        .map(|(index, spenders)| (index.to_string(), hex_ids(spenders).into()))
        .collect();
    serde_json::json!({
        "id": id.to_hex(),
        "accumulated_weight": meta.accumulated_weight,
        "score": meta.score,
        "height": meta.height,
        "voided": meta.is_voided(),
        "voided_by": hex_ids(&meta.voided_by),
        "conflict_with": hex_ids(&meta.conflict_with),
        "twins": hex_ids(&meta.twins),
        "spent_outputs": spent,
    })
}

fn vertex_json(vertex: &Vertex) -> serde_json::Value {
    let inputs: Vec<serde_json::Value> = vertex
        .inputs()
        .iter()
        .map(|i| serde_json::json!({ "tx_id": i.tx_id.to_hex(), "index": i.index }))
        .collect();
    let outputs: Vec<serde_json::Value> = vertex
        .outputs()
        .iter()
        .map(|o| {
            serde_json::json!({
                "value": o.value,
                "script": hex::encode(&o.script),
                "token_data": o.token_data,
            })
        })
        .collect();
    serde_json::json!({
        "id": vertex.id().to_hex(),
        "kind": format!("{:?}", vertex.kind()),
        "parents": hex_ids(vertex.parents()),
        "timestamp": vertex.timestamp(),
        "weight": vertex.weight(),
        "nonce": vertex.nonce(),
        "inputs": inputs,
        "outputs": outputs,
    })
}

/// Expand a leading `~` to the user's home directory (`HOME` or `USERPROFILE`).
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}
