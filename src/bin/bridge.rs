//! Model Bridge CLI
//!
//! Checks transformation definitions, exports the transformation graph and
//! runs conversions on JSON models.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use model_bridge::config::BridgeConfig;
use model_bridge::model::model_to_json;
use model_bridge::{DynamicModel, RecordConverter, TransformationEngine, TypeRegistry};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "model-bridge")]
#[command(about = "Convert models to records and between model types")]
struct Cli {
    /// Configuration file (defaults to bridge.toml lookup)
    #[arg(short, long)]
    config: Option<String>,

    /// JSON file with type descriptors (overrides [types] path)
    #[arg(short, long)]
    types: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse definition files and summarise them
    Check {
        /// Definition files or directories (defaults to configured directories)
        paths: Vec<PathBuf>,
    },

    /// Export the transformation graph in DOT format
    Graph {
        paths: Vec<PathBuf>,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Flatten a JSON model into records
    Flatten {
        /// Type id of the model
        #[arg(long = "type")]
        type_id: String,

        /// JSON file holding the model
        input: PathBuf,
    },

    /// Transform a JSON model into another type
    Transform {
        #[arg(short, long)]
        source: String,

        #[arg(short = 'T', long)]
        target: String,

        /// Require the transformation with this id
        #[arg(long)]
        id: Option<String>,

        /// JSON file holding the source model
        input: PathBuf,

        /// Definition files or directories (defaults to configured directories)
        #[arg(short, long)]
        definitions: Vec<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("❌ Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = BridgeConfig::load_from(cli.config.as_deref()).context("loading configuration")?;
    let types = load_types(&config, cli.types.as_deref())?;

    match cli.command {
        Commands::Check { paths } => {
            let engine = TransformationEngine::from_config(types, &config);
            let count = load_definitions(&engine, &config, &paths)?;
            for description in engine.registry().descriptions() {
                println!(
                    "   {} ({} steps{})",
                    description,
                    description.steps.len(),
                    description
                        .file_name
                        .as_deref()
                        .map(|f| format!(", {}", f))
                        .unwrap_or_default()
                );
            }
            println!("✅ {} transformation descriptions are valid", count);
        }

        Commands::Graph { paths, output } => {
            let engine = TransformationEngine::from_config(types, &config);
            load_definitions(&engine, &config, &paths)?;
            let dot = engine.graph().to_dot();
            match output {
                Some(path) => {
                    std::fs::write(&path, &dot).with_context(|| format!("writing {}", path.display()))?;
                    println!(
                        "✅ Exported graph ({} types, {} transformations) to: {:?}",
                        engine.graph().type_count(),
                        engine.graph().edge_count(),
                        path
                    );
                }
                None => print!("{}", dot),
            }
        }

        Commands::Flatten { type_id, input } => {
            let json = read_json(&input)?;
            let model = DynamicModel::from_json(&*types, &type_id, &json)?;
            let converter = RecordConverter::new(types);
            let flattened = converter.flatten(&model, &config.identity);
            println!("{}", serde_json::to_string_pretty(&flattened.records)?);
        }

        Commands::Transform {
            source,
            target,
            id,
            input,
            definitions,
        } => {
            let engine = TransformationEngine::from_config(types.clone(), &config);
            load_definitions(&engine, &config, &definitions)?;
            let json = read_json(&input)?;
            let model = DynamicModel::from_json(&*types, &source, &json)?;
            let result = match id {
                Some(id) => engine.perform_transformation_with_ids(&source, &target, &[id], &model)?,
                None => engine.perform_transformation(&source, &target, &model)?,
            };
            println!("{}", serde_json::to_string_pretty(&model_to_json(result.as_ref()))?);
        }
    }

    Ok(())
}

fn load_types(config: &BridgeConfig, path: Option<&Path>) -> anyhow::Result<Arc<TypeRegistry>> {
    let registry = Arc::new(TypeRegistry::new());
    let path = path.map(Path::to_path_buf).or_else(|| config.types.path.clone());
    match path {
        Some(path) => {
            registry
                .load_file(&path)
                .with_context(|| format!("loading types from {}", path.display()))?;
        }
        None => bail!("no type descriptors given; pass --types or set [types] path"),
    }
    Ok(registry)
}

/// Load definitions from explicit paths, or the configured directories
fn load_definitions(engine: &TransformationEngine, config: &BridgeConfig, paths: &[PathBuf]) -> anyhow::Result<usize> {
    let paths = if paths.is_empty() {
        config.definition_directories()
    } else {
        paths.to_vec()
    };
    if paths.is_empty() {
        bail!("no definition files given and no [definitions] directories configured");
    }

    let load_config = config.definitions.load_config();
    let mut count = 0;
    for path in paths {
        if path.is_dir() {
            let bundle = engine
                .load_directory(&path, &load_config)
                .with_context(|| format!("loading definitions from {}", path.display()))?;
            eprintln!(
                "📦 {}: {} files, {} descriptions (hash {})",
                path.display(),
                bundle.files.len(),
                bundle.description_count(),
                &bundle.bundle_hash[..12]
            );
            count += bundle.description_count();
        } else {
            count += engine
                .add_descriptions_from_file(&path)
                .with_context(|| format!("loading definitions from {}", path.display()))?;
        }
    }
    Ok(count)
}

fn read_json(path: &Path) -> anyhow::Result<serde_json::Value> {
    let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}
