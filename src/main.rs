//! Command-line entry point: compile a model configuration, bind weights and
//! print the resulting summary.

use clap::Parser;
use log::info;
use rustylayers::binding::{
    BindingScope, MissingWeightPolicy, NamingStrategy, WeightBindingEngine,
};
use rustylayers::model::Model;
use rustylayers::store::SafeTensorsStore;
use std::path::PathBuf;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "RustyLayers: compile a layer graph and bind trained weights", long_about = None)]
struct Args {
    /// Model configuration (JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// SafeTensors weight file; without it every parameter is initialized by default
    #[arg(short, long)]
    weights: Option<PathBuf>,

    /// Kernel path template, every '%s' is replaced by the layer name
    #[arg(long, requires = "template_bias")]
    template_kernel: Option<String>,

    /// Bias path template, every '%s' is replaced by the layer name
    #[arg(long, requires = "template_kernel")]
    template_bias: Option<String>,

    /// Fail instead of falling back to default initializers for missing weights
    #[arg(long)]
    strict: bool,

    /// Read only non-trainable layers from the weight file
    #[arg(long, conflicts_with = "layers")]
    frozen_only: bool,

    /// Read only these layers from the weight file (comma separated)
    #[arg(long, value_delimiter = ',')]
    layers: Vec<String>,

    /// Seed of the default initializers
    #[arg(long, default_value_t = rustylayers::binding::engine::DEFAULT_SEED)]
    seed: u64,

    /// Write the bound parameters to this SafeTensors file
    #[arg(long)]
    export: Option<PathBuf>,

    /// Only print which store path every parameter would be read from
    #[arg(long, requires = "weights")]
    dry_run: bool,
}

impl Args {
    fn engine(&self) -> WeightBindingEngine {
        let strategy = match (&self.template_kernel, &self.template_bias) {
            (Some(kernel), Some(bias)) => NamingStrategy::template(kernel, bias),
            _ => NamingStrategy::default(),
        };
        let policy = if self.strict {
            MissingWeightPolicy::Fail
        } else {
            MissingWeightPolicy::Initialize
        };
        let scope = if self.frozen_only {
            BindingScope::Frozen
        } else if !self.layers.is_empty() {
            BindingScope::Layers(self.layers.clone())
        } else {
            BindingScope::All
        };
        WeightBindingEngine::new(strategy)
            .with_policy(policy)
            .with_scope(scope)
            .with_seed(self.seed)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut model = Model::from_config_file(&args.config)?;
    // logged at info level
    model.summary();

    let engine = args.engine();
    let report = match &args.weights {
        Some(path) => {
            let store = SafeTensorsStore::open(path)?;
            if args.dry_run {
                for result in model.plan_weights(&store, &engine)? {
                    println!(
                        "{:<40} {:<40} {}",
                        result.slot_name,
                        result.path.as_deref().unwrap_or("-"),
                        result.outcome
                    );
                }
                return Ok(());
            }
            model.load_weights(&store, &engine)?
        }
        None => model.init(args.seed)?,
    };
    println!("{}", report);

    if let Some(path) = &args.export {
        model.save_weights(path)?;
        info!("Exported weights to {}", path.display());
    }
    Ok(())
}
