use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use credit_inference::{
    config::Config,
    logging,
    predictor::Predictor,
    server, trainer,
    verifier::{self, VerifierClient},
};

#[derive(Parser)]
#[command(name = "crinf")]
#[command(version)]
#[command(about = "Credit score regression: train, serve, and fetch the on-chain verifier", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true, env = "CRINF_CONFIG")]
    config: Option<PathBuf>,

    /// Log level or filter directives (RUST_LOG takes precedence)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train the regressor on a JSON dataset and save the model artifact
    Train {
        /// Dataset file (array of records or object of columns)
        #[arg(short, long)]
        dataset: Option<PathBuf>,

        /// Where to write the model artifact
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Seed for the train/holdout split
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Serve predictions over HTTP
    Serve {
        /// Model artifact produced by `train`
        #[arg(short, long)]
        model: Option<PathBuf>,

        /// Bind address
        #[arg(long)]
        bind: Option<String>,

        /// Server port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Download the generated Solidity verifier for a circuit
    FetchVerifier {
        /// Circuit identifier
        #[arg(long)]
        circuit_id: Option<String>,

        /// Output file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Base URL of the circuit service API
        #[arg(long)]
        api_url: Option<String>,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path).with_context(|| format!("loading {}", path.display())),
        None => Ok(Config::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_ref())?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    logging::init(&config.logging.level)?;

    match cli.command {
        Commands::Train {
            dataset,
            output,
            seed,
        } => {
            if let Some(dataset) = dataset {
                config.training.dataset_path = dataset;
            }
            if let Some(output) = output {
                config.training.model_path = output;
            }
            if let Some(seed) = seed {
                config.training.seed = seed;
            }
            config.validate()?;

            let training = config.training;
            let report = tokio::task::spawn_blocking(move || trainer::run(&training)).await??;
            info!(
                "Trained {} trees on {} records (holdout RMSE {:.4})",
                report.num_trees, report.train_rows, report.holdout_rmse
            );
        }

        Commands::Serve { model, bind, port } => {
            if let Some(model) = model {
                config.server.model_path = model;
            }
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            config.validate()?;

            let predictor = Predictor::load(&config.server.model_path)
                .context("model artifact must load before the service starts")?;
            info!(
                "Loaded model from {} ({} features)",
                config.server.model_path.display(),
                predictor.model().feature_columns.len()
            );
            server::serve(predictor, &config.server, async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await?;
        }

        Commands::FetchVerifier {
            circuit_id,
            output,
            api_url,
        } => {
            if let Some(circuit_id) = circuit_id {
                config.verifier.circuit_id = circuit_id;
            }
            if let Some(output) = output {
                config.verifier.output_path = output;
            }
            if let Some(api_url) = api_url {
                config.verifier.api_url = api_url;
            }
            config.validate()?;

            let settings = config.verifier;
            tokio::task::spawn_blocking(move || {
                let client =
                    VerifierClient::from_env(&settings.api_url, &settings.api_key_env)?;
                verifier::fetch_and_write(&client, &settings.circuit_id, &settings.output_path)
            })
            .await??;
        }
    }

    Ok(())
}
