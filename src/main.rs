//! Continual Streams CLI
//!
//! Drives the streams of this crate over synthetic datasets and reports what
//! they produced.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use continual_streams::drift::{DriftConfig, DriftProcess};
use continual_streams::partition::{DatasetPartitioner, PartitionConfig};
use continual_streams::runner::{drive_batches, drive_samples};
use continual_streams::sequence::{SequenceConfig, StreamSequencer};
use continual_streams::{run, HeldOut, RunConfig, SyntheticProvider};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "continual_streams")]
#[command(about = "Non-stationary data streams for continual learning")]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    data: DataArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Size of the synthetic stand-in datasets
#[derive(Args)]
struct DataArgs {
    /// Training samples per dataset
    #[arg(long, global = true, default_value = "50000")]
    train_len: usize,

    /// Test samples per dataset
    #[arg(long, global = true, default_value = "10000")]
    test_len: usize,

    /// Seed for the synthetic pixels and labels
    #[arg(long, global = true, default_value = "0")]
    data_seed: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate samples from a drifting regression process
    Drift {
        /// Drift policy (stationary, smooth, discrete_periodic, discrete_single_coordinate)
        #[arg(short, long, default_value = "stationary")]
        policy: String,

        /// Input distribution (gaussian, rademacher)
        #[arg(short, long, default_value = "gaussian")]
        distribution: String,

        /// Target function
        #[arg(short, long, default_value = "relu_network")]
        target: String,

        /// Steps between discrete changes
        #[arg(long)]
        change_freq: Option<u64>,

        /// Time scale of the smooth policy
        #[arg(long)]
        drift_period: Option<f64>,

        /// Redraw the target every change_freq steps
        #[arg(long)]
        change_target: bool,

        /// Random seed
        #[arg(short, long)]
        seed: Option<u64>,

        /// Number of samples
        #[arg(short = 'n', long, default_value = "1000")]
        steps: u64,

        /// Write samples as JSON lines to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run a task-partitioned image stream
    Partition {
        /// Dataset (mnist, fashion_mnist, cifar10, cifar100)
        #[arg(short, long, default_value = "cifar10")]
        dataset: String,

        /// Partition strategy (samples, classes)
        #[arg(long, default_value = "samples")]
        strategy: String,

        /// Base steps per task
        #[arg(long, default_value = "1000")]
        change_freq: u64,

        #[arg(short, long, default_value = "32")]
        batch_size: usize,

        /// Train on the union of all tasks seen so far
        #[arg(long)]
        accumulate: bool,

        #[arg(short, long)]
        seed: Option<u64>,

        #[arg(short = 'n', long, default_value = "1000")]
        steps: u64,
    },

    /// Run a sequence of image stream families
    Sequence {
        /// Family names, used in turn (e.g. sequence_cifar10_random_inputs_random_labels)
        #[arg(short, long = "family", default_value = "sequence_cifar10")]
        families: Vec<String>,

        /// Steps per segment
        #[arg(long, default_value = "1000")]
        change_freq: u64,

        #[arg(short, long, default_value = "128")]
        batch_size: usize,

        /// Master seed
        #[arg(short, long)]
        seed: Option<u64>,

        #[arg(short = 'n', long, default_value = "3000")]
        steps: u64,
    },

    /// Run a stream described by a JSON configuration file
    Run {
        /// Configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let data = &cli.data;
    let provider = SyntheticProvider::new(data.train_len, data.test_len, data.data_seed);

    match cli.command {
        Commands::Drift {
            policy,
            distribution,
            target,
            change_freq,
            drift_period,
            change_target,
            seed,
            steps,
            output,
        } => {
            let config = DriftConfig {
                policy: policy.parse()?,
                distribution: distribution.parse()?,
                target: target.parse()?,
                change_target,
                change_freq,
                drift_period,
                seed,
                ..Default::default()
            };
            info!(
                "Drift process: {} policy, {} target",
                config.policy, config.target
            );
            let mut process = DriftProcess::new(config)?;

            let summary = match output {
                Some(path) => {
                    let mut writer = BufWriter::new(File::create(&path)?);
                    let summary = drive_samples(&mut process, steps, "drift", |sample| {
                        serde_json::to_writer(&mut writer, sample)?;
                        writer.write_all(b"\n")?;
                        Ok(())
                    })?;
                    writer.flush()?;
                    info!("Wrote {} samples to {}", summary.items, path.display());
                    summary
                }
                None => drive_samples(&mut process, steps, "drift", |_| Ok(()))?,
            };
            println!("{}", summary);
        }

        Commands::Partition {
            dataset,
            strategy,
            change_freq,
            batch_size,
            accumulate,
            seed,
            steps,
        } => {
            let config = PartitionConfig {
                dataset: dataset.parse()?,
                strategy: strategy.parse()?,
                change_freq,
                batch_size,
                accumulate,
                seed,
                ..Default::default()
            };
            let mut stream = DatasetPartitioner::new(config, &provider)?;
            let summary = drive_batches(&mut stream, steps, "partition");

            println!("{}", summary);
            println!("Active task: {}", stream.active_task());
            println!("Plans drawn: {}", stream.plans_drawn());
            if let Some(test) = stream.test_view() {
                println!("Test samples: {}", test.len());
            }
        }

        Commands::Sequence {
            families,
            change_freq,
            batch_size,
            seed,
            steps,
        } => {
            let config = SequenceConfig {
                families,
                change_freq,
                batch_size,
                seed,
            };
            let mut stream = StreamSequencer::from_config(&config, &provider)?;
            let summary = drive_batches(&mut stream, steps, "sequence");

            println!("{}", summary);
            println!(
                "Segment: {} ({})",
                stream.segment_index(),
                stream.active().kind()
            );
        }

        Commands::Run { config } => {
            let config = RunConfig::from_json_file(&config)?;
            let summary = run(&config, &provider)?;
            println!("{}", summary);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use continual_streams::sequence::StreamFamily;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_family_help_example_resolves() {
        let command = Cli::command();
        let sequence = command.find_subcommand("sequence").unwrap();
        let families = sequence
            .get_arguments()
            .find(|arg| arg.get_id() == "families")
            .unwrap();
        let help = families.get_help().unwrap().to_string();
        let example = help
            .split("e.g. ")
            .nth(1)
            .and_then(|rest| rest.strip_suffix(')'))
            .unwrap();
        assert!(StreamFamily::from_sequence_name(example).is_ok());

        let args = ["continual_streams", "sequence", "--family", example];
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Sequence { families, .. } => assert_eq!(families, vec![example.to_string()]),
            _ => panic!("expected the sequence command"),
        }
    }
}
