use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use dprof_cluster::Clustering;
use dprof_core::{discover_datasets, parse_options, PopulationPolicy, SimilarityMatrix};
use dprof_similarity::{new_estimator, EstimatorType};
use dprof_storage::{load_matrix, load_matrix_with_index, save_estimator, save_matrix, ClusterReport};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Dataset profiler: pairwise similarities and hierarchical clustering
#[derive(Parser, Debug)]
#[command(name = "dprof")]
#[command(about = "Estimate dataset similarities and cluster datasets", long_about = None)]
struct Args {
    /// Log level
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Estimate the similarity matrix of every dataset in a directory
    Similarities {
        /// Directory holding the datasets
        #[arg(short, long)]
        input: PathBuf,

        /// Matrix output file; the dataset index goes to <output>.idx
        #[arg(short, long)]
        output: PathBuf,

        /// Estimator type (jaccard, correlation, order, size, script, script-pair, composite, random)
        #[arg(short = 't', long = "type")]
        estimator: EstimatorType,

        /// Estimator options, key=value pairs separated by commas
        #[arg(long = "opt", default_value = "")]
        options: String,

        /// Population policy: FULL, APRX,count=k or APRX,threshold=t
        #[arg(short, long, default_value = "FULL")]
        policy: PopulationPolicy,

        /// Max number of threads
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Also save the whole estimator to this file
        #[arg(short, long)]
        estimator_file: Option<PathBuf>,
    },

    /// Cluster the datasets of a similarity matrix
    Clusters {
        /// Matrix file
        #[arg(short, long)]
        similarities: PathBuf,

        /// Dataset index, defaults to <similarities>.idx
        #[arg(short = 'x', long)]
        index: Option<PathBuf>,

        /// Max number of threads
        #[arg(short, long, default_value_t = 1)]
        concurrency: usize,

        /// Print the clusters of this level only
        #[arg(short, long)]
        level: Option<usize>,

        /// JSON report output
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compare matrices against the most complete one
    Compare {
        #[arg(required = true)]
        matrices: Vec<PathBuf>,
    },

    /// List the options of one or all estimator types
    Options {
        #[arg(short = 't', long = "type")]
        estimator: Option<EstimatorType>,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Similarities {
            input,
            output,
            estimator,
            options,
            policy,
            concurrency,
            estimator_file,
        } => similarities(SimilaritiesArgs {
            input,
            output,
            estimator,
            options,
            policy,
            concurrency,
            estimator_file,
        }),
        Command::Clusters {
            similarities,
            index,
            concurrency,
            level,
            output,
        } => clusters(similarities, index, concurrency, level, output),
        Command::Compare { matrices } => compare(&matrices),
        Command::Options { estimator } => {
            list_options(estimator);
            Ok(())
        }
    }
}

struct SimilaritiesArgs {
    input: PathBuf,
    output: PathBuf,
    estimator: EstimatorType,
    options: String,
    policy: PopulationPolicy,
    concurrency: Option<usize>,
    estimator_file: Option<PathBuf>,
}

fn similarities(args: SimilaritiesArgs) -> anyhow::Result<()> {
    let datasets = discover_datasets(&args.input)
        .with_context(|| format!("Failed to list datasets in {}", args.input.display()))?;
    info!("Found {} datasets in {}", datasets.len(), args.input.display());

    let mut estimator = new_estimator(args.estimator, datasets.clone());
    let options = parse_options(&args.options)?;
    estimator
        .configure(&options)
        .with_context(|| format!("Invalid options for {}", args.estimator))?;
    estimator.set_population_policy(args.policy);
    if let Some(concurrency) = args.concurrency {
        estimator.set_concurrency(concurrency)?;
    }
    estimator.compute()?;

    let matrix = estimator.similarity_matrix();
    save_matrix(&args.output, matrix, &datasets)?;
    if let Some(path) = &args.estimator_file {
        save_estimator(path, estimator.as_ref())?;
    }
    println!(
        "{} pairs populated, {} fully calculated nodes, {:?}",
        matrix.populated_cells(),
        matrix.fully_calculated_nodes(),
        estimator.duration()
    );
    Ok(())
}

fn clusters(
    similarities: PathBuf,
    index: Option<PathBuf>,
    concurrency: usize,
    level: Option<usize>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let (matrix, datasets) = load_matrix_with_index(&similarities, index.as_deref())?;
    let mut clustering = Clustering::new(matrix, datasets)?.with_concurrency(concurrency);
    let dendrogram = clustering.compute()?;

    let (height_max, height_min) = dendrogram.heights();
    let levels: Vec<usize> = match level {
        Some(level) => vec![level],
        None => (0..=height_max).collect(),
    };
    let report = ClusterReport::from_dendrogram(dendrogram, levels);

    if level.is_none() {
        print!("{}", dendrogram);
    }
    println!("heights: max {}, min {}", height_max, height_min);
    for level in &report.levels {
        println!("level {}: {} clusters", level.level, level.clusters.len());
        for cluster in &level.clusters {
            println!("\t{}", cluster.join(" "));
        }
    }

    if let Some(path) = output {
        report.save(&path)?;
        info!("Cluster report written to {}", path.display());
    }
    Ok(())
}

/// Index of the most populated matrix, and each matrix's Frobenius
/// distance to it over the cells both populate
fn compare_matrices(matrices: &[SimilarityMatrix]) -> anyhow::Result<(usize, Vec<f64>)> {
    let reference = matrices
        .iter()
        .enumerate()
        .max_by_key(|(i, m)| (m.populated_cells(), std::cmp::Reverse(*i)))
        .map(|(i, _)| i)
        .context("No matrices to compare")?;
    let distances = matrices
        .iter()
        .map(|m| m.frobenius_distance(&matrices[reference]))
        .collect::<dprof_core::Result<Vec<_>>>()?;
    Ok((reference, distances))
}

fn compare(paths: &[PathBuf]) -> anyhow::Result<()> {
    let matrices = paths
        .iter()
        .map(|p| load_matrix(p))
        .collect::<anyhow::Result<Vec<_>>>()?;
    if let Some(m) = matrices.iter().find(|m| m.capacity() != matrices[0].capacity()) {
        bail!(
            "Matrices differ in size: {} vs {}",
            matrices[0].capacity(),
            m.capacity()
        );
    }
    let (reference, distances) = compare_matrices(&matrices)?;
    println!("reference: {}", paths[reference].display());
    for ((path, m), distance) in paths.iter().zip(&matrices).zip(distances) {
        println!(
            "{}\t{} fully calculated nodes\t{} pairs\t{:.6}",
            path.display(),
            m.fully_calculated_nodes(),
            m.populated_cells(),
            distance
        );
    }
    Ok(())
}

fn list_options(estimator: Option<EstimatorType>) {
    let types: Vec<EstimatorType> = match estimator {
        Some(t) => vec![t],
        None => EstimatorType::ALL.to_vec(),
    };
    for t in types {
        println!("{}", t);
        for (key, description) in new_estimator(t, Vec::new()).options() {
            println!("\t{:<14}{}", key, description);
        }
    }
}
