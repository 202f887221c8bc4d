//! Train every configured classifier family and persist the best one.

use std::path::PathBuf;

use stroke_risk::config::{self, Settings};
use stroke_risk::logging;
use stroke_risk::ml::ModelFamily;
use stroke_risk::ml::metrics::{ConfusionMatrix, precision_recall_by_class};
use stroke_risk::pipeline::{FamilySummary, TrainOutcome, TrainingPipeline};

fn main() {
    match run() {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    }
}

/// Returns whether a model was accepted.
fn run() -> Result<bool, String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    if let Err(err) = logging::init() {
        eprintln!("Logging disabled: {err}");
    }
    let settings = load_settings(&options)?;
    let pipeline = TrainingPipeline::new(settings);
    let outcome = pipeline
        .run(&options.train, &options.test)
        .map_err(|err| err.to_string())?;

    match outcome {
        TrainOutcome::Accepted(report) => {
            print_families(&report.families);
            println!();
            println!(
                "chosen: {} ({})  params: {}",
                report.chosen.family.display_name(),
                report.chosen.family,
                report.chosen.params
            );
            println!("test accuracy: {:.4}", report.test_accuracy);
            print_confusion(&report.confusion);
            println!();
            println!("preprocessor: {}", report.preprocessor_path.display());
            println!("model:        {}", report.model_path.display());
            Ok(true)
        }
        TrainOutcome::Rejected {
            best,
            min_accuracy,
            families,
        } => {
            print_families(&families);
            println!();
            println!(
                "no acceptable model: best was {} at {:.4}, below {:.4}; nothing saved",
                best.family, best.test_accuracy, min_accuracy
            );
            Ok(false)
        }
    }
}

fn load_settings(options: &CliOptions) -> Result<Settings, String> {
    let mut settings = match &options.config {
        Some(path) => config::load_from(path),
        None => config::load(),
    }
    .map_err(|err| err.to_string())?;
    if let Some(dir) = &options.artifacts {
        settings.artifacts.dir = dir.clone();
    }
    if let Some(seed) = options.seed {
        settings.training.seed = seed;
    }
    if let Some(min_accuracy) = options.min_accuracy {
        settings.training.min_accuracy = min_accuracy;
    }
    if let Some(families) = &options.families {
        settings.training.families = families.clone();
    }
    Ok(settings)
}

fn print_families(families: &[FamilySummary]) {
    println!("{:<22} {:>8} {:>8}  params", "family", "cv", "test");
    for family in families {
        println!(
            "{:<22} {:>8.4} {:>8.4}  {}",
            family.family.as_str(),
            family.cv_accuracy,
            family.test_accuracy,
            family.params
        );
    }
}

fn print_confusion(cm: &ConfusionMatrix) {
    let names = ["no stroke", "stroke"];
    for (class, stats) in precision_recall_by_class(cm).iter().enumerate() {
        println!(
            "class {class} {:<10}  precision={:.3}  recall={:.3}  f1={:.3}  support={}",
            names[class], stats.precision, stats.recall, stats.f1, stats.support
        );
    }
    println!("confusion matrix (rows=true, cols=pred):");
    for truth in 0..2u8 {
        println!("{:6}{:6}", cm.get(truth, 0), cm.get(truth, 1));
    }
}

#[derive(Debug, Clone)]
struct CliOptions {
    train: PathBuf,
    test: PathBuf,
    config: Option<PathBuf>,
    artifacts: Option<PathBuf>,
    seed: Option<u64>,
    min_accuracy: Option<f64>,
    families: Option<Vec<ModelFamily>>,
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut train: Option<PathBuf> = None;
    let mut test: Option<PathBuf> = None;
    let mut config = None;
    let mut artifacts = None;
    let mut seed = None;
    let mut min_accuracy = None;
    let mut families = None;

    let mut idx = 0usize;
    while idx < args.len() {
        let flag = args[idx].as_str();
        if matches!(flag, "-h" | "--help") {
            return Err(help_text());
        }
        idx += 1;
        let value = args
            .get(idx)
            .ok_or_else(|| match flag {
                "--train" | "--test" | "--config" | "--artifacts" | "--seed"
                | "--min-accuracy" | "--families" => format!("{flag} requires a value"),
                unknown => format!("Unknown argument: {unknown}\n\n{}", help_text()),
            })?;
        match flag {
            "--train" => train = Some(PathBuf::from(value)),
            "--test" => test = Some(PathBuf::from(value)),
            "--config" => config = Some(PathBuf::from(value)),
            "--artifacts" => artifacts = Some(PathBuf::from(value)),
            "--seed" => {
                seed = Some(
                    value
                        .parse::<u64>()
                        .map_err(|_| format!("Invalid --seed value: {value}"))?,
                );
            }
            "--min-accuracy" => {
                min_accuracy = Some(
                    value
                        .parse::<f64>()
                        .ok()
                        .filter(|v| v.is_finite())
                        .ok_or_else(|| format!("Invalid --min-accuracy value: {value}"))?,
                );
            }
            "--families" => {
                families = Some(
                    value
                        .split(',')
                        .map(|name| name.trim().parse::<ModelFamily>())
                        .collect::<Result<Vec<_>, _>>()?,
                );
            }
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }

    Ok(CliOptions {
        train: train.ok_or_else(help_text)?,
        test: test.ok_or_else(help_text)?,
        config,
        artifacts,
        seed,
        min_accuracy,
        families,
    })
}

fn help_text() -> String {
    [
        "stroke-train",
        "",
        "Searches every configured classifier family and saves the preprocessor and best model.",
        "",
        "Usage:",
        "  stroke-train --train <csv> --test <csv> [options]",
        "",
        "Options:",
        "  --train <csv>          Training table with a stroke column (required).",
        "  --test <csv>           Held-out table with a stroke column (required).",
        "  --config <toml>        Settings file (default: <app root>/config.toml).",
        "  --artifacts <dir>      Artifact directory (overrides [artifacts] dir).",
        "  --seed <u64>           Search seed (overrides [training] seed).",
        "  --min-accuracy <f64>   Acceptance threshold (overrides [training] min_accuracy).",
        "  --families <a,b,...>   Families to search, e.g. decision_tree,k_neighbors.",
        "",
        "Exit status is 2 when no family reaches the threshold; nothing is saved then.",
    ]
    .join("\n")
}
