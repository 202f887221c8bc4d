//! Predict stroke risk for one record using the saved artifacts. Prints `0` or `1`.

use std::io::Read;
use std::path::PathBuf;

use stroke_risk::config;
use stroke_risk::logging;
use stroke_risk::pipeline::PredictPipeline;
use stroke_risk::record::{Record, parse_flag};

const GENERIC_FAILURE: &str = "Could not produce a prediction. Check the input values and that a model has been trained.";

fn main() {
    let options = match parse_args(std::env::args().skip(1).collect()) {
        Ok(options) => options,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };
    if let Err(err) = logging::init() {
        eprintln!("Logging disabled: {err}");
    }
    match run(options) {
        Ok(label) => println!("{label}"),
        Err(err) => {
            tracing::error!("Prediction failed: {err}");
            eprintln!("{GENERIC_FAILURE}");
            std::process::exit(1);
        }
    }
}

fn run(options: CliOptions) -> Result<u8, String> {
    let mut settings = match &options.config {
        Some(path) => config::load_from(path),
        None => config::load(),
    }
    .map_err(|err| err.to_string())?;
    if let Some(dir) = options.artifacts {
        settings.artifacts.dir = dir;
    }
    let record = match options.input {
        Input::Json(source) => read_json_record(&source)?,
        Input::Fields(fields) => fields.into_record()?,
    };
    let pipeline = PredictPipeline::from_settings(&settings);
    let prediction = pipeline.predict(&record).map_err(|err| err.to_string())?;
    Ok(prediction.as_u8())
}

fn read_json_record(source: &str) -> Result<Record, String> {
    let text = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|err| format!("Failed to read stdin: {err}"))?;
        buf
    } else {
        std::fs::read_to_string(source).map_err(|err| format!("Failed to read {source}: {err}"))?
    };
    serde_json::from_str(&text).map_err(|err| format!("Invalid record JSON: {err}"))
}

#[derive(Debug, Clone)]
enum Input {
    /// Path to a JSON record, or `-` for stdin.
    Json(String),
    Fields(FieldArgs),
}

#[derive(Debug, Clone, Default)]
struct FieldArgs {
    age: Option<String>,
    bmi: Option<String>,
    avg_glucose_level: Option<String>,
    gender: Option<String>,
    ever_married: Option<String>,
    residence_type: Option<String>,
    work_type: Option<String>,
    smoking_status: Option<String>,
    hypertension: Option<String>,
    heart_disease: Option<String>,
}

impl FieldArgs {
    fn into_record(self) -> Result<Record, String> {
        fn required(value: Option<String>, flag: &str) -> Result<String, String> {
            value.ok_or_else(|| format!("{flag} is required\n\n{}", help_text()))
        }
        fn number(value: Option<String>, flag: &str) -> Result<f64, String> {
            let text = required(value, flag)?;
            text.trim()
                .parse::<f64>()
                .map_err(|_| format!("Invalid {flag} value: {text}"))
        }
        let age_text = required(self.age, "--age")?;
        let age = age_text
            .trim()
            .parse::<u32>()
            .map_err(|_| format!("Invalid --age value: {age_text}"))?;
        let text_err = |err: stroke_risk::record::RecordError| err.to_string();
        Ok(Record {
            age,
            bmi: number(self.bmi, "--bmi")?,
            avg_glucose_level: number(self.avg_glucose_level, "--glucose")?,
            gender: required(self.gender, "--gender")?.parse().map_err(text_err)?,
            ever_married: required(self.ever_married, "--ever-married")?
                .parse()
                .map_err(text_err)?,
            residence_type: required(self.residence_type, "--residence")?
                .parse()
                .map_err(text_err)?,
            work_type: required(self.work_type, "--work-type")?
                .parse()
                .map_err(text_err)?,
            smoking_status: required(self.smoking_status, "--smoking")?
                .parse()
                .map_err(text_err)?,
            hypertension: parse_flag(
                "hypertension",
                &required(self.hypertension, "--hypertension")?,
            )
            .map_err(text_err)?,
            heart_disease: parse_flag(
                "heart_disease",
                &required(self.heart_disease, "--heart-disease")?,
            )
            .map_err(text_err)?,
        })
    }
}

#[derive(Debug, Clone)]
struct CliOptions {
    input: Input,
    config: Option<PathBuf>,
    artifacts: Option<PathBuf>,
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut json: Option<String> = None;
    let mut fields = FieldArgs::default();
    let mut config = None;
    let mut artifacts = None;

    let mut idx = 0usize;
    while idx < args.len() {
        let flag = args[idx].as_str();
        if matches!(flag, "-h" | "--help") {
            return Err(help_text());
        }
        let slot: &mut Option<String> = match flag {
            "--json" => &mut json,
            "--age" => &mut fields.age,
            "--bmi" => &mut fields.bmi,
            "--glucose" => &mut fields.avg_glucose_level,
            "--gender" => &mut fields.gender,
            "--ever-married" => &mut fields.ever_married,
            "--residence" => &mut fields.residence_type,
            "--work-type" => &mut fields.work_type,
            "--smoking" => &mut fields.smoking_status,
            "--hypertension" => &mut fields.hypertension,
            "--heart-disease" => &mut fields.heart_disease,
            "--config" | "--artifacts" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| format!("{flag} requires a value"))?;
                if flag == "--config" {
                    config = Some(PathBuf::from(value));
                } else {
                    artifacts = Some(PathBuf::from(value));
                }
                idx += 1;
                continue;
            }
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        };
        idx += 1;
        let value = args
            .get(idx)
            .ok_or_else(|| format!("{flag} requires a value"))?;
        *slot = Some(value.clone());
        idx += 1;
    }

    let input = match json {
        Some(source) => Input::Json(source),
        None => Input::Fields(fields),
    };
    Ok(CliOptions {
        input,
        config,
        artifacts,
    })
}

fn help_text() -> String {
    [
        "stroke-predict",
        "",
        "Predicts stroke risk (0 or 1) for one patient record using the saved artifacts.",
        "",
        "Usage:",
        "  stroke-predict --json <file|-> [--config <toml>] [--artifacts <dir>]",
        "  stroke-predict --age <n> --bmi <f64> --glucose <f64> --gender <Male|Female|Other>",
        "                 --ever-married <Yes|No> --residence <Urban|Rural>",
        "                 --work-type <Private|Self-employed|Govt_job|children|Never_worked>",
        "                 --smoking <'formerly smoked'|'never smoked'|smokes|Unknown>",
        "                 --hypertension <0|1> --heart-disease <0|1>",
        "",
        "The JSON form uses the table column names, e.g. \"Residence_type\" and",
        "\"avg_glucose_level\". Logs go to stderr; stdout carries only the label.",
    ]
    .join("\n")
}
