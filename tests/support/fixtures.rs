//! Deterministic stroke tables with a clean separation between the classes.

use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stroke_risk::config::Settings;
use stroke_risk::ml::{ModelFamily, ParamValue, SearchGrid};
use stroke_risk::record::{EverMarried, Gender, Record, ResidenceType, SmokingStatus, WorkType};
use tempfile::TempDir;

pub const HEADER: [&str; 12] = [
    "id",
    "gender",
    "age",
    "hypertension",
    "heart_disease",
    "ever_married",
    "work_type",
    "Residence_type",
    "avg_glucose_level",
    "bmi",
    "smoking_status",
    "stroke",
];

const GENDERS: [&str; 3] = ["Male", "Female", "Other"];
const WORK_TYPES: [&str; 5] = ["Private", "Self-employed", "Govt_job", "children", "Never_worked"];
const SMOKING: [&str; 4] = ["formerly smoked", "never smoked", "smokes", "Unknown"];
const RESIDENCE: [&str; 2] = ["Urban", "Rural"];
const MARRIED: [&str; 2] = ["Yes", "No"];

pub struct Fixture {
    pub dir: TempDir,
    pub train: PathBuf,
    pub test: PathBuf,
}

impl Fixture {
    pub fn artifacts_dir(&self) -> PathBuf {
        self.dir.path().join("artifacts")
    }
}

/// Write `train.csv` (120 rows) and `test.csv` (40 rows) into a fresh temp directory.
pub fn write_fixture(seed: u64) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let mut rng = StdRng::seed_from_u64(seed);
    let train = dir.path().join("train.csv");
    let test = dir.path().join("test.csv");
    write_table(&train, &generate_rows(&mut rng, 120, 0));
    write_table(&test, &generate_rows(&mut rng, 40, 10_000));
    Fixture { dir, train, test }
}

/// Rows alternate between the classes; categorical columns cycle so every value occurs
/// in both classes.
pub fn generate_rows(rng: &mut StdRng, n: usize, first_id: usize) -> Vec<Vec<String>> {
    (0..n)
        .map(|i| {
            let stroke = i % 5 < 2;
            let (age, glucose, bmi) = if stroke {
                (
                    rng.random_range(58..=85),
                    rng.random_range(170.0..260.0),
                    rng.random_range(28.0..40.0),
                )
            } else {
                (
                    rng.random_range(2..=45),
                    rng.random_range(70.0..115.0),
                    rng.random_range(16.0..27.0),
                )
            };
            let bmi = if i % 17 == 3 {
                "N/A".to_string()
            } else {
                format!("{bmi:.1}")
            };
            let heart_disease = u8::from(stroke && i % 3 != 0);
            let hypertension = u8::from(stroke && i % 2 == 0);
            vec![
                (first_id + i).to_string(),
                GENDERS[i % GENDERS.len()].to_string(),
                format!("{age}.0"),
                hypertension.to_string(),
                heart_disease.to_string(),
                MARRIED[(i / 2) % MARRIED.len()].to_string(),
                WORK_TYPES[(i / 3) % WORK_TYPES.len()].to_string(),
                RESIDENCE[(i / 5) % RESIDENCE.len()].to_string(),
                format!("{glucose:.2}"),
                bmi,
                SMOKING[(i / 7) % SMOKING.len()].to_string(),
                u8::from(stroke).to_string(),
            ]
        })
        .collect()
}

pub fn write_table(path: &Path, rows: &[Vec<String>]) {
    let mut writer = csv::Writer::from_path(path).unwrap();
    writer.write_record(HEADER).unwrap();
    for row in rows {
        writer.write_record(row).unwrap();
    }
    writer.flush().unwrap();
}

/// Settings with three quick families and small grids, writing into `artifacts`.
pub fn quick_settings(artifacts: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.artifacts.dir = artifacts.to_path_buf();
    settings.training.families = vec![
        ModelFamily::LogisticRegression,
        ModelFamily::DecisionTree,
        ModelFamily::KNeighbors,
    ];
    settings.search.insert(
        ModelFamily::LogisticRegression.as_str().to_string(),
        SearchGrid::new()
            .with("c", [0.1, 1.0])
            .with("solver", ["batch"]),
    );
    settings.search.insert(
        ModelFamily::DecisionTree.as_str().to_string(),
        SearchGrid::new()
            .with("max_depth", [ParamValue::from("none"), 3i64.into()])
            .with("min_samples_split", [2i64]),
    );
    settings.search.insert(
        ModelFamily::KNeighbors.as_str().to_string(),
        SearchGrid::new().with("n_neighbors", [3i64, 5]),
    );
    settings
}

/// [`quick_settings`] plus small grids for the forest and both boosting families, so every
/// family is searched.
pub fn all_family_settings(artifacts: &Path) -> Settings {
    let mut settings = quick_settings(artifacts);
    settings.training.families = ModelFamily::ALL.to_vec();
    settings.search.insert(
        ModelFamily::RandomForest.as_str().to_string(),
        SearchGrid::new()
            .with("n_estimators", [10i64])
            .with("max_depth", [ParamValue::from("none"), 3i64.into()]),
    );
    settings.search.insert(
        ModelFamily::GradientBoosting.as_str().to_string(),
        SearchGrid::new()
            .with("n_estimators", [20i64])
            .with("max_depth", [3i64])
            .with("learning_rate", [0.3]),
    );
    settings.search.insert(
        ModelFamily::ObliviousBoosting.as_str().to_string(),
        SearchGrid::new()
            .with("iterations", [30i64])
            .with("learning_rate", [0.2])
            .with("depth", [3i64])
            .with("l2_leaf_reg", [0.0, 3.0])
            .with("border_count", [16i64])
            .with("bagging_temperature", [1.0]),
    );
    settings
}

pub fn high_risk_record() -> Record {
    Record {
        age: 67,
        bmi: 36.6,
        avg_glucose_level: 228.69,
        gender: Gender::Male,
        ever_married: EverMarried::Yes,
        residence_type: ResidenceType::Urban,
        work_type: WorkType::Private,
        smoking_status: SmokingStatus::FormerlySmoked,
        hypertension: false,
        heart_disease: true,
    }
}

pub fn low_risk_record() -> Record {
    Record {
        age: 3,
        bmi: 18.0,
        avg_glucose_level: 90.0,
        gender: Gender::Female,
        ever_married: EverMarried::No,
        residence_type: ResidenceType::Rural,
        work_type: WorkType::Children,
        smoking_status: SmokingStatus::Unknown,
        hypertension: false,
        heart_disease: false,
    }
}
