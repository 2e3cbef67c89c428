//! Shared test infrastructure for integration tests.

use serde::Deserialize;
use serde_json::Value;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Environment variables that would leak host configuration into a run.
const SCRUBBED_ENV: &[&str] = &[
    "RUST_LOG",
    "PFEAS_OFFLINE",
    "PFEAS_FIXTURES_DIR",
    "PFEAS_CACHE_DIR",
    "FEAS_LOT_COUNT",
    "FEAS_CONSTRAINT_PENALTY",
    "FEAS_DRIVEWAY_PENALTY",
    "FEAS_ENVELOPE_PENALTY",
    "FEAS_SHORT_PLAT_BONUS",
];

/// The slice of `summary.json` the tests assert on.
#[derive(Debug, Deserialize)]
pub struct Summary {
    pub parcel_id: String,
    pub status: String,
    pub state: String,
    pub zoning_code: Option<String>,
    pub tags: Vec<String>,
    pub warnings: Vec<String>,
    pub layouts: Vec<LayoutRow>,
    pub best_layout_id: Option<String>,
    pub best_score: Option<f64>,
    pub exports: std::collections::BTreeMap<String, PathBuf>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LayoutRow {
    pub id: String,
    pub lot_count: usize,
    pub score: Option<f64>,
    pub cost_estimate: Option<Value>,
}

impl Summary {
    pub fn load(output_dir: &Path) -> anyhow::Result<Self> {
        let bytes = fs::read(output_dir.join("summary.json"))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn risk_tags(&self) -> Vec<&str> {
        self.tags
            .iter()
            .map(String::as_str)
            .filter(|tag| tag.starts_with("RISK_"))
            .collect()
    }
}

fn manifest_dir() -> PathBuf {
    PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".into()))
}

/// The fixture set shipped in `fixtures/`.
pub fn default_fixtures() -> PathBuf {
    manifest_dir().join("fixtures")
}

/// Scratch directories for one offline run.
pub struct OfflineRun {
    pub fixtures: PathBuf,
    pub output: TempDir,
    pub cache: TempDir,
    /// Holds a copied fixture set when the test edits one.
    _scratch: Option<TempDir>,
}

impl OfflineRun {
    pub fn with_default_fixtures() -> Self {
        Self {
            fixtures: default_fixtures(),
            output: tempfile::tempdir().expect("output dir"),
            cache: tempfile::tempdir().expect("cache dir"),
            _scratch: None,
        }
    }

    /// Copy of the default fixtures that the test may edit.
    pub fn with_editable_fixtures() -> Self {
        let scratch = tempfile::tempdir().expect("fixture dir");
        for entry in fs::read_dir(default_fixtures()).expect("read fixtures") {
            let entry = entry.expect("fixture entry");
            fs::copy(entry.path(), scratch.path().join(entry.file_name())).expect("copy fixture");
        }
        Self {
            fixtures: scratch.path().to_path_buf(),
            output: tempfile::tempdir().expect("output dir"),
            cache: tempfile::tempdir().expect("cache dir"),
            _scratch: Some(scratch),
        }
    }

    pub fn write_fixture(&self, name: &str, value: &Value) {
        fs::write(self.fixtures.join(name), value.to_string()).expect("write fixture");
    }

    pub fn output_dir(&self) -> &Path {
        self.output.path()
    }

    /// Run `pfeas run` offline against this run's directories.
    pub fn run(&self, parcel_id: &str, extra: &[&str]) -> Output {
        let mut cmd = pfeas();
        cmd.arg("run")
            .arg("--parcel-id")
            .arg(parcel_id)
            .arg("--offline")
            .arg("--fixtures")
            .arg(&self.fixtures)
            .arg("--cache-dir")
            .arg(self.cache.path())
            .arg("--out")
            .arg(self.output.path())
            .args(extra);
        cmd.output().expect("spawn pfeas")
    }
}

/// A `pfeas` command with host overrides removed.
pub fn pfeas() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_pfeas"));
    for key in SCRUBBED_ENV {
        cmd.env_remove(key);
    }
    cmd
}

pub fn stdout_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}
