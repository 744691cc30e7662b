//! Analysis configuration loaded from YAML.

use crate::data::{ControlLayout, RoleInference};
use crate::error::{QcError, Result};
use crate::qc::CorrelationConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Everything needed to run the QC and filtering steps on a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Name of the analysis, used in reports.
    pub name: String,
    /// Control reference file.
    pub controls: PathBuf,
    /// Column layout of the control reference file.
    pub control_layout: ControlLayout,
    /// Count CSV files or directories of count CSV files.
    pub counts: Vec<PathBuf>,
    /// Regex marking inoculum samples by id when a file has no `role` column.
    /// Defaults to the substring `inoculum`.
    pub inoculum_pattern: Option<String>,
    pub correlation: CorrelationConfig,
    /// Minimum count in every inoculum sample for a barcode to be kept.
    pub threshold: u64,
    /// Restrict QC to one dataset.
    pub dnaid: Option<String>,
    /// Restrict QC to one experiment within `dnaid`.
    pub experiment: Option<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            name: "unnamed".to_string(),
            controls: PathBuf::from("data/controls.txt"),
            control_layout: ControlLayout::default(),
            counts: vec![PathBuf::from("data/counts")],
            inoculum_pattern: None,
            correlation: CorrelationConfig::default(),
            threshold: 1000,
            dnaid: None,
            experiment: None,
        }
    }
}

impl AnalysisConfig {
    /// Load from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(QcError::from)
    }

    /// Save to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(QcError::from)
    }

    /// Load from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| QcError::read(path, e))?;
        Self::from_yaml(&text)
    }

    /// Sample role inference rule for this analysis.
    pub fn role_inference(&self) -> Result<RoleInference> {
        match &self.inoculum_pattern {
            Some(p) => RoleInference::pattern(p),
            None => Ok(RoleInference::default()),
        }
    }

    /// Count files, with directories expanded to their `.csv` files in name order.
    pub fn count_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for path in &self.counts {
            if path.is_dir() {
                let mut entries: Vec<PathBuf> = std::fs::read_dir(path)?
                    .map(|e| e.map(|e| e.path()))
                    .collect::<std::io::Result<_>>()?;
                entries.retain(|p| p.extension().map_or(false, |ext| ext == "csv"));
                entries.sort();
                files.extend(entries);
            } else {
                files.push(path.clone());
            }
        }
        if files.is_empty() {
            return Err(QcError::EmptySelection("no count files found".to_string()));
        }
        Ok(files)
    }
}
