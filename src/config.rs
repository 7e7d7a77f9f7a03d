use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::figure::FigureStyle;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Brain area whose RDM comes from the behavioural numerosity judgements.
pub const BEHAVIOR_AREA: &str = "behavior";

// ---------------------------------------------------------------------------
// AnalysisConfig
// ---------------------------------------------------------------------------

/// Parameters of one post-hoc analysis run.
///
/// Defaults reproduce the CORnet-S / DeWind / behaviour run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub model: String,
    pub dataset: String,
    /// `behavior` or a field of the fMRI `RDM` struct (e.g. `IPS345`).
    pub brain_area: String,
    pub layers: Vec<String>,
    pub data_dir: PathBuf,
    pub res_dir: PathBuf,
    /// Number of stimulus conditions the activations are averaged into.
    pub n_conditions: usize,
    /// Consecutive stimuli per condition.
    pub block_size: usize,
    /// Order in which nodes are ranked by their leave-one-out score drop.
    pub rank_order: RankOrder,
    /// Datasets drawn as figure panels when plotting from results.
    pub panels: Vec<PanelSpec>,
    pub figure: FigureStyle,
}

/// Node ranking direction over `score_full - score_each_node`.
///
/// `ascending` reproduces the published overlap values; `descending` puts
/// the node whose removal costs the most first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankOrder {
    #[default]
    Ascending,
    Descending,
}

/// One figure panel: the network training regime it summarises.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelSpec {
    /// Dataset directory under `<model>/`.
    pub dataset: String,
    /// Suffix appended to the model name in the panel title.
    pub label: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            model: "CORnet-S".into(),
            dataset: "DeWind".into(),
            brain_area: BEHAVIOR_AREA.into(),
            layers: ["V1", "V2", "V4", "IT"].map(String::from).to_vec(),
            data_dir: PathBuf::from("./data"),
            res_dir: PathBuf::from("./res"),
            n_conditions: 32,
            block_size: 100,
            rank_order: RankOrder::default(),
            panels: vec![
                PanelSpec {
                    dataset: "ImageNet".into(),
                    label: "ImageNet".into(),
                },
                PanelSpec {
                    dataset: "DeWind".into(),
                    label: "DeWind".into(),
                },
                PanelSpec {
                    dataset: "Untrained".into(),
                    label: "Untrained".into(),
                },
            ],
            figure: FigureStyle::default(),
        }
    }
}

/// Where the human RDM for the configured brain area lives.
#[derive(Debug, Clone, PartialEq)]
pub struct HumanRdmSource {
    pub path: PathBuf,
    pub variable: String,
    /// Struct field to index after loading the variable.
    pub field: Option<String>,
}

impl AnalysisConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, text + "\n").map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.layers.is_empty() {
            return Err(ConfigError::Invalid("at least one layer is required".into()));
        }
        if self.n_conditions < 2 {
            return Err(ConfigError::Invalid(
                "n_conditions must be at least 2 to form an RDM".into(),
            ));
        }
        if self.block_size == 0 {
            return Err(ConfigError::Invalid("block_size must be > 0".into()));
        }
        if self.model.is_empty() || self.dataset.is_empty() || self.brain_area.is_empty() {
            return Err(ConfigError::Invalid(
                "model, dataset and brain_area must be non-empty".into(),
            ));
        }
        Ok(())
    }

    /// Copy of this config pointed at another dataset.
    pub fn with_dataset(&self, dataset: &str) -> Self {
        Self {
            dataset: dataset.to_string(),
            ..self.clone()
        }
    }

    pub fn human_rdm_source(&self) -> HumanRdmSource {
        if self.brain_area == BEHAVIOR_AREA {
            HumanRdmSource {
                path: self.data_dir.join("Number.mat"),
                variable: "Number".into(),
                field: None,
            }
        } else {
            HumanRdmSource {
                path: self.data_dir.join("MRI-RDM.mat"),
                variable: "RDM".into(),
                field: Some(self.brain_area.clone()),
            }
        }
    }

    /// Sequential forward selection results for one layer.
    pub fn selection_path(&self, layer: &str) -> PathBuf {
        self.res_dir
            .join("selection")
            .join("forward")
            .join(&self.brain_area)
            .join(&self.model)
            .join(&self.dataset)
            .join(format!("{layer}.mat"))
    }

    /// ANOVA-selected unit indices for one layer.
    pub fn num_unit_path(&self, layer: &str) -> PathBuf {
        self.res_dir
            .join("num_unit")
            .join(&self.model)
            .join(&self.dataset)
            .join(format!("{layer}.npy"))
    }

    /// Stimulus × unit activations for one layer.
    pub fn activations_path(&self, layer: &str) -> PathBuf {
        self.data_dir
            .join(&self.model)
            .join(&self.dataset)
            .join(format!("{layer}.npy"))
    }

    pub fn figure_path(&self, model_name: &str) -> PathBuf {
        self.res_dir
            .join("figures")
            .join(format!("{model_name}_rsa.png"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_the_reference_run() {
        let config = AnalysisConfig::default();
        assert_eq!(config.model, "CORnet-S");
        assert_eq!(config.layers, vec!["V1", "V2", "V4", "IT"]);
        assert_eq!(config.n_conditions * config.block_size, 3200);
        assert_eq!(config.rank_order, RankOrder::Ascending);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn paths_follow_the_pipeline_layout() {
        let config = AnalysisConfig::default();
        assert_eq!(
            config.selection_path("V4"),
            PathBuf::from("./res/selection/forward/behavior/CORnet-S/DeWind/V4.mat")
        );
        assert_eq!(
            config.num_unit_path("IT"),
            PathBuf::from("./res/num_unit/CORnet-S/DeWind/IT.npy")
        );
        assert_eq!(
            config.activations_path("V1"),
            PathBuf::from("./data/CORnet-S/DeWind/V1.npy")
        );
        assert_eq!(
            config.figure_path("CORnet-Z"),
            PathBuf::from("./res/figures/CORnet-Z_rsa.png")
        );
    }

    #[test]
    fn fmri_areas_index_the_rdm_struct() {
        let mut config = AnalysisConfig::default();
        assert_eq!(config.human_rdm_source().variable, "Number");

        config.brain_area = "IPS345".into();
        let source = config.human_rdm_source();
        assert_eq!(source.path, PathBuf::from("./data/MRI-RDM.mat"));
        assert_eq!(source.variable, "RDM");
        assert_eq!(source.field.as_deref(), Some("IPS345"));
    }

    #[test]
    fn validation_rejects_degenerate_settings() {
        let mut config = AnalysisConfig::default();
        config.layers.clear();
        assert!(config.validate().is_err());

        let mut config = AnalysisConfig::default();
        config.block_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "model": "CORnet-Z", "layers": ["V1", "IT"] }"#).unwrap();

        let config = AnalysisConfig::load(&path).unwrap();
        assert_eq!(config.model, "CORnet-Z");
        assert_eq!(config.layers, vec!["V1", "IT"]);
        assert_eq!(config.dataset, "DeWind");
    }

    #[test]
    fn rank_order_reads_lowercase_names() {
        let config: AnalysisConfig =
            serde_json::from_str(r#"{ "rank_order": "descending" }"#).unwrap();
        assert_eq!(config.rank_order, RankOrder::Descending);
        assert!(serde_json::from_str::<AnalysisConfig>(r#"{ "rank_order": "up" }"#).is_err());
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = AnalysisConfig {
            brain_area: "IPS345".into(),
            ..AnalysisConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(AnalysisConfig::load(&path).unwrap(), config);
    }
}
