//! Synthetic `data/` + `res/` tree laid out the way [`AnalysisConfig`] expects.
//!
//! Conditions are numerosities `1..=n_conditions`. Every third unit (every
//! fifth for `Untrained`) is tuned to a preferred numerosity on a log scale,
//! so the ANOVA units, the pruning ranking and the behavioural RDM agree.

use std::path::Path;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::config::{AnalysisConfig, RankOrder};
use crate::data::mat::{struct_value, write_mat};
use crate::data::model::{MatFile, MatValue};
use crate::data::npy::{save_indices, save_npy};

/// fMRI regions written into `MRI-RDM.mat`; only `IPS345` carries numerosity.
pub const MRI_AREAS: [&str; 3] = ["IPS345", "V1", "V3ABV7"];

const UNTRAINED: &str = "Untrained";
const TUNING_WIDTH: f64 = 0.5;
const NOISE: f64 = 0.3;
const RDM_NOISE: f64 = 0.2;

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct SampleStats {
    pub mat_files: usize,
    pub npy_files: usize,
}

/// Units in the `index`-th layer.
pub fn layer_units(index: usize) -> usize {
    16 * (index + 1)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    Ok(())
}

fn save_mat(path: &Path, variables: Vec<(&str, MatValue)>, compress: bool) -> Result<()> {
    ensure_parent(path)?;
    let mut file = MatFile::default();
    for (name, value) in variables {
        file.insert(name, value);
    }
    write_mat(path, &file, compress)
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Pairwise `|ln a - ln b|` over the condition numerosities, row-major.
fn log_distance_rdm(n: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(n * n);
    for i in 0..n {
        for j in 0..n {
            out.push((((i + 1) as f64).ln() - ((j + 1) as f64).ln()).abs());
        }
    }
    out
}

/// Symmetric, zero-diagonal copy of `base` with added noise.
fn noisy_rdm(
    rng: &mut StdRng,
    noise: &Normal<f64>,
    n: usize,
    base: &[f64],
    scale: f64,
) -> Vec<f64> {
    let mut out = vec![0.0; n * n];
    for i in 0..n {
        for j in i + 1..n {
            let v = (scale * base[i * n + j] + noise.sample(rng)).abs();
            out[i * n + j] = v;
            out[j * n + i] = v;
        }
    }
    out
}

fn write_human_rdms(config: &AnalysisConfig, rng: &mut StdRng) -> Result<usize> {
    let n = config.n_conditions;
    let number = log_distance_rdm(n);
    let noise = Normal::new(0.0, RDM_NOISE).context("RDM noise distribution")?;
    save_mat(
        &config.data_dir.join("Number.mat"),
        vec![("Number", MatValue::from_rows(n, n, &number))],
        false,
    )?;

    let fields = MRI_AREAS
        .iter()
        .map(|&area| {
            let scale = if area == "IPS345" { 1.0 } else { 0.0 };
            let rdm = noisy_rdm(rng, &noise, n, &number, scale);
            (area.to_string(), MatValue::from_rows(n, n, &rdm))
        })
        .collect();
    save_mat(
        &config.data_dir.join("MRI-RDM.mat"),
        vec![("RDM", struct_value(fields))],
        true,
    )?;
    Ok(2)
}

fn write_layer(
    config: &AnalysisConfig,
    rng: &mut StdRng,
    layer_index: usize,
    layer: &str,
) -> Result<SampleStats> {
    let units = layer_units(layer_index);
    let untrained = config.dataset == UNTRAINED;
    let stride = if untrained { 5 } else { 3 };
    let gain = if untrained { 0.6 } else { 1.0 };
    let tuned: Vec<usize> = (0..units).filter(|u| u % stride == 0).collect();
    let max_log = (config.n_conditions as f64).ln();
    let preferred: Vec<f64> = (0..units).map(|_| rng.gen_range(0.0..=max_log)).collect();
    let baseline: Vec<f64> = (0..units).map(|_| rng.gen_range(0.0..0.5)).collect();
    let noise = Normal::new(0.0, NOISE).context("activation noise distribution")?;

    let rows = config.n_conditions * config.block_size;
    let mut acts = Vec::with_capacity(rows * units);
    for row in 0..rows {
        let log_n = ((row / config.block_size + 1) as f64).ln();
        for u in 0..units {
            let signal = if u % stride == 0 {
                let d = log_n - preferred[u];
                gain * (-d * d / (2.0 * TUNING_WIDTH * TUNING_WIDTH)).exp()
            } else {
                0.0
            };
            acts.push(baseline[u] + signal + noise.sample(rng));
        }
    }
    let acts_path = config.activations_path(layer);
    ensure_parent(&acts_path)?;
    save_npy(&acts_path, &[rows, units], &acts)
        .with_context(|| format!("Failed to write {}", acts_path.display()))?;

    // The first untrained layer has no numerosity-selective units.
    let anova_units: &[usize] = if untrained && layer_index == 0 { &[] } else { &tuned };
    let units_path = config.num_unit_path(layer);
    ensure_parent(&units_path)?;
    save_indices(&units_path, anova_units)
        .with_context(|| format!("Failed to write {}", units_path.display()))?;

    // Tuned units sit at the head of the ranking in the configured order.
    let tuned_sign = match config.rank_order {
        RankOrder::Ascending => -1.0,
        RankOrder::Descending => 1.0,
    };
    let score_full = rng.gen_range(0.2..0.5);
    let score_each_node: Vec<f64> = (0..units)
        .map(|u| {
            let drop = if u % stride == 0 {
                tuned_sign * rng.gen_range(0.02..0.08)
            } else {
                tuned_sign * rng.gen_range(-0.015..0.01)
            };
            score_full - drop
        })
        .collect();
    let best = rng.gen_range(0.5..0.85);
    let peak = tuned.len().saturating_sub(1) as f64;
    let score_sfs: Vec<f64> = (0..units)
        .map(|k| best * (1.0 - ((k as f64 - peak) / units as f64).powi(2)))
        .collect();
    save_mat(
        &config.selection_path(layer),
        vec![
            ("score_full", MatValue::scalar_value(score_full)),
            ("score_each_node", MatValue::row_vector(&score_each_node)),
            ("score_sfs", MatValue::row_vector(&score_sfs)),
        ],
        layer_index % 2 == 0,
    )?;

    Ok(SampleStats {
        mat_files: 1,
        npy_files: 2,
    })
}

/// Write the human RDMs plus, for every panel dataset and layer, activations,
/// ANOVA unit indices and forward-selection results.
pub fn write_sample_tree(config: &AnalysisConfig, seed: u64) -> Result<SampleStats> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut stats = SampleStats {
        mat_files: write_human_rdms(config, &mut rng)?,
        npy_files: 0,
    };
    for panel in &config.panels {
        let dataset = config.with_dataset(&panel.dataset);
        for (i, layer) in config.layers.iter().enumerate() {
            let s = write_layer(&dataset, &mut rng, i, layer)?;
            stats.mat_files += s.mat_files;
            stats.npy_files += s.npy_files;
        }
        log::info!(
            "Wrote {} layers for {}/{}",
            config.layers.len(),
            config.model,
            panel.dataset
        );
    }
    Ok(stats)
}
