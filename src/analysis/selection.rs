use std::collections::BTreeSet;

use anyhow::{Context, Result};
use ndarray::Array2;
use serde::Serialize;

use super::rdm::{condition_average, rdm_from_activations, select_units, upper_tri};
use super::stats::{argmax, pearson};
use super::AnalysisError;
use crate::config::{AnalysisConfig, RankOrder};
use crate::data::loader::{load_activations, load_human_rdm, load_selection, load_unit_indices};
use crate::data::model::SelectionResult;

// ---------------------------------------------------------------------------
// Summary types
// ---------------------------------------------------------------------------

/// Selection results for one network layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerSummary {
    pub layer: String,
    /// Nodes ranked by the pruning run.
    pub n_nodes: usize,
    /// RSA score of the full layer.
    pub score_full: f64,
    /// Nodes kept by forward selection, most important first.
    pub selected_nodes: Vec<usize>,
    /// Best score reached during forward selection.
    pub best_sfs: f64,
    /// Present when the ANOVA selected at least one unit.
    pub anova: Option<AnovaSummary>,
    /// Number of ANOVA-selected units (0 when `anova` is `None`).
    pub n_anova_units: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnovaSummary {
    pub n_units: usize,
    /// RSA score of the ANOVA-selected units against the human RDM.
    pub score: f64,
    /// Share of the smaller selection that both selections agree on.
    pub overlap: f64,
}

impl LayerSummary {
    pub fn n_selected(&self) -> usize {
        self.selected_nodes.len()
    }
}

// ---------------------------------------------------------------------------
// Node ranking
// ---------------------------------------------------------------------------

/// Node indices ordered by how much the score drops when each is left out
/// (`score_full - score_each_node`). Ties keep the lower index first.
pub fn rank_by_deviation(res: &SelectionResult, order: RankOrder) -> Vec<usize> {
    let deviation: Vec<f64> = res
        .score_each_node
        .iter()
        .map(|s| res.score_full - s)
        .collect();
    let mut ranked: Vec<usize> = (0..deviation.len()).collect();
    match order {
        RankOrder::Ascending => ranked.sort_by(|&a, &b| deviation[a].total_cmp(&deviation[b])),
        RankOrder::Descending => ranked.sort_by(|&a, &b| deviation[b].total_cmp(&deviation[a])),
    }
    ranked
}

/// Top-ranked nodes up to and including the step where forward selection peaked.
pub fn selected_nodes(res: &SelectionResult, order: RankOrder) -> Vec<usize> {
    let ranked = rank_by_deviation(res, order);
    let Some(peak) = argmax(&res.score_sfs) else {
        log::warn!("forward selection scores are empty or all NaN; no nodes selected");
        return Vec::new();
    };
    let keep = (peak + 1).min(ranked.len());
    if keep < peak + 1 {
        log::warn!(
            "forward selection peaked at step {} but only {} nodes were ranked",
            peak + 1,
            ranked.len()
        );
    }
    ranked[..keep].to_vec()
}

/// `|a ∩ b| / min(|a|, |b|)`; NaN when either side is empty.
pub fn overlap_ratio(a: &[usize], b: &[usize]) -> f64 {
    let denom = a.len().min(b.len());
    if denom == 0 {
        return f64::NAN;
    }
    let a: BTreeSet<usize> = a.iter().copied().collect();
    let b: BTreeSet<usize> = b.iter().copied().collect();
    a.intersection(&b).count() as f64 / denom as f64
}

// ---------------------------------------------------------------------------
// ANOVA units vs human RDM
// ---------------------------------------------------------------------------

/// RSA score of the condition-averaged activations of `units` against the
/// upper triangle of the human RDM.
pub fn anova_rsa(
    human_tri: &[f64],
    acts: &Array2<f64>,
    units: &[usize],
    n_conditions: usize,
    block: usize,
) -> Result<f64, AnalysisError> {
    let averaged = condition_average(acts, n_conditions, block)?;
    let pruned = select_units(&averaged, units)?;
    let rdm = rdm_from_activations(&pruned)?;
    let acts_tri = upper_tri(&rdm)?;
    if acts_tri.len() != human_tri.len() {
        return Err(AnalysisError::Shape(format!(
            "activation RDM has {} pairs, human RDM has {}",
            acts_tri.len(),
            human_tri.len()
        )));
    }
    pearson(human_tri, &acts_tri)
}

// ---------------------------------------------------------------------------
// Per-layer driver
// ---------------------------------------------------------------------------

/// Summarise one layer from its selection results, ANOVA units, and activations.
pub fn analyze_layer(
    config: &AnalysisConfig,
    layer: &str,
    human_tri: &[f64],
) -> Result<LayerSummary> {
    let res = load_selection(&config.selection_path(layer))?;
    let selected = selected_nodes(&res, config.rank_order);
    let best_sfs = res
        .score_sfs
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(f64::NAN, f64::max);

    let units = load_unit_indices(&config.num_unit_path(layer))?;
    let anova = if units.is_empty() {
        log::warn!("{layer}: ANOVA selected no units");
        None
    } else {
        let path = config.activations_path(layer);
        let acts = load_activations(&path)?;
        let score = anova_rsa(human_tri, &acts, &units, config.n_conditions, config.block_size)
            .with_context(|| format!("{layer}: RSA of ANOVA units from {}", path.display()))?;
        if score.is_nan() {
            log::warn!("{layer}: ANOVA RSA score is NaN (constant RDM)");
        }
        Some(AnovaSummary {
            n_units: units.len(),
            score,
            overlap: overlap_ratio(&selected, &units),
        })
    };

    Ok(LayerSummary {
        layer: layer.to_string(),
        n_nodes: res.score_each_node.len(),
        score_full: res.score_full,
        selected_nodes: selected,
        best_sfs,
        anova,
        n_anova_units: units.len(),
    })
}

/// Summaries for every configured layer, in order.
pub fn run_selection(config: &AnalysisConfig) -> Result<Vec<LayerSummary>> {
    let human = load_human_rdm(&config.human_rdm_source())?;
    let human_tri = upper_tri(&human).context("human RDM")?;
    log::info!(
        "Selection results for {} / {} / {}",
        config.model,
        config.dataset,
        config.brain_area
    );
    config
        .layers
        .iter()
        .map(|layer| analyze_layer(config, layer, &human_tri))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;

    fn result(score_full: f64, each: &[f64], sfs: &[f64]) -> SelectionResult {
        SelectionResult {
            score_full,
            score_each_node: each.to_vec(),
            score_sfs: sfs.to_vec(),
        }
    }

    #[test]
    fn default_ranking_puts_the_smallest_drop_first() {
        // deviations: 0.1, 0.3, -0.1, 0.3
        let res = result(0.5, &[0.4, 0.2, 0.6, 0.2], &[]);
        assert_eq!(rank_by_deviation(&res, RankOrder::default()), vec![2, 0, 1, 3]);
    }

    #[test]
    fn descending_ranking_puts_the_largest_drop_first() {
        let res = result(0.5, &[0.4, 0.2, 0.6, 0.2], &[]);
        assert_eq!(rank_by_deviation(&res, RankOrder::Descending), vec![1, 3, 0, 2]);
    }

    #[test]
    fn selection_stops_at_the_sfs_peak() {
        let res = result(0.5, &[0.4, 0.2, 0.6, 0.2], &[0.3, 0.55, 0.52, 0.4]);
        assert_eq!(selected_nodes(&res, RankOrder::Ascending), vec![2, 0]);
        assert_eq!(selected_nodes(&res, RankOrder::Descending), vec![1, 3]);
    }

    #[test]
    fn selection_is_clamped_to_ranked_nodes() {
        let res = result(0.5, &[0.4], &[0.1, 0.2, 0.9]);
        assert_eq!(selected_nodes(&res, RankOrder::Ascending), vec![0]);
        assert!(selected_nodes(&result(0.5, &[0.4], &[]), RankOrder::Ascending).is_empty());
    }

    #[test]
    fn overlap_uses_the_smaller_selection() {
        assert_abs_diff_eq!(overlap_ratio(&[1, 2, 3, 4], &[2, 4]), 1.0);
        assert_abs_diff_eq!(overlap_ratio(&[1, 2, 3], &[3, 7, 8, 9]), 1.0 / 3.0);
        assert!(overlap_ratio(&[], &[1]).is_nan());
    }

    /// Units whose response grows with the condition index reproduce a
    /// distance-in-condition RDM.
    #[test]
    fn anova_rsa_recovers_a_graded_code() {
        let n_conditions = 4;
        let block = 2;
        let units = 3;
        let acts = Array2::from_shape_fn((n_conditions * block, units), |(row, unit)| {
            let c = (row / block) as f64;
            match unit {
                0 => c,
                1 => 2.0 * c + 1.0,
                _ => if c < 2.0 { 1.0 } else { 0.0 },
            }
        });

        let human = Array2::from_shape_fn((n_conditions, n_conditions), |(i, j)| {
            (i as f64 - j as f64).abs()
        });
        let human_tri = upper_tri(&human).unwrap();

        let score = anova_rsa(&human_tri, &acts, &[0, 1, 2], n_conditions, block).unwrap();
        assert!(score > 0.5, "score {score}");

        let mismatch = anova_rsa(&human_tri[..3], &acts, &[0, 1, 2], n_conditions, block);
        assert!(matches!(mismatch, Err(AnalysisError::Shape(_))));
    }
}
