//! Exact path-dependent Tree SHAP.
//!
//! Walks every tree once per explained row while maintaining the set of
//! features on the current root-to-node path together with the fraction of
//! training cover that flows through each ("zero" fraction) and whether the
//! row itself follows the path ("one" fraction). The permutation weights of
//! that path let each leaf credit its value to the path's features in
//! `O(depth^2)` per leaf.

use super::{Attribution, AttributionStrategy, ClassOutputs, ExplainError};
use crate::models::tree::{Node, Tree};
use crate::models::{Classifier, EnsembleOutput};
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;

pub const METHOD_NAME: &str = "tree_shap";

/// Tree SHAP for models that expose their tree ensemble
#[derive(Debug, Default, Clone, Copy)]
pub struct TreeShap;

impl AttributionStrategy for TreeShap {
    fn name(&self) -> &'static str {
        METHOD_NAME
    }

    fn applies_to(&self, model: &dyn Classifier) -> bool {
        model.tree_ensemble().is_some()
    }

    fn explain(
        &self,
        model: &dyn Classifier,
        data: ArrayView2<'_, f64>,
    ) -> Result<Attribution, ExplainError> {
        let ensemble = model.tree_ensemble().ok_or(ExplainError::NotApplicable {
            method: METHOD_NAME,
        })?;
        if ensemble.trees.is_empty() {
            return Err(ExplainError::Failed {
                method: METHOD_NAME,
                source: "model has no trees".into(),
            });
        }
        if data.ncols() != model.n_features() {
            return Err(ExplainError::Failed {
                method: METHOD_NAME,
                source: format!(
                    "model expects {} features, data has {}",
                    model.n_features(),
                    data.ncols()
                )
                .into(),
            });
        }

        let rows: Vec<Vec<f64>> = (0..data.nrows())
            .into_par_iter()
            .map(|i| {
                let row = data.row(i);
                let mut row_phi = vec![0.0; row.len()];
                for tree in ensemble.trees {
                    tree_shap(tree, row, &mut row_phi);
                }
                row_phi
            })
            .collect();

        let mut phi = Array2::<f64>::zeros(data.dim());
        for (mut out, row_phi) in phi.axis_iter_mut(Axis(0)).zip(rows) {
            out.assign(&ArrayView1::from(row_phi.as_slice()));
        }

        let expected_sum: f64 = ensemble.trees.iter().map(Tree::expected_value).sum();

        let attribution = match ensemble.output {
            EnsembleOutput::MeanProbability => {
                let n_trees = ensemble.trees.len() as f64;
                let positive = phi / n_trees;
                let expected = expected_sum / n_trees;
                Attribution {
                    method: METHOD_NAME.to_string(),
                    values: ClassOutputs::PerClass(vec![-&positive, positive]),
                    expected_value: ClassOutputs::PerClass(vec![1.0 - expected, expected]),
                }
            }
            EnsembleOutput::LogOdds { base_margin } => Attribution {
                method: METHOD_NAME.to_string(),
                values: ClassOutputs::Single(phi),
                expected_value: ClassOutputs::Single(base_margin + expected_sum),
            },
        };
        Ok(attribution)
    }
}

#[derive(Debug, Clone, Copy)]
struct PathElement {
    /// Split feature, `None` for the root placeholder
    feature: Option<usize>,
    zero_fraction: f64,
    one_fraction: f64,
    weight: f64,
}

/// Add the attributions of one tree for one row into `phi`
pub fn tree_shap(tree: &Tree, row: ArrayView1<'_, f64>, phi: &mut [f64]) {
    let nodes = tree.nodes();
    if nodes.is_empty() {
        return;
    }
    recurse(nodes, row, phi, 0, Vec::new(), 1.0, 1.0, None);
}

#[allow(clippy::too_many_arguments)]
fn recurse(
    nodes: &[Node],
    row: ArrayView1<'_, f64>,
    phi: &mut [f64],
    idx: usize,
    mut path: Vec<PathElement>,
    zero_fraction: f64,
    one_fraction: f64,
    feature: Option<usize>,
) {
    extend(&mut path, zero_fraction, one_fraction, feature);

    match &nodes[idx] {
        Node::Leaf { value, .. } => {
            for i in 1..path.len() {
                let element = path[i];
                let weight = unwound_path_sum(&path, i);
                if let Some(f) = element.feature {
                    phi[f] += weight * (element.one_fraction - element.zero_fraction) * value;
                }
            }
        }
        Node::Split {
            feature: split_feature,
            threshold,
            left,
            right,
            cover,
        } => {
            let (hot, cold) = if row[*split_feature] <= *threshold {
                (*left, *right)
            } else {
                (*right, *left)
            };

            let mut incoming_zero = 1.0;
            let mut incoming_one = 1.0;
            if let Some(k) = (1..path.len()).find(|&k| path[k].feature == Some(*split_feature)) {
                incoming_zero = path[k].zero_fraction;
                incoming_one = path[k].one_fraction;
                unwind(&mut path, k);
            }

            let share = |child: usize| {
                if *cover > 0.0 {
                    nodes[child].cover() / cover
                } else {
                    0.5
                }
            };

            recurse(
                nodes,
                row,
                phi,
                hot,
                path.clone(),
                incoming_zero * share(hot),
                incoming_one,
                Some(*split_feature),
            );
            recurse(
                nodes,
                row,
                phi,
                cold,
                path,
                incoming_zero * share(cold),
                0.0,
                Some(*split_feature),
            );
        }
    }
}

fn extend(path: &mut Vec<PathElement>, zero_fraction: f64, one_fraction: f64, feature: Option<usize>) {
    let depth = path.len();
    path.push(PathElement {
        feature,
        zero_fraction,
        one_fraction,
        weight: if depth == 0 { 1.0 } else { 0.0 },
    });

    let len = (depth + 1) as f64;
    for i in (0..depth).rev() {
        path[i + 1].weight += one_fraction * path[i].weight * (i + 1) as f64 / len;
        path[i].weight = zero_fraction * path[i].weight * (depth - i) as f64 / len;
    }
}

fn unwind(path: &mut Vec<PathElement>, i: usize) {
    let depth = path.len() - 1;
    let one = path[i].one_fraction;
    let zero = path[i].zero_fraction;
    let len = (depth + 1) as f64;
    let mut next = path[depth].weight;

    for j in (0..depth).rev() {
        if one != 0.0 {
            let previous = path[j].weight;
            path[j].weight = next * len / ((j + 1) as f64 * one);
            next = previous - path[j].weight * zero * (depth - j) as f64 / len;
        } else {
            path[j].weight = path[j].weight * len / (zero * (depth - j) as f64);
        }
    }

    for j in i..depth {
        path[j].feature = path[j + 1].feature;
        path[j].zero_fraction = path[j + 1].zero_fraction;
        path[j].one_fraction = path[j + 1].one_fraction;
    }
    path.pop();
}

/// Total permutation weight of the path with element `i` removed
fn unwound_path_sum(path: &[PathElement], i: usize) -> f64 {
    let depth = path.len() - 1;
    let one = path[i].one_fraction;
    let zero = path[i].zero_fraction;
    let len = (depth + 1) as f64;
    let mut next = path[depth].weight;
    let mut total = 0.0;

    for j in (0..depth).rev() {
        if one != 0.0 {
            let tmp = next * len / ((j + 1) as f64 * one);
            total += tmp;
            next = path[j].weight - tmp * zero * (depth - j) as f64 / len;
        } else {
            total += path[j].weight / zero / ((depth - j) as f64 / len);
        }
    }
    total
}
