//! Regression tree used as the weak learner of the booster
//!
//! Trees are grown on per-row gradients and hessians with the regularized
//! second-order gain; plain least squares is the unit-hessian special case.

use crate::error::{ModelError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum TreeNode {
    /// Leaf node with prediction value
    Leaf { value: f64, n_samples: usize },
    /// Internal node with split
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
        gain: f64,
    },
}

/// Second-order regression tree
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionTree {
    root: Option<TreeNode>,
    /// Maximum depth
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// L2 shrinkage applied to leaf values
    pub reg_lambda: f64,
}

/// Per-row gradient and hessian of the loss being fitted
struct GradientStats<'a> {
    g: &'a Array1<f64>,
    h: &'a Array1<f64>,
}

impl GradientStats<'_> {
    fn is_pure(&self, indices: &[usize]) -> bool {
        match indices.first() {
            None => true,
            Some(&first) => indices.iter().all(|&i| (self.g[i] - self.g[first]).abs() < 1e-10),
        }
    }
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionTree {
    pub fn new() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            reg_lambda: 0.0,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    pub fn with_reg_lambda(mut self, lambda: f64) -> Self {
        self.reg_lambda = lambda.max(0.0);
        self
    }

    /// Fit the tree to training data by least squares
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let hessians = Array1::ones(y.len());
        self.fit_gradients(x, y, &hessians)
    }

    /// Fit second-order statistics: `gradients` holds the descent direction
    /// (negative loss gradient) and `hessians` the loss curvature per row.
    /// Leaves take the Newton step `sum(g) / (sum(h) + lambda)`.
    pub fn fit_gradients(
        &mut self,
        x: &Array2<f64>,
        gradients: &Array1<f64>,
        hessians: &Array1<f64>,
    ) -> Result<&mut Self> {
        let n_samples = x.nrows();

        if n_samples != gradients.len() || n_samples != hessians.len() {
            return Err(ModelError::TrainingFailed(format!(
                "feature rows ({}), gradients ({}) and hessians ({}) differ in length",
                n_samples,
                gradients.len(),
                hessians.len()
            )));
        }

        if n_samples < self.min_samples_split {
            return Err(ModelError::TrainingFailed(format!(
                "need at least {} samples, got {}",
                self.min_samples_split, n_samples
            )));
        }

        let stats = GradientStats { g: gradients, h: hessians };
        let indices: Vec<usize> = (0..n_samples).collect();
        self.root = Some(self.build_tree(x, &stats, &indices, 0));
        Ok(self)
    }

    fn build_tree(&self, x: &Array2<f64>, stats: &GradientStats<'_>, indices: &[usize], depth: usize) -> TreeNode {
        let n_samples = indices.len();

        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || stats.is_pure(indices);

        if should_stop {
            return self.leaf(stats, indices);
        }

        let Some((feature_idx, threshold, gain)) = self.find_best_split(x, stats, indices) else {
            return self.leaf(stats, indices);
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| x[[i, feature_idx]] <= threshold);

        if left_indices.len() < self.min_samples_leaf || right_indices.len() < self.min_samples_leaf {
            return self.leaf(stats, indices);
        }

        let left = Box::new(self.build_tree(x, stats, &left_indices, depth + 1));
        let right = Box::new(self.build_tree(x, stats, &right_indices, depth + 1));

        TreeNode::Split {
            feature_idx,
            threshold,
            left,
            right,
            n_samples,
            gain,
        }
    }

    /// Regularized second-order gain `G_l^2/(H_l+l) + G_r^2/(H_r+l) - G^2/(H+l)`
    fn split_score(&self, g: f64, h: f64) -> f64 {
        let denom = h + self.reg_lambda;
        if denom > 0.0 {
            g * g / denom
        } else {
            0.0
        }
    }

    /// Best (feature, threshold, gain), features scanned in parallel
    fn find_best_split(
        &self,
        x: &Array2<f64>,
        stats: &GradientStats<'_>,
        indices: &[usize],
    ) -> Option<(usize, f64, f64)> {
        let total_g: f64 = indices.iter().map(|&i| stats.g[i]).sum();
        let total_h: f64 = indices.iter().map(|&i| stats.h[i]).sum();
        let parent_score = self.split_score(total_g, total_h);

        (0..x.ncols())
            .into_par_iter()
            .filter_map(|feature_idx| {
                let mut triples: Vec<(f64, f64, f64)> = indices
                    .iter()
                    .map(|&i| (x[[i, feature_idx]], stats.g[i], stats.h[i]))
                    .collect();
                triples.sort_by(|a, b| a.0.total_cmp(&b.0));

                let mut best: Option<(f64, f64)> = None;
                let mut left_g = 0.0f64;
                let mut left_h = 0.0f64;

                // Sweep split points left to right, keeping running sums
                for k in 0..triples.len() - 1 {
                    let (value, g, h) = triples[k];
                    left_g += g;
                    left_h += h;

                    let next_value = triples[k + 1].0;
                    if next_value <= value {
                        continue;
                    }

                    let left_count = k + 1;
                    let right_count = triples.len() - left_count;
                    if left_count < self.min_samples_leaf || right_count < self.min_samples_leaf {
                        continue;
                    }

                    let gain = self.split_score(left_g, left_h)
                        + self.split_score(total_g - left_g, total_h - left_h)
                        - parent_score;

                    if gain > best.map_or(1e-12, |(_, best_gain)| best_gain) {
                        best = Some(((value + next_value) / 2.0, gain));
                    }
                }

                best.map(|(threshold, gain)| (feature_idx, threshold, gain))
            })
            .max_by(|a, b| a.2.total_cmp(&b.2).then_with(|| b.0.cmp(&a.0)))
    }

    fn leaf(&self, stats: &GradientStats<'_>, indices: &[usize]) -> TreeNode {
        let g: f64 = indices.iter().map(|&i| stats.g[i]).sum();
        let h: f64 = indices.iter().map(|&i| stats.h[i]).sum();
        let denom = h + self.reg_lambda;
        TreeNode::Leaf {
            value: if denom > 0.0 { g / denom } else { 0.0 },
            n_samples: indices.len(),
        }
    }

    /// Rewrite split feature indices through `mapping` (column-subsampled fits)
    pub fn remap_features(&mut self, mapping: &[usize]) {
        fn walk(node: &mut TreeNode, mapping: &[usize]) {
            if let TreeNode::Split { feature_idx, left, right, .. } = node {
                *feature_idx = mapping[*feature_idx];
                walk(left, mapping);
                walk(right, mapping);
            }
        }
        if let Some(root) = self.root.as_mut() {
            walk(root, mapping);
        }
    }

    /// Predict a single row
    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut node = match self.root.as_ref() {
            Some(root) => root,
            None => return 0.0,
        };
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split { feature_idx, threshold, left, right, .. } => {
                    node = if row[*feature_idx] <= *threshold { left } else { right };
                }
            }
        }
    }

    /// Make predictions
    pub fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        x.rows().into_iter().map(|row| self.predict_row(row)).collect()
    }

    /// Largest feature index referenced by a split, if any
    pub fn max_feature_index(&self) -> Option<usize> {
        fn walk(node: &TreeNode) -> Option<usize> {
            match node {
                TreeNode::Leaf { .. } => None,
                TreeNode::Split { feature_idx, left, right, .. } => {
                    [Some(*feature_idx), walk(left), walk(right)].into_iter().flatten().max()
                }
            }
        }
        self.root.as_ref().and_then(walk)
    }

    pub fn get_depth(&self) -> usize {
        fn depth(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => 1 + depth(left).max(depth(right)),
            }
        }
        self.root.as_ref().map_or(0, depth)
    }
}
