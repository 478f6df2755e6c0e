use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::GrowthCriterion;

const SPREAD_EPS: f64 = 1e-10;

#[derive(Debug, Clone)]
struct Node {
    data_size: usize,
    depth: usize,
    min_values: Array1<f64>,
    max_values: Array1<f64>,
    split: Option<Split>,
}

/// Axis-parallel split with `branching_factor - 1` sorted cut points.
#[derive(Debug, Clone)]
struct Split {
    feature: usize,
    cuts: Vec<f64>,
    children: Vec<Node>,
}

impl Split {
    fn branch(&self, value: f64) -> usize {
        self.cuts.iter().filter(|&&cut| value > cut).count()
    }

    fn partition(&self, data: ArrayView2<'_, f64>) -> Vec<Vec<usize>> {
        partition(self.feature, &self.cuts, data)
    }
}

fn partition(feature: usize, cuts: &[f64], data: ArrayView2<'_, f64>) -> Vec<Vec<usize>> {
    let mut partitions = vec![Vec::new(); cuts.len() + 1];
    for (i, row) in data.rows().into_iter().enumerate() {
        let value = row[feature];
        let branch = cuts.iter().filter(|&&cut| value > cut).count();
        partitions[branch].push(i);
    }
    partitions
}

fn bounds(data: ArrayView2<'_, f64>) -> (Array1<f64>, Array1<f64>) {
    let mut min_values = Array1::from_elem(data.ncols(), f64::INFINITY);
    let mut max_values = Array1::from_elem(data.ncols(), f64::NEG_INFINITY);
    for row in data.rows() {
        for (j, &v) in row.iter().enumerate() {
            min_values[j] = min_values[j].min(v);
            max_values[j] = max_values[j].max(v);
        }
    }
    (min_values, max_values)
}

/// Expected path length contribution of a node holding `n` points.
pub fn random_path_length(branching_factor: usize, max_leaf_samples: usize, n: f64) -> f64 {
    if n < max_leaf_samples as f64 {
        0.0
    } else {
        (n / max_leaf_samples as f64).ln() / (2.0 * branching_factor as f64).ln()
    }
}

/// An isolation tree that can learn and unlearn batches without a rebuild.
///
/// Leaves only keep counts and bounding boxes. When a leaf accumulates enough
/// points it is replaced by a subtree grown from points sampled uniformly in
/// its bounding box.
#[derive(Debug, Clone)]
pub struct OnlineIsolationTree {
    growth: GrowthCriterion,
    max_leaf_samples: usize,
    subsample: f64,
    branching_factor: usize,
    rng: StdRng,
    data_size: usize,
    depth_limit: f64,
    root: Option<Node>,
}

impl OnlineIsolationTree {
    pub fn new(
        growth: GrowthCriterion,
        max_leaf_samples: usize,
        subsample: f64,
        branching_factor: usize,
        seed: u64,
    ) -> Self {
        OnlineIsolationTree {
            growth,
            max_leaf_samples,
            subsample,
            branching_factor,
            rng: StdRng::seed_from_u64(seed),
            data_size: 0,
            depth_limit: random_path_length(branching_factor, max_leaf_samples, 0.0),
            root: None,
        }
    }

    pub fn data_size(&self) -> usize {
        self.data_size
    }

    fn split_threshold(&self, depth: usize) -> usize {
        self.max_leaf_samples.saturating_mul(self.growth.multiplier(depth))
    }

    fn refresh_depth_limit(&mut self) {
        self.depth_limit =
            random_path_length(self.branching_factor, self.max_leaf_samples, self.data_size as f64);
    }

    fn subsample_indices(&mut self, n: usize) -> Vec<usize> {
        if self.subsample >= 1.0 {
            return (0..n).collect();
        }
        (0..n).filter(|_| self.rng.gen::<f64>() < self.subsample).collect()
    }

    pub fn learn(&mut self, data: ArrayView2<'_, f64>) {
        let indices = self.subsample_indices(data.nrows());
        if indices.is_empty() {
            return;
        }
        let sample = data.select(Axis(0), &indices);
        self.data_size += sample.nrows();
        self.refresh_depth_limit();

        let root = match self.root.take() {
            None => self.build(sample.view(), 0),
            Some(mut root) => {
                self.learn_node(&mut root, sample.view());
                root
            }
        };
        self.root = Some(root);
    }

    fn learn_node(&mut self, node: &mut Node, data: ArrayView2<'_, f64>) {
        node.data_size += data.nrows();
        let (lo, hi) = bounds(data);
        node.min_values.zip_mut_with(&lo, |m, &v| *m = m.min(v));
        node.max_values.zip_mut_with(&hi, |m, &v| *m = m.max(v));

        if let Some(split) = node.split.as_mut() {
            let partitions = split.partition(data);
            for (child, indices) in split.children.iter_mut().zip(partitions) {
                if !indices.is_empty() {
                    let child_data = data.select(Axis(0), &indices);
                    self.learn_node(child, child_data.view());
                }
            }
            return;
        }

        if node.data_size >= self.split_threshold(node.depth) && (node.depth as f64) < self.depth_limit {
            let synthetic = self.sample_box(&node.min_values, &node.max_values, node.data_size);
            *node = self.build(synthetic.view(), node.depth);
        }
    }

    fn sample_box(&mut self, min_values: &Array1<f64>, max_values: &Array1<f64>, n: usize) -> Array2<f64> {
        let mut sampled = Array2::zeros((n, min_values.len()));
        for mut row in sampled.rows_mut() {
            for (j, v) in row.iter_mut().enumerate() {
                let (lo, hi) = (min_values[j], max_values[j]);
                *v = if hi - lo < SPREAD_EPS { lo } else { self.rng.gen_range(lo..hi) };
            }
        }
        sampled
    }

    fn build(&mut self, data: ArrayView2<'_, f64>, depth: usize) -> Node {
        let (min_values, max_values) = bounds(data);
        let n = data.nrows();

        let splittable: Vec<usize> = (0..data.ncols())
            .filter(|&j| max_values[j] - min_values[j] >= SPREAD_EPS)
            .collect();
        if n < self.split_threshold(depth) || (depth as f64) >= self.depth_limit || splittable.is_empty() {
            return Node { data_size: n, depth, min_values, max_values, split: None };
        }

        let feature = splittable[self.rng.gen_range(0..splittable.len())];
        let (lo, hi) = (min_values[feature], max_values[feature]);
        let mut cuts: Vec<f64> = (0..self.branching_factor - 1)
            .map(|_| self.rng.gen_range(lo..hi))
            .collect();
        cuts.sort_by(|a, b| a.total_cmp(b));

        let mut children = Vec::with_capacity(self.branching_factor);
        for indices in partition(feature, &cuts, data) {
            if indices.is_empty() {
                children.push(Node {
                    data_size: 0,
                    depth: depth + 1,
                    min_values: min_values.clone(),
                    max_values: max_values.clone(),
                    split: None,
                });
            } else {
                let child_data = data.select(Axis(0), &indices);
                children.push(self.build(child_data.view(), depth + 1));
            }
        }

        Node {
            data_size: n,
            depth,
            min_values,
            max_values,
            split: Some(Split { feature, cuts, children }),
        }
    }

    pub fn unlearn(&mut self, data: ArrayView2<'_, f64>) {
        let indices = self.subsample_indices(data.nrows());
        if indices.is_empty() {
            return;
        }
        let sample = data.select(Axis(0), &indices);
        self.data_size = self.data_size.saturating_sub(sample.nrows());
        self.refresh_depth_limit();

        if let Some(mut root) = self.root.take() {
            self.unlearn_node(&mut root, sample.view());
            self.root = Some(root);
        }
    }

    fn unlearn_node(&self, node: &mut Node, data: ArrayView2<'_, f64>) {
        node.data_size = node.data_size.saturating_sub(data.nrows());

        // too small to stay split: fold the subtree back into a leaf
        if node.data_size < self.split_threshold(node.depth) {
            node.split = None;
            return;
        }

        if let Some(split) = node.split.as_mut() {
            let partitions = split.partition(data);
            for (child, indices) in split.children.iter_mut().zip(partitions) {
                if !indices.is_empty() {
                    let child_data = data.select(Axis(0), &indices);
                    self.unlearn_node(child, child_data.view());
                }
            }

            let populated: Vec<&Node> = split.children.iter().filter(|c| c.data_size > 0).collect();
            if !populated.is_empty() {
                node.min_values.fill(f64::INFINITY);
                node.max_values.fill(f64::NEG_INFINITY);
                for child in populated {
                    node.min_values.zip_mut_with(&child.min_values, |m, &v| *m = m.min(v));
                    node.max_values.zip_mut_with(&child.max_values, |m, &v| *m = m.max(v));
                }
            }
        }
    }

    /// Isolation depth of a single point, including the expected remaining
    /// depth of the leaf it lands in.
    pub fn depth(&self, x: ArrayView1<'_, f64>) -> f64 {
        let mut node = match &self.root {
            Some(root) => root,
            None => return 0.0,
        };
        while let Some(split) = &node.split {
            node = &split.children[split.branch(x[split.feature])];
        }
        node.depth as f64
            + random_path_length(self.branching_factor, self.max_leaf_samples, node.data_size as f64)
    }

    pub fn predict(&self, data: ArrayView2<'_, f64>) -> Vec<f64> {
        data.rows().into_iter().map(|row| self.depth(row)).collect()
    }
}
