//! Versioned grid of boxes over fit-parameter space.
//!
//! A [`Grid`] is an arena of [`GridBox`]es plus, for every axis, the sorted
//! list of distinct edge positions used by any box. Each box stores its lower
//! and upper edge as integer indices into that list, so adjacency is index
//! arithmetic: the upper neighbors of a box along axis `a` are the boxes
//! whose lower edge index on `a` equals this box's upper edge index, and which
//! overlap it on every other axis.
//!
//! Grids are never mutated after construction. Subdivision builds the next
//! generation from scratch.

use std::cmp::Ordering;

use serde::Serialize;

use crate::domain::FitParameter;
use crate::error::BayesError;

/// Index of a box inside one grid generation.
pub type BoxId = usize;

/// One axis-aligned cell of the discretized parameter space.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridBox {
    pub lo: Vec<f64>,
    pub hi: Vec<f64>,
    /// Representative value per axis (midpoint in the axis' spacing).
    pub center: Vec<f64>,
    #[serde(skip)]
    lo_idx: Vec<usize>,
    #[serde(skip)]
    hi_idx: Vec<usize>,
}

impl GridBox {
    pub fn contains(&self, point: &[f64]) -> bool {
        point
            .iter()
            .zip(self.lo.iter().zip(self.hi.iter()))
            .all(|(&x, (&lo, &hi))| x >= lo && x <= hi)
    }

    fn overlaps_except(&self, other: &GridBox, axis: usize) -> bool {
        (0..self.lo_idx.len())
            .filter(|&b| b != axis)
            .all(|b| other.lo_idx[b] < self.hi_idx[b] && other.hi_idx[b] > self.lo_idx[b])
    }
}

#[derive(Debug, Clone)]
struct AxisIndex {
    edges: Vec<f64>,
    /// Boxes whose lower edge sits at each edge index.
    starting_at: Vec<Vec<BoxId>>,
    /// Boxes whose upper edge sits at each edge index.
    ending_at: Vec<Vec<BoxId>>,
}

/// One generation of the box partition.
#[derive(Debug, Clone)]
pub struct Grid {
    generation: u32,
    params: Vec<FitParameter>,
    boxes: Vec<GridBox>,
    axes: Vec<AxisIndex>,
}

impl Grid {
    /// Build the generation-0 grid: the cross product of every parameter's
    /// initial partition.
    pub fn initial(params: &[FitParameter]) -> Result<Self, BayesError> {
        if params.is_empty() {
            return Err(BayesError::config("At least one fit parameter is required."));
        }
        let edges: Vec<Vec<f64>> = params
            .iter()
            .map(|p| p.initial_edges())
            .collect::<Result<_, _>>()?;

        let total: usize = params.iter().map(|p| p.resolution).product();
        let mut bounds = Vec::with_capacity(total);
        let mut counter = vec![0usize; params.len()];
        for _ in 0..total {
            let lo: Vec<f64> = counter.iter().enumerate().map(|(a, &i)| edges[a][i]).collect();
            let hi: Vec<f64> = counter
                .iter()
                .enumerate()
                .map(|(a, &i)| edges[a][i + 1])
                .collect();
            bounds.push((lo, hi));

            // Odometer increment, last axis fastest.
            for a in (0..params.len()).rev() {
                counter[a] += 1;
                if counter[a] < params[a].resolution {
                    break;
                }
                counter[a] = 0;
            }
        }

        Self::from_bounds(0, params.to_vec(), bounds)
    }

    /// Build a grid from explicit `(lo, hi)` bounds per box.
    pub fn from_bounds(
        generation: u32,
        params: Vec<FitParameter>,
        bounds: Vec<(Vec<f64>, Vec<f64>)>,
    ) -> Result<Self, BayesError> {
        let dim = params.len();
        if bounds.is_empty() {
            return Err(BayesError::config("A grid must contain at least one box."));
        }
        for (lo, hi) in &bounds {
            if lo.len() != dim || hi.len() != dim {
                return Err(BayesError::data(format!(
                    "Box has {} / {} edges, expected {dim}.",
                    lo.len(),
                    hi.len()
                )));
            }
            if lo.iter().zip(hi.iter()).any(|(l, h)| !(l.is_finite() && h.is_finite() && h > l)) {
                return Err(BayesError::data("Box edges must be finite with hi > lo."));
            }
        }

        let mut axes = Vec::with_capacity(dim);
        for a in 0..dim {
            let mut edges: Vec<f64> = bounds
                .iter()
                .flat_map(|(lo, hi)| [lo[a], hi[a]])
                .collect();
            edges.sort_by(f64::total_cmp);
            edges.dedup();
            let n = edges.len();
            axes.push(AxisIndex {
                edges,
                starting_at: vec![Vec::new(); n],
                ending_at: vec![Vec::new(); n],
            });
        }

        let mut boxes = Vec::with_capacity(bounds.len());
        for (id, (lo, hi)) in bounds.into_iter().enumerate() {
            let mut lo_idx = Vec::with_capacity(dim);
            let mut hi_idx = Vec::with_capacity(dim);
            for a in 0..dim {
                let li = edge_index(&axes[a].edges, lo[a])?;
                let hi_i = edge_index(&axes[a].edges, hi[a])?;
                axes[a].starting_at[li].push(id);
                axes[a].ending_at[hi_i].push(id);
                lo_idx.push(li);
                hi_idx.push(hi_i);
            }
            let center = params
                .iter()
                .enumerate()
                .map(|(a, p)| p.spacing.midpoint(lo[a], hi[a]))
                .collect();
            boxes.push(GridBox {
                lo,
                hi,
                center,
                lo_idx,
                hi_idx,
            });
        }

        Ok(Self {
            generation,
            params,
            boxes,
            axes,
        })
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn params(&self) -> &[FitParameter] {
        &self.params
    }

    pub fn dim(&self) -> usize {
        self.params.len()
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn boxes(&self) -> &[GridBox] {
        &self.boxes
    }

    pub fn get(&self, id: BoxId) -> Option<&GridBox> {
        self.boxes.get(id)
    }

    /// Sorted distinct edge positions used along `axis`.
    pub fn edges(&self, axis: usize) -> &[f64] {
        &self.axes[axis].edges
    }

    /// `[lo, hi)` edge indices of box `id` along `axis`.
    pub fn edge_span(&self, id: BoxId, axis: usize) -> (usize, usize) {
        let b = &self.boxes[id];
        (b.lo_idx[axis], b.hi_idx[axis])
    }

    /// Box width along `axis`, measured in that axis' spacing.
    pub fn width(&self, id: BoxId, axis: usize) -> f64 {
        let b = &self.boxes[id];
        self.params[axis].spacing.width(b.lo[axis], b.hi[axis])
    }

    /// Product of widths, each measured in its axis' spacing.
    pub fn volume(&self, id: BoxId) -> f64 {
        (0..self.dim()).map(|a| self.width(id, a)).product()
    }

    /// Neighbors of `id` along one axis: `(lower side, upper side)`.
    pub fn neighbors_along(&self, id: BoxId, axis: usize) -> (Vec<BoxId>, Vec<BoxId>) {
        let b = &self.boxes[id];
        let index = &self.axes[axis];
        let lower = index.ending_at[b.lo_idx[axis]]
            .iter()
            .copied()
            .filter(|&o| b.overlaps_except(&self.boxes[o], axis))
            .collect();
        let upper = index.starting_at[b.hi_idx[axis]]
            .iter()
            .copied()
            .filter(|&o| b.overlaps_except(&self.boxes[o], axis))
            .collect();
        (lower, upper)
    }

    /// All neighbors of `id`, one step along any single axis.
    pub fn neighbors(&self, id: BoxId) -> Vec<BoxId> {
        let mut out = Vec::new();
        for axis in 0..self.dim() {
            let (lower, upper) = self.neighbors_along(id, axis);
            out.extend(lower);
            out.extend(upper);
        }
        out.sort_unstable();
        out.dedup();
        out
    }

    /// The box containing `point`, if any. Points on a shared edge resolve to
    /// the first matching box.
    pub fn locate(&self, point: &[f64]) -> Option<BoxId> {
        if point.len() != self.dim() {
            return None;
        }
        self.boxes.iter().position(|b| b.contains(point))
    }

    /// Sum of box volumes along with the declared parameter-space volume.
    /// Equal (within rounding) while boxes partition the full range.
    pub fn coverage(&self) -> (f64, f64) {
        let covered: f64 = (0..self.len()).map(|id| self.volume(id)).sum();
        let declared: f64 = self
            .params
            .iter()
            .map(|p| p.spacing.width(p.lo, p.hi))
            .product();
        (covered, declared)
    }
}

fn edge_index(edges: &[f64], value: f64) -> Result<usize, BayesError> {
    edges
        .binary_search_by(|e| e.partial_cmp(&value).unwrap_or(Ordering::Less))
        .map_err(|_| BayesError::data(format!("Edge {value} is not in the axis index.")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params_2d() -> Vec<FitParameter> {
        vec![
            FitParameter::new("Bp", 10.0, 1000.0).log().with_resolution(4),
            FitParameter::new("n", 1.0, 2.0).with_resolution(3),
        ]
    }

    #[test]
    fn initial_grid_is_cross_product() {
        let grid = Grid::initial(&params_2d()).unwrap();
        assert_eq!(grid.len(), 12);
        assert_eq!(grid.generation(), 0);
        let (covered, declared) = grid.coverage();
        assert!((covered - declared).abs() < 1e-9);
    }

    #[test]
    fn centers_are_spacing_midpoints() {
        let grid = Grid::initial(&params_2d()).unwrap();
        let first = &grid.boxes()[0];
        assert_eq!(first.lo, vec![10.0, 1.0]);
        // Log axis: geometric midpoint of 10 and 10^1.5.
        assert!((first.center[0] - 10f64.powf(1.25)).abs() < 1e-9);
        assert!((first.center[1] - (1.0 + 1.0 / 6.0)).abs() < 1e-12);
    }

    #[test]
    fn interior_box_has_four_neighbors() {
        let grid = Grid::initial(&params_2d()).unwrap();
        // Row-major with the last axis fastest: (1, 1) -> 1 * 3 + 1.
        let id = 4;
        let n = grid.neighbors(id);
        assert_eq!(n, vec![1, 3, 5, 7]);
        let (lower, upper) = grid.neighbors_along(id, 1);
        assert_eq!(lower, vec![3]);
        assert_eq!(upper, vec![5]);
    }

    #[test]
    fn corner_box_only_sees_existing_neighbors() {
        let grid = Grid::initial(&params_2d()).unwrap();
        assert_eq!(grid.neighbors(0), vec![1, 3]);
        let (lower, _) = grid.neighbors_along(0, 0);
        assert!(lower.is_empty());
    }

    #[test]
    fn uneven_boxes_find_overlapping_neighbors() {
        let params = vec![
            FitParameter::new("x", 0.0, 2.0),
            FitParameter::new("y", 0.0, 2.0),
        ];
        // Left column is one tall box, right column is split in two.
        let bounds = vec![
            (vec![0.0, 0.0], vec![1.0, 2.0]),
            (vec![1.0, 0.0], vec![2.0, 1.0]),
            (vec![1.0, 1.0], vec![2.0, 2.0]),
        ];
        let grid = Grid::from_bounds(1, params, bounds).unwrap();
        assert_eq!(grid.neighbors(0), vec![1, 2]);
        assert_eq!(grid.neighbors(1), vec![0, 2]);
    }

    #[test]
    fn locate_finds_containing_box() {
        let grid = Grid::initial(&params_2d()).unwrap();
        let id = grid.locate(&[258.0, 1.36]).unwrap();
        assert!(grid.boxes()[id].contains(&[258.0, 1.36]));
        assert!(grid.locate(&[5.0, 1.5]).is_none());
    }
}
