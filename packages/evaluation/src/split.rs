//! Train/test partitioning.
//!
//! Random and k-fold splits shuffle row indices with a seeded
//! `ChaCha8Rng`, so a given seed always yields the same folds.
//!
//! Spatial-block splits place every row on the acre lattice, cut the
//! lattice extent into `blocks_x × blocks_y` contiguous blocks and use
//! each non-empty block as one test fold. Training rows exclude every
//! cell within Chebyshev distance `buffer_cells` of a test cell, so with
//! a buffer of at least one no training cell shares an edge or a corner
//! with a test cell.

use std::collections::{BTreeMap, BTreeSet};

use acre_map_evaluation_models::SplitStrategy;
use acre_map_projection::Projector;
use geo::Coord;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use crate::EvaluationError;

/// Row indices of one train/test fold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Position of a row on the acre lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LatticeCell {
    pub col: i64,
    pub row: i64,
}

impl LatticeCell {
    #[must_use]
    pub const fn chebyshev(self, other: Self) -> u64 {
        let dc = self.col.abs_diff(other.col);
        let dr = self.row.abs_diff(other.row);
        if dc > dr { dc } else { dr }
    }
}

/// Snaps `(lon, lat)` locations to lattice positions.
///
/// Locations are projected and expressed in whole cells from the
/// south-west-most location, so cell centres map to exact integers.
///
/// # Errors
///
/// Returns [`EvaluationError::Projection`] if a location cannot be
/// projected.
#[allow(clippy::cast_possible_truncation)]
pub fn lattice_cells(
    locations: &[Coord<f64>],
    projector: &Projector,
    cell_size_m: f64,
) -> Result<Vec<LatticeCell>, EvaluationError> {
    let projected = projector.to_projected(locations)?;
    let min_x = projected.iter().map(|c| c.x).fold(f64::INFINITY, f64::min);
    let min_y = projected.iter().map(|c| c.y).fold(f64::INFINITY, f64::min);

    Ok(projected
        .iter()
        .map(|c| LatticeCell {
            col: ((c.x - min_x) / cell_size_m).round() as i64,
            row: ((c.y - min_y) / cell_size_m).round() as i64,
        })
        .collect())
}

/// Partitions `cells.len()` rows according to `strategy`.
///
/// Folds left without training rows are skipped.
///
/// # Errors
///
/// Returns [`EvaluationError::InsufficientData`] when there are too few
/// rows for the strategy or no usable fold remains.
pub fn make_folds(
    strategy: &SplitStrategy,
    cells: &[LatticeCell],
) -> Result<Vec<Fold>, EvaluationError> {
    let n = cells.len();
    let folds = match strategy {
        SplitStrategy::RandomHoldout {
            test_fraction,
            seed,
        } => {
            if n < 2 {
                return Err(insufficient(format!(
                    "random holdout needs at least 2 rows, got {n}"
                )));
            }
            vec![random_holdout(n, *test_fraction, *seed)]
        }
        SplitStrategy::KFold { k, seed } => {
            if *k < 2 || *k > n {
                return Err(insufficient(format!(
                    "{k}-fold cross-validation needs at least {k} rows, got {n}"
                )));
            }
            k_fold(n, *k, *seed)
        }
        SplitStrategy::SpatialBlocks {
            blocks_x,
            blocks_y,
            buffer_cells,
        } => spatial_blocks(cells, *blocks_x, *blocks_y, *buffer_cells),
    };

    let usable: Vec<Fold> = folds
        .into_iter()
        .enumerate()
        .filter_map(|(i, fold)| {
            if fold.train.is_empty() || fold.test.is_empty() {
                log::warn!(
                    "{}: skipping fold {i} ({} train, {} test rows)",
                    strategy.label(),
                    fold.train.len(),
                    fold.test.len()
                );
                None
            } else {
                Some(fold)
            }
        })
        .collect();

    if usable.is_empty() {
        return Err(insufficient(format!(
            "{} produced no usable folds from {n} rows",
            strategy.label()
        )));
    }
    Ok(usable)
}

fn insufficient(message: String) -> EvaluationError {
    EvaluationError::InsufficientData { message }
}

fn shuffled(n: usize, seed: u64) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);
    indices
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn random_holdout(n: usize, test_fraction: f64, seed: u64) -> Fold {
    let n_test = ((n as f64) * test_fraction).ceil() as usize;
    let n_test = n_test.clamp(1, n - 1);

    let indices = shuffled(n, seed);
    let mut test = indices[..n_test].to_vec();
    let mut train = indices[n_test..].to_vec();
    test.sort_unstable();
    train.sort_unstable();
    Fold { train, test }
}

/// The first `n % k` folds hold one extra row.
fn k_fold(n: usize, k: usize, seed: u64) -> Vec<Fold> {
    let indices = shuffled(n, seed);
    let base = n / k;
    let extra = n % k;

    let mut folds = Vec::with_capacity(k);
    let mut start = 0;
    for fold in 0..k {
        let size = base + usize::from(fold < extra);
        let mut test = indices[start..start + size].to_vec();
        let mut train: Vec<usize> = indices[..start]
            .iter()
            .chain(&indices[start + size..])
            .copied()
            .collect();
        test.sort_unstable();
        train.sort_unstable();
        folds.push(Fold { train, test });
        start += size;
    }
    folds
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn spatial_blocks(
    cells: &[LatticeCell],
    blocks_x: usize,
    blocks_y: usize,
    buffer_cells: u32,
) -> Vec<Fold> {
    let Some(min_col) = cells.iter().map(|c| c.col).min() else {
        return Vec::new();
    };
    let min_row = cells.iter().map(|c| c.row).min().unwrap_or(0);
    let max_col = cells.iter().map(|c| c.col).max().unwrap_or(min_col);
    let max_row = cells.iter().map(|c| c.row).max().unwrap_or(min_row);
    let width = max_col - min_col + 1;
    let height = max_row - min_row + 1;

    let mut blocks: BTreeMap<(i64, i64), Vec<usize>> = BTreeMap::new();
    for (i, cell) in cells.iter().enumerate() {
        let bx = (cell.col - min_col) * blocks_x as i64 / width;
        let by = (cell.row - min_row) * blocks_y as i64 / height;
        blocks.entry((by, bx)).or_default().push(i);
    }

    if buffer_cells == 0 {
        log::warn!("spatial_blocks buffer_cells = 0 lets training touch the test block; using 1");
    }
    let buffer = i64::from(buffer_cells.max(1));
    blocks
        .into_values()
        .map(|test| {
            let test_cells: BTreeSet<LatticeCell> = test.iter().map(|&i| cells[i]).collect();
            let near_test = |cell: LatticeCell| {
                (-buffer..=buffer).any(|dr| {
                    (-buffer..=buffer).any(|dc| {
                        test_cells.contains(&LatticeCell {
                            col: cell.col + dc,
                            row: cell.row + dr,
                        })
                    })
                })
            };
            let train: Vec<usize> = (0..cells.len())
                .filter(|&i| !near_test(cells[i]))
                .collect();
            log::debug!(
                "spatial block: {} test rows, {} train rows, {} buffered",
                test.len(),
                train.len(),
                cells.len() - test.len() - train.len()
            );
            Fold { train, test }
        })
        .collect()
}
