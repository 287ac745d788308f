//! Phantom-acre filtering.

use acre_map_config::PhantomThresholds;
use acre_map_field_models::{CellAggregate, CellId};
use serde::Serialize;

use crate::AggregateError;

/// Why a cell was treated as a phantom acre.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum PhantomReason {
    /// No yield point fell in the cell.
    NoYieldData,
    /// Fewer yield points than `min_yield_points`.
    TooFewPoints { count: usize, min: usize },
    /// `yield_std / mean_yield` above `max_yield_cv`.
    NoisyYield { cv: f64, max: f64 },
    /// Mean yield outside the plausible range for the crop.
    ImplausibleMean { mean: f64 },
    /// Point count below `min_density_fraction` of the median count.
    BelowDensity { count: usize, required: f64 },
}

/// A filtered-out cell and every rule it broke.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedCell {
    pub cell_id: CellId,
    pub reasons: Vec<PhantomReason>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhantomFilterOutcome {
    /// Surviving aggregates, in input order.
    pub kept: Vec<CellAggregate>,
    pub rejected: Vec<RejectedCell>,
}

/// Drops cells whose aggregates are too sparse or too noisy to trust.
///
/// A cell is rejected when any of these holds: it has no yield data;
/// its yield point count is below `min_yield_points`; its coefficient
/// of variation exceeds `max_yield_cv`; its mean lies outside
/// `[min_plausible_yield, max_plausible_yield]`; or, when
/// `min_density_fraction` is set, its count is below that fraction of
/// the median count over cells with yield data.
///
/// # Errors
///
/// Returns [`AggregateError::NoReliableAcres`] if no cell survives.
pub fn filter_phantom_acres(
    aggregates: &[CellAggregate],
    thresholds: &PhantomThresholds,
) -> Result<PhantomFilterOutcome, AggregateError> {
    let density_floor = thresholds
        .min_density_fraction
        .and_then(|fraction| median_yield_count(aggregates).map(|median| fraction * median));

    let mut kept = Vec::new();
    let mut rejected = Vec::new();

    for aggregate in aggregates {
        let reasons = phantom_reasons(aggregate, thresholds, density_floor);
        if reasons.is_empty() {
            kept.push(aggregate.clone());
        } else {
            log::debug!("Cell {} is a phantom acre: {reasons:?}", aggregate.cell_id);
            rejected.push(RejectedCell {
                cell_id: aggregate.cell_id,
                reasons,
            });
        }
    }

    if kept.is_empty() {
        log::error!("All {} cells were filtered as phantom acres", aggregates.len());
        return Err(AggregateError::NoReliableAcres {
            total_cells: aggregates.len(),
        });
    }

    log::info!(
        "Phantom filter kept {} of {} cells",
        kept.len(),
        aggregates.len()
    );

    Ok(PhantomFilterOutcome { kept, rejected })
}

#[allow(clippy::cast_precision_loss)]
fn phantom_reasons(
    aggregate: &CellAggregate,
    thresholds: &PhantomThresholds,
    density_floor: Option<f64>,
) -> Vec<PhantomReason> {
    let Some(mean) = aggregate.mean_yield else {
        return vec![PhantomReason::NoYieldData];
    };

    let mut reasons = Vec::new();
    let count = aggregate.yield_point_count;

    if count < thresholds.min_yield_points {
        reasons.push(PhantomReason::TooFewPoints {
            count,
            min: thresholds.min_yield_points,
        });
    }
    if let Some(cv) = aggregate
        .yield_cv()
        .filter(|&cv| cv > thresholds.max_yield_cv)
    {
        reasons.push(PhantomReason::NoisyYield {
            cv,
            max: thresholds.max_yield_cv,
        });
    }
    if !(thresholds.min_plausible_yield..=thresholds.max_plausible_yield).contains(&mean) {
        reasons.push(PhantomReason::ImplausibleMean { mean });
    }
    if let Some(required) = density_floor.filter(|&required| (count as f64) < required) {
        reasons.push(PhantomReason::BelowDensity { count, required });
    }

    reasons
}

#[allow(clippy::cast_precision_loss)]
fn median_yield_count(aggregates: &[CellAggregate]) -> Option<f64> {
    let mut counts: Vec<usize> = aggregates
        .iter()
        .map(|a| a.yield_point_count)
        .filter(|&c| c > 0)
        .collect();
    if counts.is_empty() {
        return None;
    }
    counts.sort_unstable();
    let mid = counts.len() / 2;
    Some(if counts.len() % 2 == 0 {
        (counts[mid - 1] + counts[mid]) as f64 / 2.0
    } else {
        counts[mid] as f64
    })
}
