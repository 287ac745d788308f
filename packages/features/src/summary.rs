//! Descriptive statistics of the predictor columns.

use std::collections::BTreeMap;
use std::fmt;

use acre_map_field_models::AcreRow;
use serde::Serialize;

/// Count, missing count, and moments of one numeric column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericSummary {
    pub column: &'static str,
    pub count: usize,
    pub missing: usize,
    pub mean: Option<f64>,
    /// Sample standard deviation.
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Level counts of one categorical column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoricalSummary {
    pub column: &'static str,
    pub count: usize,
    pub missing: usize,
    pub levels: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictorSummary {
    pub rows: usize,
    pub rows_with_yield: usize,
    pub numeric: Vec<NumericSummary>,
    pub categorical: Vec<CategoricalSummary>,
}

/// Summarises the predictor columns of an acre table.
#[must_use]
pub fn summarize_predictors(rows: &[AcreRow]) -> PredictorSummary {
    let numeric_columns: [(&'static str, fn(&AcreRow) -> Option<f64>); 4] = [
        ("mean_nitrogen_lb_ac", |r| r.mean_nitrogen_lb_ac),
        ("rainfall_in", |r| r.rainfall_in),
        ("lat", |r| Some(r.lat)),
        ("lon", |r| Some(r.lon)),
    ];

    let numeric = numeric_columns
        .into_iter()
        .map(|(column, get)| summarize_numeric(column, rows.iter().map(get)))
        .collect();

    let mut soil = CategoricalSummary {
        column: "soil_musym",
        count: 0,
        missing: 0,
        levels: BTreeMap::new(),
    };
    for row in rows {
        match &row.soil_musym {
            Some(musym) => {
                soil.count += 1;
                *soil.levels.entry(musym.clone()).or_default() += 1;
            }
            None => soil.missing += 1,
        }
    }

    PredictorSummary {
        rows: rows.len(),
        rows_with_yield: rows.iter().filter(|r| r.mean_yield_bu_ac.is_some()).count(),
        numeric,
        categorical: vec![soil],
    }
}

#[allow(clippy::cast_precision_loss)]
fn summarize_numeric(
    column: &'static str,
    values: impl Iterator<Item = Option<f64>>,
) -> NumericSummary {
    let mut present = Vec::new();
    let mut missing = 0;
    for value in values {
        match value.filter(|v| v.is_finite()) {
            Some(v) => present.push(v),
            None => missing += 1,
        }
    }

    let count = present.len();
    let mean = (count > 0).then(|| present.iter().sum::<f64>() / count as f64);
    let std = mean.filter(|_| count > 1).map(|mean| {
        let ss: f64 = present.iter().map(|v| (v - mean).powi(2)).sum();
        (ss / (count - 1) as f64).sqrt()
    });

    NumericSummary {
        column,
        count,
        missing,
        mean,
        std,
        min: present.iter().copied().reduce(f64::min),
        max: present.iter().copied().reduce(f64::max),
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.3}"))
}

impl fmt::Display for PredictorSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} rows ({} with yield)",
            self.rows, self.rows_with_yield
        )?;
        writeln!(
            f,
            "{:<22} {:>6} {:>8} {:>12} {:>12} {:>12} {:>12}",
            "column", "count", "missing", "mean", "std", "min", "max"
        )?;
        for s in &self.numeric {
            writeln!(
                f,
                "{:<22} {:>6} {:>8} {:>12} {:>12} {:>12} {:>12}",
                s.column,
                s.count,
                s.missing,
                fmt_opt(s.mean),
                fmt_opt(s.std),
                fmt_opt(s.min),
                fmt_opt(s.max)
            )?;
        }
        for c in &self.categorical {
            writeln!(
                f,
                "{:<22} {:>6} {:>8}  {} levels",
                c.column,
                c.count,
                c.missing,
                c.levels.len()
            )?;
            for (level, n) in &c.levels {
                writeln!(f, "    {level:<18} {n:>6}")?;
            }
        }
        Ok(())
    }
}
