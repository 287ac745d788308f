#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Immutable run configuration for one field/season.
//!
//! A [`RunConfig`] is parsed from TOML once, validated with
//! [`RunConfig::validate`], and then passed by reference into every
//! component that needs a threshold, CRS code, or service parameter.
//! Nothing downstream falls back to global defaults.
//!
//! Thresholds that decide which data is trusted (CRS identifiers,
//! phantom-acre thresholds, the external systemic-failure fraction)
//! have no serde default and must be present in the file.

use std::path::{Path, PathBuf};

use acre_map_evaluation_models::{ModelKind, SplitStrategy};
use acre_map_field_models::{ACRE_COLUMNS, SeasonRange};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Annotated example configuration, embedded at compile time.
pub const EXAMPLE_CONFIG: &str = include_str!("../field.example.toml");

/// Columns that can never be marked optional.
pub const REQUIRED_COLUMNS: [&str; 3] = ["mean_yield_bu_ac", "lat", "lon"];

/// Errors from loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("I/O error reading config: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML document is malformed or missing required keys.
    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is present but out of range or inconsistent.
    #[error("Invalid config: {message}")]
    Invalid {
        /// What is wrong.
        message: String,
    },
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        message: message.into(),
    }
}

/// Complete configuration for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub field: FieldConfig,
    pub crs: CrsConfig,
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub aggregate: AggregateConfig,
    pub phantom: PhantomThresholds,
    pub external: ExternalConfig,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
}

/// Which farm, field, and season this run describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConfig {
    pub farm_name: String,
    pub field_name: String,
    pub season: i32,
    pub crop: String,
    pub growing_season_start: NaiveDate,
    pub growing_season_end: NaiveDate,
    /// Where the dataset is written. Defaults to
    /// `data/processed/<farm>_<field>_<season>`.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

impl FieldConfig {
    #[must_use]
    pub const fn season_range(&self) -> SeasonRange {
        SeasonRange {
            start: self.growing_season_start,
            end: self.growing_season_end,
        }
    }

    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(|| {
            PathBuf::from("data/processed").join(format!(
                "{}_{}_{}",
                self.farm_name.to_lowercase(),
                self.field_name.to_lowercase(),
                self.season
            ))
        })
    }
}

/// Coordinate reference systems, as `EPSG:<code>` identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrsConfig {
    /// CRS of loader coordinates (WGS84 lat/lon).
    pub geographic: String,
    /// Linear-distance CRS the grid is built in (a UTM zone or other
    /// metre-unit system PROJ can resolve).
    pub projected: String,
}

/// Acre lattice parameters, in projected units (meters).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Edge length of one square cell.
    pub cell_size_m: f64,
    /// Area one cell is meant to represent.
    pub acre_area_m2: f64,
    /// Allowed deviation of `cell_size_m²` from `acre_area_m2`.
    pub area_tolerance_m2: f64,
    /// Outward buffer applied to the yield-point convex hull when no
    /// boundary is supplied.
    pub hull_margin_m: f64,
    /// Keep a cell whose centroid is outside the boundary when at least
    /// this fraction of its area overlaps it.
    pub min_overlap_fraction: Option<f64>,
    /// Points this far outside a cell's edge still count as inside.
    pub assignment_tolerance_m: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            cell_size_m: 63.6,
            acre_area_m2: 4046.86,
            area_tolerance_m2: 25.0,
            hull_margin_m: 5.0,
            min_overlap_fraction: Some(0.5),
            assignment_tolerance_m: 1.0,
        }
    }
}

/// Point aggregation options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateConfig {
    /// Nitrogen points from different passes whose projected positions
    /// round to the same multiple of this resolution are summed into
    /// one application. `None` disables merging.
    pub nitrogen_merge_resolution_m: Option<f64>,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            nitrogen_merge_resolution_m: Some(0.1),
        }
    }
}

/// Thresholds that mark a cell as a phantom acre.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhantomThresholds {
    pub min_yield_points: usize,
    /// Maximum `yield_std / mean_yield`.
    pub max_yield_cv: f64,
    pub min_plausible_yield: f64,
    pub max_plausible_yield: f64,
    /// Minimum point count as a fraction of the median count over cells
    /// with any yield data.
    #[serde(default)]
    pub min_density_fraction: Option<f64>,
}

/// External lookup behaviour shared by the weather and soil services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalConfig {
    /// The join fails when more than this fraction of cells is left
    /// with a missing attribute.
    pub max_failure_fraction: f64,
    #[serde(default = "default_concurrency")]
    pub max_concurrent_requests: usize,
    #[serde(default = "default_attempts")]
    pub max_attempts: u32,
    /// First retry waits this long; each further retry doubles it.
    #[serde(default = "default_backoff_ms")]
    pub backoff_base_ms: u64,
    #[serde(default)]
    pub weather: WeatherServiceConfig,
    #[serde(default)]
    pub soil: SoilServiceConfig,
}

const fn default_concurrency() -> usize {
    8
}

const fn default_attempts() -> u32 {
    3
}

const fn default_backoff_ms() -> u64 {
    500
}

/// Open-Meteo ERA5 archive settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherServiceConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Native grid spacing of the weather product, in degrees.
    pub resolution_deg: f64,
}

impl Default for WeatherServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://archive-api.open-meteo.com/v1/era5".to_string(),
            timeout_secs: 30,
            resolution_deg: 0.25,
        }
    }
}

/// USDA Soil Data Access settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoilServiceConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Lookup locations are snapped to this spacing, in degrees.
    pub resolution_deg: f64,
}

impl Default for SoilServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://SDMDataAccess.sc.egov.usda.gov/Tabular/post.rest".to_string(),
            timeout_secs: 30,
            resolution_deg: 0.0001,
        }
    }
}

/// Feature table schema options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Columns allowed to be empty in the output.
    pub optional_columns: Vec<String>,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            optional_columns: [
                "mean_nitrogen_lb_ac",
                "rainfall_in",
                "soil_musym",
                "soil_muname",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
        }
    }
}

impl FeatureConfig {
    #[must_use]
    pub fn is_optional(&self, column: &str) -> bool {
        self.optional_columns.iter().any(|c| c == column)
    }
}

/// Evaluation harness options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub models: Vec<ModelKind>,
    pub splits: Vec<SplitStrategy>,
    /// Include `lat`/`lon` as predictors.
    pub use_coords: bool,
    /// Also evaluate the `[N, N², soil]` OLS baseline.
    pub include_quadratic_baseline: bool,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            models: vec![
                ModelKind::LinearRegression,
                ModelKind::Ridge { alpha: 1.0 },
                ModelKind::Lasso { alpha: 0.1 },
                ModelKind::ElasticNet {
                    alpha: 0.1,
                    l1_ratio: 0.5,
                },
                ModelKind::GradientBoosting {
                    n_estimators: 100,
                    learning_rate: 0.1,
                    max_depth: 3,
                },
            ],
            splits: vec![
                SplitStrategy::RandomHoldout {
                    test_fraction: 0.2,
                    seed: 0,
                },
                SplitStrategy::KFold { k: 5, seed: 0 },
                SplitStrategy::SpatialBlocks {
                    blocks_x: 2,
                    blocks_y: 2,
                    buffer_cells: 1,
                },
            ],
            use_coords: true,
            include_quadratic_baseline: true,
        }
    }
}

impl RunConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or missing
    /// required keys, and [`ConfigError::Invalid`] for out-of-range
    /// values.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::de::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses, and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or fails
    /// [`RunConfig::from_toml_str`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        log::info!(
            "Loaded config for {}/{} season {} from {}",
            config.field.farm_name,
            config.field.field_name,
            config.field.season,
            path.display()
        );
        Ok(config)
    }

    /// Checks ranges and cross-field consistency.
    ///
    /// CRS identifiers are checked separately when the projection is
    /// constructed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    #[allow(clippy::too_many_lines)]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.field.growing_season_start > self.field.growing_season_end {
            return Err(invalid(format!(
                "growing season starts ({}) after it ends ({})",
                self.field.growing_season_start, self.field.growing_season_end
            )));
        }

        let grid = &self.grid;
        if !(grid.cell_size_m.is_finite() && grid.cell_size_m > 0.0) {
            return Err(invalid("grid.cell_size_m must be positive"));
        }
        let cell_area = grid.cell_size_m * grid.cell_size_m;
        if (cell_area - grid.acre_area_m2).abs() > grid.area_tolerance_m2 {
            return Err(invalid(format!(
                "grid.cell_size_m² = {cell_area:.2} m² is not within {} m² of the acre area {} m²",
                grid.area_tolerance_m2, grid.acre_area_m2
            )));
        }
        if grid.hull_margin_m < 0.0 || grid.assignment_tolerance_m < 0.0 {
            return Err(invalid(
                "grid.hull_margin_m and grid.assignment_tolerance_m must be non-negative",
            ));
        }
        if grid.assignment_tolerance_m >= grid.cell_size_m / 2.0 {
            return Err(invalid(
                "grid.assignment_tolerance_m must be less than half the cell size",
            ));
        }
        if let Some(fraction) = grid.min_overlap_fraction {
            check_fraction("grid.min_overlap_fraction", fraction)?;
        }

        if let Some(resolution) = self.aggregate.nitrogen_merge_resolution_m {
            if !(resolution.is_finite() && resolution > 0.0) {
                return Err(invalid(
                    "aggregate.nitrogen_merge_resolution_m must be positive",
                ));
            }
        }

        let phantom = &self.phantom;
        if !(phantom.max_yield_cv.is_finite() && phantom.max_yield_cv >= 0.0) {
            return Err(invalid("phantom.max_yield_cv must be non-negative"));
        }
        if phantom.min_plausible_yield > phantom.max_plausible_yield {
            return Err(invalid(
                "phantom.min_plausible_yield exceeds phantom.max_plausible_yield",
            ));
        }
        if let Some(fraction) = phantom.min_density_fraction {
            if !(fraction.is_finite() && fraction >= 0.0) {
                return Err(invalid("phantom.min_density_fraction must be non-negative"));
            }
        }

        let external = &self.external;
        check_fraction("external.max_failure_fraction", external.max_failure_fraction)?;
        if external.max_concurrent_requests == 0 {
            return Err(invalid("external.max_concurrent_requests must be at least 1"));
        }
        if external.max_attempts == 0 {
            return Err(invalid("external.max_attempts must be at least 1"));
        }
        for (name, resolution) in [
            ("external.weather.resolution_deg", external.weather.resolution_deg),
            ("external.soil.resolution_deg", external.soil.resolution_deg),
        ] {
            if !(resolution.is_finite() && resolution > 0.0) {
                return Err(invalid(format!("{name} must be positive")));
            }
        }

        for column in &self.features.optional_columns {
            if !ACRE_COLUMNS.contains(&column.as_str()) {
                return Err(invalid(format!(
                    "features.optional_columns: unknown column '{column}'"
                )));
            }
            if REQUIRED_COLUMNS.contains(&column.as_str()) {
                return Err(invalid(format!(
                    "features.optional_columns: '{column}' is always required"
                )));
            }
        }

        for split in &self.evaluation.splits {
            match split {
                SplitStrategy::RandomHoldout { test_fraction, .. } => {
                    if !(*test_fraction > 0.0 && *test_fraction < 1.0) {
                        return Err(invalid(
                            "random_holdout.test_fraction must be in (0, 1)",
                        ));
                    }
                }
                SplitStrategy::KFold { k, .. } => {
                    if *k < 2 {
                        return Err(invalid("k_fold.k must be at least 2"));
                    }
                }
                SplitStrategy::SpatialBlocks {
                    blocks_x,
                    blocks_y,
                    buffer_cells,
                } => {
                    if *blocks_x == 0 || *blocks_y == 0 || blocks_x * blocks_y < 2 {
                        return Err(invalid(
                            "spatial_blocks needs at least two blocks in total",
                        ));
                    }
                    if *buffer_cells < 1 {
                        return Err(invalid(
                            "spatial_blocks.buffer_cells must be at least 1 so training \
                             cells never touch the test block",
                        ));
                    }
                }
            }
        }

        for model in &self.evaluation.models {
            match model {
                ModelKind::LinearRegression => {}
                ModelKind::Ridge { alpha } | ModelKind::Lasso { alpha } => {
                    if *alpha < 0.0 {
                        return Err(invalid(format!("{}: alpha must be >= 0", model.name())));
                    }
                }
                ModelKind::ElasticNet { alpha, l1_ratio } => {
                    if *alpha < 0.0 || !(0.0..=1.0).contains(l1_ratio) {
                        return Err(invalid(format!(
                            "{}: alpha must be >= 0 and l1_ratio in [0, 1]",
                            model.name()
                        )));
                    }
                }
                ModelKind::GradientBoosting {
                    n_estimators,
                    learning_rate,
                    max_depth,
                } => {
                    if *n_estimators == 0 || *max_depth == 0 || *learning_rate <= 0.0 {
                        return Err(invalid(format!(
                            "{}: n_estimators, max_depth, learning_rate must be positive",
                            model.name()
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

fn check_fraction(name: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be within [0, 1], got {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn example_config_is_valid() {
        let config = RunConfig::from_toml_str(EXAMPLE_CONFIG).unwrap();
        assert_eq!(config.crs.projected, "EPSG:32615");
        assert_eq!(config.evaluation.models.len(), 5);
        assert_eq!(config.evaluation.splits.len(), 3);
        assert!(config.features.is_optional("rainfall_in"));
        assert!(!config.features.is_optional("lat"));
        assert_eq!(
            config.field.output_dir(),
            PathBuf::from("data/processed/hartwell_north40_2024")
        );
    }

    #[test]
    fn missing_failure_fraction_is_a_parse_error() {
        let without = EXAMPLE_CONFIG.replace("max_failure_fraction = 0.2\n", "");
        assert!(matches!(
            RunConfig::from_toml_str(&without),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_phantom_section_is_a_parse_error() {
        let without = EXAMPLE_CONFIG.replace("[phantom]\n", "[phantom_disabled]\n");
        assert!(RunConfig::from_toml_str(&without).is_err());
    }

    #[test]
    fn rejects_cell_size_far_from_one_acre() {
        let bad = EXAMPLE_CONFIG.replace("cell_size_m = 63.6", "cell_size_m = 30.0");
        assert!(matches!(
            RunConfig::from_toml_str(&bad),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn rejects_reversed_season() {
        let bad = EXAMPLE_CONFIG.replace(
            "growing_season_end = \"2024-10-15\"",
            "growing_season_end = \"2024-01-01\"",
        );
        assert!(matches!(
            RunConfig::from_toml_str(&bad),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn rejects_required_column_marked_optional() {
        let bad = EXAMPLE_CONFIG.replace(
            "optional_columns = [\"mean_nitrogen_lb_ac\"",
            "optional_columns = [\"lat\", \"mean_nitrogen_lb_ac\"",
        );
        assert!(matches!(
            RunConfig::from_toml_str(&bad),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn rejects_single_block_spatial_split() {
        let bad = EXAMPLE_CONFIG.replace("blocks_x = 2\nblocks_y = 2", "blocks_x = 1\nblocks_y = 1");
        assert!(matches!(
            RunConfig::from_toml_str(&bad),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn rejects_spatial_split_without_buffer() {
        let bad = EXAMPLE_CONFIG.replace("buffer_cells = 1", "buffer_cells = 0");
        assert_ne!(bad, EXAMPLE_CONFIG);
        let Err(ConfigError::Invalid { message }) = RunConfig::from_toml_str(&bad) else {
            panic!("a zero buffer must be rejected");
        };
        assert!(message.contains("buffer_cells"), "{message}");
    }

    #[test]
    fn season_range_mirrors_field_dates() {
        let config = RunConfig::from_toml_str(EXAMPLE_CONFIG).unwrap();
        let range = config.field.season_range();
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2024, 4, 15).unwrap());
        assert_eq!(range.end, NaiveDate::from_ymd_opt(2024, 10, 15).unwrap());
    }
}
