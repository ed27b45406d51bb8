//! Phase folding and binning of light curves into "river" matrices.
//!
//! A river matrix has one row per folded cycle and one column per phase bin;
//! each cell is an aggregate of the flux values that landed in it, or NaN
//! when nothing did. Rows cover the cycle range contiguously, so cycles with
//! no data appear as all-NaN rows.

use std::fmt::Display;
use std::str::FromStr;

use itertools::Itertools;
use log::debug;
use ndarray::parallel::prelude::*;
use ndarray::prelude::*;
use rayon::prelude::ParallelSlice;

use crate::error::FoldError;

/// How the flux values contributing to a cell are reduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    /// Arithmetic mean.
    Mean,

    /// Median (average of the two middle values for even counts).
    Median,

    /// Significance score: (cell mean - global mean) / global stddev, where
    /// the global statistics are computed once over all finite input fluxes.
    Sigma,
}

impl FromStr for Aggregation {
    type Err = FoldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mean" => Ok(Aggregation::Mean),
            "median" => Ok(Aggregation::Median),
            "sigma" => Ok(Aggregation::Sigma),
            _ => Err(FoldError::InvalidParameter(format!(
                "unknown aggregation '{s}' (expected mean, median or sigma)"
            ))),
        }
    }
}

impl Display for Aggregation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Aggregation::Mean => write!(f, "mean"),
            Aggregation::Median => write!(f, "median"),
            Aggregation::Sigma => write!(f, "sigma"),
        }
    }
}

/// The two binning semantics exposed by river-plotting tools: `bin_points`
/// can mean "this many consecutive points per group" or just participate in
/// choosing the phase resolution. Rather than inferring intent from the
/// parameters, the caller names the mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BinningMode {
    /// All values in a (cycle, phase-bin) cell are reduced in one pass.
    #[default]
    PhaseBins,

    /// Values in a cell are first reduced in consecutive groups of
    /// `bin_points` (in phase order), then the group values are reduced.
    /// Identical to `PhaseBins` when `bin_points` is 1.
    PointGroups,
}

impl FromStr for BinningMode {
    type Err = FoldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "phase-bins" | "phase" => Ok(BinningMode::PhaseBins),
            "point-groups" | "points" => Ok(BinningMode::PointGroups),
            _ => Err(FoldError::InvalidParameter(format!(
                "unknown binning mode '{s}' (expected phase-bins or point-groups)"
            ))),
        }
    }
}

/// Everything the fold needs beyond the samples themselves. No hidden state;
/// two calls with the same config and samples give the same matrix.
#[derive(Debug, Clone)]
pub struct FoldConfig {
    /// The period to fold on, in the same units as the sample times. Must be
    /// finite and positive.
    pub period: f64,

    /// The reference time defining phase zero. Defaults to the time of the
    /// first sample.
    pub epoch: Option<f64>,

    /// The number of consecutive phase-sorted samples aggregated per group
    /// in [`BinningMode::PointGroups`]; also feeds the derived `bin_count`.
    pub bin_points: usize,

    /// The number of phase columns. When `None`, derived from the sampling
    /// cadence so that roughly `bin_points` samples land in each bin per
    /// cycle: `round(period / (cadence * bin_points))`.
    pub bin_count: Option<usize>,

    pub aggregation: Aggregation,

    pub binning: BinningMode,
}

impl FoldConfig {
    pub fn new(period: f64) -> FoldConfig {
        FoldConfig {
            period,
            epoch: None,
            bin_points: 1,
            bin_count: None,
            aggregation: Aggregation::Mean,
            binning: BinningMode::PhaseBins,
        }
    }

    fn validate(&self) -> Result<(), FoldError> {
        if !self.period.is_finite() || self.period <= 0.0 {
            return Err(FoldError::InvalidParameter(format!(
                "period must be finite and positive, got {}",
                self.period
            )));
        }
        if let Some(epoch) = self.epoch {
            if !epoch.is_finite() {
                return Err(FoldError::InvalidParameter(format!(
                    "epoch must be finite, got {epoch}"
                )));
            }
        }
        if self.bin_points == 0 {
            return Err(FoldError::InvalidParameter(
                "bin_points must be at least 1".to_string(),
            ));
        }
        if self.bin_count == Some(0) {
            return Err(FoldError::InvalidParameter(
                "bin_count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// The derived, read-only output of one fold.
#[derive(Debug, Clone)]
pub struct RiverMatrix {
    /// Aggregated flux, shape (cycles, phase bins). Empty cells are NaN.
    pub values: Array2<f64>,

    /// How many finite flux values contributed to each cell.
    pub counts: Array2<u32>,

    /// The cycle index of row 0. Cycle indices can be negative when samples
    /// precede the epoch.
    pub first_cycle: i64,

    /// `bin_count + 1` boundaries partitioning [0, 1) into equal-width bins.
    pub phase_edges: Vec<f64>,

    /// The period and epoch actually used (epoch after defaulting).
    pub period: f64,
    pub epoch: f64,

    pub aggregation: Aggregation,
}

impl RiverMatrix {
    pub fn num_cycles(&self) -> usize {
        self.values.nrows()
    }

    pub fn num_bins(&self) -> usize {
        self.values.ncols()
    }

    /// The cycle index of the final row.
    pub fn last_cycle(&self) -> i64 {
        self.first_cycle + self.values.nrows() as i64 - 1
    }
}

/// Fold `times`/`fluxes` on the configured period and reduce each
/// (cycle, phase-bin) cell.
///
/// `times` must be strictly increasing and finite (as produced by the read
/// layer after masking); `fluxes` may contain non-finite values, which are
/// treated as missing and contribute to no cell.
pub fn fold_to_river(
    times: &[f64],
    fluxes: &[f64],
    config: &FoldConfig,
) -> Result<RiverMatrix, FoldError> {
    config.validate()?;
    if times.is_empty() {
        return Err(FoldError::EmptyInput);
    }
    if times.len() != fluxes.len() {
        return Err(FoldError::InvalidParameter(format!(
            "times and fluxes have different lengths ({} vs {})",
            times.len(),
            fluxes.len()
        )));
    }
    if let Some(t) = times.iter().find(|t| !t.is_finite()) {
        return Err(FoldError::InvalidParameter(format!(
            "non-finite sample time {t}"
        )));
    }

    let period = config.period;
    let epoch = config.epoch.unwrap_or(times[0]);

    // Global statistics over all finite fluxes. Needed for sigma scoring,
    // and cheap enough to always have for callers that want display limits.
    let (global_mean, global_std, num_finite) = global_stats(fluxes);
    if num_finite == 0 {
        return Err(FoldError::InsufficientData(
            "all flux values are non-finite".to_string(),
        ));
    }
    if config.aggregation == Aggregation::Sigma && global_std == 0.0 {
        return Err(FoldError::InsufficientData(
            "flux has zero variance; sigma scores are undefined".to_string(),
        ));
    }

    let bin_count = match config.bin_count {
        Some(n) => n,
        None => derive_bin_count(times, period, config.bin_points),
    };
    debug!("Folding {} samples on period {period}", times.len());
    debug!("Epoch: {epoch}");
    debug!("Phase bins: {bin_count}");

    // Phase/cycle for every sample. rem_euclid keeps phases in [0, 1) for
    // times before the epoch too, but can round up to exactly 1.0 for a
    // time just under the epoch; the bin clamp absorbs that.
    let cycles: Vec<i64> = times
        .iter()
        .map(|t| ((t - epoch) / period).floor() as i64)
        .collect();
    let bins: Vec<usize> = times
        .iter()
        .map(|t| {
            let phase = (t - epoch).rem_euclid(period) / period;
            ((phase * bin_count as f64) as usize).min(bin_count - 1)
        })
        .collect();

    let (first_cycle, last_cycle) = match cycles.iter().minmax() {
        itertools::MinMaxResult::NoElements => unreachable!("input verified non-empty"),
        itertools::MinMaxResult::OneElement(&c) => (c, c),
        itertools::MinMaxResult::MinMax(&min, &max) => (min, max),
    };
    let num_rows = usize::try_from(last_cycle - first_cycle + 1).expect("cycle range fits usize");
    debug!("Cycles {first_cycle}..={last_cycle} ({num_rows} rows)");

    // Gather each cell's finite fluxes. The input is time ordered and,
    // within one cycle, time order is phase order, so cells end up phase
    // sorted without an explicit sort.
    let mut cells: Vec<Vec<f64>> = vec![Vec::new(); num_rows * bin_count];
    for ((&cycle, &bin), &flux) in cycles.iter().zip(&bins).zip(fluxes) {
        if flux.is_finite() {
            let row = (cycle - first_cycle) as usize;
            cells[row * bin_count + bin].push(flux);
        }
    }

    let mut counts = Array2::zeros((num_rows, bin_count));
    for (cell, count) in cells.iter().zip(counts.iter_mut()) {
        *count = cell.len() as u32;
    }

    let mut values = Array2::from_elem((num_rows, bin_count), f64::NAN);
    values
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .zip(cells.par_chunks(bin_count))
        .for_each(|(mut row, row_cells)| {
            for (out, cell) in row.iter_mut().zip(row_cells) {
                if !cell.is_empty() {
                    *out = reduce_cell(cell, config, global_mean, global_std);
                }
            }
        });

    let phase_edges = (0..=bin_count)
        .map(|i| i as f64 / bin_count as f64)
        .collect();

    Ok(RiverMatrix {
        values,
        counts,
        first_cycle,
        phase_edges,
        period,
        epoch,
        aggregation: config.aggregation,
    })
}

/// Mean and population stddev over the finite fluxes, plus how many there
/// were.
fn global_stats(fluxes: &[f64]) -> (f64, f64, usize) {
    let mut n = 0usize;
    let mut sum = 0.0;
    for &f in fluxes {
        if f.is_finite() {
            n += 1;
            sum += f;
        }
    }
    if n == 0 {
        return (f64::NAN, f64::NAN, 0);
    }
    let mean = sum / n as f64;
    let var = fluxes
        .iter()
        .filter(|f| f.is_finite())
        .map(|f| (f - mean).powi(2))
        .sum::<f64>()
        / n as f64;
    (mean, var.sqrt(), n)
}

/// Pick a bin count from the sampling cadence (the minimum positive time
/// step) so that about `bin_points` samples land in each bin per cycle.
fn derive_bin_count(times: &[f64], period: f64, bin_points: usize) -> usize {
    let cadence = times
        .windows(2)
        .map(|t| t[1] - t[0])
        .filter(|&dt| dt > 0.0)
        .fold(f64::INFINITY, f64::min);
    if !cadence.is_finite() {
        // A single sample (or degenerate spacing); one bin covers [0, 1).
        debug!("No cadence derivable; defaulting to a single phase bin");
        return 1;
    }
    debug!("Derived cadence: {cadence}");
    let n = (period / (cadence * bin_points as f64)).round();
    if n < 1.0 {
        1
    } else {
        n as usize
    }
}

fn reduce_cell(cell: &[f64], config: &FoldConfig, global_mean: f64, global_std: f64) -> f64 {
    let reduced = match config.binning {
        BinningMode::PhaseBins => reduce_raw(cell, config.aggregation),
        BinningMode::PointGroups if config.bin_points <= 1 => {
            reduce_raw(cell, config.aggregation)
        }
        BinningMode::PointGroups => {
            // Sigma scores are taken of the cell mean, so the inner group
            // reduction is a mean; normalising both passes would not be a
            // significance score.
            let inner = match config.aggregation {
                Aggregation::Median => Aggregation::Median,
                Aggregation::Mean | Aggregation::Sigma => Aggregation::Mean,
            };
            let groups: Vec<f64> = cell
                .chunks(config.bin_points)
                .map(|g| reduce_raw(g, inner))
                .collect();
            reduce_raw(&groups, config.aggregation)
        }
    };
    match config.aggregation {
        Aggregation::Sigma => (reduced - global_mean) / global_std,
        _ => reduced,
    }
}

/// Reduce finite values with mean or median; for sigma, the cell statistic
/// is its mean (normalisation happens in the caller).
fn reduce_raw(values: &[f64], aggregation: Aggregation) -> f64 {
    match aggregation {
        Aggregation::Mean | Aggregation::Sigma => {
            values.iter().sum::<f64>() / values.len() as f64
        }
        Aggregation::Median => {
            let mut sorted = values.to_vec();
            sorted.sort_unstable_by(|a, b| a.partial_cmp(b).expect("finite values"));
            let mid = sorted.len() / 2;
            if sorted.len() % 2 == 1 {
                sorted[mid]
            } else {
                (sorted[mid - 1] + sorted[mid]) / 2.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn config(period: f64) -> FoldConfig {
        FoldConfig::new(period)
    }

    /// period=10, epoch=0, times 0..=24, flux=time: rows 0/1/2 hold 10/10/5
    /// samples, and the first cell is the t=0 sample alone.
    #[test]
    fn worked_example() {
        let times: Vec<f64> = (0..25).map(f64::from).collect();
        let fluxes = times.clone();
        let mut cfg = config(10.0);
        cfg.epoch = Some(0.0);
        cfg.bin_count = Some(10);

        let river = fold_to_river(&times, &fluxes, &cfg).unwrap();
        assert_eq!(river.values.dim(), (3, 10));
        assert_eq!(river.first_cycle, 0);
        assert_eq!(river.last_cycle(), 2);

        let row_counts: Vec<u32> = river
            .counts
            .rows()
            .into_iter()
            .map(|r| r.sum())
            .collect();
        assert_eq!(row_counts, vec![10, 10, 5]);

        assert_abs_diff_eq!(river.values[(0, 0)], 0.0);
        // Every cell in rows 0 and 1 holds exactly its sample's flux.
        assert_abs_diff_eq!(river.values[(1, 3)], 13.0);
        assert!(river.values[(2, 5)].is_nan());
    }

    #[test]
    fn every_sample_lands_in_one_cell() {
        let times: Vec<f64> = (0..100).map(|i| 0.31 * f64::from(i)).collect();
        let fluxes: Vec<f64> = times.iter().map(|t| t.sin()).collect();
        let mut cfg = config(2.7);
        cfg.bin_count = Some(7);

        let river = fold_to_river(&times, &fluxes, &cfg).unwrap();
        assert_eq!(river.counts.sum(), 100);
    }

    #[test]
    fn non_finite_fluxes_are_missing_not_counted() {
        let times = vec![0.0, 1.0, 2.0, 3.0];
        let fluxes = vec![1.0, f64::NAN, 3.0, f64::INFINITY];
        let mut cfg = config(4.0);
        cfg.bin_count = Some(4);

        let river = fold_to_river(&times, &fluxes, &cfg).unwrap();
        assert_eq!(river.counts.sum(), 2);
        assert!(river.values[(0, 1)].is_nan());
    }

    #[test]
    fn empty_cycles_become_nan_rows() {
        // Samples in cycles 0 and 2 only.
        let times = vec![0.0, 1.0, 25.0, 26.0];
        let fluxes = vec![1.0, 2.0, 3.0, 4.0];
        let mut cfg = config(10.0);
        cfg.epoch = Some(0.0);
        cfg.bin_count = Some(5);

        let river = fold_to_river(&times, &fluxes, &cfg).unwrap();
        assert_eq!(river.num_cycles(), 3);
        assert!(river.values.row(1).iter().all(|v| v.is_nan()));
        assert_eq!(river.counts.row(1).sum(), 0);
    }

    #[test]
    fn negative_cycles_before_epoch() {
        let times = vec![-5.0, 5.0];
        let fluxes = vec![1.0, 2.0];
        let mut cfg = config(10.0);
        cfg.epoch = Some(0.0);
        cfg.bin_count = Some(2);

        let river = fold_to_river(&times, &fluxes, &cfg).unwrap();
        assert_eq!(river.first_cycle, -1);
        // t=-5 has phase 0.5.
        assert_abs_diff_eq!(river.values[(0, 1)], 1.0);
        assert_abs_diff_eq!(river.values[(1, 1)], 2.0);
    }

    /// A time a hair before the epoch folds to phase 1.0 exactly in floats;
    /// it must land in the last bin, not out of range.
    #[test]
    fn phase_one_edge_goes_to_last_bin() {
        let times = vec![-1e-20, 1.0];
        let fluxes = vec![7.0, 8.0];
        let mut cfg = config(2.0);
        cfg.epoch = Some(0.0);
        cfg.bin_count = Some(4);

        let river = fold_to_river(&times, &fluxes, &cfg).unwrap();
        assert_eq!(river.first_cycle, -1);
        assert_abs_diff_eq!(river.values[(0, 3)], 7.0);
    }

    #[test]
    fn median_of_odd_cell_is_middle_value() {
        // All three phases fall in bin 0 of cycle 0.
        let times = vec![0.0, 0.05, 0.09];
        let fluxes = vec![5.0, 1.0, 9.0];
        let mut cfg = config(10.0);
        cfg.epoch = Some(0.0);
        cfg.bin_count = Some(10);
        cfg.aggregation = Aggregation::Median;

        let river = fold_to_river(&times, &fluxes, &cfg).unwrap();
        assert_abs_diff_eq!(river.values[(0, 0)], 5.0);
    }

    #[test]
    fn median_of_even_cell_averages_middles() {
        let times = vec![0.0, 0.01, 0.02, 0.03];
        let fluxes = vec![4.0, 1.0, 3.0, 2.0];
        let mut cfg = config(10.0);
        cfg.epoch = Some(0.0);
        cfg.bin_count = Some(10);
        cfg.aggregation = Aggregation::Median;

        let river = fold_to_river(&times, &fluxes, &cfg).unwrap();
        assert_abs_diff_eq!(river.values[(0, 0)], 2.5);
    }

    /// With singleton cells, sigma scores are just standardised fluxes, so
    /// the matrix has mean 0 and (population) stddev 1 by construction.
    #[test]
    fn sigma_scores_are_standardised() {
        let times: Vec<f64> = (0..20).map(f64::from).collect();
        let fluxes: Vec<f64> = (0..20).map(|i| f64::from(i) * 1.5 + 3.0).collect();
        let mut cfg = config(20.0);
        cfg.epoch = Some(0.0);
        cfg.bin_count = Some(20);
        cfg.aggregation = Aggregation::Sigma;

        let river = fold_to_river(&times, &fluxes, &cfg).unwrap();
        let cells: Vec<f64> = river.values.iter().copied().collect();
        let mean = cells.iter().sum::<f64>() / cells.len() as f64;
        let std =
            (cells.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / cells.len() as f64).sqrt();
        assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(std, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn point_groups_reduce_in_two_passes() {
        // One cell with fluxes [1, 2, 3, 100]; groups of 2 have medians
        // [1.5, 51.5], whose median is 26.5. A flat median would be 2.5.
        let times = vec![0.0, 0.01, 0.02, 0.03];
        let fluxes = vec![1.0, 2.0, 3.0, 100.0];
        let mut cfg = config(10.0);
        cfg.epoch = Some(0.0);
        cfg.bin_count = Some(1);
        cfg.bin_points = 2;
        cfg.aggregation = Aggregation::Median;
        cfg.binning = BinningMode::PointGroups;

        let river = fold_to_river(&times, &fluxes, &cfg).unwrap();
        assert_abs_diff_eq!(river.values[(0, 0)], 26.5);

        cfg.binning = BinningMode::PhaseBins;
        let flat = fold_to_river(&times, &fluxes, &cfg).unwrap();
        assert_abs_diff_eq!(flat.values[(0, 0)], 2.5);
    }

    #[test]
    fn bin_count_derived_from_cadence() {
        let times: Vec<f64> = (0..30).map(|i| 0.1 * f64::from(i)).collect();
        let fluxes = vec![1.0; 30];
        let cfg = config(1.0);

        let river = fold_to_river(&times, &fluxes, &cfg).unwrap();
        assert_eq!(river.num_bins(), 10);

        let mut cfg = config(1.0);
        cfg.bin_points = 5;
        let river = fold_to_river(&times, &fluxes, &cfg).unwrap();
        assert_eq!(river.num_bins(), 2);
    }

    #[test]
    fn single_sample_folds_to_one_bin() {
        let river = fold_to_river(&[3.0], &[42.0], &config(2.0)).unwrap();
        assert_eq!(river.values.dim(), (1, 1));
        assert_abs_diff_eq!(river.values[(0, 0)], 42.0);
        assert_abs_diff_eq!(river.epoch, 3.0);
    }

    #[test]
    fn identical_inputs_give_identical_matrices() {
        let times: Vec<f64> = (0..50).map(|i| 0.21 * f64::from(i)).collect();
        let fluxes: Vec<f64> = times.iter().map(|t| (t * 3.0).cos()).collect();
        let mut cfg = config(1.3);
        cfg.aggregation = Aggregation::Sigma;

        let a = fold_to_river(&times, &fluxes, &cfg).unwrap();
        let b = fold_to_river(&times, &fluxes, &cfg).unwrap();
        assert_eq!(a.values, b.values);
        assert_eq!(a.counts, b.counts);
        assert_eq!(a.phase_edges, b.phase_edges);
    }

    #[test]
    fn phase_edges_partition_unit_interval() {
        let mut cfg = config(1.0);
        cfg.bin_count = Some(8);
        let river = fold_to_river(&[0.0, 0.5], &[1.0, 2.0], &cfg).unwrap();
        assert_eq!(river.phase_edges.len(), 9);
        assert_abs_diff_eq!(river.phase_edges[0], 0.0);
        assert_abs_diff_eq!(*river.phase_edges.last().unwrap(), 1.0);
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(matches!(
            fold_to_river(&[], &[], &config(1.0)),
            Err(FoldError::EmptyInput)
        ));
    }

    #[test]
    fn non_positive_period_is_an_error() {
        for period in [0.0, -1.0, f64::NAN] {
            assert!(matches!(
                fold_to_river(&[0.0], &[1.0], &config(period)),
                Err(FoldError::InvalidParameter(_))
            ));
        }
    }

    #[test]
    fn all_non_finite_flux_is_an_error() {
        let result = fold_to_river(&[0.0, 1.0], &[f64::NAN, f64::NAN], &config(1.0));
        assert!(matches!(result, Err(FoldError::InsufficientData(_))));
    }

    #[test]
    fn zero_variance_sigma_is_an_error() {
        let mut cfg = config(1.0);
        cfg.aggregation = Aggregation::Sigma;
        let result = fold_to_river(&[0.0, 0.1, 0.2], &[5.0, 5.0, 5.0], &cfg);
        assert!(matches!(result, Err(FoldError::InsufficientData(_))));
    }

    #[test]
    fn unknown_aggregation_string_is_an_error() {
        assert!("mean".parse::<Aggregation>().is_ok());
        assert!("MEDIAN".parse::<Aggregation>().is_ok());
        assert!(matches!(
            "average".parse::<Aggregation>(),
            Err(FoldError::InvalidParameter(_))
        ));
    }
}
