//! Percentile Computation
//!
//! Nearest-rank percentiles without interpolation. The rank `n * p / 100` is
//! rounded up when fractional and used as a zero-based index, so a percentile
//! is undefined (`None`) once the rank reaches the end of the data. With fewer
//! than ~100 samples p99 is usually undefined; that is the intended signal
//! that the tail has not been observed yet.

/// Sort values ascending, in place.
pub fn sort(values: &mut [f64]) {
    values.sort_by(f64::total_cmp);
}

/// Return the first value above `percentile` percent of the other values.
///
/// Sorts `values` in place as a side effect. Returns `None` when no such value
/// exists.
///
/// # Examples
///
/// ```
/// # use loaded_stats::percentile;
/// let mut values: Vec<f64> = (0..10).map(f64::from).collect();
/// assert_eq!(percentile(&mut values, 50.0), Some(5.0));
/// assert_eq!(percentile(&mut values, 90.0), Some(9.0));
/// ```
pub fn percentile(values: &mut [f64], percentile: f64) -> Option<f64> {
    sort(values);

    // Multiply before dividing so integral ranks stay exact
    let rank = values.len() as f64 * percentile / 100.0;
    let index = rank.ceil() as usize;

    values.get(index).copied()
}
