//! Helper functions

/// Median of a set of floats. Returns NaN for an empty set.
pub fn median_of_floats(mut values: Vec<f64>) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }

    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;

    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}
