//! Summary statistics shared by the protocol stages

pub fn euclidean_norm(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum::<f64>().sqrt()
}

/// Pearson correlation coefficient.
///
/// Returns `None` when the inputs are shorter than two samples or when
/// either side has zero variance (e.g. an all-ones bit vector).
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    assert_eq!(x.len(), y.len(), "pearson inputs must have equal length");
    let n = x.len();
    if n < 2 {
        return None;
    }

    let mean_x = x.iter().sum::<f64>() / n as f64;
    let mean_y = y.iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (&a, &b) in x.iter().zip(y.iter()) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x <= 0.0 || var_y <= 0.0 {
        return None;
    }
    Some(cov / (var_x * var_y).sqrt())
}

/// Pearson correlation of two 0/1 sequences treated as numeric vectors
pub fn bit_correlation(x: &[u8], y: &[u8]) -> Option<f64> {
    let xs: Vec<f64> = x.iter().map(|&b| f64::from(b)).collect();
    let ys: Vec<f64> = y.iter().map(|&b| f64::from(b)).collect();
    pearson(&xs, &ys)
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
