//! Area-average resampling.
//!
//! Every destination pixel is the mean of the source area it covers, with
//! partially covered source pixels weighted by their overlap. Unlike
//! nearest-neighbour sampling this keeps small details from aliasing into
//! the fingerprint, and unlike filtered resizes it needs no kernel support
//! beyond the covered area.

/// Per destination index, the contributing source indices and their weights.
/// Weights for one destination index sum to 1.
fn coverage_weights(src_len: usize, dst_len: usize) -> Vec<Vec<(usize, f64)>> {
    let scale = src_len as f64 / dst_len as f64;

    (0..dst_len)
        .map(|d| {
            let start = d as f64 * scale;
            let end = (d + 1) as f64 * scale;
            let first = start.floor() as usize;
            let last = (end.ceil() as usize).min(src_len);

            (first..last)
                .filter_map(|s| {
                    let overlap = end.min((s + 1) as f64) - start.max(s as f64);
                    (overlap > 0.0).then(|| (s, overlap / scale))
                })
                .collect()
        })
        .collect()
}

/// Resample a `src_w` x `src_h` plane to `dst_w` x `dst_h` by area averaging.
///
/// `sample(x, y)` returns the source value; it is called exactly once per
/// source pixel. The result is row-major.
pub fn area_resample<F>(
    src_w: usize,
    src_h: usize,
    dst_w: usize,
    dst_h: usize,
    sample: F,
) -> Vec<f64>
where
    F: Fn(usize, usize) -> f64,
{
    let x_weights = coverage_weights(src_w, dst_w);
    let y_weights = coverage_weights(src_h, dst_h);

    // Horizontal pass: src_h rows of dst_w columns
    let mut rows = vec![0.0f64; src_h * dst_w];
    let mut line = vec![0.0f64; src_w];
    for y in 0..src_h {
        for (x, value) in line.iter_mut().enumerate() {
            *value = sample(x, y);
        }
        let out = &mut rows[y * dst_w..(y + 1) * dst_w];
        for (dx, weights) in x_weights.iter().enumerate() {
            out[dx] = weights.iter().map(|&(sx, w)| line[sx] * w).sum();
        }
    }

    // Vertical pass
    let mut result = vec![0.0f64; dst_w * dst_h];
    for (dy, weights) in y_weights.iter().enumerate() {
        for dx in 0..dst_w {
            result[dy * dst_w + dx] = weights
                .iter()
                .map(|&(sy, w)| rows[sy * dst_w + dx] * w)
                .sum();
        }
    }

    result
}

/// Resample an existing row-major plane
pub fn resample_plane(
    plane: &[f64],
    src_w: usize,
    src_h: usize,
    dst_w: usize,
    dst_h: usize,
) -> Vec<f64> {
    area_resample(src_w, src_h, dst_w, dst_h, |x, y| plane[y * src_w + x])
}
