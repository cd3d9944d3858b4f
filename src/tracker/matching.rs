//! Linear assignment between tracks and ground-truth trajectories.

use ndarray::Array2;

/// Solve the rectangular assignment problem on `cost_matrix` (tracks x
/// objects) and return the `(track, object)` pairs whose cost does not
/// exceed `thresh`.
pub fn linear_assignment(cost_matrix: &Array2<f32>, thresh: f32) -> Vec<(usize, usize)> {
    let (num_rows, num_cols) = cost_matrix.dim();
    if num_rows == 0 || num_cols == 0 {
        return vec![];
    }

    // lapjv wants a square matrix; dummy rows/columns are prohibitively costly
    let size = num_rows.max(num_cols);
    let mut padded = Array2::<f64>::from_elem((size, size), 1e6);
    for ((i, j), &cost) in cost_matrix.indexed_iter() {
        padded[[i, j]] = cost as f64;
    }

    match lapjv::lapjv(&padded) {
        Ok((row_to_col, _)) => row_to_col
            .into_iter()
            .take(num_rows)
            .enumerate()
            .filter(|&(row, col)| col < num_cols && cost_matrix[[row, col]] <= thresh)
            .collect(),
        Err(err) => {
            log::warn!("linear assignment failed, leaving all tracks unmatched: {err:?}");
            vec![]
        }
    }
}
