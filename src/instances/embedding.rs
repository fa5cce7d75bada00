//! Facial-embedding vector utilities
//!
//! Embeddings are fixed-length 128-element vectors. Everything that enters
//! the user store or the matcher goes through the helpers here first.

use ndarray::ArrayView1;

/// Canonical embedding length
pub const EMBEDDING_DIM: usize = 128;

/// L2-normalize an embedding and fix its length to [`EMBEDDING_DIM`].
///
/// Empty input, a zero norm, or a NaN norm all collapse to the all-zero
/// vector, which doubles as the unconfigured-admin sentinel.
pub fn normalize(values: &[f32]) -> Vec<f32> {
    if values.is_empty() {
        return vec![0.0; EMBEDDING_DIM];
    }

    let view = ArrayView1::from(values);
    let norm = view.dot(&view).sqrt();
    if norm == 0.0 || norm.is_nan() {
        return vec![0.0; EMBEDDING_DIM];
    }

    let mut normalized: Vec<f32> = values.iter().map(|v| v / norm).collect();
    normalized.resize(EMBEDDING_DIM, 0.0);
    normalized
}

/// Cosine similarity over the first [`EMBEDDING_DIM`] components.
///
/// Returns `0.0` for empty or zero-norm inputs rather than an error, so a
/// degenerate stored vector can never authenticate.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let len = a.len().min(b.len()).min(EMBEDDING_DIM);
    let va = ArrayView1::from(&a[..len]);
    let vb = ArrayView1::from(&b[..len]);

    let norm_a = va.dot(&va).sqrt();
    let norm_b = vb.dot(&vb).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let similarity = va.dot(&vb) / (norm_a * norm_b);
    if similarity.is_nan() || similarity.is_infinite() {
        return 0.0;
    }
    similarity
}

/// Whether the first [`EMBEDDING_DIM`] components form a usable vector:
/// long enough, finite, and with a non-zero norm.
pub fn is_valid(values: &[f32]) -> bool {
    if values.len() < EMBEDDING_DIM {
        return false;
    }

    let head = &values[..EMBEDDING_DIM];
    if head.iter().any(|v| !v.is_finite()) {
        return false;
    }

    let view = ArrayView1::from(head);
    view.dot(&view).sqrt() > 0.0
}

/// Replace NaN/Inf components with `0.0` and fix the length to
/// [`EMBEDDING_DIM`]. Applied before anything is written to the store.
pub fn sanitize(values: &[f32]) -> Vec<f32> {
    let mut cleaned: Vec<f32> = values
        .iter()
        .take(EMBEDDING_DIM)
        .map(|v| if v.is_finite() { *v } else { 0.0 })
        .collect();
    cleaned.resize(EMBEDDING_DIM, 0.0);
    cleaned
}

/// Whether every component is exactly zero (the admin-bootstrap sentinel)
pub fn is_all_zero(values: &[f32]) -> bool {
    values.iter().all(|v| *v == 0.0)
}
