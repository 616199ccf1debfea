//! Vector helpers shared by the sampler and the query engine.

use crate::types::Embedding;

/// Scale a vector to unit length in place.
///
/// A zero vector is left untouched; it has no direction to preserve.
pub fn l2_normalize(vector: &mut [f32]) {
    let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if magnitude > 0.0 && magnitude.is_finite() {
        for value in vector.iter_mut() {
            *value /= magnitude;
        }
    }
}

/// Return a unit-length copy of a vector
pub fn normalized(vector: &[f32]) -> Embedding {
    let mut copy = vector.to_vec();
    l2_normalize(&mut copy);
    copy
}

/// Calculate cosine similarity between two vectors
///
/// Returns `None` when the dimensions differ. A zero-magnitude vector scores
/// 0.0. The result is clamped into `[-1, 1]` to absorb rounding.
pub fn cosine_similarity(vector_a: &[f32], vector_b: &[f32]) -> Option<f32> {
    if vector_a.len() != vector_b.len() {
        return None;
    }

    let dot_product: f32 = vector_a
        .iter()
        .zip(vector_b.iter())
        .map(|(left, right)| left * right)
        .sum();
    let magnitude_a = vector_a.iter().map(|value| value * value).sum::<f32>().sqrt();
    let magnitude_b = vector_b.iter().map(|value| value * value).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return Some(0.0);
    }

    Some((dot_product / (magnitude_a * magnitude_b)).clamp(-1.0, 1.0))
}

/// Weighted element-wise mean of vectors, re-normalized to unit length.
///
/// Every input is normalized first so one long vector cannot dominate.
/// Returns `None` for an empty input or mismatched dimensions.
pub fn weighted_mean(vectors: &[(Embedding, f32)]) -> Option<Embedding> {
    let dimension = vectors.first().map(|(vector, _)| vector.len())?;
    if dimension == 0 {
        return None;
    }

    let mut sum = vec![0.0f32; dimension];
    let mut total_weight = 0.0f32;
    for (vector, weight) in vectors {
        if vector.len() != dimension {
            return None;
        }
        let unit = normalized(vector);
        for (slot, value) in sum.iter_mut().zip(unit.iter()) {
            *slot += value * weight;
        }
        total_weight += weight;
    }

    if total_weight <= 0.0 {
        return None;
    }
    for slot in &mut sum {
        *slot /= total_weight;
    }
    l2_normalize(&mut sum);
    Some(sum)
}

/// Unweighted mean of vectors, re-normalized to unit length
pub fn mean(vectors: &[Embedding]) -> Option<Embedding> {
    let weighted: Vec<(Embedding, f32)> =
        vectors.iter().map(|vector| (vector.clone(), 1.0)).collect();
    weighted_mean(&weighted)
}
