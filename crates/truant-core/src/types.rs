use serde::{Deserialize, Serialize};

/// Face embedding vector (512-dimensional for the ArcFace model).
///
/// Stored and compared only in unit-normalized form; the oracle hands out
/// raw model output and consumers call [`normalized`](Self::normalized)
/// before doing anything else with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Euclidean (L2) norm.
    pub fn norm(&self) -> f32 {
        self.0.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    /// Unit-length copy. A zero vector comes back unchanged — downstream it
    /// scores 0 against everything and matches nothing.
    pub fn normalized(&self) -> Embedding {
        let norm = self.norm();
        if norm > 0.0 {
            Embedding(self.0.iter().map(|x| x / norm).collect())
        } else {
            self.clone()
        }
    }

    /// Dot product; equals cosine similarity when both sides are unit length.
    pub fn dot(&self, other: &Embedding) -> f32 {
        self.0.iter().zip(other.0.iter()).map(|(a, b)| a * b).sum()
    }
}

/// Five facial landmarks in frame coordinates, in fixed order:
/// left eye, right eye, nose tip, left mouth corner, right mouth corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmarks(pub [(f32, f32); 5]);

impl Landmarks {
    pub fn left_eye(&self) -> (f32, f32) {
        self.0[0]
    }

    pub fn right_eye(&self) -> (f32, f32) {
        self.0[1]
    }

    pub fn nose(&self) -> (f32, f32) {
        self.0[2]
    }

    pub fn points(&self) -> &[(f32, f32); 5] {
        &self.0
    }
}

/// Axis-aligned detection box in frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl BoundingBox {
    /// Box area, used to pick the enrollment subject when several faces are
    /// in frame (nearest face wins).
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

/// One face found in one frame: where it is, its landmark geometry, and the
/// raw (non-normalized) embedding the oracle extracted for it.
///
/// Lives for a single pipeline cycle and is then discarded.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub bbox: BoundingBox,
    pub landmarks: Landmarks,
    pub embedding: Embedding,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_has_unit_norm() {
        let e = Embedding(vec![3.0, 4.0]);
        assert!((e.normalized().norm() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn normalize_is_idempotent() {
        let e = Embedding(vec![0.3, -1.7, 2.2, 0.01]);
        let once = e.normalized();
        let twice = once.normalized();
        for (a, b) in once.0.iter().zip(twice.0.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn zero_vector_survives_normalization() {
        let e = Embedding(vec![0.0, 0.0, 0.0]);
        let n = e.normalized();
        assert_eq!(n, e);
        assert_eq!(n.norm(), 0.0);
    }

    #[test]
    fn dot_of_identical_unit_vectors_is_one() {
        let e = Embedding(vec![1.0, 2.0, -2.0]).normalized();
        assert!((e.dot(&e) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn dot_of_orthogonal_vectors_is_zero() {
        let a = Embedding(vec![1.0, 0.0]);
        let b = Embedding(vec![0.0, 1.0]);
        assert!(a.dot(&b).abs() < 1e-6);
    }

    #[test]
    fn bbox_area() {
        let b = BoundingBox { x: 10.0, y: 10.0, width: 20.0, height: 5.0, confidence: 0.9 };
        assert!((b.area() - 100.0).abs() < 1e-6);
    }

    #[test]
    fn degenerate_bbox_area_clamps_to_zero() {
        let b = BoundingBox { x: 0.0, y: 0.0, width: -3.0, height: 10.0, confidence: 0.5 };
        assert_eq!(b.area(), 0.0);
    }
}
