//! Landmark-based face alignment.
//!
//! Warps a detected face into the canonical 112x112 ArcFace crop via a
//! 4-DOF similarity transform (scale, rotation, translation) estimated by
//! least squares against the InsightFace reference landmark positions.

use super::arcface::INPUT_SIZE;

/// Canonical landmark positions for a 112x112 crop.
const REFERENCE: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

/// Align a face to the canonical crop. Out-of-frame samples read as black.
pub(crate) fn align_face(
    frame: &[u8],
    width: u32,
    height: u32,
    landmarks: &[(f32, f32); 5],
) -> Vec<u8> {
    let m = similarity_transform(landmarks, &REFERENCE);
    warp(frame, width as usize, height as usize, &m)
}

/// Estimate the 2x3 similarity matrix `[a -b tx; b a ty]` mapping `src`
/// onto `dst`, least-squares over the five point pairs.
fn similarity_transform(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> [f32; 6] {
    // Normal equations for the overdetermined system: each pair contributes
    //   sx*a - sy*b + tx = dx
    //   sy*a + sx*b + ty = dy
    let mut ata = [[0.0f32; 4]; 4];
    let mut atb = [0.0f32; 4];

    for i in 0..5 {
        let (sx, sy) = src[i];
        let (dx, dy) = dst[i];
        let rows = [([sx, -sy, 1.0, 0.0], dx), ([sy, sx, 0.0, 1.0], dy)];
        for (row, rhs) in rows {
            for j in 0..4 {
                for k in 0..4 {
                    ata[j][k] += row[j] * row[k];
                }
                atb[j] += row[j] * rhs;
            }
        }
    }

    let x = solve4(ata, atb);
    [x[0], -x[1], x[2], x[1], x[0], x[3]]
}

/// Gaussian elimination with partial pivoting on a 4x4 system.
fn solve4(mut a: [[f32; 4]; 4], mut b: [f32; 4]) -> [f32; 4] {
    for col in 0..4 {
        let pivot_row = (col..4)
            .max_by(|&i, &j| {
                a[i][col]
                    .abs()
                    .partial_cmp(&a[j][col].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(col);
        a.swap(col, pivot_row);
        b.swap(col, pivot_row);

        let pivot = a[col][col];
        if pivot.abs() < 1e-12 {
            // Collinear landmarks; identity keeps the warp harmless.
            return [1.0, 0.0, 0.0, 0.0];
        }

        for row in (col + 1)..4 {
            let f = a[row][col] / pivot;
            for k in col..4 {
                a[row][k] -= f * a[col][k];
            }
            b[row] -= f * b[col];
        }
    }

    let mut x = [0.0f32; 4];
    for i in (0..4).rev() {
        x[i] = b[i];
        for j in (i + 1)..4 {
            x[i] -= a[i][j] * x[j];
        }
        x[i] /= a[i][i];
    }
    x
}

/// Inverse-map each output pixel through the similarity matrix and sample
/// the source bilinearly.
fn warp(frame: &[u8], src_w: usize, src_h: usize, m: &[f32; 6]) -> Vec<u8> {
    let (a, tx, b, ty) = (m[0], m[2], m[3], m[5]);

    let det = a * a + b * b;
    if det.abs() < 1e-12 {
        return vec![0u8; INPUT_SIZE * INPUT_SIZE];
    }
    let ia = a / det;
    let ib = b / det;

    let sample = |x: i32, y: i32| -> f32 {
        if x >= 0 && (x as usize) < src_w && y >= 0 && (y as usize) < src_h {
            frame[y as usize * src_w + x as usize] as f32
        } else {
            0.0
        }
    };

    let mut out = vec![0u8; INPUT_SIZE * INPUT_SIZE];
    for oy in 0..INPUT_SIZE {
        for ox in 0..INPUT_SIZE {
            let dx = ox as f32 - tx;
            let dy = oy as f32 - ty;
            let sx = ia * dx + ib * dy;
            let sy = -ib * dx + ia * dy;

            let x0 = sx.floor() as i32;
            let y0 = sy.floor() as i32;
            let fx = sx - x0 as f32;
            let fy = sy - y0 as f32;

            let v = sample(x0, y0) * (1.0 - fx) * (1.0 - fy)
                + sample(x0 + 1, y0) * fx * (1.0 - fy)
                + sample(x0, y0 + 1) * (1.0 - fx) * fy
                + sample(x0 + 1, y0 + 1) * fx * fy;

            out[oy * INPUT_SIZE + ox] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_when_landmarks_match_reference() {
        let m = similarity_transform(&REFERENCE, &REFERENCE);
        assert!((m[0] - 1.0).abs() < 1e-4, "a = {}", m[0]);
        assert!(m[1].abs() < 1e-4, "-b = {}", m[1]);
        assert!(m[2].abs() < 1e-3, "tx = {}", m[2]);
        assert!((m[4] - 1.0).abs() < 1e-4);
        assert!(m[5].abs() < 1e-3, "ty = {}", m[5]);
    }

    #[test]
    fn doubled_landmarks_halve_the_scale() {
        let src: [(f32, f32); 5] = std::array::from_fn(|i| {
            let (x, y) = REFERENCE[i];
            (x * 2.0, y * 2.0)
        });
        let m = similarity_transform(&src, &REFERENCE);
        assert!((m[0] - 0.5).abs() < 0.05, "a = {}", m[0]);
    }

    #[test]
    fn aligned_crop_has_canonical_size() {
        let frame = vec![90u8; 320 * 240];
        let out = align_face(&frame, 320, 240, &REFERENCE);
        assert_eq!(out.len(), INPUT_SIZE * INPUT_SIZE);
    }

    #[test]
    fn bright_landmark_lands_near_reference() {
        let (w, h) = (200usize, 200usize);
        let mut frame = vec![0u8; w * h];

        let src: [(f32, f32); 5] = [
            (80.0, 60.0),
            (120.0, 60.0),
            (100.0, 85.0),
            (85.0, 110.0),
            (115.0, 110.0),
        ];

        // bright 5x5 patch at the left eye
        let (lx, ly) = (src[0].0 as usize, src[0].1 as usize);
        for dy in 0..5 {
            for dx in 0..5 {
                frame[(ly - 2 + dy) * w + (lx - 2 + dx)] = 255;
            }
        }

        let out = align_face(&frame, w as u32, h as u32, &src);

        let rx = REFERENCE[0].0.round() as usize;
        let ry = REFERENCE[0].1.round() as usize;
        let mut max = 0u8;
        for dy in 0..3 {
            for dx in 0..3 {
                max = max.max(out[(ry - 1 + dy) * INPUT_SIZE + (rx - 1 + dx)]);
            }
        }
        assert!(max > 100, "expected bright patch near ({rx}, {ry}), max = {max}");
    }
}
