//! Resolves "several faces in one photo" down to the single face that takes
//! part in the swap.
//!
//! Only the largest face per image participates; every other detection is
//! ignored.

use crate::types::Face;

/// Pick the face with the largest area; on exact ties the earliest in
/// detector output order wins. `None` when `faces` is empty.
pub fn select(faces: &[Face]) -> Option<&Face> {
    let mut best: Option<&Face> = None;
    for face in faces {
        match best {
            Some(current) if face.region.area() <= current.region.area() => {}
            _ => best = Some(face),
        }
    }
    if let Some(face) = best {
        tracing::debug!(
            candidates = faces.len(),
            region = ?face.region,
            "selected largest face"
        );
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Region;

    fn face(x: u32, w: u32, h: u32, confidence: f32) -> Face {
        Face::new(Region::new(x, 0, w, h), confidence)
    }

    #[test]
    fn test_select_empty() {
        assert!(select(&[]).is_none());
    }

    #[test]
    fn test_select_largest_area() {
        let faces = vec![face(0, 40, 40, 9.0), face(100, 60, 50, 1.0), face(200, 50, 50, 5.0)];
        assert_eq!(select(&faces).unwrap().region.x, 100);
    }

    #[test]
    fn test_select_ignores_confidence() {
        let faces = vec![face(0, 80, 80, 0.1), face(100, 20, 20, 0.99)];
        assert_eq!(select(&faces).unwrap().region.x, 0);
    }

    #[test]
    fn test_select_tie_takes_first() {
        // 40x50 and 50x40 have equal area.
        let faces = vec![face(0, 10, 10, 1.0), face(10, 40, 50, 1.0), face(20, 50, 40, 1.0)];
        for _ in 0..5 {
            assert_eq!(select(&faces).unwrap().region.x, 10);
        }
    }

    #[test]
    fn test_select_single() {
        let faces = vec![face(7, 30, 30, 1.0)];
        assert_eq!(select(&faces).unwrap().region.x, 7);
    }
}
