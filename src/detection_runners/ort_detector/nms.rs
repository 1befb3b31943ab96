pub trait Nms {
    fn iou(&self, other: &Self) -> f32;
    fn confidence(&self) -> f32;
    /// Boxes are only suppressed by higher-scoring boxes of the same class.
    fn class_id(&self) -> usize {
        0
    }
}

/// Greedy non-maximum suppression, highest confidence first.
pub fn nms<T: Nms>(boxes: &mut Vec<T>, iou_threshold: f32) {
    boxes.sort_by(|b1, b2| {
        b2.confidence()
            .partial_cmp(&b1.confidence())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut current_index = 0;
    for index in 0..boxes.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            if boxes[prev_index].class_id() != boxes[index].class_id() {
                continue;
            }
            let iou = boxes[prev_index].iou(&boxes[index]);
            if iou > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            boxes.swap(current_index, index);
            current_index += 1;
        }
    }
    boxes.truncate(current_index);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{BBox, Detection};

    fn det(class_id: usize, x: f32, conf: f32) -> Detection {
        Detection::new(class_id, "x", BBox::new(x, 0., x + 10., 10.), conf)
    }

    #[test]
    fn suppresses_overlapping_same_class() {
        let mut dets = vec![det(0, 0., 0.5), det(0, 1., 0.9), det(0, 50., 0.4)];
        nms(&mut dets, 0.45);
        let confs: Vec<f32> = dets.iter().map(|d| d.confidence).collect();
        assert_eq!(confs, vec![0.9, 0.4]);
    }

    #[test]
    fn keeps_overlapping_different_classes() {
        let mut dets = vec![det(0, 0., 0.9), det(1, 0., 0.8)];
        nms(&mut dets, 0.45);
        assert_eq!(dets.len(), 2);
    }
}
