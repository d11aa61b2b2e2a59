/// A rectangle describing a damaged (changed) region of the frame, in
/// frame coordinates. Transient: consumed by the capture loop as soon as
/// the matching notification is processed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DamageRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl DamageRect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Clamp a damage rectangle to the frame bounds. Returns `None` when
/// nothing of the rectangle lies inside the frame.
#[inline(always)]
pub(crate) fn clamp_damage_rect(rect: DamageRect, width: u32, height: u32) -> Option<DamageRect> {
    let x = rect.x.min(width);
    let y = rect.y.min(height);
    if x >= width || y >= height {
        return None;
    }

    let clamped_w = rect.width.min(width - x);
    let clamped_h = rect.height.min(height - y);
    if clamped_w == 0 || clamped_h == 0 {
        return None;
    }

    Some(DamageRect {
        x,
        y,
        width: clamped_w,
        height: clamped_h,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_bounds_rect_is_unchanged() {
        let rect = DamageRect::new(10, 10, 20, 20);
        assert_eq!(clamp_damage_rect(rect, 100, 100), Some(rect));
    }

    #[test]
    fn overflowing_rect_is_truncated_to_frame_edge() {
        let rect = DamageRect::new(90, 95, 20, 20);
        assert_eq!(
            clamp_damage_rect(rect, 100, 100),
            Some(DamageRect::new(90, 95, 10, 5))
        );
    }

    #[test]
    fn fully_outside_rect_clamps_to_none() {
        assert_eq!(clamp_damage_rect(DamageRect::new(100, 0, 5, 5), 100, 100), None);
        assert_eq!(clamp_damage_rect(DamageRect::new(0, 200, 5, 5), 100, 100), None);
        assert_eq!(clamp_damage_rect(DamageRect::new(0, 0, 0, 5), 100, 100), None);
    }
}
