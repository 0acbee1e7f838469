use std::fmt;

/// Type-level marker for the physical coordinate space of an output
#[derive(Debug)]
pub struct Physical;

/// Type-level marker for the buffer coordinate space of a decoded frame
#[derive(Debug)]
pub struct Buffer;

/// A point as defined by its x and y coordinates
#[repr(C)]
pub struct Point<N, Kind> {
    /// horizontal coordinate
    pub x: N,
    /// vertical coordinate
    pub y: N,
    _kind: std::marker::PhantomData<Kind>,
}

impl<N, Kind> From<(N, N)> for Point<N, Kind> {
    #[inline]
    fn from((x, y): (N, N)) -> Point<N, Kind> {
        Point {
            x,
            y,
            _kind: std::marker::PhantomData,
        }
    }
}

impl<N, Kind> From<Point<N, Kind>> for (N, N) {
    #[inline]
    fn from(point: Point<N, Kind>) -> (N, N) {
        (point.x, point.y)
    }
}

impl<N: fmt::Debug, S> fmt::Debug for Point<N, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Point")
            .field("x", &self.x)
            .field("y", &self.y)
            .finish()
    }
}

impl<N: Clone, Kind> Clone for Point<N, Kind> {
    #[inline]
    fn clone(&self) -> Self {
        Point {
            x: self.x.clone(),
            y: self.y.clone(),
            _kind: std::marker::PhantomData,
        }
    }
}

impl<N: Copy, Kind> Copy for Point<N, Kind> {}

impl<N: PartialEq, Kind> PartialEq for Point<N, Kind> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.x == other.x && self.y == other.y
    }
}

impl<N: Eq, Kind> Eq for Point<N, Kind> {}

impl<N: Default, Kind> Default for Point<N, Kind> {
    fn default() -> Self {
        Point {
            x: N::default(),
            y: N::default(),
            _kind: std::marker::PhantomData,
        }
    }
}

/// A size as defined by its width and height
#[repr(C)]
pub struct Size<N, Kind> {
    /// horizontal coordinate
    pub w: N,
    /// vertical coordinate
    pub h: N,
    _kind: std::marker::PhantomData<Kind>,
}

impl<Kind> Size<u32, Kind> {
    /// Returns true if either dimension is zero
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }
}

impl<N, Kind> From<(N, N)> for Size<N, Kind> {
    #[inline]
    fn from((w, h): (N, N)) -> Size<N, Kind> {
        Size {
            w,
            h,
            _kind: std::marker::PhantomData,
        }
    }
}

impl<N, Kind> From<Size<N, Kind>> for (N, N) {
    #[inline]
    fn from(size: Size<N, Kind>) -> (N, N) {
        (size.w, size.h)
    }
}

impl<N: fmt::Debug, S> fmt::Debug for Size<N, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Size")
            .field("w", &self.w)
            .field("h", &self.h)
            .finish()
    }
}

impl<N: Clone, Kind> Clone for Size<N, Kind> {
    #[inline]
    fn clone(&self) -> Self {
        Size {
            w: self.w.clone(),
            h: self.h.clone(),
            _kind: std::marker::PhantomData,
        }
    }
}

impl<N: Copy, Kind> Copy for Size<N, Kind> {}

impl<N: PartialEq, Kind> PartialEq for Size<N, Kind> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.w == other.w && self.h == other.h
    }
}

impl<N: Eq, Kind> Eq for Size<N, Kind> {}

impl<N: Default, Kind> Default for Size<N, Kind> {
    fn default() -> Self {
        Size {
            w: N::default(),
            h: N::default(),
            _kind: std::marker::PhantomData,
        }
    }
}

/// A rectangle defined by its top-left corner and dimensions
#[repr(C)]
pub struct Rectangle<N, Kind> {
    /// Location of the top-left corner of the rectangle
    pub loc: Point<N, Kind>,
    /// Size of the rectangle, as (width, height)
    pub size: Size<N, Kind>,
}

impl<N, Kind> Rectangle<N, Kind> {
    /// Create a new [`Rectangle`] from the coordinates of its top-left corner and its dimensions
    #[inline]
    pub fn from_loc_and_size(loc: impl Into<Point<N, Kind>>, size: impl Into<Size<N, Kind>>) -> Self {
        Rectangle {
            loc: loc.into(),
            size: size.into(),
        }
    }
}

impl<Kind> Rectangle<u32, Kind> {
    /// Checks whether a given [`Rectangle`] is completely contained within this one
    #[inline]
    pub fn contains_rect<R: Into<Rectangle<u32, Kind>>>(self, rect: R) -> bool {
        let r: Rectangle<u32, Kind> = rect.into();
        r.loc.x >= self.loc.x
            && r.loc.y >= self.loc.y
            && r.loc.x.saturating_add(r.size.w) <= self.loc.x.saturating_add(self.size.w)
            && r.loc.y.saturating_add(r.size.h) <= self.loc.y.saturating_add(self.size.h)
    }
}

impl<N: fmt::Debug, S> fmt::Debug for Rectangle<N, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rectangle")
            .field("x", &self.loc.x)
            .field("y", &self.loc.y)
            .field("width", &self.size.w)
            .field("height", &self.size.h)
            .finish()
    }
}

impl<N: Clone, Kind> Clone for Rectangle<N, Kind> {
    #[inline]
    fn clone(&self) -> Self {
        Rectangle {
            loc: self.loc.clone(),
            size: self.size.clone(),
        }
    }
}

impl<N: Copy, Kind> Copy for Rectangle<N, Kind> {}

impl<N: PartialEq, Kind> PartialEq for Rectangle<N, Kind> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.loc == other.loc && self.size == other.size
    }
}

impl<N: Eq, Kind> Eq for Rectangle<N, Kind> {}

impl<N: Default, Kind> Default for Rectangle<N, Kind> {
    fn default() -> Self {
        Rectangle {
            loc: Default::default(),
            size: Default::default(),
        }
    }
}

/// Width-to-height ratio of a single source pixel
///
/// A ratio with a zero term is treated as square pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AspectRatio {
    /// Numerator
    pub num: u32,
    /// Denominator
    pub den: u32,
}

impl AspectRatio {
    /// Square pixels
    pub const SQUARE: AspectRatio = AspectRatio { num: 1, den: 1 };

    /// Create a new sample aspect ratio
    pub fn new(num: u32, den: u32) -> AspectRatio {
        AspectRatio { num, den }
    }

    /// Returns the ratio with zero terms replaced by 1:1
    pub fn normalized(self) -> AspectRatio {
        if self.num == 0 || self.den == 0 {
            AspectRatio::SQUARE
        } else {
            self
        }
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        AspectRatio::SQUARE
    }
}

impl From<(u32, u32)> for AspectRatio {
    fn from((num, den): (u32, u32)) -> Self {
        AspectRatio { num, den }
    }
}

/// Compute where a frame of `src` pixels with sample aspect ratio `sar` lands on an output of size `output`.
///
/// The frame is scaled to the largest size that fits the output while keeping its display
/// aspect ratio, and centered along the axis that has room left. Nothing is cropped.
///
/// Returns `None` if the source, the corrected source width, the output or the scaled result is empty.
pub fn resolve_destination(
    src: Size<u32, Buffer>,
    sar: AspectRatio,
    output: Size<u32, Physical>,
) -> Option<Rectangle<u32, Physical>> {
    let sar = sar.normalized();
    if src.is_empty() || output.is_empty() {
        return None;
    }

    // u128 so the cross products of any u32 input fit
    let crtc_w = src.w as u128 * sar.num as u128 / sar.den as u128;
    let crtc_h = src.h as u128;
    if crtc_w == 0 {
        return None;
    }
    let (out_w, out_h) = (output.w as u128, output.h as u128);

    // out_w / crtc_w > out_h / crtc_h, cross-multiplied
    let (w, h, x, y) = if out_w * crtc_h > out_h * crtc_w {
        // height is the constraining dimension
        let w = crtc_w * out_h / crtc_h;
        (w, out_h, (out_w - w) / 2, 0)
    } else {
        let h = crtc_h * out_w / crtc_w;
        (out_w, h, 0, (out_h - h) / 2)
    };
    if w == 0 || h == 0 {
        return None;
    }

    Some(Rectangle::from_loc_and_size(
        (x as u32, y as u32),
        (w as u32, h as u32),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(w: u32, h: u32) -> Rectangle<u32, Physical> {
        Rectangle::from_loc_and_size((0, 0), (w, h))
    }

    #[test]
    fn downscale_same_aspect() {
        let dst = resolve_destination((1920, 1080).into(), AspectRatio::SQUARE, (1280, 720).into()).unwrap();
        assert_eq!(dst, Rectangle::from_loc_and_size((0, 0), (1280, 720)));
    }

    #[test]
    fn pillarbox_four_by_three() {
        let dst = resolve_destination((640, 480).into(), AspectRatio::SQUARE, (1920, 1080).into()).unwrap();
        assert_eq!(dst, Rectangle::from_loc_and_size((240, 0), (1440, 1080)));
    }

    #[test]
    fn letterbox_wide_source() {
        let dst = resolve_destination((1920, 800).into(), AspectRatio::SQUARE, (1280, 1024).into()).unwrap();
        assert_eq!(dst.size.w, 1280);
        assert_eq!(dst.size.h, 533);
        assert_eq!(dst.loc.x, 0);
        assert_eq!(dst.loc.y, (1024 - 533) / 2);
    }

    #[test]
    fn anamorphic_sample_aspect() {
        // 720x576 PAL with 16:11 pixels displays as 1047x576, wider than 16:9
        let dst =
            resolve_destination((720, 576).into(), AspectRatio::new(16, 11), (1920, 1080).into()).unwrap();
        assert_eq!(dst, Rectangle::from_loc_and_size((0, 12), (1920, 1056)));

        // 8:9 pixels on the same frame end up narrower than the output
        let dst =
            resolve_destination((720, 576).into(), AspectRatio::new(8, 9), (1920, 1080).into()).unwrap();
        assert_eq!(dst.size.h, 1080);
        assert_eq!(dst.size.w, 640 * 1080 / 576);
        assert_eq!(dst.loc.x, (1920 - dst.size.w) / 2);
    }

    #[test]
    fn zero_sample_aspect_is_square() {
        let a = resolve_destination((640, 480).into(), AspectRatio::new(0, 1), (1920, 1080).into());
        let b = resolve_destination((640, 480).into(), AspectRatio::new(3, 0), (1920, 1080).into());
        let square = resolve_destination((640, 480).into(), AspectRatio::SQUARE, (1920, 1080).into());
        assert_eq!(a, square);
        assert_eq!(b, square);
    }

    #[test]
    fn empty_input_has_no_destination() {
        assert!(resolve_destination((0, 480).into(), AspectRatio::SQUARE, (1920, 1080).into()).is_none());
        assert!(resolve_destination((640, 480).into(), AspectRatio::SQUARE, (1920, 0).into()).is_none());
        assert!(resolve_destination((1, 480).into(), AspectRatio::new(1, 4), (1920, 1080).into()).is_none());
    }

    #[test]
    fn extreme_inputs_do_not_overflow() {
        let dst = resolve_destination(
            (u32::MAX, u32::MAX).into(),
            AspectRatio::new(u32::MAX, 1),
            (u32::MAX, u32::MAX).into(),
        )
        .unwrap();
        assert_eq!(dst, Rectangle::from_loc_and_size((0, (u32::MAX - 1) / 2), (u32::MAX, 1)));

        // scaled below a pixel
        assert!(resolve_destination(
            (u32::MAX, 1).into(),
            AspectRatio::new(u32::MAX, 1),
            (u32::MAX, u32::MAX).into(),
        )
        .is_none());
    }

    #[test]
    fn destination_stays_on_screen() {
        let sources = [(1, 1), (176, 144), (640, 480), (720, 576), (1920, 1080), (3840, 2160), (1080, 1920)];
        let outputs = [(640, 480), (1280, 720), (1366, 768), (1920, 1080), (1080, 1920)];
        let sars = [(1, 1), (16, 11), (64, 45), (4, 3), (8, 9)];

        for &src in &sources {
            for &out in &outputs {
                for &sar in &sars {
                    let Some(dst) = resolve_destination(src.into(), sar.into(), out.into()) else {
                        continue;
                    };
                    assert!(
                        output(out.0, out.1).contains_rect(dst),
                        "{:?} escapes {:?} for {:?} @ {:?}",
                        dst,
                        out,
                        src,
                        sar
                    );
                    // one axis is always fully used
                    assert!(dst.size.w == out.0 || dst.size.h == out.1);
                }
            }
        }
    }

    #[test]
    fn aspect_ratio_preserved() {
        let cases = [
            ((640, 480), (1, 1), (1920, 1080)),
            ((1920, 1080), (1, 1), (1024, 768)),
            ((720, 480), (32, 27), (1920, 1080)),
            ((1280, 720), (1, 1), (1080, 1920)),
        ];
        for (src, sar, out) in cases {
            let dst = resolve_destination(src.into(), sar.into(), out.into()).unwrap();
            let expected = (src.0 as f64 * sar.0 as f64 / sar.1 as f64) / src.1 as f64;
            let actual = dst.size.w as f64 / dst.size.h as f64;
            // one pixel of rounding on the scaled axis
            let tolerance = expected / dst.size.w.min(dst.size.h) as f64 + f64::EPSILON;
            assert!(
                (expected - actual).abs() <= tolerance,
                "{:?}: expected {} got {}",
                src,
                expected,
                actual
            );
        }
    }
}
