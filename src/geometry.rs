//! Page geometry and coordinate transforms.
//!
//! PDF user space has its origin at the bottom-left corner with y growing
//! upwards; raster buffers have their origin at the top-left with y growing
//! downwards. Every transform here maps from [`PdfSpace`] into either another
//! PDF page ([`PdfTransform`]) or a pixel buffer ([`DeviceTransform`]).

use euclid::{Box2D, Rect, Size2D, Transform2D, point2, vec2};

use crate::{PdfError, PdfResult};

/// PDF user space, in points, y pointing up.
pub struct PdfSpace;

/// Raster space, in pixels, y pointing down.
pub struct PixelSpace;

pub type PdfTransform = Transform2D<f64, PdfSpace, PdfSpace>;
pub type DeviceTransform = Transform2D<f64, PdfSpace, PixelSpace>;
pub type PdfRect = Rect<f64, PdfSpace>;
pub type PdfSize = Size2D<f64, PdfSpace>;
pub type PixelSize = Size2D<u32, PixelSpace>;

/// Build a normalized rectangle from a PDF `[llx lly urx ury]` array.
///
/// The corners may be given in any order.
pub fn rect_from_array(coords: [f64; 4]) -> PdfRect {
    let [x0, y0, x1, y1] = coords;
    Box2D::new(point2(x0.min(x1), y0.min(y1)), point2(x0.max(x1), y0.max(y1))).to_rect()
}

/// The `[llx lly urx ury]` corners of `rect`.
pub fn rect_to_array(rect: &PdfRect) -> [f64; 4] {
    [rect.min_x(), rect.min_y(), rect.max_x(), rect.max_y()]
}

/// Reject boxes no transform can be derived from.
pub fn validate_box(rect: &PdfRect) -> PdfResult<()> {
    let (width, height) = (rect.size.width, rect.size.height);
    let finite = rect.origin.x.is_finite() && rect.origin.y.is_finite()
        && width.is_finite() && height.is_finite();
    if !finite || width <= 0.0 || height <= 0.0 {
        return Err(PdfError::DegenerateBox { width, height });
    }
    Ok(())
}

fn validate_target<U>(size: &Size2D<f64, U>) -> PdfResult<()> {
    let (width, height) = (size.width, size.height);
    if !(width.is_finite() && height.is_finite()) || width < 0.0 || height < 0.0 {
        return Err(PdfError::DegenerateBox { width, height });
    }
    Ok(())
}

/// Scale factors and centering offsets placing a source box inside a target.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Fit {
    scale_x: f64,
    scale_y: f64,
    offset_x: f64,
    offset_y: f64,
}

fn fit(source: &PdfRect, target: &PdfSize, preserve_aspect_ratio: bool) -> PdfResult<Fit> {
    validate_box(source)?;
    validate_target(target)?;

    let scale_x = target.width / source.size.width;
    let scale_y = target.height / source.size.height;
    if !preserve_aspect_ratio {
        return Ok(Fit { scale_x, scale_y, offset_x: 0.0, offset_y: 0.0 });
    }

    let scale = scale_x.min(scale_y);
    Ok(Fit {
        scale_x: scale,
        scale_y: scale,
        offset_x: (target.width - source.size.width * scale) / 2.0,
        offset_y: (target.height - source.size.height * scale) / 2.0,
    })
}

/// Map `source` into a `target` sized rectangle anchored at the origin, in
/// PDF orientation.
///
/// With `preserve_aspect_ratio` the content is scaled uniformly by the smaller
/// of the two axis ratios and centered on the other axis; without it each
/// axis is stretched independently to fill the target.
pub fn fit_transform(
    source: &PdfRect,
    target: &PdfSize,
    preserve_aspect_ratio: bool,
) -> PdfResult<PdfTransform> {
    let fit = fit(source, target, preserve_aspect_ratio)?;
    Ok(Transform2D::translation(-source.origin.x, -source.origin.y)
        .then_scale(fit.scale_x, fit.scale_y)
        .then_translate(vec2(fit.offset_x, fit.offset_y)))
}

/// Mirror the y axis of a `height` tall area so its bottom edge becomes the
/// top edge.
pub fn flip_vertical<Dst>(height: f64) -> Transform2D<f64, PdfSpace, Dst> {
    Transform2D::new(1., 0., 0., -1., 0., height)
}

/// Transform drawing `source` into a raster of `target` pixels.
///
/// Same fit as [`fit_transform`], followed by a flip so the bottom-left PDF
/// origin ends up at the top-left corner of the buffer.
pub fn draw_transform(
    source: &PdfRect,
    target: &Size2D<f64, PixelSpace>,
    preserve_aspect_ratio: bool,
) -> PdfResult<DeviceTransform> {
    let fitted = fit_transform(source, &target.cast_unit(), preserve_aspect_ratio)?;
    Ok(fitted.then(&flip_vertical(target.height)))
}

/// Transform re-drawing a page so its crop box exactly fills a `target`
/// sized page.
///
/// The crop box origin moves to the page origin and each axis is scaled
/// independently; nothing is centered.
pub fn reframe_to_crop_box(crop_box: &PdfRect, target: &PdfSize) -> PdfResult<PdfTransform> {
    validate_box(crop_box)?;
    validate_target(target)?;
    Ok(Transform2D::translation(-crop_box.origin.x, -crop_box.origin.y)
        .then_scale(target.width / crop_box.size.width, target.height / crop_box.size.height))
}

/// Pixel dimensions of `size` points rendered at `pixels_per_point`.
pub fn scaled_pixel_size(size: &PdfSize, pixels_per_point: u32) -> PixelSize {
    let scale = f64::from(pixels_per_point);
    Size2D::new(
        (size.width * scale).round().max(0.0) as u32,
        (size.height * scale).round().max(0.0) as u32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use euclid::{rect, size2};

    fn assert_close(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 1e-9, "expected {expected}, got {actual}");
    }

    #[test]
    fn normalizes_inverted_arrays() {
        let r = rect_from_array([612., 792., 0., 0.]);
        assert_eq!(r, rect(0., 0., 612., 792.));
        assert_eq!(rect_to_array(&r), [0., 0., 612., 792.]);
    }

    #[test]
    fn aspect_fit_scales_uniformly_and_centers() {
        let t = draw_transform(&rect(0., 0., 200., 100.), &size2(100., 100.), true).unwrap();
        assert_close(t.m11, 0.5);
        assert_close(t.m22, -0.5);
        assert_close(t.m12, 0.0);
        assert_close(t.m21, 0.0);

        // 100x50 of content leaves 25 on either side of the short axis
        let top_left = t.transform_point(point2(0., 100.));
        let bottom_right = t.transform_point(point2(200., 0.));
        assert_close(top_left.x, 0.0);
        assert_close(top_left.y, 25.0);
        assert_close(bottom_right.x, 100.0);
        assert_close(bottom_right.y, 75.0);
    }

    #[test]
    fn aspect_fit_centers_horizontally_for_tall_sources() {
        let t = draw_transform(&rect(0., 0., 100., 200.), &size2(100., 100.), true).unwrap();
        let top_left = t.transform_point(point2(0., 200.));
        let bottom_right = t.transform_point(point2(100., 0.));
        assert_close(top_left.x, 25.0);
        assert_close(top_left.y, 0.0);
        assert_close(bottom_right.x, 75.0);
        assert_close(bottom_right.y, 100.0);
    }

    #[test]
    fn stretch_scales_each_axis() {
        let t = draw_transform(&rect(0., 0., 200., 100.), &size2(100., 100.), false).unwrap();
        assert_close(t.m11, 0.5);
        assert_close(t.m22, -1.0);

        let top_left = t.transform_point(point2(0., 100.));
        let bottom_right = t.transform_point(point2(200., 0.));
        assert_close(top_left.x, 0.0);
        assert_close(top_left.y, 0.0);
        assert_close(bottom_right.x, 100.0);
        assert_close(bottom_right.y, 100.0);
    }

    #[test]
    fn draw_transform_honors_box_origin() {
        let source = rect(50., 100., 200., 100.);
        let t = draw_transform(&source, &size2(400., 200.), true).unwrap();
        let top_left = t.transform_point(point2(50., 200.));
        let bottom_right = t.transform_point(point2(250., 100.));
        assert_close(top_left.x, 0.0);
        assert_close(top_left.y, 0.0);
        assert_close(bottom_right.x, 400.0);
        assert_close(bottom_right.y, 200.0);
    }

    #[test]
    fn fit_transform_keeps_pdf_orientation() {
        let t = fit_transform(&rect(0., 0., 200., 100.), &size2(100., 100.), true).unwrap();
        let bottom_left = t.transform_point(point2(0., 0.));
        assert_close(bottom_left.x, 0.0);
        assert_close(bottom_left.y, 25.0);
        assert_close(t.m22, 0.5);
    }

    #[test]
    fn reframe_fills_target_from_crop_origin() {
        let crop = rect(36., 72., 540., 648.);
        let t = reframe_to_crop_box(&crop, &size2(270., 324.)).unwrap();
        assert_close(t.m11, 0.5);
        assert_close(t.m22, 0.5);

        let origin = t.transform_point(point2(36., 72.));
        let far = t.transform_point(point2(576., 720.));
        assert_close(origin.x, 0.0);
        assert_close(origin.y, 0.0);
        assert_close(far.x, 270.0);
        assert_close(far.y, 324.0);
    }

    #[test]
    fn reframe_is_non_uniform() {
        let t = reframe_to_crop_box(&rect(0., 0., 100., 100.), &size2(300., 50.)).unwrap();
        assert_close(t.m11, 3.0);
        assert_close(t.m22, 0.5);
    }

    #[test]
    fn degenerate_boxes_are_rejected() {
        let flat = rect(0., 0., 0., 100.);
        assert!(matches!(
            draw_transform(&flat, &size2(100., 100.), true),
            Err(PdfError::DegenerateBox { .. })
        ));
        assert!(matches!(
            reframe_to_crop_box(&rect(0., 0., 100., 0.), &size2(100., 100.)),
            Err(PdfError::DegenerateBox { .. })
        ));
        assert!(validate_box(&rect(0., 0., f64::NAN, 10.)).is_err());
        assert!(fit_transform(&rect(0., 0., 10., 10.), &size2(-1., 10.), false).is_err());
    }

    #[test]
    fn pixel_size_scales_and_rounds() {
        let size = scaled_pixel_size(&size2(612., 791.6), 2);
        assert_eq!((size.width, size.height), (1224, 1583));
        let none = scaled_pixel_size(&size2(612., 792.), 0);
        assert_eq!((none.width, none.height), (0, 0));
    }
}
