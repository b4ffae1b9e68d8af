use crate::{config::FittingConfig, error::OverlayError};
use image::{DynamicImage, Rgba, RgbaImage, imageops, metadata::Orientation};
use std::{fmt, io::Cursor, path::Path, sync::Arc};

/// Width every subject photo is normalized to before compositing.
pub const STANDARD_WIDTH: u32 = 600;

const BUILTIN_OVERLAY: &[u8] = include_bytes!("../assets/dress_overlay.svg");

/// Largest RGBA buffer a normalized photo may occupy, matching the decoder's allocation limit.
pub const MAX_NORMALIZED_BYTES: u64 = 512 * 1024 * 1024;

/// Deterministic fallback: a fixed garment silhouette laid over the lower part of the photo.
///
/// The SVG is parsed once; composing only rasterizes it at the size each photo needs.
#[derive(Clone)]
pub struct OverlayComposer {
    tree: Arc<usvg::Tree>,
}

impl fmt::Debug for OverlayComposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverlayComposer")
            .field("size", &self.intrinsic_size())
            .finish()
    }
}

impl OverlayComposer {
    /// Composer using the dress silhouette shipped with the crate.
    pub fn builtin() -> Result<Self, OverlayError> {
        Self::from_svg(BUILTIN_OVERLAY)
    }

    pub fn from_svg(bytes: &[u8]) -> Result<Self, OverlayError> {
        let tree = usvg::Tree::from_data(bytes, &usvg::Options::default())?;
        let size = tree.size();
        let (width, height) = (size.width(), size.height());
        if !width.is_finite() || !height.is_finite() || width <= 0.0 || height <= 0.0 {
            return Err(OverlayError::InvalidSize { width, height });
        }
        Ok(Self {
            tree: Arc::new(tree),
        })
    }

    pub fn from_path(path: &Path) -> Result<Self, OverlayError> {
        let bytes = std::fs::read(path).map_err(|source| OverlayError::Asset {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_svg(&bytes)
    }

    pub fn from_config(config: &FittingConfig) -> Result<Self, OverlayError> {
        match &config.overlay_asset {
            Some(path) => Self::from_path(path),
            None => Self::builtin(),
        }
    }

    /// Composes the overlay onto the encoded subject photo.
    pub fn compose(&self, subject: &[u8]) -> Result<DynamicImage, OverlayError> {
        let mut composite = normalize(subject)?;
        let (width, height) = composite.dimensions();

        let (overlay_width, overlay_height) =
            fit_inside(self.intrinsic_size(), overlay_bounds(width, height));
        let overlay = self.rasterize(overlay_width, overlay_height)?;

        let mut layer = RgbaImage::new(width, height);
        let (x, y) = bottom_center(width, height, overlay_width, overlay_height);
        imageops::replace(&mut layer, &overlay, i64::from(x), i64::from(y));

        imageops::overlay(&mut composite, &layer, 0, 0);
        Ok(DynamicImage::ImageRgba8(composite))
    }

    fn intrinsic_size(&self) -> (f32, f32) {
        let size = self.tree.size();
        (size.width(), size.height())
    }

    fn rasterize(&self, width: u32, height: u32) -> Result<RgbaImage, OverlayError> {
        let mut pixmap = resvg::tiny_skia::Pixmap::new(width, height)
            .ok_or(OverlayError::Pixmap { width, height })?;

        let (svg_width, svg_height) = self.intrinsic_size();
        let transform = resvg::tiny_skia::Transform::from_scale(
            width as f32 / svg_width,
            height as f32 / svg_height,
        );
        resvg::render(&self.tree, transform, &mut pixmap.as_mut());

        // tiny-skia stores premultiplied alpha, the image crate expects straight alpha
        let mut out = RgbaImage::new(width, height);
        for (dst, src) in out.pixels_mut().zip(pixmap.pixels()) {
            let color = src.demultiply();
            *dst = Rgba([color.red(), color.green(), color.blue(), color.alpha()]);
        }
        Ok(out)
    }
}

/// Decodes, orients and resizes the subject to [`STANDARD_WIDTH`].
fn normalize(subject: &[u8]) -> Result<RgbaImage, OverlayError> {
    let mut image = image::load_from_memory(subject).map_err(OverlayError::Decode)?;
    if let Some(orientation) = exif_orientation(subject) {
        image.apply_orientation(orientation);
    }

    let (width, height) = standard_size(image.width(), image.height());
    if u64::from(width) * u64::from(height) * 4 > MAX_NORMALIZED_BYTES {
        return Err(OverlayError::TooLarge { width, height });
    }
    Ok(image
        .resize_exact(width, height, imageops::FilterType::Lanczos3)
        .to_rgba8())
}

fn exif_orientation(bytes: &[u8]) -> Option<Orientation> {
    let exif = exif::Reader::new()
        .read_from_container(&mut Cursor::new(bytes))
        .ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    let value = field.value.get_uint(0)?;
    Orientation::from_exif(u8::try_from(value).ok()?)
}

/// Width fixed to [`STANDARD_WIDTH`], height scaled proportionally.
pub fn standard_size(width: u32, height: u32) -> (u32, u32) {
    let width = u64::from(width.max(1));
    let target = u64::from(STANDARD_WIDTH);
    let scaled = (u64::from(height) * target + width / 2) / width;
    (STANDARD_WIDTH, scaled.clamp(1, u64::from(u32::MAX)) as u32)
}

/// 90% of the normalized photo, rounded down.
pub fn overlay_bounds(width: u32, height: u32) -> (u32, u32) {
    let scale = |v: u32| ((u64::from(v) * 9 / 10) as u32).max(1);
    (scale(width), scale(height))
}

/// Largest size with the source aspect ratio that fits inside `bounds`.
pub fn fit_inside(source: (f32, f32), bounds: (u32, u32)) -> (u32, u32) {
    let (source_width, source_height) = (f64::from(source.0), f64::from(source.1));
    let (max_width, max_height) = bounds;
    let scale = (f64::from(max_width) / source_width).min(f64::from(max_height) / source_height);

    let width = ((source_width * scale).round() as u32).clamp(1, max_width);
    let height = ((source_height * scale).round() as u32).clamp(1, max_height);
    (width, height)
}

/// Top-left corner that anchors an overlay to the bottom-center of the canvas.
pub fn bottom_center(
    width: u32,
    height: u32,
    overlay_width: u32,
    overlay_height: u32,
) -> (u32, u32) {
    (
        width.saturating_sub(overlay_width) / 2,
        height.saturating_sub(overlay_height),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, ImageFormat, Rgb, RgbImage};

    const RED: Rgb<u8> = Rgb([200, 20, 20]);

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_pixel(width, height, RED);
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn encode(image: &DynamicImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn portrait_geometry_matches_reference_scenario() {
        assert_eq!(standard_size(800, 1000), (600, 750));
        assert_eq!(overlay_bounds(600, 750), (540, 675));
        // the built-in silhouette is 400x600, so height is the binding side
        assert_eq!(fit_inside((400.0, 600.0), (540, 675)), (450, 675));
        assert_eq!(bottom_center(600, 750, 450, 675), (75, 75));
    }

    #[test]
    fn landscape_geometry_fits_by_height() {
        assert_eq!(standard_size(1200, 600), (600, 300));
        assert_eq!(overlay_bounds(600, 300), (540, 270));
        assert_eq!(fit_inside((400.0, 600.0), (540, 270)), (180, 270));
        assert_eq!(bottom_center(600, 300, 180, 270), (210, 30));
    }

    #[test]
    fn small_images_are_scaled_up() {
        assert_eq!(standard_size(300, 400), (600, 800));
        assert_eq!(standard_size(6000, 1), (600, 1));
    }

    #[test]
    fn compose_keeps_background_and_covers_bottom_center() {
        let composer = OverlayComposer::builtin().unwrap();
        let composite = composer.compose(&png(800, 1000)).unwrap();

        assert_eq!(composite.dimensions(), (600, 750));
        let corner = composite.get_pixel(0, 0);
        assert_eq!(corner, Rgba([RED[0], RED[1], RED[2], 255]));

        let dress = composite.get_pixel(300, 745);
        assert_ne!(dress, corner);
        assert!(dress[1] > 150, "bottom center should be covered by the light dress");
    }

    #[test]
    fn compose_is_deterministic() {
        let composer = OverlayComposer::builtin().unwrap();
        let input = png(640, 480);
        let first = encode(&composer.compose(&input).unwrap());
        let second = encode(&composer.compose(&input).unwrap());
        assert_eq!(first, second);
    }

    #[test]
    fn undecodable_input_is_an_error() {
        let composer = OverlayComposer::builtin().unwrap();
        let err = composer.compose(b"definitely not an image").unwrap_err();
        assert!(matches!(err, OverlayError::Decode(_)));
    }

    #[test]
    fn invalid_svg_is_rejected() {
        assert!(matches!(
            OverlayComposer::from_svg(b"<not-svg"),
            Err(OverlayError::Svg(_))
        ));
    }

    /// Baseline JPEG with an APP1 segment carrying only an EXIF orientation tag.
    fn jpeg_with_orientation(width: u32, height: u32, orientation: u16) -> Vec<u8> {
        let image = RgbImage::from_pixel(width, height, RED);
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Jpeg).unwrap();
        let jpeg = out.into_inner();

        // big-endian TIFF header, one IFD entry: Orientation (0x0112), SHORT, count 1
        let mut tiff = b"MM\x00\x2a\x00\x00\x00\x08".to_vec();
        tiff.extend_from_slice(b"\x00\x01\x01\x12\x00\x03\x00\x00\x00\x01");
        tiff.extend_from_slice(&orientation.to_be_bytes());
        tiff.extend_from_slice(&[0, 0, 0, 0, 0, 0]);

        let mut app1 = b"Exif\x00\x00".to_vec();
        app1.extend_from_slice(&tiff);
        let length = u16::try_from(app1.len() + 2).unwrap();

        let mut with_exif = jpeg[..2].to_vec();
        with_exif.extend_from_slice(&[0xff, 0xe1]);
        with_exif.extend_from_slice(&length.to_be_bytes());
        with_exif.extend_from_slice(&app1);
        with_exif.extend_from_slice(&jpeg[2..]);
        with_exif
    }

    #[test]
    fn exif_rotation_is_applied_before_resizing() {
        let input = jpeg_with_orientation(40, 20, 6);
        assert_eq!(exif_orientation(&input), Some(Orientation::Rotate90));

        let composer = OverlayComposer::builtin().unwrap();
        let composite = composer.compose(&input).unwrap();
        assert_eq!(composite.dimensions(), (600, 1200));
    }

    #[test]
    fn oversized_normalization_is_an_error() {
        let composer = OverlayComposer::builtin().unwrap();
        let err = composer.compose(&png(1, 40_000)).unwrap_err();
        assert!(matches!(
            err,
            OverlayError::TooLarge {
                width: 600,
                height: 24_000_000
            }
        ));
    }

    #[test]
    fn composer_debug_shows_intrinsic_size() {
        let composer = OverlayComposer::builtin().unwrap();
        assert_eq!(
            format!("{composer:?}"),
            "OverlayComposer { size: (400.0, 600.0) }"
        );
    }

    #[test]
    fn missing_asset_reports_path() {
        let err = OverlayComposer::from_path(Path::new("/nonexistent/overlay.svg")).unwrap_err();
        assert!(matches!(err, OverlayError::Asset { .. }));
    }

    #[test]
    fn png_without_exif_has_no_orientation() {
        assert_eq!(exif_orientation(&png(4, 4)), None);
    }
}
