//! Image subtype detection from magic bytes

use ::image::ImageFormat;

/// Guess the `image/*` subtype of a payload from its leading bytes
pub fn detect_image_subtype(data: &[u8]) -> Option<&'static str> {
    let subtype = match ::image::guess_format(data).ok()? {
        ImageFormat::Png => "png",
        ImageFormat::Jpeg => "jpeg",
        ImageFormat::Gif => "gif",
        ImageFormat::WebP => "webp",
        ImageFormat::Tiff => "tiff",
        ImageFormat::Bmp => "bmp",
        ImageFormat::Ico => "x-icon",
        ImageFormat::OpenExr => "x-exr",
        ImageFormat::Pnm => "x-portable-anymap",
        ImageFormat::Avif => "avif",
        ImageFormat::Qoi => "x-qoi",
        ImageFormat::Hdr => "vnd.radiance",
        _ => return None,
    };
    Some(subtype)
}
