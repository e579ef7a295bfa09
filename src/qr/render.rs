use std::io::Cursor;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use derive_more::Display;
use image::{DynamicImage, ImageFormat, Luma};
use qrcode::QrCode;
use qrcode::render::unicode::Dense1x2;

const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";
const MIN_EDGE_PX: u32 = 240;

#[derive(Debug, Display)]
pub enum RenderError {
    #[display(fmt = "payload does not fit in a QR code: {}", _0)]
    Encode(qrcode::types::QrError),
    #[display(fmt = "PNG encoding failed: {}", _0)]
    Png(image::ImageError),
}

impl std::error::Error for RenderError {}

/// Renders `payload` as a PNG data URL. Nothing is cached: the payload string
/// is the source of truth and the image is rebuilt on every call.
pub fn png_data_url(payload: &str) -> Result<String, RenderError> {
    let code = QrCode::new(payload.as_bytes()).map_err(RenderError::Encode)?;
    let img = code
        .render::<Luma<u8>>()
        .min_dimensions(MIN_EDGE_PX, MIN_EDGE_PX)
        .build();

    let mut png = Vec::new();
    DynamicImage::ImageLuma8(img)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(RenderError::Png)?;

    Ok(format!("{}{}", PNG_DATA_URL_PREFIX, STANDARD.encode(png)))
}

/// Terminal rendering, two modules per character cell.
pub fn unicode_block(payload: &str) -> Result<String, RenderError> {
    let code = QrCode::new(payload.as_bytes()).map_err(RenderError::Encode)?;
    Ok(code
        .render::<Dense1x2>()
        .dark_color(Dense1x2::Light)
        .light_color(Dense1x2::Dark)
        .build())
}

#[cfg(test)]
pub(crate) fn decode_png_data_url(data_url: &str) -> String {
    let encoded = data_url
        .strip_prefix(PNG_DATA_URL_PREFIX)
        .expect("not a PNG data URL");
    let bytes = STANDARD.decode(encoded).expect("invalid base64");
    let img = image::load_from_memory_with_format(&bytes, ImageFormat::Png)
        .expect("invalid PNG")
        .to_luma8();

    let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
        img.width() as usize,
        img.height() as usize,
        |x, y| img.get_pixel(x as u32, y as u32).0[0],
    );
    let grids = prepared.detect_grids();
    assert_eq!(grids.len(), 1, "expected exactly one QR code in the image");
    let (_, content) = grids[0].decode().expect("QR grid did not decode");
    content
}
