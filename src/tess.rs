use std::io::Cursor;

use image::{DynamicImage, ImageFormat};
use leptess::LepTess;
use tracing::instrument;

use crate::Error;

/// One-shot Tesseract pass over a plate crop. The engine is rebuilt per call;
/// the program recognizes a single image per invocation, so there is nothing
/// worth pooling.
#[instrument(skip(image))]
pub(crate) fn recognize(image: &DynamicImage) -> Result<String, Error> {
    let mut encoded = Vec::new();
    image.write_to(&mut Cursor::new(&mut encoded), ImageFormat::Png)?;

    let mut engine =
        LepTess::new(None, "eng").map_err(|e| Error::Tesseract(e.to_string()))?;
    engine
        .set_image_from_mem(&encoded)
        .map_err(|e| Error::Tesseract(e.to_string()))?;

    // Undecodable output reads the same as "no text found".
    Ok(engine.get_utf8_text().unwrap_or_default())
}
