use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::codecs::gif::{GifEncoder, Repeat};
use image::imageops::FilterType;
use image::{Delay, Frame, RgbaImage};

/// Floor for the per-frame display time
pub const MIN_FRAME_MS: u64 = 1000;

fn decode_still(encoded: &str) -> Option<RgbaImage> {
    let bytes = STANDARD.decode(encoded.trim()).ok()?;
    image::load_from_memory(&bytes).ok().map(|img| img.to_rgba8())
}

/// Build a looping GIF from base64 still images, returned base64 encoded
///
/// Entries that do not decode as images are skipped. Frames are scaled to
/// the first frame's size. `None` when nothing decodes or encoding fails.
pub fn animate(images: &[String], frame_ms: u64) -> Option<String> {
    let stills: Vec<RgbaImage> = images.iter().filter_map(|img| decode_still(img)).collect();
    let first = stills.first()?;
    let (width, height) = first.dimensions();
    let frame_ms = u32::try_from(frame_ms.max(MIN_FRAME_MS)).unwrap_or(u32::MAX);

    let mut buffer = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut buffer);
        if let Err(e) = encoder.set_repeat(Repeat::Infinite) {
            log::warn!("⚠️  GIF repeat setup failed: {}", e);
            return None;
        }
        for still in stills.iter() {
            let still = if still.dimensions() == (width, height) {
                still.clone()
            } else {
                image::imageops::resize(still, width, height, FilterType::Triangle)
            };
            let frame = Frame::from_parts(still, 0, 0, Delay::from_numer_denom_ms(frame_ms, 1));
            if let Err(e) = encoder.encode_frame(frame) {
                log::warn!("⚠️  GIF frame encoding failed: {}", e);
                return None;
            }
        }
    }

    log::debug!("Animated {} of {} images", stills.len(), images.len());
    Some(STANDARD.encode(buffer))
}
