//! Frame → text decoding.

use super::camera::Frame;

/// Finds a 2D barcode in a frame and returns its text.
///
/// `None` covers every "nothing usable here" case: no symbol in view, a
/// partial symbol, a symbol that fails error correction. Continuous scanning
/// hits these constantly, so they are not errors.
pub trait FrameDecoder: Send + Sync {
    fn decode(&self, frame: &Frame) -> Option<String>;
}

/// QR decoder backed by `rqrr`.
#[derive(Debug, Clone, Copy, Default)]
pub struct QrDecoder;

impl FrameDecoder for QrDecoder {
    fn decode(&self, frame: &Frame) -> Option<String> {
        let width = frame.width() as usize;
        let height = frame.height() as usize;
        let luma = frame.luma();
        let mut prepared =
            rqrr::PreparedImage::prepare_from_greyscale(width, height, |x, y| luma[y * width + x]);

        prepared
            .detect_grids()
            .into_iter()
            .find_map(|grid| match grid.decode() {
                Ok((_, content)) if !content.trim().is_empty() => Some(content),
                Ok(_) => None,
                Err(e) => {
                    tracing::trace!(error = %e, "qr grid failed to decode");
                    None
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qr;

    #[test]
    fn blank_frame_decodes_to_nothing() {
        let frame = Frame::from_luma(64, 64, vec![255u8; 64 * 64]).unwrap();
        assert_eq!(QrDecoder.decode(&frame), None);
    }

    #[test]
    fn rendered_code_decodes_back() {
        let payload = r#"{"subjectId":"u1","reg_no":"REG-1"}"#;
        let img = qr::render_image(payload).unwrap();
        let frame = Frame::from_gray_image(img);
        assert_eq!(QrDecoder.decode(&frame).as_deref(), Some(payload));
    }
}
