//! Camera discovery: find a device that opens, accepts the requested format
//! and actually delivers a frame.

use std::ops::Range;

use crate::capture::domain::frame_source::{CaptureError, FrameSource, SourceConfig};

/// Opens the device at a numeric index.
pub trait SourceOpener {
    fn open(&self, index: u32) -> Result<Box<dyn FrameSource>, CaptureError>;
}

/// Tries `preferred` first, then every other index in `candidates`.
///
/// A candidate is accepted once it is configured and a test read succeeds.
/// Returns the index that worked alongside the ready source.
pub fn open_first_available(
    opener: &dyn SourceOpener,
    preferred: u32,
    candidates: Range<u32>,
    config: &SourceConfig,
) -> Result<(u32, Box<dyn FrameSource>), CaptureError> {
    let order = std::iter::once(preferred).chain(candidates.filter(|&i| i != preferred));
    for index in order {
        match try_open(opener, index, config) {
            Ok(source) => {
                if index != preferred {
                    log::info!("Camera {preferred} unavailable, using camera {index}");
                }
                return Ok((index, source));
            }
            Err(e) => log::debug!("Camera {index} rejected: {e}"),
        }
    }
    Err(CaptureError::NoDevice)
}

/// Indices in `candidates` that open and deliver a frame. Each probed device
/// is released again.
pub fn find_available(
    opener: &dyn SourceOpener,
    candidates: Range<u32>,
    config: &SourceConfig,
) -> Vec<u32> {
    candidates
        .filter(|&index| match try_open(opener, index, config) {
            Ok(mut source) => {
                source.release();
                true
            }
            Err(_) => false,
        })
        .collect()
}

fn try_open(
    opener: &dyn SourceOpener,
    index: u32,
    config: &SourceConfig,
) -> Result<Box<dyn FrameSource>, CaptureError> {
    let mut source = opener.open(index)?;
    if let Err(e) = source.configure(config) {
        source.release();
        return Err(e);
    }
    if source.read().is_none() {
        source.release();
        return Err(CaptureError::Open {
            source_name: source.describe(),
            reason: "test read returned no frame".to_string(),
        });
    }
    Ok(source)
}
