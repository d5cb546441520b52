//! Reader for RGB-D sensor capture (`.sens`) containers.
//!
//! A container is a header followed by `frame_count` frame records, each
//! holding a camera pose, two timestamps and compressed color and depth
//! payloads. [`reader::open_sens`] parses the header and yields frames
//! lazily; [`export`] decodes them into image, pose and calibration files.

pub mod codec;
pub mod cursor;
pub mod decode;
pub mod error;
pub mod export;
pub mod frame;
pub mod header;
pub mod reader;
pub mod version;
pub mod writer;

pub use error::{Result, SensError};
pub use frame::FrameRecord;
pub use header::{Header, ReaderConfig};
pub use reader::{SensReader, open_sens};
