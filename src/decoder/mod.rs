pub mod frame_data;
pub mod probe;
pub mod video;

pub use frame_data::Frame;
pub use video::{FfmpegDecoder, FrameSource, MemorySource};
