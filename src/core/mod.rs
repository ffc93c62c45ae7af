pub mod pipeline;
pub mod preview;
pub mod video_encoder;
