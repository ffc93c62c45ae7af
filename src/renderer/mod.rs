pub mod atlas;
pub mod cell;
pub mod processor;
pub mod quantizer;

pub use atlas::IconAtlas;
pub use cell::{Cell, GridLayout};
pub use processor::MosaicProcessor;
pub use quantizer::BrightnessQuantizer;
