pub mod image_ctx;
pub mod image_flow;
pub mod prompt;

pub use image_ctx::ImageCtx;
pub use image_flow::{ImageFlow, ItemState};
pub use prompt::{load_instruction, DEFAULT_INSTRUCTION};
