pub mod caption;
pub mod loader;
pub mod metadata;
pub mod synthetic;

pub use caption::{load_font, render_caption, CaptionLayout};
pub use loader::*;
pub use metadata::{format_capture_date, format_timestamp, read_capture_date};
