pub mod aligner;
pub mod batch;
pub mod traits;
pub mod types;

pub use aligner::*;
pub use batch::*;
pub use traits::*;
pub use types::*;
