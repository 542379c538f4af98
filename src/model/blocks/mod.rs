pub mod basic;
pub mod bottleneck;
pub mod conv;

pub use basic::BasicBlock;
pub use bottleneck::{Bottleneck, BOTTLENECK_EXPANSION};
pub use conv::ConvBlock;
