pub mod amount;
pub mod tick_range;

pub use amount::{AssetPrices, TokenAmounts};
pub use tick_range::TickRange;
