pub mod bronze;
pub mod silver;

pub use bronze::{BronzeLoader, LoadOutcome, LoadReport, LoadStatus};
pub use silver::SilverTransformer;
