pub mod analysis;
pub mod dashboard;
pub mod plan;

pub use analysis::*;
pub use dashboard::*;
pub use plan::*;
