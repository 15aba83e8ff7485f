mod labels;
mod propaganda;
mod report;

pub use labels::*;
pub use propaganda::*;
pub use report::*;
