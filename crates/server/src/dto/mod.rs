mod report;
mod request;

pub use report::*;
pub use request::*;
