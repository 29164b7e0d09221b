// Domain value objects
pub mod job_status;
pub mod priority;
pub mod severity;

pub use job_status::*;
pub use priority::*;
pub use severity::*;
