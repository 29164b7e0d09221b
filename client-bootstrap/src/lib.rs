pub mod context;
pub mod runner;

pub use context::{ClientContext, TransportMode};
pub use runner::{run_scan, ScanArgs};
