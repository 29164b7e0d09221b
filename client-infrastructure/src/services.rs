// Backend adapters

pub mod http_jobs;
pub mod ws_stream;

pub use http_jobs::HttpJobService;
pub use ws_stream::WsScanTransport;
