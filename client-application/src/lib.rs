// Client Application Layer

pub mod error;
pub mod session;
pub mod transport;

pub use error::SessionError;
pub use session::{ScanSession, SessionPhase, SessionSnapshot};
pub use transport::{PollTransport, ScanTransport, TransportEvent};
