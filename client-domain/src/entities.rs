// Domain entities

pub mod finding;
pub mod job;
pub mod stream;

pub use finding::*;
pub use job::*;
pub use stream::*;
