// Service Port Traits (Interfaces)
// Define what the client needs from the backend

pub mod jobs;

pub use jobs::*;
