// src/services/mod.rs
//
// Outbound clients for the external identity providers

pub mod google;
pub mod microsoft;

// Re-export commonly used types for convenience
pub use google::{GoogleError, GoogleService};
pub use microsoft::{MicrosoftError, MicrosoftService};
