//! Core data models for the gated file-transfer service.
//!
//! A transfer tracks one file's journey from sender to a single recipient,
//! including the verification-code sub-state and the terminal download flag.

pub mod transfer;
