//! Service layer: the transfer registry, its orchestration, and the
//! storage/mail/clock collaborators.

pub mod clock;
pub mod file_store;
pub mod mailer;
pub mod registry;
pub mod transfer;
