//! Concrete collaborators for the digest pipeline.
//!
//! - [`MaildirSource`] lists digest messages from a Maildir
//! - [`MaildirArchiver`] moves processed messages into an archive Maildir
//! - [`CommandSink`] hands the compendium to a mail submission command

mod maildir;
mod sink;

pub use maildir::{MaildirArchiver, MaildirSource};
pub use sink::{CommandSink, compose_message};
