//! I/O helpers: configuration, credentials, completion client, prompts and
//! the record store.

pub mod config;
pub mod credentials;
pub mod init;
pub mod llm;
pub mod prompt;
pub mod store;
