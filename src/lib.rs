pub mod api;
pub mod branch;
pub mod config;
pub mod credentials;
pub mod deploy;
pub mod echo;
pub mod environment;
pub mod error;
pub mod execute;
pub mod filter;
pub mod package;
pub mod project;
pub mod retry;
pub mod store;
pub mod tracking;
pub mod uploader;

#[cfg(test)]
mod testing;
