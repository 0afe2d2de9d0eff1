pub mod archive;
pub mod cli;
pub mod config;
pub mod errors;
pub mod generate;
pub mod log;
pub mod pipeline;
pub mod prompt;
pub mod provider;
pub mod safety;
pub mod server;
pub mod store;
pub mod ux;
pub mod validate;
pub mod wire;
