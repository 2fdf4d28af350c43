pub mod config;
pub mod generate;
pub mod github;
pub mod http;
pub mod import;
pub mod package;
pub mod store;
