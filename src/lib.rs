pub mod bucket;
pub mod config;
pub mod error;
pub mod export;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod query;
pub mod source;
pub mod store;
pub mod types;
pub mod validate;
