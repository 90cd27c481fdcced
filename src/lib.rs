pub mod analyzers;
pub mod cleaner;
pub mod config;
pub mod fetch;
pub mod merger;
pub mod model;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod risk;
