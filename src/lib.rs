#![forbid(unsafe_code)]

pub mod app;
pub mod batch;
pub mod cli;
pub mod completion;
pub mod config;
pub mod contract;
pub mod folders;
pub mod literature;
pub mod logging;
pub mod openai;
pub mod path_guard;
pub mod prompts;
pub mod render;
pub mod schema;
