pub mod api;
pub mod batch;
pub mod category;
pub mod config;
pub mod input;
pub mod interwiki;
pub mod jobs;
pub mod rewrite;
pub mod runtime;
pub mod template;
