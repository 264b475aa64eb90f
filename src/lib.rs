pub mod app;
pub mod cache;
pub mod concurrency;
pub mod core;
pub mod remote;
pub mod scanner;
pub mod staging;
