//! Core services shared by every engine component

pub mod cancel;
pub mod error_handling;
pub mod logging;
pub mod retry;
pub mod sync;
pub mod time;
