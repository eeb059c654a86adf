pub mod app;
pub mod beep;
pub mod cancel;
pub mod cleanup;
pub mod cli;
pub mod clipboard;
pub mod config;
pub mod controller;
pub mod engine;
pub mod job;
pub mod logging;
pub mod preflight;
pub mod storage;
pub mod sweep;
pub mod tray;

pub use app::run;
