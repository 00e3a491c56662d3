#![forbid(unsafe_code)]

pub mod alignment;
pub mod app;
pub mod audio;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod elevenlabs;
pub mod extract;
pub mod json_file;
pub mod logging;
pub mod normalize;
pub mod provider;
pub mod retry;
pub mod voice;
