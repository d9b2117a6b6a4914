pub mod command;
pub mod config;
pub mod decode;
pub mod encode;
pub mod info;
pub mod progress;
