pub mod cluster;
pub mod config;
pub mod fs_util;
pub mod materializer;
pub mod process;
pub mod secrets;
pub mod template;
