pub mod cmd_caps;
pub mod cmd_config;
pub mod cmd_domcaps;
pub mod cmd_sysinfo;
pub mod common;
pub mod config;
