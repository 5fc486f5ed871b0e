pub mod init;
pub mod platform;
pub mod serve;
pub mod sign;
pub mod sync_config;
