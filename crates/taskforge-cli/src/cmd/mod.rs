pub mod config;
pub mod generate;
pub mod init;
pub mod requirements;
pub mod status;
pub mod subtask;
pub mod unlock;
pub mod validate;
