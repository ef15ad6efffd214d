pub mod init;
pub mod task;
