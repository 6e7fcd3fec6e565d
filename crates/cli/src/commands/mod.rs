pub mod chat;
pub mod init;
pub mod replay;
pub mod serve;
