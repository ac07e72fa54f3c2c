pub mod cycle;
pub mod daemon;
pub mod init;
pub mod plan;
pub mod report;
pub mod status;
