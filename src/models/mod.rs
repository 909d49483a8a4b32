pub mod audit;
pub mod email_log;
pub mod registration;
