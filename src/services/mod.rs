pub mod approval;
pub mod email;
pub mod erp;
pub mod token;
