//! Kenya Airways Alumni Approval Service
//!
//! This library provides the automatic approval-processing job for the
//! alumni registration portal: pending registrations are validated against
//! the ERP (HR) system with exponential backoff and either approved, with a
//! verification email, or escalated to human review. The job never rejects.

pub mod config;
pub mod db;
pub mod models;
pub mod schedule;
pub mod services;
