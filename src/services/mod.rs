//! Business logic services.

pub mod approval;
pub mod audit;
pub mod auth;
pub mod pdf;
pub mod photo;
pub mod record;
pub mod report;
pub mod session;
pub mod storage;
pub mod template;
pub mod workflow;
