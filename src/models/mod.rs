//! Database models and DTOs for all domain entities.

pub mod approval;
pub mod audit;
pub mod pagination;
pub mod photo;
pub mod record;
pub mod template;
pub mod user;
