// Core confession module - the aggregate, its storage port and the
// submission/administration service.

pub mod confession_models;
pub mod confession_service;

pub use confession_models::*;
pub use confession_service::*;
