//! Policy document handling

pub mod loader;
pub mod schema;
pub mod validator;

pub use loader::{PolicyFormat, PolicyLoader};
pub use schema::{DomainPattern, Policy, ProxyMode};
pub use validator::PolicyValidator;
