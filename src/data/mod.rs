pub mod course;
pub mod enrollment;
pub mod filter;
pub mod project;
pub mod serde_helpers;
pub mod store;
pub mod user;
