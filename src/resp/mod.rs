pub mod envelope;
pub mod error;
pub mod jwt;
pub mod util;
