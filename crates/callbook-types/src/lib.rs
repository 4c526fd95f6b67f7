pub mod api;
pub mod models;
pub mod status;

pub use models::*;
pub use status::*;
