// Pure domain logic shared by every component

pub mod constants;
pub mod errors;
pub mod models;
pub mod traits;
