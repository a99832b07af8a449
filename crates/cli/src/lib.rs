pub mod http;
pub mod principal;

pub use http::{router, AppState};
