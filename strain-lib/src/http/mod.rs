pub mod headers;
pub mod request;

pub use self::request::{RequestOutcome, RequestTemplate};
