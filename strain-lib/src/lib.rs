#![cfg_attr(
    not(test),
    warn(clippy::print_stdout, clippy::dbg_macro),
    deny(clippy::unwrap_used, clippy::expect_used)
)]

pub mod config;
pub mod controller;
pub mod http;
pub mod monitor;
pub mod probe;
pub mod report;
pub mod sizer;
pub mod state;
pub mod utils;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_utils;
