#![doc = include_str!("../README.md")]

mod error;

pub mod framing;
pub mod telemetry;

pub use error::{Error, Result};
