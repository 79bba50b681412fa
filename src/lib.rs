pub mod aws_config;
pub mod ec2;
pub mod error;
pub mod migrate;

pub use error::{Error, Result};
