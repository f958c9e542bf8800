#![doc = include_str!("../README.md")]

mod error;
mod prelude;

pub mod config;
pub mod framing;
pub mod hrpt;
pub mod image;
pub mod lrpt;
pub mod session;
pub mod spacepacket;
pub mod timecode;

pub use error::{Error, Result};
