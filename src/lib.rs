//! Reconstruction engine for heritage-weaver
//!
//! Takes photographs of a broken object's fragments and produces one image of
//! the restored whole. Several external image-generation services are tried in
//! order; if none of them delivers, an offline placeholder is returned so a
//! caller always receives an image.

pub mod ai;
pub mod app;
pub mod chain;
pub mod config;
pub mod error;
pub mod mime;
pub mod models;
pub mod placeholder;
pub mod prompts;
pub mod sink;
pub mod transcode;
pub mod validator;

pub use error::{Error, Result};
