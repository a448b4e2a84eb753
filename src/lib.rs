// Pdfpress PDF Compression Service Library

pub mod auth;
pub mod config;
pub mod error;
pub mod ghostscript;
pub mod logging;
pub mod rate_limit;
pub mod server;
pub mod staging;
