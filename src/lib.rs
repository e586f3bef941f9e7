//! Blog archiver library.
//!
//! Backs up a Tumblr blog into per-day Markdown documents with optional
//! local media, then optionally feeds linked videos into a YouTube playlist
//! and mirrors the archive to S3.

pub mod archive;
pub mod attachments;
pub mod auth;
pub mod config;
pub mod constants;
pub mod fs_utils;
pub mod pipeline;
pub mod post;
pub mod render;
pub mod s3;
pub mod tumblr;
pub mod youtube;
