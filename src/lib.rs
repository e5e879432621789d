//! # pixfit
//!
//! Normalize, convert, and fit images for the web. Read an image from a
//! file, a byte buffer, or a stream, clean it up, bring it to a target
//! size, and encode it in the format you need.
//!
//! # Architecture: One Pipeline, Many Callers
//!
//! Every image goes through the same [`imaging::Processor`] pipeline:
//!
//! ```text
//! read → convert format → remove alpha → remove layers → remove meta
//!      → convert colorspace → scale-to-fit | thumbnail → encode
//! ```
//!
//! The pipeline is split three ways:
//!
//! - **Geometry** ([`imaging::geometry`]): pure functions that compute the
//!   target size and crop box. No pixels involved, fully unit tested.
//! - **Backend** ([`imaging::ImageBackend`]): executes single steps on
//!   pixels. [`imaging::RustBackend`] is the production implementation;
//!   tests use a recording mock.
//! - **Processor** ([`imaging::Processor`]): threads an image through the
//!   steps by value, so each step hands the next a fresh processor.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imaging`] | Geometry, parameters, backends, and the processor pipeline |
//! | [`jobs`] | Batch runs over files and directories, in parallel with rayon |
//! | [`config`] | `pixfit.toml` loading, validation, and merging over stock defaults |
//! | [`output`] | CLI output formatting for identify results and job progress |
//!
//! # Design Decisions
//!
//! ## Typed Parameters
//!
//! Formats, colorspaces, filters, and backgrounds are closed enums or
//! validated newtypes. Bad values are rejected when parsed (from the CLI or
//! the config file), never in the middle of a batch.
//!
//! ## No Default Colorspace
//!
//! [`imaging::ColorSpace`] has no default. Conversion only happens when the
//! caller names a target, so images are never silently re-encoded into a
//! colorspace nobody asked for.
//!
//! ## Pure-Rust Imaging
//!
//! The [`imaging`] module uses the `image` crate for decoding, resampling,
//! and encoding. No ImageMagick, no system libraries: the binary is fully
//! self-contained.

pub mod config;
pub mod imaging;
pub mod jobs;
pub mod output;
