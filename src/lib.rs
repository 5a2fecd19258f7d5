//! Tune finder library - fuzzy tune-name matching against a local audio library.
//! Shared by the find-tune and resolve-sets binaries.

pub mod aliases;
pub mod batch;
pub mod catalog;
pub mod cli;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod recordings;
pub mod safety;
pub mod scoring;
pub mod sets;

pub use error::{Result, TuneError};
