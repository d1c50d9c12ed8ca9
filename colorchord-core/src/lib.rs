// colorchord-core/src/lib.rs

//! The core of the ColorChord note analyzer.
//! This crate turns a stream of 16-bit audio samples into a handful of
//! tracked musical notes, each with a position on the octave circle and two
//! amplitude estimates. It is integer-only on the sample path, allocation
//! free per sample and per frame, and contains no audio I/O.
//!
//! Data flows as:
//! samples -> [`dft`] (scheduled by [`schedule`]) -> [`magnitude`] ->
//! [`postprocess`] -> [`peaks`] -> [`notes`], all driven by [`engine::Engine`].

pub mod config;
pub mod dft;
pub mod engine;
pub mod error;
pub mod fixed;
pub mod freqtable;
pub mod magnitude;
pub mod notes;
pub mod peaks;
pub mod postprocess;
pub mod schedule;
pub mod sintable;
pub mod tuning;
pub mod worker;

pub use config::{DftMode, Settings};
pub use engine::{ColorChord, Diagnostics, Engine, SAMPLES_PER_FRAME};
pub use error::ConfigError;
pub use magnitude::{Approximate, Exact, MagnitudePolicy};
pub use notes::NoteSlot;
pub use worker::{AnalyzerWorker, FrameReport};
