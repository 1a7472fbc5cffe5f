//! Attendance-from-photo engine.
//!
//! Matches faces detected in one classroom group photo against a
//! per-student reference gallery, builds a present/absent/unrecognized
//! roster, and reconciles unrecognized faces through operator reuploads.

pub mod encoding;
pub mod gallery;
pub mod imaging;
pub mod matching;
pub mod pipeline;
pub mod session;
pub mod shared;
