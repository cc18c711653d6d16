//! Testing utilities and mock implementations for E2E tests.
//!
//! Provides a controllable [`MockEncoder`] so the queue, registry,
//! history and worker can be exercised end to end without
//! ImageMagick installed.

mod mock_encoder;

pub use mock_encoder::{MockEncoder, RecordedEncode};
