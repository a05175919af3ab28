//! Stress tests.
//!
//! ## What We Test
//!
//! - **Single flight**: thousands of concurrent callers, one session
//! - **Shutdown races**: shutdown interleaved with in-flight sessions
//! - **Retry volume**: many concurrent retrying operations sharing a config
