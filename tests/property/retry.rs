//! Property tests for the retry wrapper.
//!
//! Invariants tested:
//! - Never exceeds max_attempts
//! - k transient failures below the budget take k + 1 invocations
//! - Non-transient failures take exactly one invocation

use super::paused_runtime;
use conn_resilience_retry::{RetryConfig, with_retry};
use proptest::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
enum TestError {
    Transient,
    Fatal,
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Transient => write!(f, "transient error"),
            TestError::Fatal => write!(f, "fatal error"),
        }
    }
}

fn config(max_attempts: usize, base_ms: u64) -> RetryConfig<TestError> {
    RetryConfig::retry_on(|e: &TestError| *e == TestError::Transient)
        .max_attempts(max_attempts)
        .base_delay(Duration::from_millis(base_ms))
        .build()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: invocations == min(failures + 1, max_attempts)
    #[test]
    fn invocation_count_matches_budget(
        max_attempts in 1usize..=8,
        failures in 0usize..=10,
        base_ms in 0u64..=2_000,
    ) {
        let rt = paused_runtime();
        rt.block_on(async {
            let calls = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&calls);

            let result = with_retry(
                || {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n < failures {
                            Err(TestError::Transient)
                        } else {
                            Ok(n + 1)
                        }
                    }
                },
                "op",
                &config(max_attempts, base_ms),
            )
            .await;

            let total = calls.load(Ordering::SeqCst);
            prop_assert_eq!(total, (failures + 1).min(max_attempts));
            if failures < max_attempts {
                prop_assert_eq!(result, Ok(failures + 1));
            } else {
                prop_assert_eq!(result, Err(TestError::Transient));
            }
            Ok(())
        })?;
    }

    /// Property: a non-transient failure is never retried
    #[test]
    fn fatal_error_single_invocation(max_attempts in 1usize..=8) {
        let rt = paused_runtime();
        rt.block_on(async {
            let calls = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&calls);

            let result: Result<(), _> = with_retry(
                || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Err(TestError::Fatal) }
                },
                "op",
                &config(max_attempts, 100),
            )
            .await;

            prop_assert_eq!(result, Err(TestError::Fatal));
            prop_assert_eq!(calls.load(Ordering::SeqCst), 1);
            Ok(())
        })?;
    }

    /// Property: total sleep is base * (1 + 2 + ... + (attempts - 1))
    #[test]
    fn linear_delay_total(max_attempts in 1usize..=6, base_ms in 1u64..=1_000) {
        let rt = paused_runtime();
        rt.block_on(async {
            let start = tokio::time::Instant::now();
            let _: Result<(), _> = with_retry(
                || async { Err(TestError::Transient) },
                "op",
                &config(max_attempts, base_ms),
            )
            .await;

            let n = (max_attempts - 1) as u64;
            let expected = Duration::from_millis(base_ms * n * (n + 1) / 2);
            prop_assert_eq!(start.elapsed(), expected);
            Ok(())
        })?;
    }
}
