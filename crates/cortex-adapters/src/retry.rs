use std::time::Duration;

use cortex_types::CancelToken;

use crate::error::{Error, Result};

/// Known upstream rate-limit tokens, matched by substring.
const RATE_LIMIT_TOKENS: [&str; 2] = ["rateLimitExceeded", "userRateLimitExceeded"];

pub fn is_rate_limit_error(message: &str) -> bool {
    RATE_LIMIT_TOKENS.iter().any(|t| message.contains(t))
}

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const MAX_ATTEMPTS: u32 = 8;

/// Per-item retry for rate-limited upstream calls: exponential backoff
/// from 500 ms, doubling, capped at 30 s, up to 8 attempts. Non-rate-limit
/// errors return immediately so the caller can log and skip the item.
pub fn retry_rate_limited<T, F>(cancel: &CancelToken, mut op: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut backoff = INITIAL_BACKOFF;
    let mut attempt = 1;
    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match op() {
            Ok(value) => return Ok(value),
            Err(err) => {
                let retryable = matches!(&err, Error::Upstream(msg) if is_rate_limit_error(msg));
                if !retryable || attempt >= MAX_ATTEMPTS {
                    return Err(err);
                }
                tracing::debug!(attempt, backoff_ms = backoff.as_millis() as u64, "rate limited, backing off");
                if !cancel.sleep(backoff) {
                    return Err(Error::Cancelled);
                }
                backoff = (backoff * 2).min(MAX_BACKOFF);
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_rate_limit_token_detection() {
        assert!(is_rate_limit_error("googleapi: Error 403: rateLimitExceeded"));
        assert!(is_rate_limit_error("userRateLimitExceeded for user"));
        assert!(!is_rate_limit_error("connection refused"));
    }

    #[test]
    fn test_retries_until_success() {
        let cancel = CancelToken::new();
        let calls = Cell::new(0);
        let result = retry_rate_limited(&cancel, || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(Error::Upstream("rateLimitExceeded".to_string()))
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_non_rate_limit_errors_fail_fast() {
        let cancel = CancelToken::new();
        let calls = Cell::new(0);
        let result: Result<()> = retry_rate_limited(&cancel, || {
            calls.set(calls.get() + 1);
            Err(Error::Upstream("500 internal".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_cancellation_aborts_retry_loop() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let result: Result<()> =
            retry_rate_limited(&cancel, || Err(Error::Upstream("rateLimitExceeded".into())));
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
