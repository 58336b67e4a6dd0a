//! Panic recovery for handler and hook code.
//!
//! A panicking handler must not take the turn down with it: the panic is
//! captured, logged, and converted into [`Error::Panicked`] so it flows
//! through the normal error path.

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::types::{Error, Result};

/// Execute a function with panic recovery.
pub fn with_recovery<F, T>(operation: F, operation_name: &str) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    match catch_unwind(AssertUnwindSafe(operation)) {
        Ok(result) => result,
        Err(panic_payload) => {
            let panic_msg = extract_panic_message(panic_payload.as_ref());
            tracing::error!(
                "panic_recovered: operation={}, panic={}",
                operation_name,
                panic_msg
            );
            Err(Error::panicked(operation_name, panic_msg))
        }
    }
}

/// Await a future with panic recovery, including panics raised while it
/// is being polled.
pub async fn with_recovery_async<Fut, T>(future: Fut, operation_name: &str) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(panic_payload) => {
            let panic_msg = extract_panic_message(panic_payload.as_ref());
            tracing::error!(
                "async_panic_recovered: operation={}, panic={}",
                operation_name,
                panic_msg
            );
            Err(Error::panicked(operation_name, panic_msg))
        }
    }
}

fn extract_panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic (no message)".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_recovery_success() {
        let result = with_recovery(|| Ok(42), "test_operation");
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn test_with_recovery_error_passes_through() {
        let result: Result<()> = with_recovery(|| Err(Error::NoLaunchFunction), "test_operation");
        assert!(matches!(result, Err(Error::NoLaunchFunction)));
    }

    #[test]
    fn test_with_recovery_panic_str() {
        let result: Result<()> = with_recovery(|| panic!("test panic"), "intent handler");

        let err = result.unwrap_err();
        assert!(matches!(err, Error::Panicked { .. }));
        let msg = err.to_string();
        assert!(msg.contains("panic in intent handler"));
        assert!(msg.contains("test panic"));
    }

    #[test]
    fn test_with_recovery_panic_string() {
        let result: Result<()> = with_recovery(
            || panic!("{}", "dynamic panic message"),
            "test_operation",
        );
        assert!(result.unwrap_err().to_string().contains("dynamic panic message"));
    }

    #[tokio::test]
    async fn test_with_recovery_async_success() {
        let result = with_recovery_async(async { Ok(7) }, "async_test").await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_with_recovery_async_panic_while_polling() {
        let result: Result<()> = with_recovery_async(
            async {
                tokio::task::yield_now().await;
                let fail = true;
                if fail {
                    panic!("late panic");
                }
                Ok(())
            },
            "async_test",
        )
        .await;
        assert!(result.unwrap_err().to_string().contains("late panic"));
    }

    #[test]
    fn test_extract_panic_message_unknown_payload() {
        let payload: Box<dyn Any + Send> = Box::new(17_u32);
        assert_eq!(
            extract_panic_message(payload.as_ref()),
            "Unknown panic (no message)"
        );
    }
}
