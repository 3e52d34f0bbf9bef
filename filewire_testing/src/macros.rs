//! Assertion macros shared by test helpers and integration tests.

/// Await a receive future and panic with contextual diagnostics on failure.
#[macro_export]
macro_rules! recv_expect {
    ($fut:expr) => {{
        $fut.await
            .expect(concat!("recv failed at ", file!(), ":", line!()))
    }};
    ($fut:expr, $msg:expr) => {{
        let m = ::std::format!("{msg} at {}:{}", file!(), line!(), msg = $msg);
        $fut.await.expect(&m)
    }};
}

/// Await a future with a timeout, panicking with the call site if it stalls.
#[macro_export]
macro_rules! within {
    ($secs:expr, $fut:expr) => {{
        ::tokio::time::timeout(::std::time::Duration::from_secs($secs), $fut)
            .await
            .expect(concat!("timed out at ", file!(), ":", line!()))
    }};
}

pub use crate::{recv_expect, within};
