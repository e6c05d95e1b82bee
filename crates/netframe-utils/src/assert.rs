/// Routes a release-build invariant breach through `tracing::error!` here,
/// inside the crate that actually owns the `tracing` dependency, so callers
/// of `invariant!`/`invariant_failure!` never need to carry `tracing`
/// themselves just to satisfy macro expansion.
#[doc(hidden)]
pub fn __log_invariant_failure(args: std::fmt::Arguments) {
    tracing::error!("{}", args);
}

/// An invariant breach that would be a bug, not a recoverable runtime
/// condition. Panics in debug builds; logs via `tracing::error!` and
/// continues in release builds.
#[macro_export]
macro_rules! invariant_failure {
    ($($arg:tt)*) => {
        if cfg!(debug_assertions) {
            panic!($($arg)*);
        } else {
            $crate::__log_invariant_failure(format_args!($($arg)*));
        }
    };
}

/// Like `debug_assert!`, but in release builds logs via `tracing::error!`
/// instead of compiling away, so invariant breaches in the hot accept/receive
/// path are never silent.
#[macro_export]
macro_rules! invariant {
    ($cond:expr $(,)?) => {
        #[cfg(debug_assertions)]
        {
            debug_assert!($cond);
        }
        #[cfg(not(debug_assertions))]
        {
            if !$cond {
                $crate::__log_invariant_failure(format_args!("invariant failed: {}", stringify!($cond)));
            }
        }
    };
    ($cond:expr, $($arg:tt)+) => {
        #[cfg(debug_assertions)]
        {
            debug_assert!($cond, $($arg)+);
        }
        #[cfg(not(debug_assertions))]
        {
            if !$cond {
                $crate::__log_invariant_failure(format_args!($($arg)+));
            }
        }
    };
}
