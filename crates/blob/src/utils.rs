//! Internal helper macros.

/// Returns early with `Err($error)` unless `$predicate` holds.
///
/// The error-returning counterpart of `assert!`, used for limit and input checks.
///
/// ```ignore
/// ensure!(body_offset <= MAX_HEADER_BYTES, ParseError::too_large_header(body_offset, MAX_HEADER_BYTES));
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
