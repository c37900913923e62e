//! Internal helper macros.

/// Returns early with `$error` when `$predicate` does not hold.
///
/// Like `assert!`, but for validation paths that report an error instead of panicking.
///
/// ```ignore
/// ensure!(!request.path.is_empty(), ParseError::InvalidUri);
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
