//! Small helpers shared by the codec modules.

/// Returns early with `$error` when `$predicate` does not hold.
///
/// ```ignore
/// ensure!(headers.len() <= MAX_HEADER_NUM, ParseError::too_many_headers(MAX_HEADER_NUM));
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
