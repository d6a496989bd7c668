///Creates a new error object with line info
#[macro_export]
macro_rules! err_create {
    ($t:expr) => {
        $crate::error::RelayError {
            inner: $crate::error::ErrorBag::from($t),
            msg: None,
            file: file!(),
            line: line!(),
            column: column!(),
        }
    };
}

///Creates a new CustomError with line info, message is formatted with arguments
#[macro_export]
macro_rules! err_custom_create {
    ($($t:tt)*) => {
        $crate::error::RelayError {
            inner: $crate::error::ErrorBag::from($crate::error::CustomError::from_owned_string(format!($($t)*))),
            msg: None,
            file: file!(),
            line: line!(),
            column: column!(),
        }
    };
}

///Closure wrapping an error with line + file info, for use in map_err
#[macro_export]
macro_rules! err_from {
    () => {
        |e| $crate::error::RelayError {
            inner: $crate::error::ErrorBag::from(e),
            msg: None,
            file: file!(),
            line: line!(),
            column: column!(),
        }
    };
}

///Closure wrapping an error with line + file info and a formatted message
#[macro_export]
macro_rules! err_from_msg {
    ($($t:tt)*) => {{
        |e| $crate::error::RelayError {
            inner: $crate::error::ErrorBag::from(e),
            msg: Some(format!($($t)*)),
            file: file!(),
            line: line!(),
            column: column!(),
        }
    }};
}
