use super::ErrorBag;
use std::error::Error;

/// Error type build over ErrorBag, containing source code location and optional message.
/// Only the macros capture line and file, so create it through them.
#[derive(Debug)]
pub struct RelayError {
    pub inner: ErrorBag,
    pub msg: Option<String>,
    pub file: &'static str,
    pub line: u32,
    pub column: u32,
}

impl RelayError {
    pub fn is_store_error(&self) -> bool {
        self.inner.is_store_error()
    }
}

impl Error for RelayError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.inner)
    }
}

impl std::fmt::Display for RelayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let file_loc = self.file.replace('\\', "/");
        if let Some(msg) = &self.msg {
            write!(
                f,
                "{}, {}, {}:{}:{}",
                msg, self.inner, file_loc, self.line, self.column
            )
        } else {
            write!(
                f,
                "{}, {}:{}:{}",
                self.inner, file_loc, self.line, self.column
            )
        }
    }
}
