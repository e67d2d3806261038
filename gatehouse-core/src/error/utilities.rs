use crate::{Error, error::StorageError};

/// Extension trait for mapping driver-level errors into [`StorageError`].
pub trait DatabaseResultExt<T> {
    fn map_db_err(self) -> Result<T, Error>;

    /// Like [`map_db_err`], prefixing the message with a short context.
    ///
    /// [`map_db_err`]: DatabaseResultExt::map_db_err
    fn map_db_err_with_context(self, context: &str) -> Result<T, Error>;
}

impl<T, E: std::fmt::Display> DatabaseResultExt<T> for Result<T, E> {
    fn map_db_err(self) -> Result<T, Error> {
        self.map_err(|e| Error::Storage(StorageError::Database(e.to_string())))
    }

    fn map_db_err_with_context(self, context: &str) -> Result<T, Error> {
        self.map_err(|e| Error::Storage(StorageError::Database(format!("{context}: {e}"))))
    }
}
