use crate::error::{Error, Result};

/// Runs a blocking component call (SQLite, hashing, SMTP, image encoding)
/// off the async workers.
pub async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Task {
            message: e.to_string(),
        })?
}

/// Percent-encodes a path for use as a query value.
pub fn encode_query_value(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
