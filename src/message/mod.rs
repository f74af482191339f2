//! The Message envelope (spec §4.1): a route plus a typed key/value map,
//! carried across the IPC transport. Keys are strings; values are typed;
//! there is no implicit coercion. `route` and `error` are reserved keys —
//! callers never see them through `get`/`set`, only through the dedicated
//! accessors below.

mod value;

pub use value::Value;

use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{AppError, AppResult};

const RESERVED_ROUTE: &str = "route";
const RESERVED_ERROR: &str = "error";

/// An immutable-by-convention envelope. Mutation happens through `set_*`
/// while building a message to send; once handed to the transport a
/// message should not be mutated further.
#[derive(Debug)]
pub struct Message {
    route: Option<String>,
    fields: HashMap<String, Value>,
    error: Option<AppError>,
    /// Guards `reply()`: a reply may be produced at most once per request.
    replied: AtomicBool,
}

impl Message {
    /// An empty message addressed to `route`.
    pub fn new(route: impl Into<String>) -> Self {
        Self {
            route: Some(route.into()),
            fields: HashMap::new(),
            error: None,
            replied: AtomicBool::new(false),
        }
    }

    /// A bare message with no route, used for replies built outside of
    /// `reply()` (e.g. a synthesized `notImplemented` DNS-style response is
    /// not a `Message`, so this is only used internally by the server).
    fn new_reply() -> Self {
        Self {
            route: None,
            fields: HashMap::new(),
            error: None,
            replied: AtomicBool::new(false),
        }
    }

    /// Same shape as `new_reply`, used by the transport when decoding a
    /// routeless frame off the wire.
    pub(crate) fn new_reply_for_decode() -> Self {
        Self::new_reply()
    }

    /// Iterates fields for wire encoding without exposing field storage.
    pub(crate) fn fields_for_encoding(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn route(&self) -> Option<&str> {
        self.route.as_deref()
    }

    /// A new message bound to this one as its request. Callable at most
    /// once; a second call fails with `invalidState`.
    pub fn reply(&self) -> AppResult<Message> {
        if self
            .replied
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AppError::invalid_state(
                "a reply has already been produced for this message",
            ));
        }
        Ok(Message::new_reply())
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        debug_assert!(key != RESERVED_ROUTE && key != RESERVED_ERROR, "reserved key");
        self.fields.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(Value::as_u64)
    }

    /// A borrowed view of a data field, valid only for the lifetime of this
    /// message. Avoids one copy on the hot path for large JSON blobs; do
    /// not retain the borrow past the message's lifetime.
    pub fn get_data_no_copy(&self, key: &str) -> Option<&[u8]> {
        self.get(key).and_then(Value::as_data)
    }

    /// An owned copy of a data field.
    pub fn get_data(&self, key: &str) -> Option<Vec<u8>> {
        self.get_data_no_copy(key).map(|d| d.to_vec())
    }

    pub fn set_json<T: serde::Serialize>(&mut self, key: impl Into<String>, value: &T) -> AppResult<()> {
        let bytes = serde_json::to_vec(value)?;
        self.set(key, Value::Data(bytes));
        Ok(())
    }

    pub fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> AppResult<Option<T>> {
        match self.get_data_no_copy(key) {
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes)?)),
            None => Ok(None),
        }
    }

    /// Transfers ownership of `fd` into the message. The caller must treat
    /// `fd` as consumed after this call — it will be closed when the
    /// message is dropped (or handed across the transport, which takes
    /// over the same obligation).
    pub fn set_fd(&mut self, key: impl Into<String>, fd: RawFd) {
        self.set(key, Value::Fd(fd));
    }

    pub fn set_fds(&mut self, key: impl Into<String>, fds: Vec<RawFd>) {
        self.set(key, Value::FdArray(fds));
    }

    /// A fresh `dup` of a stored fd. The message keeps ownership of its
    /// own copy; the caller owns the duplicate and must close it.
    pub fn get_fd(&self, key: &str) -> AppResult<Option<RawFd>> {
        match self.get(key) {
            Some(Value::Fd(fd)) => {
                let dup = nix::unistd::dup(*fd)
                    .map_err(|e| AppError::internal(format!("dup failed: {e}")))?;
                Ok(Some(dup))
            }
            Some(_) => Err(AppError::invalid_argument(format!("{key} is not a file descriptor"))),
            None => Ok(None),
        }
    }

    /// If an error field is present, fail with the decoded error; else
    /// succeed.
    pub fn error(&self) -> AppResult<()> {
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Encodes `err` into the reserved error slot.
    pub fn set_error(&mut self, err: AppError) {
        self.error = Some(err);
    }
}

impl Drop for Message {
    fn drop(&mut self) {
        for value in self.fields.values() {
            match value {
                Value::Fd(fd) => {
                    let _ = nix::unistd::close(*fd);
                }
                Value::FdArray(fds) => {
                    for fd in fds {
                        let _ = nix::unistd::close(*fd);
                    }
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_is_single_use() {
        let msg = Message::new("containers.list");
        let _first = msg.reply().expect("first reply succeeds");
        let second = msg.reply();
        assert!(second.is_err());
        assert_eq!(second.unwrap_err().code, crate::error::AppErrorCode::InvalidState);
    }

    #[test]
    fn absent_key_is_none_not_zero() {
        let msg = Message::new("volumes.create");
        assert_eq!(msg.get_i64("missing"), None);
        assert_eq!(msg.get_u64("missing"), None);
    }

    #[test]
    fn error_round_trips() {
        let mut msg = Message::new("volumes.delete");
        assert!(msg.error().is_ok());
        msg.set_error(AppError::not_found("x"));
        let err = msg.error().unwrap_err();
        assert_eq!(err.code, crate::error::AppErrorCode::NotFound);
        assert_eq!(err.message, "x");
    }

    #[test]
    fn json_round_trips_through_data() {
        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct Payload {
            name: String,
        }
        let mut msg = Message::new("volumes.create");
        msg.set_json("volumeLabels", &Payload { name: "data".into() }).unwrap();
        let decoded: Payload = msg.get_json("volumeLabels").unwrap().unwrap();
        assert_eq!(decoded, Payload { name: "data".into() });
    }
}
