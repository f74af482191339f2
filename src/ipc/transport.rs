//! The wire transport underneath [`super::client::Client`] and
//! [`super::server::Server`]: a length-prefixed JSON frame per `Message`,
//! with file descriptors ferried alongside as `SCM_RIGHTS` ancillary data
//! (the transport's native handle-passing facility, spec §4.1/§6).
//!
//! Unlike the teacher's Docker/HTTP calls, this substrate has no ecosystem
//! crate to reach for: fd-passing over a Unix-domain socket is a raw
//! syscall facility. We use `nix` (already part of the teacher's
//! dependency closure) for the `sendmsg`/`recvmsg` calls and drive them
//! through `UnixStream::try_io` so they compose with tokio's reactor
//! instead of blocking a worker thread. Both halves of the connection
//! operate through a shared `&UnixStream` (tokio implements `AsyncRead`/
//! `AsyncWrite` for `&UnixStream`), so a reader task and a writer task can
//! each hold their own clone of the surrounding `Arc` without splitting
//! the socket.

use std::collections::BTreeMap;
use std::os::unix::io::{AsRawFd, RawFd};

use nix::sys::socket::{ControlMessage, ControlMessageOwned, MsgFlags, recvmsg, sendmsg};
use std::io::{IoSlice, IoSliceMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt, Interest};
use tokio::net::UnixStream;

use crate::error::{AppError, AppResult};
use crate::message::{Message, Value};

/// A `BTreeMap`, not a `HashMap`: both `encode` and `decode` must visit
/// fd-bearing fields in the same order to line the ancillary-data fds back
/// up with the field that owns each one, and a hash map's iteration order
/// is per-thread and shares nothing between the sending and receiving
/// sides. Sorting by key gives both sides the same order for free.
#[derive(serde::Serialize, serde::Deserialize)]
struct WireMessage {
    route: Option<String>,
    fields: BTreeMap<String, WireValue>,
    error: Option<AppError>,
}

#[derive(serde::Serialize, serde::Deserialize)]
enum WireValue {
    Str(String),
    Bool(bool),
    Int64(i64),
    UInt64(u64),
    Data(Vec<u8>),
    Endpoint(String),
    /// A single fd rides in the ancillary data that follows this frame, in
    /// field-iteration order.
    Fd,
    /// `n` fds ride in the ancillary data that follows this frame.
    FdArray(usize),
}

/// One message, encoded and ready to write: the JSON body plus the fds (if
/// any) that must follow it as `SCM_RIGHTS`.
struct Framed {
    body: Vec<u8>,
    fds: Vec<RawFd>,
}

fn encode(msg: &Message) -> AppResult<Framed> {
    let mut fields = BTreeMap::new();
    let mut fds = Vec::new();

    let mut ordered: Vec<_> = msg.fields_for_encoding().collect();
    ordered.sort_by(|(a, _), (b, _)| a.cmp(b));

    for (key, value) in ordered {
        let wire = match value {
            Value::Str(s) => WireValue::Str(s.clone()),
            Value::Bool(b) => WireValue::Bool(*b),
            Value::Int64(v) => WireValue::Int64(*v),
            Value::UInt64(v) => WireValue::UInt64(*v),
            Value::Data(d) => WireValue::Data(d.clone()),
            Value::Endpoint(e) => WireValue::Endpoint(e.clone()),
            Value::Fd(fd) => {
                fds.push(*fd);
                WireValue::Fd
            }
            Value::FdArray(list) => {
                fds.extend(list.iter().copied());
                WireValue::FdArray(list.len())
            }
        };
        fields.insert(key.clone(), wire);
    }

    let wire = WireMessage {
        route: msg.route().map(str::to_owned),
        fields,
        error: msg.error().err(),
    };
    let body = serde_json::to_vec(&wire)?;
    Ok(Framed { body, fds })
}

fn decode(json: &[u8], mut fds: Vec<RawFd>) -> AppResult<Message> {
    let wire: WireMessage = serde_json::from_slice(json)?;
    // `fields` is a BTreeMap, so this visits keys in the same sorted order
    // `encode` used to append fds to the ancillary data; draining from the
    // front (after reversing) lines each fd back up with its field.
    fds.reverse();
    let mut msg = match wire.route {
        Some(route) => Message::new(route),
        None => Message::new_reply_for_decode(),
    };
    for (key, value) in wire.fields {
        match value {
            WireValue::Str(s) => msg.set(key, Value::Str(s)),
            WireValue::Bool(b) => msg.set(key, Value::Bool(b)),
            WireValue::Int64(v) => msg.set(key, Value::Int64(v)),
            WireValue::UInt64(v) => msg.set(key, Value::UInt64(v)),
            WireValue::Data(d) => msg.set(key, Value::Data(d)),
            WireValue::Endpoint(e) => msg.set(key, Value::Endpoint(e)),
            WireValue::Fd => {
                let fd = fds
                    .pop()
                    .ok_or_else(|| AppError::internal("fd announced but not delivered"))?;
                msg.set(key, Value::Fd(fd));
            }
            WireValue::FdArray(n) => {
                let mut list = Vec::with_capacity(n);
                for _ in 0..n {
                    let fd = fds.pop().ok_or_else(|| {
                        AppError::internal("fd array announced but not fully delivered")
                    })?;
                    list.push(fd);
                }
                msg.set(key, Value::FdArray(list));
            }
        }
    }
    if let Some(err) = wire.error {
        msg.set_error(err);
    }
    Ok(msg)
}

/// Writes one frame: `[len: u32 BE][request_id: u64 BE][json...]`, followed
/// by any fds as a second `sendmsg`. `request_id` is transport-level
/// correlation metadata, not part of the `Message` abstraction itself —
/// it is how one connection multiplexes concurrent, independent `send`
/// calls (spec §4.2 concurrency, §5 ordering guarantees).
pub async fn write_message(stream: &UnixStream, msg: &Message, request_id: u64) -> AppResult<()> {
    let framed = encode(msg)?;
    let mut header = Vec::with_capacity(12);
    header.extend_from_slice(&(framed.body.len() as u32).to_be_bytes());
    header.extend_from_slice(&request_id.to_be_bytes());

    let mut w = stream;
    w.write_all(&header)
        .await
        .map_err(|e| AppError::interrupted(format!("write failed: {e}")))?;
    w.write_all(&framed.body)
        .await
        .map_err(|e| AppError::interrupted(format!("write failed: {e}")))?;

    if !framed.fds.is_empty() {
        send_fds(stream, &framed.fds).await?;
    }
    Ok(())
}

pub async fn read_message(stream: &UnixStream) -> AppResult<(u64, Message)> {
    let mut r = stream;
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf)
        .await
        .map_err(|e| AppError::interrupted(format!("connection closed: {e}")))?;
    let len = u32::from_be_bytes(len_buf) as usize;

    let mut id_buf = [0u8; 8];
    r.read_exact(&mut id_buf)
        .await
        .map_err(|e| AppError::interrupted(format!("connection closed mid-header: {e}")))?;
    let request_id = u64::from_be_bytes(id_buf);

    let mut json = vec![0u8; len];
    r.read_exact(&mut json)
        .await
        .map_err(|e| AppError::interrupted(format!("connection closed mid-frame: {e}")))?;

    // Decode once to learn how many fds are owed, pull exactly that many
    // off the ancillary channel, then decode again to rehydrate them.
    let needed = count_expected_fds(&json)?;
    let fds = if needed > 0 {
        recv_fds(stream, needed).await?
    } else {
        Vec::new()
    };
    Ok((request_id, decode(&json, fds)?))
}

fn count_expected_fds(json: &[u8]) -> AppResult<usize> {
    let wire: WireMessage = serde_json::from_slice(json)?;
    Ok(wire
        .fields
        .values()
        .map(|v| match v {
            WireValue::Fd => 1,
            WireValue::FdArray(n) => *n,
            _ => 0,
        })
        .sum())
}

async fn send_fds(stream: &UnixStream, fds: &[RawFd]) -> AppResult<()> {
    let dummy = vec![0u8; fds.len()];
    loop {
        let ready = stream
            .ready(Interest::WRITABLE)
            .await
            .map_err(|e| AppError::interrupted(e.to_string()))?;
        if !ready.is_writable() {
            continue;
        }
        let result = stream.try_io(Interest::WRITABLE, || {
            let iov = [IoSlice::new(&dummy)];
            let cmsg = [ControlMessage::ScmRights(fds)];
            sendmsg::<()>(stream.as_raw_fd(), &iov, &cmsg, MsgFlags::empty(), None)
                .map_err(std::io::Error::from)
        });
        match result {
            Ok(_) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(AppError::interrupted(format!("sendmsg failed: {e}"))),
        }
    }
}

async fn recv_fds(stream: &UnixStream, count: usize) -> AppResult<Vec<RawFd>> {
    let mut buf = vec![0u8; count];
    let mut cmsg_space = nix::cmsg_space!([RawFd; 32]);
    loop {
        let ready = stream
            .ready(Interest::READABLE)
            .await
            .map_err(|e| AppError::interrupted(e.to_string()))?;
        if !ready.is_readable() {
            continue;
        }
        let result = stream.try_io(Interest::READABLE, || {
            let mut iov = [IoSliceMut::new(&mut buf)];
            recvmsg::<()>(
                stream.as_raw_fd(),
                &mut iov,
                Some(&mut cmsg_space),
                MsgFlags::empty(),
            )
            .map_err(std::io::Error::from)
        });
        match result {
            Ok(msg) => {
                let mut fds = Vec::new();
                for cmsg in msg.cmsgs() {
                    if let ControlMessageOwned::ScmRights(received) = cmsg {
                        fds.extend(received);
                    }
                }
                if fds.len() != count {
                    return Err(AppError::internal(format!(
                        "expected {count} fds, received {}",
                        fds.len()
                    )));
                }
                return Ok(fds);
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(AppError::interrupted(format!("recvmsg failed: {e}"))),
        }
    }
}
