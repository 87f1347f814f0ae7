//! Session layer: login, request/response commands, reply correlation,
//! keepalive and alarm subscription.
//!
//! One [`Connection`] owns one TCP session to a device. Many commands may
//! be in flight at once on the single socket; replies carry no request
//! correlation id, so the session matches each inbound frame to the oldest
//! pending command expecting that reply's message-type code. Frames of the
//! alarm push type bypass the table entirely and go to the installed alarm
//! handler.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::{DvripError, Result, RET_SUCCESS};
use crate::protocol::{build_frame, CommandType, Frame, Header};
use crate::sofia::sofia_hash;
use crate::transport::{self, FrameSink, Transport};

/// Picture replies shorter than this are sniffed for a JSON error document
/// before being treated as binary image data.
const SNAP_ERROR_SNIFF_LIMIT: usize = 500;

/// One alarm notification pushed by the device.
#[derive(Debug, Clone)]
pub struct Alarm {
    /// Zero-based channel the event was detected on.
    pub channel: i64,
    /// True when the event starts, false when it stops.
    pub is_start: bool,
    /// Event name as reported by the device, e.g. `"VideoMotion"`.
    pub event: String,
    /// The full notification document.
    pub data: Value,
}

type AlarmHandler = Arc<dyn Fn(Result<Alarm>) + Send + Sync>;

/// A waiter for a reply of a particular message type.
struct PendingReply {
    expected: u16,
    tx: oneshot::Sender<Result<Bytes>>,
}

/// Correlation table plus connection liveness, guarded together so that no
/// waiter can be registered after the disconnect fan-out drained the table.
struct PendingTable {
    entries: VecDeque<PendingReply>,
    connected: bool,
}

/// Login request body. `PassWord` carries the Sofia digest, never the
/// plaintext.
#[derive(Serialize)]
struct LoginRequest<'a> {
    #[serde(rename = "LoginType")]
    login_type: &'a str,
    #[serde(rename = "EncryptType")]
    encrypt_type: &'a str,
    #[serde(rename = "UserName")]
    user_name: &'a str,
    #[serde(rename = "PassWord")]
    pass_word: String,
}

struct ConnectionInner {
    transport: Transport,
    /// Assigned by the device at login; 0 before that. Refreshed whenever
    /// any inbound JSON carries a numeric `SessionID`.
    session_id: AtomicU32,
    /// Advanced by one for every outgoing frame, wraps modulo 2^32.
    sequence: AtomicU32,
    /// Seconds between keepalives as advertised by the device; 0 disables.
    alive_interval: AtomicU32,
    pending: Mutex<PendingTable>,
    alarm: Mutex<Option<AlarmHandler>>,
    keepalive: Mutex<Option<JoinHandle<()>>>,
}

/// A single TCP session to a DVR/NVR device.
///
/// Cheap to clone; all clones share the same session. Dropping every clone
/// does not close the socket by itself; call [`Connection::disconnect`].
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    /// Resolve and connect to a device.
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        Ok(Self::from_stream(stream))
    }

    /// Run a session over an already-established byte stream.
    ///
    /// Must be called from within a tokio runtime; the read and write pumps
    /// are spawned onto it.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (transport, io) = Transport::new();
        let inner = Arc::new(ConnectionInner {
            transport,
            session_id: AtomicU32::new(0),
            sequence: AtomicU32::new(0),
            alive_interval: AtomicU32::new(0),
            pending: Mutex::new(PendingTable {
                entries: VecDeque::new(),
                connected: true,
            }),
            alarm: Mutex::new(None),
            keepalive: Mutex::new(None),
        });
        transport::spawn_io(stream, io, Arc::clone(&inner) as Arc<dyn FrameSink>);
        Self { inner }
    }

    /// Log in with the given credentials and start the keepalive timer.
    ///
    /// On success the reply document is returned and the session id and
    /// keepalive interval it carries are adopted. A missing `SessionID` or
    /// `AliveInterval` fails the login even when the device reported
    /// success.
    pub async fn login(&self, username: &str, password: &str) -> Result<Value> {
        let body = serde_json::to_value(LoginRequest {
            login_type: "DVRIP-Web",
            encrypt_type: "MD5",
            user_name: username,
            pass_word: sofia_hash(password),
        })?;
        let reply = self
            .inner
            .command_json(CommandType::LoginReq, CommandType::LoginResp, &body)
            .await?;

        let session_id = reply
            .get("SessionID")
            .and_then(parse_session_id)
            .ok_or(DvripError::MissingField("SessionID"))?;
        self.inner.session_id.store(session_id, Ordering::Release);

        let alive_interval = reply
            .get("AliveInterval")
            .and_then(Value::as_u64)
            .ok_or(DvripError::MissingField("AliveInterval"))?;
        self.inner
            .alive_interval
            .store(alive_interval as u32, Ordering::Release);

        if alive_interval > 0 {
            // Keepalives go out at half the advertised interval.
            self.start_keepalive(Duration::from_millis(alive_interval.saturating_mul(500)));
        }

        Ok(reply)
    }

    /// Query the channel names configured on the device.
    ///
    /// Most devices require a successful [`login`](Connection::login)
    /// first.
    pub async fn channel_names(&self) -> Result<Vec<String>> {
        let body = json!({
            "SessionID": self.inner.session_id_hex(),
            "Name": "ChannelTitle",
        });
        let reply = self
            .inner
            .command_json(
                CommandType::ConfigChannelTitleGetReq,
                CommandType::ConfigChannelTitleGetResp,
                &body,
            )
            .await?;
        let titles = reply
            .get("ChannelTitle")
            .and_then(Value::as_array)
            .ok_or(DvripError::MissingField("ChannelTitle"))?;
        Ok(titles
            .iter()
            .map(|title| match title.as_str() {
                Some(s) => s.to_string(),
                None => title.to_string(),
            })
            .collect())
    }

    /// Query a named system-information block, e.g. `"SystemInfo"`.
    pub async fn sys_info(&self, name: &str) -> Result<Value> {
        let body = json!({
            "SessionID": self.inner.session_id_hex(),
            "Name": name,
        });
        self.inner
            .command_json(CommandType::SysInfoReq, CommandType::SysInfoResp, &body)
            .await
    }

    /// Query a named configuration block, e.g. `"General.General"`.
    pub async fn config(&self, name: &str) -> Result<Value> {
        let body = json!({
            "SessionID": self.inner.session_id_hex(),
            "Name": name,
        });
        self.inner
            .command_json(CommandType::ConfigGetReq, CommandType::ConfigGetResp, &body)
            .await
    }

    /// Capture a still picture from the given channel.
    ///
    /// Returns the raw image bytes (typically JPEG). Some firmwares answer
    /// with a small JSON error document instead of picture data; that is
    /// detected and surfaced as [`DvripError::Device`].
    pub async fn capture_picture(&self, channel: i32) -> Result<Bytes> {
        let body = json!({
            "Name": "OPSNAP",
            "OPSNAP": { "Channel": channel },
        });
        let payload = serde_json::to_vec(&body)?;
        let bytes = self
            .inner
            .command_raw(CommandType::NetSnapReq, CommandType::NetSnapResp, payload)
            .await?;

        // A real picture is never this small; a parseable JSON body with a
        // numeric Ret is the error shape, anything else is image data.
        if bytes.len() < SNAP_ERROR_SNIFF_LIMIT {
            if let Ok(value) = serde_json::from_slice::<Value>(&bytes) {
                if let Some(code) = value.get("Ret").and_then(Value::as_i64) {
                    return Err(DvripError::Device { code });
                }
            }
        }

        Ok(bytes)
    }

    /// Install the alarm handler and ask the device to start pushing alarm
    /// notifications.
    ///
    /// Only one handler is active at a time; installing another replaces
    /// the previous one. The subscribe command is only issued the first
    /// time; after that the device is already guarding. There is no way
    /// to unsubscribe.
    pub fn monitor_alarms<F>(&self, handler: F)
    where
        F: Fn(Result<Alarm>) + Send + Sync + 'static,
    {
        let previous = self
            .inner
            .alarm
            .lock()
            .expect("alarm slot lock poisoned")
            .replace(Arc::new(handler));
        if previous.is_some() {
            return;
        }

        let body = json!({
            "Name": "",
            "SessionID": self.inner.session_id_hex(),
        });
        let Ok(payload) = serde_json::to_vec(&body) else {
            return;
        };
        // The guard reply carries nothing of interest; dropping the
        // receiver turns its completion into a no-op.
        let _ = self
            .inner
            .queue_command(CommandType::GuardReq, CommandType::GuardResp, &payload);
    }

    /// Close the connection. Every outstanding command completes with
    /// [`DvripError::Disconnected`]. Idempotent; there is no reconnect.
    pub fn disconnect(&self) {
        self.inner.shut_down();
    }

    /// The session id currently in use (0 before login).
    pub fn session_id(&self) -> u32 {
        self.inner.session_id.load(Ordering::Acquire)
    }

    /// The keepalive interval advertised by the device at login, in
    /// seconds (0 before login, or when the device disabled keepalive).
    pub fn alive_interval(&self) -> u32 {
        self.inner.alive_interval.load(Ordering::Acquire)
    }

    fn start_keepalive(&self, period: Duration) {
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(keepalive_loop(inner, period));
        let replaced = self
            .inner
            .keepalive
            .lock()
            .expect("keepalive slot lock poisoned")
            .replace(task);
        if let Some(previous) = replaced {
            previous.abort();
        }
    }
}

/// Periodic keepalive: fires every `period`, stops once the connection is
/// gone. The task holds a strong handle on the session, so the session
/// outlives every scheduled timer tick.
async fn keepalive_loop(inner: Arc<ConnectionInner>, period: Duration) {
    loop {
        tokio::time::sleep(period).await;
        let body = json!({
            "Name": "KeepAlive",
            "SessionID": inner.session_id_hex(),
        });
        match inner
            .command_json(CommandType::KeepAliveReq, CommandType::KeepAliveResp, &body)
            .await
        {
            // The reply body is uninteresting; only a dead connection
            // stops the timer.
            Err(DvripError::Disconnected) | Err(DvripError::NoConnection) => return,
            _ => {}
        }
    }
}

impl ConnectionInner {
    /// The session id rendered the way JSON bodies carry it: lowercase hex,
    /// `0x` prefix, zero-padded to 8 digits.
    fn session_id_hex(&self) -> String {
        render_session_id(self.session_id.load(Ordering::Acquire))
    }

    /// Register the expected reply, then serialize and enqueue the command.
    ///
    /// Registration strictly precedes the write: a reply can never arrive
    /// before its waiter exists. The frame is serialized after the waiter
    /// is in place, with the session id current at that moment.
    fn queue_command(
        &self,
        command: CommandType,
        expected_reply: CommandType,
        payload: &[u8],
    ) -> Result<oneshot::Receiver<Result<Bytes>>> {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.pending.lock().expect("pending table lock poisoned");
        if !pending.connected {
            return Err(DvripError::Disconnected);
        }
        pending.entries.push_back(PendingReply {
            expected: expected_reply.code(),
            tx,
        });

        // Sequence allocation and enqueue stay under the lock so frames
        // reach the wire in sequence order.
        let sequence = self.sequence.fetch_add(1, Ordering::AcqRel);
        let header = Header::new(
            self.session_id.load(Ordering::Acquire),
            sequence,
            command.code(),
            payload.len() as u32,
        );
        self.transport.send(build_frame(&header, payload));
        Ok(rx)
    }

    /// Issue a command and wait for the raw reply payload.
    async fn command_raw(
        &self,
        command: CommandType,
        expected_reply: CommandType,
        payload: Vec<u8>,
    ) -> Result<Bytes> {
        let rx = self.queue_command(command, expected_reply, &payload)?;
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(DvripError::Disconnected),
        }
    }

    /// Issue a command with a JSON body and decode the JSON reply.
    async fn command_json(
        &self,
        command: CommandType,
        expected_reply: CommandType,
        body: &Value,
    ) -> Result<Value> {
        let payload = serde_json::to_vec(body)?;
        let bytes = self.command_raw(command, expected_reply, payload).await?;
        self.decode_json_reply(&bytes)
    }

    /// Decode a JSON reply: adopt the echoed session id, then map `Ret`.
    ///
    /// A payload that fails to parse means the stream is carrying garbage
    /// where a document was promised; nothing later on it can be trusted,
    /// so the whole connection is torn down.
    fn decode_json_reply(&self, bytes: &[u8]) -> Result<Value> {
        let value: Value = match serde_json::from_slice(bytes) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("malformed JSON reply, closing connection: {e}");
                self.shut_down();
                return Err(DvripError::Disconnected);
            }
        };
        self.remember_session_id(&value);
        match value.get("Ret").and_then(Value::as_i64) {
            None => Err(DvripError::MissingField("Ret")),
            Some(RET_SUCCESS) => Ok(value),
            Some(code) => Err(DvripError::Device { code }),
        }
    }

    /// Replies and alarms repeat the session id; a numeric one is adopted
    /// as the current id (the protocol's informal resync mechanism).
    fn remember_session_id(&self, value: &Value) {
        if let Some(id) = value.get("SessionID").and_then(Value::as_u64) {
            self.session_id.store(id as u32, Ordering::Release);
        }
    }

    /// Route an alarm push to the installed handler.
    fn notify_alarm(&self, payload: &[u8]) {
        let handler = self
            .alarm
            .lock()
            .expect("alarm slot lock poisoned")
            .clone();
        let Some(handler) = handler else {
            return;
        };

        let value: Value = match serde_json::from_slice(payload) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!("dropping malformed alarm payload: {e}");
                return;
            }
        };
        self.remember_session_id(&value);

        let info = value.get("AlarmInfo").and_then(Value::as_object);
        let fields = info.and_then(|info| {
            Some((
                info.get("Channel")?.as_i64()?,
                info.get("Event")?.as_str()?.to_string(),
                info.get("Status")?.as_str()?,
            ))
        });
        match fields {
            Some((channel, event, status)) => {
                let is_start = status == "Start";
                handler(Ok(Alarm {
                    channel,
                    is_start,
                    event,
                    data: value.clone(),
                }));
            }
            None => handler(Err(DvripError::MissingField("AlarmInfo"))),
        }
    }

    /// Tear the connection down and fail every waiting command.
    fn shut_down(&self) {
        self.transport.disconnect();
        self.fail_pending();
    }

    /// Snapshot-and-clear the pending table and complete every waiter with
    /// a disconnection error, in registration order. First caller wins;
    /// later calls find the table already drained.
    fn fail_pending(&self) {
        let drained: Vec<PendingReply> = {
            let mut pending = self.pending.lock().expect("pending table lock poisoned");
            pending.connected = false;
            pending.entries.drain(..).collect()
        };
        for entry in drained {
            let _ = entry.tx.send(Err(DvripError::Disconnected));
        }

        let task = self
            .keepalive
            .lock()
            .expect("keepalive slot lock poisoned")
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }
}

impl FrameSink for ConnectionInner {
    fn on_frame(&self, frame: Frame) {
        if frame.message_type() == CommandType::AlarmReq.code() {
            // Alarm pushes never consume a pending-reply entry.
            self.notify_alarm(&frame.payload);
            return;
        }

        let waiter = {
            let mut pending = self.pending.lock().expect("pending table lock poisoned");
            pending
                .entries
                .iter()
                .position(|entry| entry.expected == frame.message_type())
                .and_then(|index| pending.entries.remove(index))
        };
        match waiter {
            Some(entry) => {
                let _ = entry.tx.send(Ok(frame.payload));
            }
            None => {
                tracing::debug!(
                    message_type = frame.message_type(),
                    "dropping reply frame with no waiter"
                );
            }
        }
    }

    fn on_disconnected(&self) {
        self.fail_pending();
    }
}

/// Render a session id the way JSON bodies carry it.
fn render_session_id(id: u32) -> String {
    format!("{id:#010x}")
}

/// The device reports `SessionID` either as a JSON number or as a hex
/// string with a `0x` prefix; parse with base auto-detection.
fn parse_session_id(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().map(|n| n as u32),
        Value::String(s) => {
            let s = s.trim();
            match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => s.parse().ok(),
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_renders_as_padded_hex() {
        assert_eq!(render_session_id(0x12), "0x00000012");
        assert_eq!(render_session_id(0), "0x00000000");
        assert_eq!(render_session_id(0xDEADBEEF), "0xdeadbeef");
    }

    #[test]
    fn session_id_parses_from_number() {
        assert_eq!(parse_session_id(&json!(18)), Some(18));
        assert_eq!(parse_session_id(&json!(0)), Some(0));
    }

    #[test]
    fn session_id_parses_from_hex_string() {
        assert_eq!(parse_session_id(&json!("0x12")), Some(0x12));
        assert_eq!(parse_session_id(&json!("0x00000012")), Some(0x12));
        assert_eq!(parse_session_id(&json!("0XDEADBEEF")), Some(0xDEADBEEF));
    }

    #[test]
    fn session_id_parses_from_decimal_string() {
        assert_eq!(parse_session_id(&json!("18")), Some(18));
    }

    #[test]
    fn session_id_rejects_garbage() {
        assert_eq!(parse_session_id(&json!("0xZZ")), None);
        assert_eq!(parse_session_id(&json!("banana")), None);
        assert_eq!(parse_session_id(&json!(null)), None);
        assert_eq!(parse_session_id(&json!(-5)), None);
        assert_eq!(parse_session_id(&json!([1, 2])), None);
    }

    #[test]
    fn login_request_serializes_with_protocol_field_names() {
        let body = serde_json::to_value(LoginRequest {
            login_type: "DVRIP-Web",
            encrypt_type: "MD5",
            user_name: "admin",
            pass_word: sofia_hash("tlJwpbo6"),
        })
        .unwrap();
        assert_eq!(body["LoginType"], "DVRIP-Web");
        assert_eq!(body["EncryptType"], "MD5");
        assert_eq!(body["UserName"], "admin");
        assert_eq!(body["PassWord"], "6QNMIQGe");
    }
}
