//! Line-delimited JSON transport to a coordinator gateway.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use broker::{Credentials, Error, Result, SessionId, Transport, TransportEvent, TransportFuture, WireRequest};
use inspect_protocol::frames::{ClientFrame, ServerFrame};
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

pub const DEFAULT_GATEWAY_ADDR: &str = "127.0.0.1:27100";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Longest frame accepted from the gateway, excluding the newline.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1 << 20;

struct Link {
	generation: u64,
	writer: Arc<AsyncMutex<OwnedWriteHalf>>,
	reader: JoinHandle<()>,
}

#[derive(Default)]
struct Slot {
	events: Option<mpsc::UnboundedSender<TransportEvent>>,
	link: Option<Link>,
}

#[derive(Default)]
struct Slots {
	by_session: Mutex<HashMap<SessionId, Slot>>,
}

impl Slots {
	fn emit(&self, session: SessionId, event: TransportEvent) {
		let slots = self.by_session.lock();
		if let Some(tx) = slots.get(&session).and_then(|slot| slot.events.as_ref()) {
			let _ = tx.send(event);
		}
	}

	/// Drops the link if it is still the one identified by `generation`.
	fn detach(&self, session: SessionId, generation: u64) -> Option<Link> {
		let mut slots = self.by_session.lock();
		let slot = slots.get_mut(&session)?;
		if slot.link.as_ref().is_some_and(|link| link.generation == generation) {
			slot.link.take()
		} else {
			None
		}
	}
}

/// [`Transport`] that opens one TCP connection per session to a gateway.
///
/// The gateway owns the coordinator protocol; this side only frames requests
/// and maps pushed frames to [`TransportEvent`]s. A socket closed by the
/// gateway surfaces as `Disconnected { user_initiated: false }`.
pub struct GatewayTransport {
	addr: String,
	connect_timeout: Duration,
	max_frame_bytes: usize,
	slots: Arc<Slots>,
	generation: AtomicU64,
}

impl GatewayTransport {
	pub fn new(addr: impl Into<String>) -> Self {
		Self {
			addr: addr.into(),
			connect_timeout: DEFAULT_CONNECT_TIMEOUT,
			max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
			slots: Arc::new(Slots::default()),
			generation: AtomicU64::new(0),
		}
	}

	pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
		self.connect_timeout = timeout;
		self
	}

	/// Caps the size of a single gateway frame. A longer line drops the connection.
	pub fn with_max_frame_bytes(mut self, max: usize) -> Self {
		self.max_frame_bytes = max;
		self
	}

	pub fn addr(&self) -> &str {
		&self.addr
	}

	pub fn is_connected(&self, session: SessionId) -> bool {
		self.slots.by_session.lock().get(&session).is_some_and(|slot| slot.link.is_some())
	}

	async fn write_frame(&self, session: SessionId, frame: &ClientFrame) -> Result<()> {
		let writer = self
			.slots
			.by_session
			.lock()
			.get(&session)
			.and_then(|slot| slot.link.as_ref())
			.map(|link| Arc::clone(&link.writer))
			.ok_or_else(|| Error::NotConnected(session.to_string()))?;

		let payload = encode_frame(frame)?;
		let mut writer = writer.lock().await;
		writer.write_all(&payload).await?;
		writer.flush().await?;
		trace!(target = "inspect.transport", %session, bytes = payload.len(), "frame written");
		Ok(())
	}
}

impl std::fmt::Debug for GatewayTransport {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("GatewayTransport")
			.field("addr", &self.addr)
			.field("connect_timeout", &self.connect_timeout)
			.field("max_frame_bytes", &self.max_frame_bytes)
			.finish()
	}
}

impl Transport for GatewayTransport {
	fn subscribe(&self, session: SessionId) -> mpsc::UnboundedReceiver<TransportEvent> {
		let (tx, rx) = mpsc::unbounded_channel();
		self.slots.by_session.lock().entry(session).or_default().events = Some(tx);
		rx
	}

	fn connect(&self, session: SessionId) -> TransportFuture<'_> {
		Box::pin(async move {
			let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(self.addr.as_str()))
				.await
				.map_err(|_| Error::Transport(format!("connect to {} timed out", self.addr)))?
				.map_err(|err| Error::Transport(format!("connect to {} failed: {err}", self.addr)))?;
			let _ = stream.set_nodelay(true);
			let (read, write) = stream.into_split();

			let generation = self.generation.fetch_add(1, Ordering::Relaxed);
			let writer = Arc::new(AsyncMutex::new(write));

			// The reader needs this lock to emit anything, so Connected is
			// always queued ahead of the first frame or the close.
			let previous = {
				let mut slots = self.slots.by_session.lock();
				let reader = tokio::spawn(read_frames(Arc::clone(&self.slots), session, generation, read, self.max_frame_bytes));
				let slot = slots.entry(session).or_default();
				let previous = slot.link.replace(Link { generation, writer, reader });
				if let Some(tx) = &slot.events {
					let _ = tx.send(TransportEvent::Connected);
				}
				previous
			};
			if let Some(previous) = previous {
				previous.reader.abort();
			}

			debug!(target = "inspect.transport", %session, addr = %self.addr, "gateway connected");
			Ok(())
		})
	}

	fn authenticate<'a>(&'a self, session: SessionId, credentials: &'a Credentials) -> TransportFuture<'a> {
		Box::pin(async move {
			let frame = ClientFrame::LogOn {
				username: credentials.username.clone(),
				password: credentials.password.clone(),
			};
			self.write_frame(session, &frame).await
		})
	}

	fn handshake(&self, session: SessionId, version: u32) -> TransportFuture<'_> {
		Box::pin(async move { self.write_frame(session, &ClientFrame::Hello { version }).await })
	}

	fn send(&self, session: SessionId, request: WireRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			let frame = ClientFrame::PreviewRequest {
				nonce: request.nonce,
				params: request.params,
			};
			self.write_frame(session, &frame).await
		})
	}

	fn disconnect(&self, session: SessionId) -> TransportFuture<'_> {
		Box::pin(async move {
			let link = self.slots.by_session.lock().get_mut(&session).and_then(|slot| slot.link.take());
			let Some(link) = link else {
				return Ok(());
			};
			link.reader.abort();
			let mut writer = link.writer.lock().await;
			if let Ok(payload) = encode_frame(&ClientFrame::LogOff) {
				let _ = writer.write_all(&payload).await;
			}
			let _ = writer.shutdown().await;
			drop(writer);
			debug!(target = "inspect.transport", %session, "gateway disconnected");
			self.slots.emit(session, TransportEvent::Disconnected { user_initiated: true });
			Ok(())
		})
	}
}

async fn read_frames(slots: Arc<Slots>, session: SessionId, generation: u64, read: OwnedReadHalf, max_frame_bytes: usize) {
	let mut reader = BufReader::new(read);
	let mut line = Vec::new();
	loop {
		line.clear();
		let limit = max_frame_bytes as u64 + 1;
		match (&mut reader).take(limit).read_until(b'\n', &mut line).await {
			Ok(0) => break,
			Ok(_) => {
				if line.last() != Some(&b'\n') && line.len() > max_frame_bytes {
					warn!(target = "inspect.transport", %session, limit = max_frame_bytes, "gateway frame exceeds size limit; dropping connection");
					break;
				}
				if line.iter().all(u8::is_ascii_whitespace) {
					continue;
				}
				match decode_frame(&line) {
					Ok(frame) => {
						if let Some(event) = frame_to_event(frame) {
							slots.emit(session, event);
						}
					}
					Err(err) => warn!(target = "inspect.transport", %session, error = %err, "unparsable gateway frame"),
				}
			}
			Err(err) => {
				warn!(target = "inspect.transport", %session, error = %err, "gateway read failed");
				break;
			}
		}
	}

	if slots.detach(session, generation).is_some() {
		debug!(target = "inspect.transport", %session, "gateway closed the connection");
		slots.emit(session, TransportEvent::Disconnected { user_initiated: false });
	}
}

fn encode_frame(frame: &ClientFrame) -> Result<Vec<u8>> {
	let mut payload = serde_json::to_vec(frame)?;
	payload.push(b'\n');
	Ok(payload)
}

fn decode_frame(line: impl AsRef<[u8]>) -> Result<ServerFrame> {
	Ok(serde_json::from_slice(line.as_ref())?)
}

fn frame_to_event(frame: ServerFrame) -> Option<TransportEvent> {
	let event = match frame {
		ServerFrame::LoggedOn { ok: true, .. } => TransportEvent::LoggedOn(Ok(())),
		ServerFrame::LoggedOn { ok: false, result } => TransportEvent::LoggedOn(Err(result.unwrap_or_else(|| "unknown".to_string()))),
		ServerFrame::LoggedOff { result } => TransportEvent::LoggedOff { reason: result },
		ServerFrame::Welcome { version } => TransportEvent::Welcome { version },
		ServerFrame::ConnectionStatus { status, have_session, .. } => TransportEvent::ConnectionStatus { status, have_session },
		ServerFrame::LogonFatalError { code, message } => TransportEvent::LogonFatalError { code, message },
		ServerFrame::PreviewResponse { itemid, nonce, item } => TransportEvent::Response { key: itemid, nonce, item },
		ServerFrame::Unhandled => return None,
	};
	Some(event)
}

#[cfg(test)]
mod tests {
	use super::*;
	use broker::LookupParams;

	#[test]
	fn encoded_frames_are_single_lines() {
		let frame = ClientFrame::PreviewRequest {
			nonce: 3,
			params: LookupParams::new(0, 42, 9, 1),
		};
		let payload = encode_frame(&frame).unwrap();
		assert_eq!(payload.last(), Some(&b'\n'));
		assert_eq!(payload.iter().filter(|b| **b == b'\n').count(), 1);
	}

	#[test]
	fn rejected_logon_keeps_reason() {
		let frame = decode_frame(r#"{"type":"logged_on","ok":false,"result":"InvalidPassword"}"#).unwrap();
		assert_eq!(frame_to_event(frame), Some(TransportEvent::LoggedOn(Err("InvalidPassword".into()))));

		let frame = decode_frame(r#"{"type":"logged_on","ok":false}"#).unwrap();
		assert_eq!(frame_to_event(frame), Some(TransportEvent::LoggedOn(Err("unknown".into()))));
	}

	#[test]
	fn preview_response_maps_itemid_to_key() {
		let frame = decode_frame(r#"{"type":"preview_response","itemid":42,"nonce":5}"#).unwrap();
		assert_eq!(
			frame_to_event(frame),
			Some(TransportEvent::Response {
				key: 42,
				nonce: Some(5),
				item: None,
			})
		);
	}

	#[test]
	fn unknown_frames_are_skipped() {
		let frame = decode_frame(r#"{"type":"item_customization_notification"}"#).unwrap();
		assert_eq!(frame_to_event(frame), None);
	}

	#[test]
	fn malformed_frame_is_a_json_error() {
		assert!(matches!(decode_frame("{oops"), Err(Error::Json(_))));
	}
}
