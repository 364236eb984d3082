//! Tests for GatewayTransport against an in-process gateway.

use std::sync::Arc;
use std::time::Duration;

use broker::{
	Broker, BrokerConfig, Credentials, Error, ItemDescriptor, LookupOutcome, LookupParams, SessionId, Transport, TransportEvent,
	WireRequest,
};
use inspect_protocol::frames::{ClientFrame, ServerFrame};
use inspect_runtime::GatewayTransport;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::net::tcp::OwnedWriteHalf;

async fn write_frame(write: &mut OwnedWriteHalf, frame: &ServerFrame) {
	let mut payload = serde_json::to_vec(frame).unwrap();
	payload.push(b'\n');
	write.write_all(&payload).await.unwrap();
}

fn item(key: u64) -> ItemDescriptor {
	ItemDescriptor {
		itemid: key,
		defindex: 7,
		paintwear: 0.07f32.to_bits(),
		paintseed: 661,
		..Default::default()
	}
}

/// Answers every frame the way a healthy gateway would, for any number of connections.
async fn serve_gateway(listener: TcpListener) {
	while let Ok((stream, _)) = listener.accept().await {
		tokio::spawn(async move {
			let (read, mut write) = stream.into_split();
			let mut lines = BufReader::new(read).lines();
			while let Ok(Some(line)) = lines.next_line().await {
				let reply = match serde_json::from_str::<ClientFrame>(&line).unwrap() {
					ClientFrame::LogOn { .. } => ServerFrame::LoggedOn { ok: true, result: None },
					ClientFrame::Hello { version } => ServerFrame::Welcome { version },
					ClientFrame::PreviewRequest { nonce, params } => ServerFrame::PreviewResponse {
						itemid: params.a,
						nonce: Some(nonce),
						item: Some(item(params.a)),
					},
					ClientFrame::LogOff => continue,
				};
				write_frame(&mut write, &reply).await;
			}
		});
	}
}

#[tokio::test]
async fn gateway_frames_round_trip() {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();

	let server = tokio::spawn(async move {
		let (stream, _) = listener.accept().await.unwrap();
		let (read, mut write) = stream.into_split();
		let mut lines = BufReader::new(read).lines();

		let logon: ClientFrame = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
		assert_eq!(
			logon,
			ClientFrame::LogOn {
				username: "bot".into(),
				password: "hunter2".into(),
			}
		);
		write_frame(&mut write, &ServerFrame::LoggedOn { ok: true, result: None }).await;

		let hello: ClientFrame = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
		assert_eq!(hello, ClientFrame::Hello { version: 2_000_202 });
		write_frame(&mut write, &ServerFrame::Welcome { version: 2_000_202 }).await;

		let request: ClientFrame = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
		let ClientFrame::PreviewRequest { nonce, params } = request else {
			panic!("expected preview request, got {request:?}");
		};
		assert_eq!(nonce, 7);
		write_frame(
			&mut write,
			&ServerFrame::PreviewResponse {
				itemid: params.a,
				nonce: Some(nonce),
				item: Some(item(params.a)),
			},
		)
		.await;
	});

	let transport = GatewayTransport::new(addr.to_string());
	let session = SessionId(0);
	let mut events = transport.subscribe(session);

	transport.connect(session).await.unwrap();
	assert_eq!(events.recv().await, Some(TransportEvent::Connected));
	assert!(transport.is_connected(session));

	transport.authenticate(session, &Credentials::new("bot", "hunter2")).await.unwrap();
	assert_eq!(events.recv().await, Some(TransportEvent::LoggedOn(Ok(()))));

	transport.handshake(session, 2_000_202).await.unwrap();
	assert_eq!(events.recv().await, Some(TransportEvent::Welcome { version: 2_000_202 }));

	let request = WireRequest {
		nonce: 7,
		params: LookupParams::new(76561198000000000, 42, 123, 0),
	};
	transport.send(session, request).await.unwrap();
	assert_eq!(
		events.recv().await,
		Some(TransportEvent::Response {
			key: 42,
			nonce: Some(7),
			item: Some(item(42)),
		})
	);

	server.await.unwrap();
	assert_eq!(events.recv().await, Some(TransportEvent::Disconnected { user_initiated: false }));
	assert!(!transport.is_connected(session));
}

#[tokio::test]
async fn disconnect_logs_off_and_is_user_initiated() {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	let server = tokio::spawn(async move {
		let (stream, _) = listener.accept().await.unwrap();
		let mut lines = BufReader::new(stream).lines();
		let mut frames = Vec::new();
		while let Ok(Some(line)) = lines.next_line().await {
			frames.push(serde_json::from_str::<ClientFrame>(&line).unwrap());
		}
		frames
	});

	let transport = GatewayTransport::new(addr.to_string());
	let session = SessionId(0);
	let mut events = transport.subscribe(session);

	transport.connect(session).await.unwrap();
	assert_eq!(events.recv().await, Some(TransportEvent::Connected));

	transport.disconnect(session).await.unwrap();
	assert_eq!(events.recv().await, Some(TransportEvent::Disconnected { user_initiated: true }));
	assert_eq!(server.await.unwrap(), vec![ClientFrame::LogOff]);

	let request = WireRequest {
		nonce: 1,
		params: LookupParams::new(0, 42, 9, 0),
	};
	let err = transport.send(session, request).await.unwrap_err();
	assert!(matches!(err, Error::NotConnected(_)));
	assert!(err.is_transport());

	// Nothing further is reported for the closed socket.
	let extra = tokio::time::timeout(Duration::from_millis(100), events.recv()).await;
	assert!(extra.is_err());
}

#[tokio::test]
async fn oversized_frame_drops_the_connection() {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	tokio::spawn(async move {
		let (stream, _) = listener.accept().await.unwrap();
		let (_read, mut write) = stream.into_split();
		write_frame(&mut write, &ServerFrame::Welcome { version: 1 }).await;
		write.write_all(&[b'x'; 256]).await.unwrap();
		// Keep the socket open so only the size limit can end the link.
		tokio::time::sleep(Duration::from_secs(30)).await;
	});

	let transport = GatewayTransport::new(addr.to_string()).with_max_frame_bytes(64);
	let session = SessionId(0);
	let mut events = transport.subscribe(session);

	transport.connect(session).await.unwrap();
	assert_eq!(events.recv().await, Some(TransportEvent::Connected));
	assert_eq!(events.recv().await, Some(TransportEvent::Welcome { version: 1 }));

	let closed = tokio::time::timeout(Duration::from_secs(5), events.recv()).await.unwrap();
	assert_eq!(closed, Some(TransportEvent::Disconnected { user_initiated: false }));
	assert!(!transport.is_connected(session));
}

#[tokio::test]
async fn refused_connection_is_a_transport_error() {
	let addr = {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		listener.local_addr().unwrap()
	};

	let transport = GatewayTransport::new(addr.to_string()).with_connect_timeout(Duration::from_secs(2));
	let _events = transport.subscribe(SessionId(0));
	let err = transport.connect(SessionId(0)).await.unwrap_err();
	assert!(matches!(err, Error::Transport(_)));
}

#[tokio::test]
async fn broker_resolves_lookups_through_gateway() -> anyhow::Result<()> {
	let listener = TcpListener::bind("127.0.0.1:0").await?;
	let addr = listener.local_addr()?;
	tokio::spawn(serve_gateway(listener));

	let config = BrokerConfig {
		handshake_delay_ms: 10,
		min_request_interval_ms: 10,
		..Default::default()
	};
	let accounts = vec![Credentials::new("bot0", "pw"), Credentials::new("bot1", "pw")];
	let broker = Broker::start(config, accounts, Arc::new(GatewayTransport::new(addr.to_string()))).await?;
	broker.wait_ready().await?;

	let (a, b) = tokio::join!(
		broker.lookup(LookupParams::new(76561198000000000, 42, 1, 0)),
		broker.lookup(LookupParams::new(76561198000000000, 42, 1, 0))
	);
	assert_eq!(a, LookupOutcome::Found(item(42)));
	assert_eq!(a, b);
	assert_eq!(broker.stats().snapshot().sends, 1);

	let other = broker.lookup(LookupParams::new(0, 99, 1, 5)).await;
	assert_eq!(other.item().map(|item| item.itemid), Some(99));

	broker.shutdown().await;
	assert_eq!(broker.ready_count(), 0);
	Ok(())
}
