use std::path::Path;
use std::process::{Command, Output};

use inspect_protocol::frames::{ClientFrame, ServerFrame};
use inspect_protocol::ItemDescriptor;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

fn inspect(workdir: &Path, args: &[&str]) -> Output {
	Command::new(env!("CARGO_BIN_EXE_inspect"))
		.current_dir(workdir)
		.env_remove("STEAM_USERNAME")
		.env_remove("STEAM_PASSWORD")
		.env_remove("RUST_LOG")
		.args(args)
		.output()
		.expect("failed to execute inspect")
}

fn stdout_json(output: &Output) -> Value {
	let stdout = String::from_utf8_lossy(&output.stdout);
	serde_json::from_str(&stdout).unwrap_or_else(|_| json!({ "raw": stdout }))
}

fn write_accounts(workdir: &Path) {
	std::fs::write(
		workdir.join("steam-accounts.json"),
		r#"[{"username":"bot0","password":"s3cret"},{"username":"bot1","password":"s3cret"}]"#,
	)
	.expect("accounts file should be written");
}

#[test]
fn accounts_lists_names_without_passwords() {
	let dir = TempDir::new().unwrap();
	write_accounts(dir.path());

	let output = inspect(dir.path(), &["accounts"]);

	assert!(output.status.success());
	let value = stdout_json(&output);
	assert_eq!(value["ok"], json!(true));
	assert_eq!(value["data"]["accounts"], json!(["bot0", "bot1"]));
	assert!(!String::from_utf8_lossy(&output.stdout).contains("s3cret"));
}

#[test]
fn accounts_falls_back_to_environment() {
	let dir = TempDir::new().unwrap();

	let output = Command::new(env!("CARGO_BIN_EXE_inspect"))
		.current_dir(dir.path())
		.env("STEAM_USERNAME", "envbot")
		.env("STEAM_PASSWORD", "pw")
		.args(["-f", "text", "accounts"])
		.output()
		.unwrap();

	assert!(output.status.success());
	assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "envbot");
}

#[test]
fn missing_accounts_is_reported() {
	let dir = TempDir::new().unwrap();

	let output = inspect(dir.path(), &["accounts"]);

	assert!(!output.status.success());
	let value = stdout_json(&output);
	assert_eq!(value["ok"], json!(false));
	assert_eq!(value["error"]["code"], json!("NO_ACCOUNTS"));
}

#[test]
fn config_merges_file_and_flags() {
	let dir = TempDir::new().unwrap();
	std::fs::write(dir.path().join("broker.json"), r#"{"attempt_timeout_ms": 500, "max_attempts": 5}"#).unwrap();

	let output = inspect(dir.path(), &["--config", "broker.json", "--max-attempts", "2", "config"]);

	assert!(output.status.success());
	let broker = &stdout_json(&output)["data"]["broker"];
	assert_eq!(broker["attempt_timeout_ms"], json!(500));
	assert_eq!(broker["max_attempts"], json!(2));
	assert_eq!(broker["min_request_interval_ms"], json!(1000));
}

#[test]
fn invalid_config_is_rejected() {
	let dir = TempDir::new().unwrap();

	let output = inspect(dir.path(), &["--max-attempts", "0", "config"]);

	assert!(!output.status.success());
	assert_eq!(stdout_json(&output)["error"]["code"], json!("CONFIG_ERROR"));
}

#[test]
fn encoded_links_fail_before_connecting() {
	let dir = TempDir::new().unwrap();
	write_accounts(dir.path());

	let output = inspect(
		dir.path(),
		&[
			"--gateway",
			"127.0.0.1:1",
			"lookup",
			"steam://rungame/730/76561202255233023/+csgo_econ_action_preview%2000180020A8",
		],
	);

	assert!(!output.status.success());
	assert_eq!(stdout_json(&output)["error"]["code"], json!("INVALID_INPUT"));
}

#[tokio::test(flavor = "multi_thread")]
async fn lookup_resolves_through_gateway() {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	tokio::spawn(async move {
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
							item: (params.a != 404).then(|| ItemDescriptor {
								itemid: params.a,
								defindex: 7,
								paintseed: 661,
								paintwear: 0.5f32.to_bits(),
								..Default::default()
							}),
						},
						ClientFrame::LogOff => continue,
					};
					let mut payload = serde_json::to_vec(&reply).unwrap();
					payload.push(b'\n');
					write.write_all(&payload).await.unwrap();
				}
			});
		}
	});

	let dir = TempDir::new().unwrap();
	write_accounts(dir.path());
	let gateway = addr.to_string();
	let workdir = dir.path().to_path_buf();

	let output = tokio::task::spawn_blocking(move || {
		inspect(
			&workdir,
			&[
				"--gateway",
				&gateway,
				"lookup",
				"steam://rungame/730/76561202255233023/+csgo_econ_action_preview%20S76561198084749846A42D7935523998312483177",
				"0,404,1,0",
			],
		)
	})
	.await
	.unwrap();

	assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
	let value = stdout_json(&output);
	let results = value["data"]["results"].as_array().unwrap();
	assert_eq!(results.len(), 2);
	assert_eq!(results[0]["key"], json!(42));
	assert_eq!(results[0]["outcome"]["status"], json!("found"));
	assert_eq!(results[0]["outcome"]["detail"]["paintseed"], json!(661));
	assert_eq!(results[0]["wear"], json!(0.5));
	assert_eq!(results[1]["outcome"]["status"], json!("not_found"));
}
