//! Helpers shared by the server tests.

use std::{net::SocketAddr, path::Path};

use photobooth_orchestrator::{SimulatedHardware, SystemHandle};
use photobooth_types::config::PhotoboothConfig;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

/// Small frames and short timings on a throwaway capture directory.
pub(crate) fn fast_config(root: &Path) -> PhotoboothConfig {
    let mut config = PhotoboothConfig::default();
    config.camera.width = 64;
    config.camera.height = 80;
    config.camera.frame_rate = 50;
    config.leds.num_pixels = 4;

    let capture = &mut config.capture;
    capture.capture_dir = root.join("captures").to_string_lossy().into_owned();
    capture.watermark_path = None;
    capture.countdown_ms = 20;
    capture.flash_ms = 5;
    capture.flash_settle_ms = 1;
    capture.stream_frame_interval_ms = 5;
    capture.stream_idle_timeout_ms = 100;
    capture.ready_pulse_ms = 10;

    config.upload.enabled = false;
    config.startup.retry_backoff_ms = 5;
    config
}

pub(crate) async fn initialized_handle(config: PhotoboothConfig) -> SystemHandle {
    let handle = SystemHandle::new();
    let booting = handle.clone();
    tokio::task::spawn_blocking(move || booting.initialize(&config, &SimulatedHardware))
        .await
        .expect("init task")
        .expect("initialize");
    handle
}

/// Send one raw request with `Connection: close` and read the whole reply.
pub(crate) async fn http_exchange(addr: SocketAddr, method: &str, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    let request = format!(
        "{method} {path} HTTP/1.1\r\nHost: booth\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
    );
    stream.write_all(request.as_bytes()).await.expect("request");
    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await.expect("response");
    String::from_utf8_lossy(&reply).into_owned()
}
