use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;

const RDP_DEFAULT_PORT: u16 = 3389;

#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub destination: Destination,
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
    pub replacement_username: Option<String>,
    pub replacement_password: Option<String>,
    pub output_dir: PathBuf,
    pub artifacts_dir: PathBuf,
    pub player: Option<String>,
    pub log_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    name: String,
    port: u16,
}

impl Destination {
    pub fn new(addr: impl Into<String>) -> anyhow::Result<Self> {
        let addr = addr.into();

        if let Ok(sock_addr) = addr.parse::<core::net::SocketAddr>() {
            return Ok(Self {
                name: sock_addr.ip().to_string(),
                port: sock_addr.port(),
            });
        }

        if let Some((name, port)) = addr.rsplit_once(':') {
            if let Ok(port) = port.parse::<u16>() {
                return Ok(Self {
                    name: name.to_owned(),
                    port,
                });
            }
        }

        if addr.is_empty() {
            anyhow::bail!("target address is empty");
        }

        Ok(Self {
            name: addr,
            port: RDP_DEFAULT_PORT,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn lookup_addr(&self) -> String {
        format!("{}:{}", self.name, self.port)
    }
}

/// Intercepts RDP connections, steals credentials, clipboard contents and
/// redirected files, and records the session for replay.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Address and port of the target RDP server, e.g. `10.0.0.5` or `host:3389`
    target: String,

    /// Address to listen on for victim connections
    #[arg(short, long, default_value = "0.0.0.0:3389")]
    listen: String,

    /// Path to the PEM certificate used to terminate the victim's TLS
    #[arg(short, long)]
    cert: Option<PathBuf>,

    /// Path to the PEM private key matching the certificate
    #[arg(short, long)]
    key: Option<PathBuf>,

    /// Username sent to the server in place of the one the victim typed
    #[arg(short = 'u', long)]
    replacement_username: Option<String>,

    /// Password sent to the server in place of the one the victim typed
    #[arg(short = 'p', long)]
    replacement_password: Option<String>,

    /// Directory where session recordings are written
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Directory where files stolen over RDPDR are written
    #[arg(long, default_value = "./saved_files")]
    saved_files: PathBuf,

    /// Address of a live player to stream sessions to, e.g. `127.0.0.1:3000`
    #[arg(long)]
    player: Option<String>,

    /// Write logs to this file in addition to stderr
    #[arg(long)]
    log_file: Option<String>,
}

impl Config {
    pub fn parse_args() -> anyhow::Result<Self> {
        let args = Args::parse();

        let destination = Destination::new(args.target).context("invalid target address")?;

        if args.cert.is_some() != args.key.is_some() {
            anyhow::bail!("--cert and --key must be provided together");
        }

        Ok(Self {
            listen: args.listen,
            destination,
            cert: args.cert,
            key: args.key,
            replacement_username: args.replacement_username,
            replacement_password: args.replacement_password,
            output_dir: args.output,
            artifacts_dir: args.saved_files,
            player: args.player,
            log_file: args.log_file,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_accepts_bare_hosts_and_socket_addrs() {
        let dest = Destination::new("10.0.0.5").unwrap();
        assert_eq!(dest.port(), RDP_DEFAULT_PORT);

        let dest = Destination::new("server.example:3390").unwrap();
        assert_eq!(dest.name(), "server.example");
        assert_eq!(dest.port(), 3390);

        let dest = Destination::new("192.168.1.7:4000").unwrap();
        assert_eq!(dest.lookup_addr(), "192.168.1.7:4000");
    }
}
