use clap::Parser;
use std::path::PathBuf;

use crate::config;

#[derive(Parser, Debug)]
#[command(name = "rendezvous")]
#[command(author = "Rendezvous Team")]
#[command(version)]
#[command(about = "Two-party WebRTC signaling relay", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "rendezvous.toml")]
    pub config: PathBuf,

    /// HTTP bind address
    #[arg(long)]
    pub host: Option<String>,

    /// HTTP port (overrides PORT)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Directory with the browser client build
    #[arg(long)]
    pub static_root: Option<PathBuf>,

    /// TLS certificate (PEM)
    #[arg(long)]
    pub tls_cert: Option<PathBuf>,

    /// TLS private key (PEM, PKCS#8)
    #[arg(long)]
    pub tls_key: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, action)]
    pub verbose: bool,
}

impl Args {
    pub fn load_config(&self) -> Result<config::Config, Box<dyn std::error::Error>> {
        config::Config::load(&self.config)
    }

    /// Apply command line and `PORT` overrides; the command line wins.
    pub fn apply_overrides(&self, config: &mut config::Config, env_port: Option<u16>) {
        if let Some(host) = self.host.clone() {
            config.http.host = host;
        }
        if let Some(port) = self.port.or(env_port) {
            config.http.port = port;
        }
        if let Some(root) = self.static_root.clone() {
            config.http.static_root = Some(root);
        }
        if let Some(cert) = self.tls_cert.clone() {
            config.http.tls_cert = cert;
        }
        if let Some(key) = self.tls_key.clone() {
            config.http.tls_key = key;
        }
        if self.verbose {
            config.logging.level = "debug".to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_port_beats_env_port() {
        let args = Args::parse_from(["rendezvous", "--port", "4000"]);
        let mut cfg = config::Config::default();
        args.apply_overrides(&mut cfg, Some(5000));
        assert_eq!(cfg.http.port, 4000);
    }

    #[test]
    fn env_port_beats_file() {
        let args = Args::parse_from(["rendezvous", "-v"]);
        let mut cfg = config::Config::default();
        cfg.http.port = 8080;
        args.apply_overrides(&mut cfg, Some(5000));
        assert_eq!(cfg.http.port, 5000);
        assert_eq!(cfg.logging.level, "debug");
    }
}
