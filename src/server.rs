//! FTP transfer server
//!
//! The pipeline only needs "tell me when an upload completed". Anything that
//! can do that implements [`TransferServer`]; [`FtpServer`] does it with
//! libunftp over the local filesystem.

use async_trait::async_trait;
use libunftp::auth::{AuthenticationError, Authenticator, Credentials, DefaultUser};
use libunftp::options::PassiveHost;
use libunftp::ServerBuilder;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{Config, PassivePorts};
use crate::error::RelayError;
use crate::services::upload_events::{UploadEventSource, UploadNotifyingStorage};

const GREETING: &str = "ftpdrop: images are forwarded on upload";

/// A file-transfer front end that reports completed uploads
#[async_trait]
pub trait TransferServer: Send {
    /// Serve until the server stops, reporting each completed upload to `events`
    async fn serve(self: Box<Self>, events: UploadEventSource) -> Result<(), RelayError>;
}

/// Settings for [`FtpServer`]
#[derive(Debug, Clone)]
pub struct FtpSettings {
    pub root: PathBuf,
    pub bind_address: String,
    pub username: String,
    pub password: String,
    pub passive_ports: PassivePorts,
    pub public_host: Option<String>,
}

impl FtpSettings {
    pub fn from_config(config: &Config, root: PathBuf) -> Self {
        Self {
            root,
            bind_address: config.bind_address(),
            username: config.ftp_user.clone(),
            password: config.ftp_pass.clone(),
            passive_ports: config.pasv_ports,
            public_host: config.ftp_public_host.clone(),
        }
    }
}

/// libunftp-backed FTP server with a single account homed at the root
#[derive(Debug)]
pub struct FtpServer {
    settings: FtpSettings,
}

impl FtpServer {
    pub fn new(settings: FtpSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl TransferServer for FtpServer {
    async fn serve(self: Box<Self>, events: UploadEventSource) -> Result<(), RelayError> {
        let settings = self.settings;

        let authenticator = SingleUserAuthenticator {
            username: settings.username.clone(),
            password: settings.password.clone(),
        };
        let root = settings.root.clone();
        let storage = move || UploadNotifyingStorage::new(root.clone(), events.clone());

        let mut builder = ServerBuilder::<UploadNotifyingStorage, DefaultUser>::with_authenticator(
            Box::new(storage),
            Arc::new(authenticator),
        )
        .greeting(GREETING)
        .passive_ports(settings.passive_ports.unftp_range());

        if let Some(host) = settings.public_host.as_deref() {
            builder = builder.passive_host(passive_host(host));
        }

        let server = builder
            .build()
            .map_err(|e| RelayError::Server(e.to_string()))?;

        info!(
            address = %settings.bind_address,
            passive_ports = %settings.passive_ports,
            passive_port_count = settings.passive_ports.port_count(),
            root = %settings.root.display(),
            "FTP server listening"
        );

        server
            .listen(settings.bind_address.clone())
            .await
            .map_err(|e| RelayError::Server(e.to_string()))
    }
}

/// IPv4 literals are advertised as-is; anything else is resolved per connection
fn passive_host(host: &str) -> PassiveHost {
    match host.parse::<Ipv4Addr>() {
        Ok(ip) => PassiveHost::Ip(ip),
        Err(_) => PassiveHost::Dns(host.to_string()),
    }
}

/// Accepts exactly one username/password pair
#[derive(Debug)]
struct SingleUserAuthenticator {
    username: String,
    password: String,
}

impl SingleUserAuthenticator {
    fn check(&self, username: &str, password: Option<&str>) -> Result<(), AuthenticationError> {
        if username != self.username {
            return Err(AuthenticationError::BadUser);
        }
        if password != Some(self.password.as_str()) {
            return Err(AuthenticationError::BadPassword);
        }
        Ok(())
    }
}

#[async_trait]
impl Authenticator<DefaultUser> for SingleUserAuthenticator {
    async fn authenticate(
        &self,
        username: &str,
        creds: &Credentials,
    ) -> Result<DefaultUser, AuthenticationError> {
        self.check(username, creds.password.as_deref())
            .map(|()| DefaultUser)
            .inspect_err(|_| warn!(user = username, "FTP login rejected"))
    }
}
