//! Listening sockets shared across the fleet.
//!
//! # Responsibilities
//! - Bind the configured TCP address or unix socket once, in the master
//! - Hand the same socket to every worker (fd inheritance or `try_clone`)
//! - Adopt an inherited socket inside a worker process
//!
//! # Design Decisions
//! - Pre-fork accept model: all workers accept on one socket, the kernel
//!   spreads connections between them
//! - A stale unix socket file is removed before binding

use std::net::{TcpListener as StdTcpListener, ToSocketAddrs};
use std::os::fd::{AsRawFd, FromRawFd, RawFd};
use std::os::unix::net::UnixListener as StdUnixListener;
use std::path::PathBuf;

use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use thiserror::Error;

use crate::config::ListenAddress;

/// Env var carrying the inherited listener fd.
pub const ENV_LISTEN_FD: &str = "SSR_LISTEN_FD";

/// Env var carrying the inherited listener kind (`tcp` or `unix`).
pub const ENV_LISTEN_KIND: &str = "SSR_LISTEN_KIND";

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to bind to address.
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    /// Failed to prepare or adopt a socket.
    #[error("Listener setup failed: {0}")]
    Setup(#[from] std::io::Error),

    /// Inherited socket description is missing or malformed.
    #[error("No inherited listener: {0}")]
    Inherit(String),
}

/// A bound socket that can be duplicated for several workers.
#[derive(Debug)]
pub enum SharedListener {
    Tcp(StdTcpListener),
    Unix {
        listener: StdUnixListener,
        path: PathBuf,
    },
}

/// A worker's async listener, ready for `axum::serve`.
#[derive(Debug)]
pub enum GatewayListener {
    Tcp(tokio::net::TcpListener),
    Unix(tokio::net::UnixListener),
}

impl SharedListener {
    /// Bind the resolved address.
    pub fn bind(address: &ListenAddress) -> Result<Self, ListenerError> {
        match address {
            ListenAddress::Tcp { host, port } => {
                let display = format!("{}:{}", host, port);
                let bind_err = |source| ListenerError::Bind {
                    address: display.clone(),
                    source,
                };
                let addr = (host.as_str(), *port)
                    .to_socket_addrs()
                    .map_err(bind_err)?
                    .next()
                    .ok_or_else(|| {
                        bind_err(std::io::Error::new(
                            std::io::ErrorKind::AddrNotAvailable,
                            "host resolved to no addresses",
                        ))
                    })?;
                let listener = StdTcpListener::bind(addr).map_err(bind_err)?;
                tracing::info!(address = %listener.local_addr()?, "Listener bound");
                Ok(Self::Tcp(listener))
            }
            ListenAddress::Unix { path } => {
                if path.exists() {
                    std::fs::remove_file(path)?;
                }
                let listener = StdUnixListener::bind(path).map_err(|source| ListenerError::Bind {
                    address: path.display().to_string(),
                    source,
                })?;
                tracing::info!(path = %path.display(), "Listener bound");
                Ok(Self::Unix {
                    listener,
                    path: path.clone(),
                })
            }
        }
    }

    /// Duplicate the socket handle.
    pub fn try_clone(&self) -> Result<Self, ListenerError> {
        Ok(match self {
            Self::Tcp(listener) => Self::Tcp(listener.try_clone()?),
            Self::Unix { listener, path } => Self::Unix {
                listener: listener.try_clone()?,
                path: path.clone(),
            },
        })
    }

    /// `tcp` or `unix`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Tcp(_) => "tcp",
            Self::Unix { .. } => "unix",
        }
    }

    /// Human-readable address for logs.
    pub fn describe(&self) -> String {
        match self {
            Self::Tcp(listener) => listener
                .local_addr()
                .map(|a| format!("http://{}", a))
                .unwrap_or_else(|_| "http://<unknown>".to_string()),
            Self::Unix { path, .. } => format!("unix:{}", path.display()),
        }
    }

    /// The bound TCP address, if any.
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        match self {
            Self::Tcp(listener) => listener.local_addr().ok(),
            Self::Unix { .. } => None,
        }
    }

    fn raw_fd(&self) -> RawFd {
        match self {
            Self::Tcp(listener) => listener.as_raw_fd(),
            Self::Unix { listener, .. } => listener.as_raw_fd(),
        }
    }

    /// Clear close-on-exec so spawned workers inherit the socket.
    ///
    /// Returns the env vars a child needs to adopt it.
    pub fn inheritable_env(&self) -> Result<Vec<(String, String)>, ListenerError> {
        let fd = self.raw_fd();
        fcntl(fd, FcntlArg::F_SETFD(FdFlag::empty()))
            .map_err(|e| ListenerError::Setup(std::io::Error::from_raw_os_error(e as i32)))?;
        Ok(vec![
            (ENV_LISTEN_FD.to_string(), fd.to_string()),
            (ENV_LISTEN_KIND.to_string(), self.kind().to_string()),
        ])
    }

    /// Adopt the socket described by the inherited env vars.
    pub fn from_inherited_env() -> Result<Self, ListenerError> {
        let fd: RawFd = std::env::var(ENV_LISTEN_FD)
            .map_err(|_| ListenerError::Inherit(format!("{} not set", ENV_LISTEN_FD)))?
            .parse()
            .map_err(|_| ListenerError::Inherit(format!("{} is not a descriptor", ENV_LISTEN_FD)))?;
        let kind = std::env::var(ENV_LISTEN_KIND).unwrap_or_else(|_| "tcp".to_string());

        // Safety: the master cleared CLOEXEC on a listening socket and passed
        // its number to exactly this process; nothing else owns it here.
        match kind.as_str() {
            "tcp" => Ok(Self::Tcp(unsafe { StdTcpListener::from_raw_fd(fd) })),
            "unix" => {
                let listener = unsafe { StdUnixListener::from_raw_fd(fd) };
                let path = listener
                    .local_addr()
                    .ok()
                    .and_then(|a| a.as_pathname().map(PathBuf::from))
                    .unwrap_or_default();
                Ok(Self::Unix { listener, path })
            }
            other => Err(ListenerError::Inherit(format!("unknown listener kind {}", other))),
        }
    }

    /// Convert into a tokio listener. Must be called inside a runtime.
    pub fn into_tokio(self) -> Result<GatewayListener, ListenerError> {
        Ok(match self {
            Self::Tcp(listener) => {
                listener.set_nonblocking(true)?;
                GatewayListener::Tcp(tokio::net::TcpListener::from_std(listener)?)
            }
            Self::Unix { listener, .. } => {
                listener.set_nonblocking(true)?;
                GatewayListener::Unix(tokio::net::UnixListener::from_std(listener)?)
            }
        })
    }
}

impl GatewayListener {
    /// Human-readable address for logs.
    pub fn describe(&self) -> String {
        match self {
            Self::Tcp(listener) => listener
                .local_addr()
                .map(|a| format!("http://{}", a))
                .unwrap_or_else(|_| "http://<unknown>".to_string()),
            Self::Unix(listener) => listener
                .local_addr()
                .ok()
                .and_then(|a| a.as_pathname().map(|p| format!("unix:{}", p.display())))
                .unwrap_or_else(|| "unix:<unnamed>".to_string()),
        }
    }
}
