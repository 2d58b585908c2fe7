pub mod packet;
pub mod probe;
pub mod socket;

pub use packet::*;
pub use probe::*;
pub use socket::*;

/// Conditions that end a session before any probe is sent.
#[derive(Debug)]
pub enum SessionError {
    Resolution { host: String, reason: String },
    Permission(std::io::Error),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Resolution { host, reason } => {
                write!(f, "could not resolve host '{}': {}", host, reason)
            }
            SessionError::Permission(e) => write!(
                f,
                "failed to create raw ICMP socket: {}. Root privileges or CAP_NET_RAW may be required.",
                e
            ),
        }
    }
}

impl std::error::Error for SessionError {}
