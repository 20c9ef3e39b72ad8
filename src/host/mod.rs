//! Connection to the target server.

mod mock;
mod transport;

pub use mock::MockShell;
pub use transport::{RemoteShell, SshAuth, SshConfig, SshShell, TransportError};
