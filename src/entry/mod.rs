//! Remote rider registration over UDP.
//!
//! Companion devices (tag readers, phones) send one JSON datagram per
//! registration. Malformed datagrams and receive errors are logged and
//! dropped; once started, the listener only stops when its handle is
//! dropped.

use std::{io, net::SocketAddr, sync::Arc};

use serde::Deserialize;
use tokio::net::UdpSocket;

use crate::{timing::TimingController, util::AbortOnDropHandle};

pub(crate) mod error;

use error::{EntryError, Result};

/// Default port for registration datagrams.
pub const DEFAULT_ENTRY_PORT: u16 = 5005;

const MAX_DATAGRAM_LEN: usize = 1024;

/// One registration datagram, sent as `{"type": "ENTRY", ...}`.
///
/// The `bike` alias matches older companion apps that predate the
/// vehicle-agnostic field name.
#[derive(Debug, Clone, Deserialize)]
pub struct EntryMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub id: String,
    #[serde(alias = "bike")]
    pub vehicle: String,
}

impl EntryMessage {
    fn parse(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }

    /// Companion apps send `ENTRY`; the case check is relaxed so a
    /// hand-typed lowercase datagram still registers.
    fn is_entry(&self) -> bool {
        self.kind.eq_ignore_ascii_case("ENTRY")
    }
}

/// Handle to a running entry receive loop.
///
/// Dropping the handle stops the loop.
pub struct EntryListenerHandle(AbortOnDropHandle<()>);

impl EntryListenerHandle {
    /// Returns `true` once the receive loop has exited.
    pub fn is_finished(&self) -> bool {
        self.0.is_finished()
    }
}

/// UDP listener that forwards registrations to a [`TimingController`].
pub struct EntryListener {
    socket: UdpSocket,
}

impl EntryListener {
    /// Binds the listener on all interfaces at [`DEFAULT_ENTRY_PORT`].
    pub async fn bind_default() -> Result<Self> {
        Self::bind(("0.0.0.0", DEFAULT_ENTRY_PORT)).await
    }

    /// Binds the listener on the given address.
    pub async fn bind(addr: impl tokio::net::ToSocketAddrs) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await.map_err(EntryError::Bind)?;

        Ok(Self { socket })
    }

    /// Returns the bound local address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Starts the receive loop and returns its task handle.
    ///
    /// The loop runs until the handle is dropped. Receive errors,
    /// malformed datagrams, and unknown message types are all logged
    /// and skipped; nothing arriving on the wire can stop the loop.
    pub fn start(self, controller: Arc<TimingController>) -> EntryListenerHandle {
        EntryListenerHandle(tokio::spawn(self.recv_loop(controller)).into())
    }

    async fn recv_loop(self, controller: Arc<TimingController>) {
        let mut buf = [0u8; MAX_DATAGRAM_LEN];

        loop {
            let (len, peer) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    log::warn!("Entry socket receive failed: {e}");
                    continue;
                }
            };

            match EntryMessage::parse(&buf[..len]) {
                Ok(message) if message.is_entry() => {
                    controller.handle_entry(&message.name, &message.id, &message.vehicle);
                }
                Ok(message) => {
                    log::debug!("Ignoring datagram of type {:?} from {peer}", message.kind);
                }
                Err(e) => {
                    log::warn!("Malformed entry datagram from {peer}: {e}");
                }
            }
        }
    }
}
