//! In-process peer channel
//!
//! Every [`LoopbackChannel`] joined to the same [`LoopbackGroup`] receives the
//! payloads the others send. Used when parties only ever span one process,
//! and in tests.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use super::channel::{ChannelError, ChannelEvent, PeerChannel};

struct Member {
    peer: String,
    tx: mpsc::UnboundedSender<ChannelEvent>,
}

#[derive(Clone)]
pub struct LoopbackGroup {
    name: String,
    members: Arc<Mutex<Vec<Member>>>,
}

impl LoopbackGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Join as `peer`; the first event on the receiver is [`ChannelEvent::Connected`]
    pub fn join(&self, peer: &str) -> (LoopbackChannel, mpsc::UnboundedReceiver<ChannelEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(ChannelEvent::Connected);
        self.members.lock().push(Member {
            peer: peer.to_string(),
            tx,
        });
        debug!("{} joined loopback group {}", peer, self.name);

        let channel = LoopbackChannel {
            peer: peer.to_string(),
            group: self.clone(),
        };
        (channel, rx)
    }

    pub fn peer_count(&self) -> usize {
        self.members.lock().len()
    }
}

pub struct LoopbackChannel {
    peer: String,
    group: LoopbackGroup,
}

impl LoopbackChannel {
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Leave the group; our receiver sees [`ChannelEvent::Disconnected`]
    pub fn disconnect(&self) {
        let mut members = self.group.members.lock();
        if let Some(idx) = members.iter().position(|m| m.peer == self.peer) {
            let member = members.remove(idx);
            let _ = member.tx.send(ChannelEvent::Disconnected);
        }
    }
}

impl PeerChannel for LoopbackChannel {
    fn name(&self) -> &str {
        &self.group.name
    }

    fn send(&self, payload: Vec<u8>) -> Result<(), ChannelError> {
        let mut members = self.group.members.lock();
        if !members.iter().any(|m| m.peer == self.peer) {
            return Err(ChannelError::Closed);
        }

        // Drop receivers that went away
        members.retain(|m| !m.tx.is_closed());
        for member in members.iter().filter(|m| m.peer != self.peer) {
            let _ = member.tx.send(ChannelEvent::Message {
                from: self.peer.clone(),
                payload: payload.clone(),
            });
        }
        Ok(())
    }

    fn close(&self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_out_excludes_sender() {
        let group = LoopbackGroup::new("spotifymod");
        let (a, mut a_rx) = group.join("a");
        let (_b, mut b_rx) = group.join("b");

        assert_eq!(a_rx.try_recv().unwrap(), ChannelEvent::Connected);
        assert_eq!(b_rx.try_recv().unwrap(), ChannelEvent::Connected);

        a.send(vec![1, 2, 3]).unwrap();
        assert_eq!(
            b_rx.try_recv().unwrap(),
            ChannelEvent::Message {
                from: "a".into(),
                payload: vec![1, 2, 3],
            }
        );
        assert!(a_rx.try_recv().is_err());
        assert_eq!(a.name(), "spotifymod");
    }

    #[test]
    fn test_disconnect() {
        let group = LoopbackGroup::new("spotifymod");
        let (a, mut a_rx) = group.join("a");
        let (b, mut b_rx) = group.join("b");
        let _ = a_rx.try_recv();
        let _ = b_rx.try_recv();

        a.disconnect();
        assert_eq!(a_rx.try_recv().unwrap(), ChannelEvent::Disconnected);
        assert_eq!(group.peer_count(), 1);
        assert!(matches!(a.send(vec![1]), Err(ChannelError::Closed)));

        b.send(vec![2]).unwrap();
        assert!(a_rx.try_recv().is_err());
    }
}
