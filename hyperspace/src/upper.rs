//! The upward interface to the node's IPv6 stack and applications.

use core::future::Future;

use crate::mac::Error;
use crate::phy::PacketBuffer;

/// The stack side the MAC talks to. Packets are whole IPv6 packets; the
/// MAC owns framing, routing options and fragmentation below this line.
pub trait UpperLayer {
    /// Waits for the stack to provide a packet to send.
    fn packet_to_transmit(&self) -> impl Future<Output = PacketBuffer>;
    /// Delivers a packet addressed to this node (or a flooded broadcast).
    fn received_packet(&self, packet: PacketBuffer) -> impl Future<Output = ()>;
    /// Notifies the stack of an error it may care about.
    fn error(&self, error: Error) -> impl Future<Output = ()>;
}

#[cfg(test)]
pub mod tests {
    use crate::sync::channel::{Channel, Receiver, Sender};

    use super::*;

    /// A channel-backed [`UpperLayer`] with a monitor half for tests.
    #[derive(Default)]
    pub struct TestUpperChannel {
        pub tx: Channel<PacketBuffer>,
        pub rx: Channel<PacketBuffer>,
        pub errors: Channel<Error>,
    }

    impl TestUpperChannel {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn split(&mut self) -> (TestUpper<'_>, TestUpperMonitor<'_>) {
            let (tx_send, tx_recv) = self.tx.split();
            let (rx_send, rx_recv) = self.rx.split();
            let (err_send, err_recv) = self.errors.split();
            (
                TestUpper { tx: tx_recv, rx: rx_send, errors: err_send },
                TestUpperMonitor { tx: tx_send, rx: rx_recv, errors: err_recv },
            )
        }
    }

    /// The stack-facing half handed to the MAC.
    pub struct TestUpper<'a> {
        tx: Receiver<'a, PacketBuffer>,
        rx: Sender<'a, PacketBuffer>,
        errors: Sender<'a, Error>,
    }

    /// The test-facing half.
    pub struct TestUpperMonitor<'a> {
        pub tx: Sender<'a, PacketBuffer>,
        pub rx: Receiver<'a, PacketBuffer>,
        pub errors: Receiver<'a, Error>,
    }

    impl UpperLayer for TestUpper<'_> {
        async fn packet_to_transmit(&self) -> PacketBuffer {
            self.tx.receive().await
        }

        async fn received_packet(&self, packet: PacketBuffer) {
            self.rx.send(packet);
        }

        async fn error(&self, error: Error) {
            self.errors.send(error);
        }
    }
}
