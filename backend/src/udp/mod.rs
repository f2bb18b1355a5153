// UDP dispatch of telemetry samples.
// Invariants: fire-and-forget; one datagram per resolved destination per tick, failures stay per destination.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::net::{Destination, HostLookup};
use telemetry_core::model::Sample;
use telemetry_core::payload::encode_payload;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: usize,
    pub unresolved: usize,
    pub failed: usize,
}

pub struct Dispatcher {
    socket: UdpSocket,
}

impl Dispatcher {
    pub async fn bind(bind_addr: IpAddr) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(SocketAddr::new(bind_addr, 0)).await?;
        info!(local_addr = %socket.local_addr()?, "udp sender started");
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub async fn send<L: HostLookup>(
        &self,
        sample: &Sample,
        destinations: &mut [Destination],
        lookup: &L,
        resolve_interval: Duration,
    ) -> DispatchReport {
        let payload = encode_payload(sample);
        self.send_payload(&payload, destinations, lookup, resolve_interval)
            .await
    }

    pub async fn send_payload<L: HostLookup>(
        &self,
        payload: &[u8],
        destinations: &mut [Destination],
        lookup: &L,
        resolve_interval: Duration,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();
        let now = Instant::now();
        for destination in destinations.iter_mut() {
            let Some(target) = destination.resolve(lookup, resolve_interval, now).await else {
                report.unresolved += 1;
                continue;
            };
            match self.socket.send_to(payload, target).await {
                Ok(_) => report.sent += 1,
                Err(err) => {
                    debug!(?err, %target, "udp send failed");
                    report.failed += 1;
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::DestinationSpec;
    use crate::net::tests::FakeLookup;
    use std::net::Ipv4Addr;

    async fn receiver() -> (UdpSocket, u16) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = socket.local_addr().unwrap().port();
        (socket, port)
    }

    #[tokio::test]
    async fn unresolved_destination_does_not_block_others() {
        let (first, first_port) = receiver().await;
        let (second, second_port) = receiver().await;
        let lookup = FakeLookup::with(&[("esp32.local", IpAddr::V4(Ipv4Addr::LOCALHOST))]);
        let mut destinations = vec![
            Destination::new(DestinationSpec::new("esp32.local", first_port)),
            Destination::new(DestinationSpec::new("gone.invalid", 5005)),
            Destination::new(DestinationSpec::new("127.0.0.1", second_port)),
        ];
        lookup.set("127.0.0.1", IpAddr::V4(Ipv4Addr::LOCALHOST));

        let dispatcher = Dispatcher::bind(IpAddr::V4(Ipv4Addr::LOCALHOST)).await.unwrap();
        let sample = Sample {
            sequence: 7,
            rpm: 6100.0,
            ..Sample::default()
        };
        let report = dispatcher
            .send(&sample, &mut destinations, &lookup, Duration::from_secs(5))
            .await;

        assert_eq!(
            report,
            DispatchReport {
                sent: 2,
                unresolved: 1,
                failed: 0
            }
        );
        let mut buf = [0u8; 256];
        for socket in [&first, &second] {
            let (len, _) = socket.recv_from(&mut buf).await.unwrap();
            let line = std::str::from_utf8(&buf[..len]).unwrap();
            assert!(line.starts_with("7,6100.0,"), "{line}");
        }
    }

    #[tokio::test]
    async fn unroutable_family_counts_as_failure() {
        let (socket, port) = receiver().await;
        let lookup = FakeLookup::with(&[
            ("v6.only", "::1".parse().unwrap()),
            ("esp32.local", IpAddr::V4(Ipv4Addr::LOCALHOST)),
        ]);
        let mut destinations = vec![
            Destination::new(DestinationSpec::new("v6.only", 5005)),
            Destination::new(DestinationSpec::new("esp32.local", port)),
        ];
        let dispatcher = Dispatcher::bind(IpAddr::V4(Ipv4Addr::LOCALHOST)).await.unwrap();
        let report = dispatcher
            .send_payload(b"1,2,3", &mut destinations, &lookup, Duration::from_secs(5))
            .await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.sent, 1);
        let mut buf = [0u8; 32];
        let (len, _) = socket.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"1,2,3");
    }
}
