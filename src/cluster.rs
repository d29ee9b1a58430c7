//! 클러스터 UDP 소켓
//!
//! - 수신은 고정 타임아웃으로 제한, 타임아웃은 에러가 아닌 별도 결과
//! - 송신은 최선 노력: 실패해도 로그만 남기고 재시도하지 않음

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::relay::OutboundDatagram;
use crate::Result;

/// 최대 UDP 데이터그램 크기
const MAX_DATAGRAM_SIZE: usize = 65535;

/// 수신 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    Datagram { payload: Bytes, sender: SocketAddr },
    Timeout,
}

/// 클러스터 소켓
pub struct ClusterSocket {
    socket: UdpSocket,
    recv_timeout: Duration,
    buf: Vec<u8>,
}

impl ClusterSocket {
    /// 주소에 바인딩
    pub async fn bind(addr: SocketAddr, recv_timeout: Duration) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self::from_socket(socket, recv_timeout))
    }

    pub fn from_socket(socket: UdpSocket, recv_timeout: Duration) -> Self {
        Self {
            socket,
            recv_timeout,
            buf: vec![0u8; MAX_DATAGRAM_SIZE],
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// 데이터그램 하나 수신 (타임아웃 제한)
    pub async fn recv(&mut self) -> Result<Received> {
        match tokio::time::timeout(self.recv_timeout, self.socket.recv_from(&mut self.buf)).await {
            Ok(Ok((len, sender))) => Ok(Received::Datagram {
                payload: Bytes::copy_from_slice(&self.buf[..len]),
                sender,
            }),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Ok(Received::Timeout),
        }
    }

    /// 최선 노력 송신. 성공 여부만 반환
    pub async fn send(&self, payload: &[u8], target: SocketAddr) -> bool {
        match self.socket.send_to(payload, target).await {
            Ok(_) => true,
            Err(e) => {
                warn!("{} 바이트 송신 실패 -> {}: {}", payload.len(), target, e);
                false
            }
        }
    }

    /// 송신 대기열 전송. 성공한 개수 반환
    pub async fn flush(&self, outbox: Vec<OutboundDatagram>) -> usize {
        let mut sent = 0;
        for datagram in outbox {
            if self.send(&datagram.payload, datagram.target).await {
                sent += 1;
            } else {
                debug!("dropped datagram to {}", datagram.target);
            }
        }
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 0))
    }

    #[tokio::test]
    async fn test_recv_timeout_is_not_error() {
        let mut socket = ClusterSocket::bind(loopback(), Duration::from_millis(20))
            .await
            .unwrap();

        let received = socket.recv().await.unwrap();
        assert_eq!(received, Received::Timeout);
    }

    #[tokio::test]
    async fn test_flush_and_recv() {
        let mut a = ClusterSocket::bind(loopback(), Duration::from_secs(1)).await.unwrap();
        let b = ClusterSocket::bind(loopback(), Duration::from_secs(1)).await.unwrap();
        let a_addr = a.local_addr().unwrap();
        let b_addr = b.local_addr().unwrap();

        let sent = b
            .flush(vec![
                OutboundDatagram::new(a_addr, Bytes::from_static(b"\x00\x01xy")),
                OutboundDatagram::new(a_addr, Bytes::new()),
            ])
            .await;
        assert_eq!(sent, 2);

        assert_eq!(
            a.recv().await.unwrap(),
            Received::Datagram {
                payload: Bytes::from_static(b"\x00\x01xy"),
                sender: b_addr,
            }
        );
        // 빈 데이터그램도 그대로 수신됨
        assert_eq!(
            a.recv().await.unwrap(),
            Received::Datagram {
                payload: Bytes::new(),
                sender: b_addr,
            }
        );
    }
}
