//! 플레이어 전달
//!
//! - 재생 커서 위치의 슬롯을 순서대로 플레이어로 전달
//! - 누락 슬롯은 스플리터에 손실 신고 후 그대로 건너뜀 (재시도 없음)
//! - 플레이어 쓰기 실패는 재생 종료 신호

use std::net::SocketAddr;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

use crate::buffer::RingBuffer;
use crate::cluster::ClusterSocket;
use crate::message::complaint_message;
use crate::stats::PlaybackCounters;
use crate::{Error, Result};

/// 플레이어 접속 대기 (한 번만 accept)
pub async fn accept_player(listening_port: u16) -> Result<TcpStream> {
    let bind_addr = SocketAddr::from(([0, 0, 0, 0], listening_port));
    let listener = TcpListener::bind(bind_addr).await?;
    info!("{} waiting for the player on port {}", bind_addr, listening_port);

    let (stream, player) = listener.accept().await?;
    stream.set_nodelay(true)?;
    info!("The player {} has established a connection", player);
    Ok(stream)
}

/// 재생 피더
pub struct PlaybackFeeder<P> {
    /// 플레이어 연결
    player: P,

    /// 다음에 재생할 슬롯
    cursor: usize,

    /// 손실 신고 대상
    splitter: SocketAddr,

    counters: PlaybackCounters,
}

impl<P: AsyncWrite + Unpin> PlaybackFeeder<P> {
    pub fn new(player: P, first_slot: usize, splitter: SocketAddr) -> Self {
        Self {
            player,
            cursor: first_slot,
            splitter,
            counters: PlaybackCounters::default(),
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn counters(&self) -> &PlaybackCounters {
        &self.counters
    }

    /// 플레이어 연결 반환 (테스트/종료 처리용)
    pub fn into_player(self) -> P {
        self.player
    }

    /// 슬롯 하나 재생
    ///
    /// 실패하면 `Error::PlayerDisconnected`. 커서와 슬롯 상태는 그대로 둠
    pub async fn emit(&mut self, buffer: &mut RingBuffer, cluster: &ClusterSocket) -> Result<()> {
        let slot = self.cursor;

        if !buffer.is_present(slot) {
            // 재생 커서 값 자체를 신고 (16비트에 맞게)
            let complaint = complaint_message(slot as u16);
            if cluster.send(&complaint, self.splitter).await {
                self.counters.complaints_sent += 1;
            }
            self.counters.gaps += 1;
            debug!("complaining about lost block {}", slot);
        }

        // 한 번도 채워지지 않은 슬롯이면 아무것도 쓰지 않음
        if let Some(block) = buffer.get(slot) {
            if let Err(e) = self.player.write_all(block).await {
                error!("player disconnected! ({})", e);
                return Err(Error::PlayerDisconnected);
            }
            self.counters.bytes_written += block.len() as u64;
            debug!("{} -> (player)", slot);
        }

        buffer.clear(slot);
        self.cursor = (slot + 1) % buffer.capacity();
        self.counters.slots_played += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::Received;
    use bytes::Bytes;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    async fn sockets() -> (ClusterSocket, ClusterSocket) {
        let loopback = SocketAddr::from(([127, 0, 0, 1], 0));
        let peer = ClusterSocket::bind(loopback, Duration::from_millis(200)).await.unwrap();
        let splitter = ClusterSocket::bind(loopback, Duration::from_millis(200)).await.unwrap();
        (peer, splitter)
    }

    #[tokio::test]
    async fn test_emit_present_slots_in_order() {
        let (cluster, mut splitter) = sockets().await;
        let mut buffer = RingBuffer::new(4);
        buffer.store(2, Bytes::from_static(b"ab"));
        buffer.store(3, Bytes::from_static(b"cd"));

        let mut feeder = PlaybackFeeder::new(Vec::new(), 2, splitter.local_addr().unwrap());
        feeder.emit(&mut buffer, &cluster).await.unwrap();
        feeder.emit(&mut buffer, &cluster).await.unwrap();

        assert_eq!(feeder.cursor(), 0);
        assert!(!buffer.is_present(2));
        assert!(!buffer.is_present(3));
        assert_eq!(feeder.counters().gaps, 0);
        assert_eq!(feeder.into_player(), b"abcd".to_vec());

        // 손실 신고 없음
        assert_eq!(splitter.recv().await.unwrap(), Received::Timeout);
    }

    #[tokio::test]
    async fn test_missing_slot_complains_and_skips() {
        let (cluster, mut splitter) = sockets().await;
        let mut buffer = RingBuffer::new(4);
        buffer.store(1, Bytes::from_static(b"xy"));

        let mut feeder = PlaybackFeeder::new(Vec::new(), 0, splitter.local_addr().unwrap());
        feeder.emit(&mut buffer, &cluster).await.unwrap();
        feeder.emit(&mut buffer, &cluster).await.unwrap();

        assert_eq!(feeder.cursor(), 2);
        assert_eq!(feeder.counters().gaps, 1);
        assert_eq!(feeder.counters().complaints_sent, 1);
        assert_eq!(feeder.into_player(), b"xy".to_vec());

        match splitter.recv().await.unwrap() {
            Received::Datagram { payload, .. } => assert_eq!(&payload[..], &[0, 0]),
            Received::Timeout => panic!("complaint not received"),
        }
    }

    #[tokio::test]
    async fn test_stale_slot_is_replayed() {
        let (cluster, splitter) = sockets().await;
        let mut buffer = RingBuffer::new(2);
        buffer.store(0, Bytes::from_static(b"old"));
        buffer.take(0);

        let mut feeder = PlaybackFeeder::new(Vec::new(), 0, splitter.local_addr().unwrap());
        feeder.emit(&mut buffer, &cluster).await.unwrap();

        assert_eq!(feeder.counters().gaps, 1);
        assert_eq!(feeder.into_player(), b"old".to_vec());
    }

    #[tokio::test]
    async fn test_closed_player_is_terminal() {
        let (cluster, splitter) = sockets().await;
        let mut buffer = RingBuffer::new(2);
        buffer.store(0, Bytes::from_static(b"data"));

        let (player, reader) = tokio::io::duplex(64);
        drop(reader);

        let mut feeder = PlaybackFeeder::new(player, 0, splitter.local_addr().unwrap());
        let result = feeder.emit(&mut buffer, &cluster).await;

        assert!(matches!(result, Err(Error::PlayerDisconnected)));
        assert_eq!(feeder.cursor(), 0);
        assert!(buffer.is_present(0));
    }

    #[tokio::test]
    async fn test_duplex_player_receives_bytes() {
        let (cluster, splitter) = sockets().await;
        let mut buffer = RingBuffer::new(2);
        buffer.store(0, Bytes::from_static(b"live"));

        let (player, mut reader) = tokio::io::duplex(64);
        let mut feeder = PlaybackFeeder::new(player, 0, splitter.local_addr().unwrap());
        feeder.emit(&mut buffer, &cluster).await.unwrap();

        let mut received = [0u8; 4];
        reader.read_exact(&mut received).await.unwrap();
        assert_eq!(&received, b"live");
    }
}
