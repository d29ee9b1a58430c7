//! 피어 노드
//!
//! 모든 상태(링 버퍼, 릴레이 엔진, 재생 피더)를 소유하는 단일 객체.
//! 시작 → 버퍼링 → 정상 상태 루프 → 종료 순서로 진행

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::io::AsyncWrite;
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::buffer::RingBuffer;
use crate::buffering::BufferingController;
use crate::churn::DeathTime;
use crate::cluster::{ClusterSocket, Received};
use crate::handshake::{ClusterList, SplitterConnection};
use crate::message::control_message;
use crate::playback::{accept_player, PlaybackFeeder};
use crate::relay::{RelayEngine, Step};
use crate::source::communicate_header;
use crate::stats::{BufferingReport, PeerStats};
use crate::{Config, Error, Result};

/// 수신 에러 후 다음 수신까지 대기
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// 정상 상태 루프 종료 이유
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// 플레이어 연결 끊김
    PlayerDisconnected,

    /// 이탈 시각 도달
    DeathTime,

    /// 설정된 블록 수 처리 완료
    BlocksExhausted,

    /// 외부 정지 요청
    Stopped,
}

/// 노드 핸들 (외부에서 제어용)
#[derive(Clone)]
pub struct PeerHandle {
    running: Arc<AtomicBool>,
    stats: Arc<RwLock<PeerStats>>,
}

impl PeerHandle {
    /// 정지 요청. 다음 루프 반복에서 반영됨
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// 통계 스냅샷
    pub fn stats(&self) -> PeerStats {
        self.stats.read().clone()
    }
}

/// 피어 노드
pub struct PeerNode<P> {
    config: Config,
    cluster: ClusterSocket,
    relay: RelayEngine,
    buffer: RingBuffer,

    /// 버퍼링 전까지 보관하는 플레이어 연결
    player: Option<P>,

    /// 버퍼링 후 생성되는 재생 피더
    feeder: Option<PlaybackFeeder<P>>,

    death_time: DeathTime,

    /// 버퍼링 시간 측정 기준 (스플리터 접속 직전)
    started_at: Instant,

    buffering: Option<BufferingReport>,

    running: Arc<AtomicBool>,
    stats: Arc<RwLock<PeerStats>>,
}

impl PeerNode<TcpStream> {
    /// 플레이어 접속, 헤더 전달, 스플리터 핸드쉐이크까지 수행
    pub async fn start(config: Config) -> Result<Self> {
        config.validate()?;

        // 플레이어가 붙을 때까지 여기서 대기
        let mut player = if config.player_enabled {
            Some(accept_player(config.listening_port).await?)
        } else {
            None
        };

        if let Some(player) = player.as_mut() {
            communicate_header(
                &config.source_addr,
                &config.channel,
                player,
                config.header_size,
            )
            .await?;
        }

        let started_at = Instant::now();
        debug!("Trying to connect to the splitter at {}", config.splitter_addr);
        let connection = SplitterConnection::connect(&config.splitter_addr).await?;
        let splitter = connection.splitter();

        // 스플리터 연결의 로컬 포트를 클러스터 UDP 포트로 사용
        let cluster_addr = SocketAddr::from(([0, 0, 0, 0], connection.local_addr().port()));
        let cluster = ClusterSocket::bind(cluster_addr, config.recv_timeout()).await?;

        let list = connection.read_cluster_list().await?;

        let mut node = Self::from_parts(config, cluster, splitter, list, player, started_at)?;
        node.announce().await;
        Ok(node)
    }
}

impl<P: AsyncWrite + Unpin> PeerNode<P> {
    /// 이미 준비된 소켓과 클러스터 목록으로 노드 구성
    ///
    /// 설정이 유효하지 않으면 `Error::InvalidConfig`
    pub fn from_parts(
        config: Config,
        cluster: ClusterSocket,
        splitter: SocketAddr,
        list: ClusterList,
        player: Option<P>,
        started_at: Instant,
    ) -> Result<Self> {
        config.validate()?;
        let buffer = RingBuffer::try_new(config.buffer_size)?;
        let relay = RelayEngine::new(&config, splitter, list.gatherer, list.peers);
        let death_time = DeathTime::new(config.churn_scale, config.churn_shape);
        if let Some(remaining) = death_time.remaining() {
            info!("scheduled death in {:.1}s", remaining.as_secs_f64());
        }

        let stats = PeerStats {
            peers: relay.membership().len(),
            ..PeerStats::new()
        };

        Ok(Self {
            buffer,
            config,
            cluster,
            relay,
            player,
            feeder: None,
            death_time,
            started_at,
            buffering: None,
            running: Arc::new(AtomicBool::new(true)),
            stats: Arc::new(RwLock::new(stats)),
        })
    }

    pub fn handle(&self) -> PeerHandle {
        PeerHandle {
            running: self.running.clone(),
            stats: self.stats.clone(),
        }
    }

    pub fn relay(&self) -> &RelayEngine {
        &self.relay
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.cluster.local_addr()
    }

    /// 이탈 시각 교체 (외부 스케줄러용)
    pub fn set_death_time(&mut self, death_time: DeathTime) {
        self.death_time = death_time;
    }

    /// 초기 피어들에게 빈 데이터그램으로 참여 알림
    pub async fn announce(&mut self) {
        let hello = control_message();
        let peers = self.relay.membership().peers().to_vec();
        for peer in peers {
            self.relay.queue(peer, hello.clone());
        }
        let sent = self.cluster.flush(self.relay.drain_outbox()).await;
        debug!("announced to {} peers", sent);
    }

    /// 수신 → 릴레이 한 스텝
    pub async fn step(&mut self) -> Step {
        let step = match self.cluster.recv().await {
            Ok(Received::Datagram { payload, sender }) => {
                self.relay.handle_datagram(payload, sender, &mut self.buffer)
            }
            Ok(Received::Timeout) => self.relay.handle_timeout(),
            Err(e) => {
                let step = self.relay.handle_recv_error(&e);
                // 계속 실패하는 소켓에서 루프가 헛돌지 않게 잠깐 쉼
                tokio::time::sleep(RECV_ERROR_BACKOFF).await;
                step
            }
        };

        let outbox = self.relay.drain_outbox();
        if !outbox.is_empty() {
            self.cluster.flush(outbox).await;
        }
        step
    }

    /// 버퍼 절반이 찰 때까지 릴레이
    pub async fn buffer(&mut self) -> Result<BufferingReport> {
        if let Some(report) = &self.buffering {
            return Ok(report.clone());
        }

        info!("{} buffering ...", self.cluster.local_addr()?);
        let mut controller = BufferingController::new(self.config.buffer_size, self.started_at);

        loop {
            if !self.running.load(Ordering::SeqCst) {
                return Err(Error::Interrupted);
            }

            let step = self.step().await;
            let peers = self.relay.membership().len();
            if let Some(report) = controller.on_step(step, &self.buffer, peers) {
                if let Some(player) = self.player.take() {
                    self.feeder = Some(PlaybackFeeder::new(
                        player,
                        report.first_slot,
                        self.relay.splitter(),
                    ));
                }

                self.buffering = Some(report.clone());
                self.stats.write().buffering = Some(report.clone());
                self.publish_stats();
                return Ok(report);
            }
        }
    }

    /// 정상 상태 루프: 릴레이 한 스텝 + (데이터 블록이면) 재생 한 슬롯
    pub async fn run(&mut self) -> Result<ExitReason> {
        self.buffer().await?;

        let mut processed = 0u64;
        let reason = loop {
            if !self.running.load(Ordering::SeqCst) {
                break ExitReason::Stopped;
            }
            if self.death_time.has_passed() {
                break ExitReason::DeathTime;
            }
            if let Some(max_blocks) = self.config.max_blocks {
                if processed >= max_blocks {
                    break ExitReason::BlocksExhausted;
                }
            }

            if self.step().await.block_number().is_none() {
                continue;
            }
            processed += 1;

            if let Some(feeder) = self.feeder.as_mut() {
                match feeder.emit(&mut self.buffer, &self.cluster).await {
                    Ok(()) => {}
                    Err(Error::PlayerDisconnected) => break ExitReason::PlayerDisconnected,
                    Err(e) => return Err(e),
                }
            }
            self.publish_stats();
        };

        self.publish_stats();
        info!("Goodbye! ({:?})", reason);
        Ok(reason)
    }

    /// 종료 절차: 스플리터에 탈퇴 알림 → 잔여 수신 처리 → 남은 피어들에게 탈퇴 알림
    pub async fn shutdown(mut self) -> PeerStats {
        let goodbye = control_message();
        self.cluster.send(&goodbye, self.relay.splitter()).await;

        for _ in 0..self.config.shutdown_drain_steps {
            self.step().await;
        }

        let peers = self.relay.membership().peers().to_vec();
        for peer in &peers {
            self.cluster.send(&goodbye, *peer).await;
        }
        info!("left the cluster ({} peers notified)", peers.len());

        self.publish_stats();
        self.running.store(false, Ordering::SeqCst);
        self.stats.read().clone()
    }

    /// 버퍼링 → 정상 상태 → 종료까지 한 번에 실행
    pub async fn serve(mut self) -> Result<(ExitReason, PeerStats)> {
        let reason = match self.run().await {
            Ok(reason) => reason,
            Err(Error::Interrupted) => ExitReason::Stopped,
            Err(e) => return Err(e),
        };
        let stats = self.shutdown().await;
        Ok((reason, stats))
    }

    fn publish_stats(&self) {
        let mut stats = self.stats.write();
        stats.peers = self.relay.membership().len();
        stats.relay = self.relay.counters().clone();
        if let Some(feeder) = &self.feeder {
            stats.playback = feeder.counters().clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Block;
    use bytes::Bytes;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, DuplexStream};
    use tokio::net::UdpSocket;

    const BLOCK_SIZE: usize = 16;

    fn config() -> Config {
        Config {
            buffer_size: 8,
            block_size: BLOCK_SIZE,
            recv_timeout_ms: 100,
            shutdown_drain_steps: 1,
            ..Config::default()
        }
    }

    fn datagram(number: u16) -> Bytes {
        Block::new(number, Bytes::from(vec![number as u8; BLOCK_SIZE])).to_bytes()
    }

    async fn udp() -> UdpSocket {
        UdpSocket::bind("127.0.0.1:0").await.unwrap()
    }

    async fn recv(socket: &UdpSocket) -> Option<Vec<u8>> {
        let mut buf = vec![0u8; 2048];
        match tokio::time::timeout(Duration::from_millis(500), socket.recv(&mut buf)).await {
            Ok(Ok(len)) => Some(buf[..len].to_vec()),
            _ => None,
        }
    }

    struct Cluster {
        splitter: UdpSocket,
        gatherer: UdpSocket,
        peer: UdpSocket,
    }

    async fn node_with(
        config: Config,
        player: Option<DuplexStream>,
    ) -> (PeerNode<DuplexStream>, Cluster) {
        let cluster = Cluster {
            splitter: udp().await,
            gatherer: udp().await,
            peer: udp().await,
        };
        let socket = ClusterSocket::bind("127.0.0.1:0".parse().unwrap(), config.recv_timeout())
            .await
            .unwrap();
        let list = ClusterList {
            gatherer: cluster.gatherer.local_addr().unwrap(),
            peers: vec![cluster.peer.local_addr().unwrap()],
        };
        let node = PeerNode::from_parts(
            config,
            socket,
            cluster.splitter.local_addr().unwrap(),
            list,
            player,
            Instant::now(),
        )
        .unwrap();
        (node, cluster)
    }

    #[tokio::test]
    async fn test_end_to_end_session() {
        let (player, mut player_reader) = tokio::io::duplex(4096);
        let config = Config {
            max_blocks: Some(4),
            ..config()
        };
        let (mut node, cluster) = node_with(config, Some(player)).await;
        let node_addr = node.local_addr().unwrap();

        node.announce().await;
        assert_eq!(recv(&cluster.peer).await, Some(Vec::new()));

        for number in 0..9u16 {
            cluster.splitter.send_to(&datagram(number), node_addr).await.unwrap();
        }

        // 첫 블록 + 버퍼 절반(4) = 블록 0..=4
        let report = node.buffer().await.unwrap();
        assert_eq!(report.first_slot, 0);
        assert_eq!(report.window, 4);
        assert_eq!(report.lost_blocks, 0);
        assert_eq!(report.peers, 1);

        // 블록 5..=8 처리하면서 슬롯 0..=3 재생
        let reason = node.run().await.unwrap();
        assert_eq!(reason, ExitReason::BlocksExhausted);

        let mut played = vec![0u8; 4 * BLOCK_SIZE];
        player_reader.read_exact(&mut played).await.unwrap();
        let expected: Vec<u8> = (0..4u8).flat_map(|n| vec![n; BLOCK_SIZE]).collect();
        assert_eq!(played, expected);

        let handle = node.handle();
        let stats = node.shutdown().await;
        assert!(!handle.is_running());
        assert_eq!(stats.relay.from_splitter, 9);
        assert_eq!(stats.playback.slots_played, 4);
        assert_eq!(stats.playback.gaps, 0);

        // 게더러는 스플리터 블록을 모두 그대로 받음
        for number in 0..9u16 {
            assert_eq!(recv(&cluster.gatherer).await, Some(datagram(number).to_vec()));
        }

        // 피어는 각 블록을 한 번씩 받은 뒤 탈퇴 알림을 받음
        for number in 0..9u16 {
            assert_eq!(recv(&cluster.peer).await, Some(datagram(number).to_vec()));
        }
        assert_eq!(recv(&cluster.peer).await, Some(Vec::new()));

        // 스플리터는 탈퇴 알림을 받음
        assert_eq!(recv(&cluster.splitter).await, Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_player_disconnect_ends_loop() {
        let (player, player_reader) = tokio::io::duplex(64);
        drop(player_reader);
        let (mut node, cluster) = node_with(config(), Some(player)).await;
        let node_addr = node.local_addr().unwrap();

        for number in 0..6u16 {
            cluster.splitter.send_to(&datagram(number), node_addr).await.unwrap();
        }

        let reason = node.run().await.unwrap();
        assert_eq!(reason, ExitReason::PlayerDisconnected);
    }

    #[tokio::test]
    async fn test_stop_before_buffering() {
        let (mut node, _cluster) = node_with(config(), None).await;
        node.handle().stop();

        let result = node.buffer().await;
        assert!(matches!(result, Err(Error::Interrupted)));

        let (reason, _) = node.serve().await.unwrap();
        assert_eq!(reason, ExitReason::Stopped);
    }

    #[tokio::test]
    async fn test_death_time_ends_loop() {
        let (mut node, cluster) = node_with(config(), None).await;
        let node_addr = node.local_addr().unwrap();
        for number in 0..5u16 {
            cluster.splitter.send_to(&datagram(number), node_addr).await.unwrap();
        }
        node.buffer().await.unwrap();

        node.set_death_time(DeathTime::At(Instant::now()));
        assert_eq!(node.run().await.unwrap(), ExitReason::DeathTime);
    }

    #[tokio::test]
    async fn test_relay_only_node_counts_without_player() {
        let config = Config {
            max_blocks: Some(2),
            ..config()
        };
        let (mut node, cluster) = node_with(config, None).await;
        let node_addr = node.local_addr().unwrap();
        for number in 0..7u16 {
            cluster.splitter.send_to(&datagram(number), node_addr).await.unwrap();
        }

        assert_eq!(node.run().await.unwrap(), ExitReason::BlocksExhausted);
        let stats = node.handle().stats();
        assert_eq!(stats.relay.blocks_received, 7);
        assert_eq!(stats.playback.slots_played, 0);
        assert!(stats.buffering.is_some());
    }

    #[tokio::test]
    async fn test_peer_joining_during_drain_gets_goodbye() {
        let config = Config {
            shutdown_drain_steps: 2,
            ..config()
        };
        let (node, cluster) = node_with(config, None).await;
        let node_addr = node.local_addr().unwrap();

        // 종료 직전에 도착한 가입 알림
        let joiner = udp().await;
        joiner.send_to(&[], node_addr).await.unwrap();

        let stats = node.shutdown().await;
        assert_eq!(stats.relay.joins, 1);
        assert_eq!(stats.peers, 2);

        assert_eq!(recv(&cluster.splitter).await, Some(Vec::new()));
        assert_eq!(recv(&joiner).await, Some(Vec::new()));
        assert_eq!(recv(&cluster.peer).await, Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let socket = ClusterSocket::bind("127.0.0.1:0".parse().unwrap(), Duration::from_millis(100))
            .await
            .unwrap();
        let list = ClusterList {
            gatherer: "127.0.0.1:7000".parse().unwrap(),
            peers: Vec::new(),
        };
        let config = Config {
            buffer_size: 0,
            ..config()
        };

        let result = PeerNode::<DuplexStream>::from_parts(
            config,
            socket,
            "127.0.0.1:4552".parse().unwrap(),
            list,
            None,
            Instant::now(),
        );
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }
}
