//! 클러스터 릴레이 엔진
//!
//! - 스플리터 블록 수신 시: 게더러로 전달 + 이전 블록 버스트 전송
//! - 그 외 데이터 수신 시: 송신 피어의 비협조 카운터 리셋
//! - 모든 데이터 수신마다: 혼잡 회피 모드로 피어 하나에게 이전 블록 전송
//!
//! 소켓을 직접 다루지 않고 보낼 데이터그램을 outbox에 쌓아두면
//! 노드가 클러스터 소켓으로 흘려보냄

use std::net::SocketAddr;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::block::SequenceNumber;
use crate::buffer::RingBuffer;
use crate::membership::{ControlOutcome, Membership, Penalty};
use crate::message::Datagram;
use crate::stats::RelayCounters;
use crate::{Config, Error};

/// 송신 대기 데이터그램
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundDatagram {
    pub target: SocketAddr,
    pub payload: Bytes,
}

impl OutboundDatagram {
    pub fn new(target: SocketAddr, payload: Bytes) -> Self {
        Self { target, payload }
    }
}

/// 릴레이 스텝 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// 데이터 블록 처리 (시퀀스 번호)
    Block(SequenceNumber),

    /// 제어 메시지 처리 (재생과 무관)
    Control,

    /// 수신 타임아웃
    Timeout,

    /// 형식이 맞지 않아 버림
    Dropped,
}

impl Step {
    pub fn block_number(&self) -> Option<SequenceNumber> {
        match self {
            Step::Block(number) => Some(*number),
            _ => None,
        }
    }
}

/// 릴레이 엔진 (멤버십 테이블의 유일한 소유자)
#[derive(Debug)]
pub struct RelayEngine {
    /// 스플리터 주소
    splitter: SocketAddr,

    /// 게더러 주소
    gatherer: SocketAddr,

    /// 블록 페이로드 크기
    block_size: usize,

    /// 피어 목록 + 비협조 카운터
    membership: Membership,

    /// 라운드로빈 커서
    cursor: usize,

    /// 스플리터로부터 받은 직전 데이터그램
    last: Option<Bytes>,

    /// 비협조 카운터 반감 주기
    decay_period: u64,

    /// 처리한 데이터 블록 수
    blocks_processed: u64,

    /// 송신 대기열
    outbox: Vec<OutboundDatagram>,

    counters: RelayCounters,
}

impl RelayEngine {
    /// 새 릴레이 엔진 생성
    pub fn new(
        config: &Config,
        splitter: SocketAddr,
        gatherer: SocketAddr,
        peers: impl IntoIterator<Item = SocketAddr>,
    ) -> Self {
        Self {
            splitter,
            gatherer,
            block_size: config.block_size,
            membership: Membership::with_peers(config.insolidarity_threshold, peers),
            cursor: 0,
            last: None,
            decay_period: config.decay_period,
            blocks_processed: 0,
            outbox: Vec::new(),
            counters: RelayCounters::default(),
        }
    }

    pub fn splitter(&self) -> SocketAddr {
        self.splitter
    }

    pub fn gatherer(&self) -> SocketAddr {
        self.gatherer
    }

    pub fn membership(&self) -> &Membership {
        &self.membership
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn counters(&self) -> &RelayCounters {
        &self.counters
    }

    /// 송신 대기열에 추가
    pub fn queue(&mut self, target: SocketAddr, payload: Bytes) {
        self.outbox.push(OutboundDatagram::new(target, payload));
    }

    /// 송신 대기열 비우기
    pub fn drain_outbox(&mut self) -> Vec<OutboundDatagram> {
        std::mem::take(&mut self.outbox)
    }

    /// 수신 데이터그램 하나 처리
    pub fn handle_datagram(
        &mut self,
        raw: Bytes,
        sender: SocketAddr,
        buffer: &mut RingBuffer,
    ) -> Step {
        match Datagram::classify(raw, self.block_size) {
            Datagram::Block { block, raw } => {
                let number = block.number;
                buffer.store(number, block.payload);
                debug!("{} <- block {}", sender, number);

                self.counters.blocks_received += 1;
                if sender == self.splitter {
                    self.counters.from_splitter += 1;
                    self.queue(self.gatherer, raw.clone());
                    self.counters.gatherer_sends += 1;
                    debug!("block {} -> (gatherer) {}", number, self.gatherer);

                    self.burst();
                    self.last = Some(raw);
                } else {
                    self.counters.from_peers += 1;
                    if self.membership.observe_relay(sender) {
                        info!("peer {} added by data block", sender);
                    }
                }

                self.congestion_avoidance();
                self.count_processed();

                Step::Block(number)
            }
            Datagram::Control => {
                self.handle_control(sender);
                Step::Control
            }
            Datagram::Complaint(number) => {
                // 손실 신고는 스플리터만 받아야 함
                warn!("unexpected complaint for {} from {}, dropped", number, sender);
                self.counters.dropped += 1;
                Step::Dropped
            }
            Datagram::Malformed(len) => {
                warn!("malformed datagram ({} bytes) from {}, dropped", len, sender);
                self.counters.dropped += 1;
                Step::Dropped
            }
        }
    }

    /// 수신 타임아웃 처리
    pub fn handle_timeout(&mut self) -> Step {
        self.counters.timeouts += 1;
        warn!("cluster timeout!");
        Step::Timeout
    }

    /// 소켓 수신 에러 처리. 스텝은 버려진 것으로 취급
    pub fn handle_recv_error(&mut self, error: &Error) -> Step {
        self.counters.recv_errors += 1;
        warn!("수신 에러: {} (누적 {})", error, self.counters.recv_errors);
        Step::Dropped
    }

    /// 버스트 모드: 커서부터 목록 끝까지 직전 블록 전송
    ///
    /// 순회 중에는 카운터만 올리고 제거는 순회가 끝난 뒤 적용
    fn burst(&mut self) {
        if let Some(last) = self.last.clone() {
            let mut exceeded = Vec::new();

            for index in self.cursor..self.membership.len() {
                let Some(peer) = self.membership.get(index) else {
                    break;
                };
                self.queue(peer, last.clone());
                self.counters.burst_sends += 1;

                match self.membership.record_miss(&peer) {
                    Penalty::Exceeded => exceeded.push(peer),
                    Penalty::Counted(count) => debug!("{} insolidarity = {}", peer, count),
                    Penalty::Unknown => {}
                }
            }

            for peer in exceeded {
                if self.membership.remove(&peer).is_some() {
                    self.counters.evictions += 1;
                    info!("peer {} removed (insolidarity)", peer);
                }
            }
        }

        self.cursor = 0;
    }

    /// 혼잡 회피 모드: 커서 위치의 피어 하나에게 직전 블록 전송
    fn congestion_avoidance(&mut self) {
        let Some(last) = self.last.clone() else {
            return;
        };
        let Some(peer) = self.membership.get(self.cursor) else {
            return;
        };

        self.queue(peer, last);
        self.counters.congestion_sends += 1;
        self.cursor += 1;

        if let Some(index) = self.membership.penalize(&peer) {
            self.counters.evictions += 1;
            self.shift_cursor(index);
            info!("peer {} removed by unsupportive", peer);
        }
    }

    /// 제어 메시지: 모르는 피어면 가입, 아는 피어면 탈퇴
    fn handle_control(&mut self, sender: SocketAddr) {
        match self.membership.observe_control(sender) {
            ControlOutcome::Joined => {
                self.counters.joins += 1;
                info!("peer {} added by control block", sender);
            }
            ControlOutcome::Left(index) => {
                self.counters.leaves += 1;
                self.shift_cursor(index);
                info!("peer {} removed by control block", sender);
            }
        }
    }

    /// 커서 앞쪽 피어가 빠지면 커서를 당겨서 이번 순회에서 건너뛰는 피어가 없게 함
    fn shift_cursor(&mut self, removed_index: usize) {
        if removed_index < self.cursor {
            self.cursor -= 1;
        }
    }

    fn count_processed(&mut self) {
        self.blocks_processed += 1;
        if self.decay_period > 0 && self.blocks_processed % self.decay_period == 0 {
            self.membership.decay();
            debug!("insolidarity decayed after {} blocks", self.blocks_processed);
        }
    }
}
