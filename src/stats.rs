//! 피어 통계

use std::time::{Duration, Instant};

/// 릴레이 엔진 카운터
#[derive(Debug, Clone, Default)]
pub struct RelayCounters {
    /// 수신한 데이터 블록 수
    pub blocks_received: u64,

    /// 스플리터로부터 받은 블록 수
    pub from_splitter: u64,

    /// 다른 피어가 릴레이한 블록 수
    pub from_peers: u64,

    /// 게더러로 전달한 블록 수
    pub gatherer_sends: u64,

    /// 버스트 모드 전송 수
    pub burst_sends: u64,

    /// 혼잡 회피 모드 전송 수
    pub congestion_sends: u64,

    /// 제어 메시지로 가입한 피어 수
    pub joins: u64,

    /// 제어 메시지로 탈퇴한 피어 수
    pub leaves: u64,

    /// 비협조로 제거된 피어 수
    pub evictions: u64,

    /// 수신 타임아웃 횟수
    pub timeouts: u64,

    /// 버려진 데이터그램 수 (형식 불일치 등)
    pub dropped: u64,

    /// 소켓 수신 에러 횟수
    pub recv_errors: u64,
}

/// 재생 카운터
#[derive(Debug, Clone, Default)]
pub struct PlaybackCounters {
    /// 플레이어로 내보낸 슬롯 수
    pub slots_played: u64,

    /// 누락 슬롯 수 (구멍)
    pub gaps: u64,

    /// 스플리터로 보낸 손실 신고 수
    pub complaints_sent: u64,

    /// 플레이어로 쓴 바이트
    pub bytes_written: u64,
}

/// 버퍼링 결과
#[derive(Debug, Clone)]
pub struct BufferingReport {
    /// 버퍼링 소요 시간 (핸드쉐이크 포함)
    pub elapsed: Duration,

    /// 첫 재생 슬롯
    pub first_slot: usize,

    /// 검사한 슬롯 수 (버퍼의 절반)
    pub window: usize,

    /// 검사 구간에서 수신되지 않은 슬롯 수
    pub lost_blocks: usize,

    /// 버퍼링 완료 시점의 피어 수
    pub peers: usize,
}

impl BufferingReport {
    /// 손실률 (%)
    pub fn loss_percentage(&self) -> f64 {
        if self.window == 0 {
            return 0.0;
        }
        (self.lost_blocks * 100) as f64 / self.window as f64
    }
}

/// 전체 피어 통계
#[derive(Debug, Clone)]
pub struct PeerStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 현재 피어 수
    pub peers: usize,

    pub relay: RelayCounters,

    pub playback: PlaybackCounters,

    /// 버퍼링이 끝났으면 그 결과
    pub buffering: Option<BufferingReport>,
}

impl PeerStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            peers: 0,
            relay: RelayCounters::default(),
            playback: PlaybackCounters::default(),
            buffering: None,
        }
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 재생 구멍 비율
    pub fn gap_rate(&self) -> f64 {
        if self.playback.slots_played == 0 {
            return 0.0;
        }
        self.playback.gaps as f64 / self.playback.slots_played as f64
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Peers: {} | Blocks: {} (splitter {}, peers {}) | Sent: {} burst / {} CA | Evicted: {} | Played: {} | Gaps: {:.2}% | Complaints: {} | Timeouts: {} | Recv errors: {}",
            self.elapsed().as_secs_f64(),
            self.peers,
            self.relay.blocks_received,
            self.relay.from_splitter,
            self.relay.from_peers,
            self.relay.burst_sends,
            self.relay.congestion_sends,
            self.relay.evictions,
            self.playback.slots_played,
            self.gap_rate() * 100.0,
            self.playback.complaints_sent,
            self.relay.timeouts,
            self.relay.recv_errors,
        )
    }
}

impl Default for PeerStats {
    fn default() -> Self {
        Self::new()
    }
}
