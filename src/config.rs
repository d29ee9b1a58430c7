//! 피어 설정

use std::time::Duration;

use crate::{
    DEFAULT_BLOCK_SIZE, DEFAULT_BUFFER_SIZE, DEFAULT_DECAY_PERIOD, DEFAULT_HEADER_SIZE,
    DEFAULT_INSOLIDARITY_THRESHOLD, SEQUENCE_NUMBER_SIZE,
};
use crate::{Error, Result};

/// P2PSP 피어 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 링 버퍼 크기 (블록 수)
    pub buffer_size: usize,

    /// 블록 페이로드 크기 (바이트, 시퀀스 번호 제외)
    pub block_size: usize,

    /// 스트림 헤더 크기 (바이트)
    pub header_size: usize,

    /// 플레이어 대기 포트
    pub listening_port: u16,

    /// 스플리터 주소 (host:port)
    pub splitter_addr: String,

    /// 소스 주소 (host:port)
    pub source_addr: String,

    /// 소스에 요청할 채널 이름
    pub channel: String,

    /// 플레이어로 스트림 전달 여부
    /// false면 릴레이 전용 노드로 동작
    pub player_enabled: bool,

    /// 정상 상태에서 처리할 최대 블록 수 (None이면 무제한)
    pub max_blocks: Option<u64>,

    /// 클러스터 소켓 수신 타임아웃 (밀리초)
    pub recv_timeout_ms: u64,

    /// 비협조 카운터 한계. 초과하면 피어 목록에서 제거
    pub insolidarity_threshold: u32,

    /// 비협조 카운터 반감 주기 (처리한 데이터 블록 수)
    pub decay_period: u64,

    /// 종료 시 추가로 처리할 수신 스텝 수
    pub shutdown_drain_steps: usize,

    /// 이탈(churn) Weibull 스케일 (초). 0이면 이탈 없음
    pub churn_scale: f64,

    /// 이탈 Weibull 형상 파라미터
    pub churn_shape: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            block_size: DEFAULT_BLOCK_SIZE,
            header_size: DEFAULT_HEADER_SIZE,
            listening_port: 9998,
            splitter_addr: "localhost:4552".into(),
            source_addr: "localhost:4551".into(),
            channel: "134.ogg".into(),
            player_enabled: true,
            max_blocks: None,
            recv_timeout_ms: 1000,                 // 1초
            insolidarity_threshold: DEFAULT_INSOLIDARITY_THRESHOLD,
            decay_period: DEFAULT_DECAY_PERIOD,
            shutdown_drain_steps: 3,
            churn_scale: 0.0,                      // 이탈 없음
            churn_shape: 1.0,                      // 지수 분포
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 플레이어 없이 릴레이만 하는 노드용 설정
    pub fn relay_only() -> Self {
        Self {
            player_enabled: false,
            header_size: 0,
            ..Self::default()
        }
    }

    /// 버퍼링 단계에서 채울 블록 수 (버퍼의 절반)
    pub fn half_buffer(&self) -> usize {
        self.buffer_size / 2
    }

    /// 데이터 블록 데이터그램 크기 (시퀀스 번호 + 페이로드)
    pub fn datagram_size(&self) -> usize {
        SEQUENCE_NUMBER_SIZE + self.block_size
    }

    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size < 2 {
            return Err(Error::InvalidConfig(format!(
                "buffer_size는 2 이상이어야 함: {}",
                self.buffer_size
            )));
        }
        // 시퀀스 번호가 16비트이므로 랩어라운드 시 슬롯이 어긋나지 않으려면 65536의 약수여야 함
        if self.buffer_size > 1 << 16 || (1usize << 16) % self.buffer_size != 0 {
            return Err(Error::InvalidConfig(format!(
                "buffer_size는 65536의 약수여야 함: {}",
                self.buffer_size
            )));
        }
        // 0이면 데이터 블록이 손실 신고와 같은 크기가 됨
        if self.block_size == 0 {
            return Err(Error::InvalidConfig("block_size는 0보다 커야 함".into()));
        }
        if self.recv_timeout_ms == 0 {
            return Err(Error::InvalidConfig("recv_timeout_ms는 0보다 커야 함".into()));
        }
        if self.churn_scale > 0.0 && self.churn_shape <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "churn_shape는 0보다 커야 함: {}",
                self.churn_shape
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.half_buffer(), 128);
        assert_eq!(config.datagram_size(), 1026);
        assert_eq!(config.recv_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_rejects_buffer_not_dividing_sequence_space() {
        let config = Config {
            buffer_size: 100,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_empty_block() {
        let config = Config {
            block_size: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_relay_only_preset() {
        let config = Config::relay_only();
        assert!(!config.player_enabled);
        assert!(config.validate().is_ok());
    }
}
