//! # P2PSP 피어
//!
//! UDP 클러스터 안에서 라이브 스트림 블록을 중계하는 피어 노드
//!
//! ## 핵심 특징
//! - **링 버퍼**: 시퀀스 번호 mod 버퍼 크기 슬롯에 블록 저장
//! - **버스트 + 혼잡 회피**: 스플리터 블록마다 남은 피어에게 몰아 보내고,
//!   피어 블록마다 한 명씩 보냄
//! - **비협조 카운터**: 블록을 돌려주지 않는 피어를 주기적으로 감쇠/퇴출
//! - **손실 신고**: 재생 시점에 빈 슬롯을 스플리터에 알림
//! - **이탈 시뮬레이션**: Weibull 분포 수명

pub mod block;
pub mod buffer;
pub mod buffering;
pub mod churn;
pub mod cluster;
pub mod config;
pub mod error;
pub mod handshake;
pub mod membership;
pub mod message;
pub mod node;
pub mod playback;
pub mod relay;
pub mod source;
pub mod stats;

pub use block::{Block, SequenceNumber};
pub use buffer::RingBuffer;
pub use buffering::{BufferingController, BufferingState};
pub use churn::DeathTime;
pub use cluster::{ClusterSocket, Received};
pub use config::Config;
pub use error::{Error, Result};
pub use handshake::{ClusterList, SplitterConnection};
pub use membership::Membership;
pub use message::Datagram;
pub use node::{ExitReason, PeerHandle, PeerNode};
pub use playback::PlaybackFeeder;
pub use relay::{OutboundDatagram, RelayEngine, Step};
pub use stats::{BufferingReport, PeerStats};

/// 시퀀스 번호 크기 (바이트, 네트워크 바이트 순서)
pub const SEQUENCE_NUMBER_SIZE: usize = 2;

/// 기본 블록 페이로드 크기 (바이트)
pub const DEFAULT_BLOCK_SIZE: usize = 1024;

/// 기본 링 버퍼 크기 (블록 수). 65536의 약수여야 함
pub const DEFAULT_BUFFER_SIZE: usize = 256;

/// 기본 스트림 헤더 크기 (바이트)
pub const DEFAULT_HEADER_SIZE: usize = 20 * 1024; // 20KB

/// 기본 비협조 카운터 한계
pub const DEFAULT_INSOLIDARITY_THRESHOLD: u32 = 64;

/// 기본 비협조 카운터 반감 주기 (데이터 블록 수)
pub const DEFAULT_DECAY_PERIOD: u64 = 256;
