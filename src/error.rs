//! 에러 타입 정의

use thiserror::Error;

/// 피어 노드 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    /// 스플리터 접속 또는 피어 목록 수신 실패 (시작 단계에서 치명적)
    #[error("스플리터 핸드쉐이크 실패: {0}")]
    Handshake(String),

    #[error("스트림 헤더 수신 중단: {received}/{expected} bytes")]
    HeaderTruncated { received: usize, expected: usize },

    /// 플레이어 쓰기 실패. 재생 루프 종료 신호로 사용됨
    #[error("플레이어 연결 종료")]
    PlayerDisconnected,

    #[error("유효하지 않은 설정: {0}")]
    InvalidConfig(String),

    /// 버퍼링 도중 외부에서 정지 요청
    #[error("정지 요청으로 중단됨")]
    Interrupted,
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
