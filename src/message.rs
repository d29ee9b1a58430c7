//! 클러스터 데이터그램 정의
//!
//! 별도 타입 필드 없이 길이와 송신자로만 구분되는 프로토콜이므로
//! 상태를 건드리기 전에 종류를 먼저 확정함

use bytes::Bytes;

use crate::block::{Block, SequenceNumber};
use crate::SEQUENCE_NUMBER_SIZE;

/// 분류된 데이터그램
#[derive(Debug, Clone)]
pub enum Datagram {
    Block {
        block: Block,
        /// 수정 없이 재전송하기 위한 원본 바이트
        raw: Bytes,
    },
    Control,
    Complaint(SequenceNumber),
    Malformed(usize),
}

impl Datagram {
    /// 수신한 바이트를 데이터그램 종류로 분류
    pub fn classify(raw: Bytes, block_size: usize) -> Self {
        let len = raw.len();
        if len == 0 {
            return Datagram::Control;
        }
        if len == SEQUENCE_NUMBER_SIZE {
            return Datagram::Complaint(u16::from_be_bytes([raw[0], raw[1]]));
        }
        if len == SEQUENCE_NUMBER_SIZE + block_size {
            if let Some(block) = Block::from_datagram(&raw) {
                return Datagram::Block { block, raw };
            }
        }
        Datagram::Malformed(len)
    }
}

/// 제어 메시지 (가입/탈퇴 알림)
pub fn control_message() -> Bytes {
    Bytes::new()
}

/// 손실 신고 메시지 (재생 커서 값, 빅엔디안)
pub fn complaint_message(slot: SequenceNumber) -> Bytes {
    Bytes::copy_from_slice(&slot.to_be_bytes())
}
