//! 스트림 블록 정의
//!
//! - 와이어 포맷: 시퀀스 번호(2바이트, 빅엔디안) + 고정 크기 페이로드

use bytes::{BufMut, Bytes, BytesMut};

use crate::SEQUENCE_NUMBER_SIZE;

/// 블록 시퀀스 번호 (16비트, 랩어라운드)
pub type SequenceNumber = u16;

/// 스트림 블록
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// 시퀀스 번호
    pub number: SequenceNumber,

    /// 페이로드
    pub payload: Bytes,
}

impl Block {
    pub fn new(number: SequenceNumber, payload: Bytes) -> Self {
        Self { number, payload }
    }

    /// 블록을 데이터그램 바이트로 직렬화
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(SEQUENCE_NUMBER_SIZE + self.payload.len());
        buf.put_u16(self.number);
        buf.extend_from_slice(&self.payload);
        buf.freeze()
    }

    /// 데이터그램에서 블록 추출
    ///
    /// 길이 검사는 호출자가 담당 (`message::Datagram::classify`).
    /// 페이로드는 원본 버퍼를 복사 없이 공유함.
    pub fn from_datagram(datagram: &Bytes) -> Option<Self> {
        if datagram.len() < SEQUENCE_NUMBER_SIZE {
            return None;
        }
        let number = u16::from_be_bytes([datagram[0], datagram[1]]);
        Some(Self {
            number,
            payload: datagram.slice(SEQUENCE_NUMBER_SIZE..),
        })
    }

    /// 링 버퍼 슬롯 인덱스
    pub fn slot(&self, buffer_size: usize) -> usize {
        self.number as usize % buffer_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_wire_format() {
        let block = Block::new(0x0102, Bytes::from_static(b"abcd"));
        let bytes = block.to_bytes();

        // 네트워크 바이트 순서
        assert_eq!(&bytes[..], b"\x01\x02abcd");

        let restored = Block::from_datagram(&bytes).unwrap();
        assert_eq!(restored, block);
    }

    #[test]
    fn test_slot_wraps() {
        let block = Block::new(u16::MAX, Bytes::new());
        assert_eq!(block.slot(256), 255);
        assert_eq!(Block::new(256, Bytes::new()).slot(256), 0);
    }

    #[test]
    fn test_too_short_datagram() {
        assert!(Block::from_datagram(&Bytes::from_static(b"\x01")).is_none());
    }
}
