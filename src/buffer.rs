//! 블록 링 버퍼
//!
//! - 슬롯 `i`에는 `number mod N == i`인 가장 최근 블록이 들어감
//! - 수신 여부 플래그가 false인 슬롯은 이미 소비됐거나 아직 도착하지 않은 것
//! - 백프레셔 없음: 소비 전 덮어쓰기는 재생 시 구멍으로 드러남

use bytes::Bytes;

use crate::block::SequenceNumber;
use crate::{Error, Result};

/// 고정 크기 블록 링 버퍼
#[derive(Debug)]
pub struct RingBuffer {
    /// 블록 슬롯 (한 번도 쓰이지 않은 슬롯은 None)
    blocks: Vec<Option<Bytes>>,

    /// 슬롯별 수신 여부
    received: Vec<bool>,
}

impl RingBuffer {
    /// 새 링 버퍼 생성
    ///
    /// # Panics
    ///
    /// `capacity`가 0이면 패닉. 외부 입력은 [`RingBuffer::try_new`] 사용
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "링 버퍼 크기는 0보다 커야 함");
        Self {
            blocks: vec![None; capacity],
            received: vec![false; capacity],
        }
    }

    /// 크기 0이면 `Error::InvalidConfig`
    pub fn try_new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidConfig("링 버퍼 크기는 0보다 커야 함".into()));
        }
        Ok(Self::new(capacity))
    }

    /// 버퍼 크기 (슬롯 수)
    pub fn capacity(&self) -> usize {
        self.blocks.len()
    }

    /// 시퀀스 번호에 해당하는 슬롯 인덱스
    pub fn slot_of(&self, number: SequenceNumber) -> usize {
        number as usize % self.capacity()
    }

    /// 블록 저장 (무조건 덮어쓰고 수신 표시)
    pub fn store(&mut self, number: SequenceNumber, payload: Bytes) -> usize {
        let slot = self.slot_of(number);
        self.blocks[slot] = Some(payload);
        self.received[slot] = true;
        slot
    }

    /// 수신된 블록을 꺼내고 플래그 해제
    ///
    /// 다음 `store` 전까지 같은 슬롯은 한 번만 꺼낼 수 있음
    pub fn take(&mut self, slot: usize) -> Option<Bytes> {
        let slot = slot % self.capacity();
        if !self.received[slot] {
            return None;
        }
        self.received[slot] = false;
        self.blocks[slot].clone()
    }

    /// 수신 여부와 무관하게 슬롯 내용 조회
    pub fn get(&self, slot: usize) -> Option<&Bytes> {
        self.blocks[slot % self.capacity()].as_ref()
    }

    pub fn is_present(&self, slot: usize) -> bool {
        self.received[slot % self.capacity()]
    }

    /// 수신 플래그만 해제
    pub fn clear(&mut self, slot: usize) {
        let slot = slot % self.capacity();
        self.received[slot] = false;
    }

    /// `start`부터 `len`개 슬롯 중 수신되지 않은 슬롯 수 (랩어라운드)
    pub fn missing_in_window(&self, start: usize, len: usize) -> usize {
        let capacity = self.capacity();
        (start..start + len)
            .filter(|&i| !self.received[i % capacity])
            .count()
    }
}
