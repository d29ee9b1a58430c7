//! 클러스터 멤버십 (피어 목록 + 비협조 카운터)
//!
//! - 피어 목록 순서는 라운드로빈 커서가 가리키는 순서
//! - 비협조(insolidarity) 카운터가 한계를 넘으면 제거
//! - 주기적으로 반감하여 일시적 혼잡은 용서함

use std::collections::HashMap;
use std::net::SocketAddr;

/// 제어 메시지 처리 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOutcome {
    /// 처음 본 피어 → 추가
    Joined,

    /// 이미 아는 피어 → 제거 (제거 전 인덱스)
    Left(usize),
}

/// 비협조 기록 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Penalty {
    /// 카운터 증가 (현재 값)
    Counted(u32),

    /// 한계 초과로 제거 대상
    Exceeded,

    /// 목록에 없는 피어
    Unknown,
}

/// 멤버십 테이블
#[derive(Debug, Clone)]
pub struct Membership {
    /// 피어 목록 (전송 순서)
    peers: Vec<SocketAddr>,

    /// 피어별 비협조 카운터
    insolidarity: HashMap<SocketAddr, u32>,

    /// 제거 한계
    threshold: u32,
}

impl Membership {
    pub fn new(threshold: u32) -> Self {
        Self {
            peers: Vec::new(),
            insolidarity: HashMap::new(),
            threshold,
        }
    }

    /// 초기 피어 목록으로 생성 (카운터 0)
    pub fn with_peers(threshold: u32, peers: impl IntoIterator<Item = SocketAddr>) -> Self {
        let mut membership = Self::new(threshold);
        for peer in peers {
            membership.insert(peer);
        }
        membership
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn contains(&self, peer: &SocketAddr) -> bool {
        self.insolidarity.contains_key(peer)
    }

    /// 인덱스로 피어 조회
    pub fn get(&self, index: usize) -> Option<SocketAddr> {
        self.peers.get(index).copied()
    }

    /// 전송 순서대로 피어 목록
    pub fn peers(&self) -> &[SocketAddr] {
        &self.peers
    }

    pub fn insolidarity(&self, peer: &SocketAddr) -> Option<u32> {
        self.insolidarity.get(peer).copied()
    }

    /// 피어 추가 (이미 있으면 무시). 추가됐으면 true
    pub fn insert(&mut self, peer: SocketAddr) -> bool {
        if self.insolidarity.contains_key(&peer) {
            return false;
        }
        self.peers.push(peer);
        self.insolidarity.insert(peer, 0);
        true
    }

    /// 피어 제거. 제거 전 인덱스 반환
    pub fn remove(&mut self, peer: &SocketAddr) -> Option<usize> {
        self.insolidarity.remove(peer)?;
        let index = self.peers.iter().position(|p| p == peer)?;
        self.peers.remove(index);
        Some(index)
    }

    /// 데이터를 릴레이해준 피어 관찰. 새 피어면 true
    ///
    /// 아는 피어라면 카운터를 0으로 되돌림
    pub fn observe_relay(&mut self, peer: SocketAddr) -> bool {
        match self.insolidarity.get_mut(&peer) {
            Some(counter) => {
                *counter = 0;
                false
            }
            None => self.insert(peer),
        }
    }

    /// 제어 메시지 관찰: 모르는 피어면 가입, 아는 피어면 탈퇴
    pub fn observe_control(&mut self, peer: SocketAddr) -> ControlOutcome {
        match self.remove(&peer) {
            Some(index) => ControlOutcome::Left(index),
            None => {
                self.insert(peer);
                ControlOutcome::Joined
            }
        }
    }

    /// 비협조 카운터 증가만 수행 (제거는 호출자가 결정)
    pub fn record_miss(&mut self, peer: &SocketAddr) -> Penalty {
        match self.insolidarity.get_mut(peer) {
            Some(counter) => {
                *counter += 1;
                if *counter > self.threshold {
                    Penalty::Exceeded
                } else {
                    Penalty::Counted(*counter)
                }
            }
            None => Penalty::Unknown,
        }
    }

    /// 비협조 카운터 증가, 한계 초과 시 즉시 제거
    ///
    /// 제거됐으면 제거 전 인덱스 반환
    pub fn penalize(&mut self, peer: &SocketAddr) -> Option<usize> {
        match self.record_miss(peer) {
            Penalty::Exceeded => self.remove(peer),
            _ => None,
        }
    }

    /// 모든 카운터 반감
    pub fn decay(&mut self) {
        for counter in self.insolidarity.values_mut() {
            *counter /= 2;
        }
    }
}
