//! 시작 버퍼링 상태 머신
//!
//! `AwaitFirstBlock → FillHalf → Ready`
//!
//! 첫 블록의 슬롯을 재생 시작 위치로 잡고, 이후 버퍼의 절반만큼 데이터 블록을
//! 더 받은 뒤 시작 구간의 누락 슬롯 수를 센다

use std::time::Instant;

use tracing::{debug, info};

use crate::buffer::RingBuffer;
use crate::relay::Step;
use crate::stats::BufferingReport;

/// 버퍼링 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferingState {
    /// 첫 데이터 블록 대기
    AwaitFirstBlock,

    /// 버퍼 절반 채우는 중 (남은 블록 수)
    FillHalf { remaining: usize },

    /// 재생 준비 완료
    Ready,
}

/// 버퍼링 컨트롤러
#[derive(Debug)]
pub struct BufferingController {
    state: BufferingState,

    /// 검사 구간 크기 (버퍼의 절반)
    window: usize,

    /// 첫 재생 슬롯
    first_slot: Option<usize>,

    /// 버퍼링 시작 시각 (스플리터 접속 전)
    started_at: Instant,

    report: Option<BufferingReport>,
}

impl BufferingController {
    pub fn new(buffer_size: usize, started_at: Instant) -> Self {
        Self {
            state: BufferingState::AwaitFirstBlock,
            window: buffer_size / 2,
            first_slot: None,
            started_at,
            report: None,
        }
    }

    pub fn state(&self) -> BufferingState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == BufferingState::Ready
    }

    /// 재생 시작 슬롯 (첫 블록 수신 전이면 None)
    pub fn first_slot(&self) -> Option<usize> {
        self.first_slot
    }

    pub fn report(&self) -> Option<&BufferingReport> {
        self.report.as_ref()
    }

    /// 릴레이 스텝 결과 반영
    ///
    /// 데이터 블록이 아닌 스텝은 무시. 버퍼링이 끝나는 스텝에서만 결과 반환
    pub fn on_step(
        &mut self,
        step: Step,
        buffer: &RingBuffer,
        peers: usize,
    ) -> Option<BufferingReport> {
        let number = step.block_number()?;

        match self.state {
            BufferingState::AwaitFirstBlock => {
                let slot = buffer.slot_of(number);
                self.first_slot = Some(slot);
                debug!("first block {} -> playback starts at slot {}", number, slot);
                self.state = BufferingState::FillHalf {
                    remaining: self.window,
                };
                None
            }
            BufferingState::FillHalf { remaining } => {
                let remaining = remaining.saturating_sub(1);
                if remaining > 0 {
                    self.state = BufferingState::FillHalf { remaining };
                    return None;
                }
                Some(self.finish(buffer, peers))
            }
            BufferingState::Ready => None,
        }
    }

    fn finish(&mut self, buffer: &RingBuffer, peers: usize) -> BufferingReport {
        let first_slot = self.first_slot.unwrap_or(0);
        let lost_blocks = buffer.missing_in_window(first_slot, self.window);

        let report = BufferingReport {
            elapsed: self.started_at.elapsed(),
            first_slot,
            window: self.window,
            lost_blocks,
            peers,
        };

        info!(
            buffering_ms = report.elapsed.as_millis() as u64,
            lost = report.lost_blocks,
            loss_pct = report.loss_percentage(),
            peers = report.peers,
            "buffering done"
        );

        self.state = BufferingState::Ready;
        self.report = Some(report.clone());
        report
    }
}
