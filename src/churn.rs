//! 이탈(churn) 스케줄러
//!
//! Weibull 분포로 피어 수명을 뽑아 종료 시각을 정한다

use std::time::{Duration, Instant};

use rand::Rng;

/// 피어 종료 시각
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeathTime {
    /// 이탈 없음
    Never,

    At(Instant),
}

impl DeathTime {
    /// 설정값으로 종료 시각 생성 (scale <= 0 이면 Never)
    pub fn new(scale: f64, shape: f64) -> Self {
        Self::with_rng(scale, shape, &mut rand::thread_rng())
    }

    pub fn with_rng<R: Rng + ?Sized>(scale: f64, shape: f64, rng: &mut R) -> Self {
        if scale <= 0.0 || shape <= 0.0 {
            return DeathTime::Never;
        }
        Instant::now()
            .checked_add(weibull_lifetime(scale, shape, rng))
            .map_or(DeathTime::Never, DeathTime::At)
    }

    pub fn has_passed(&self) -> bool {
        match self {
            DeathTime::Never => false,
            DeathTime::At(at) => Instant::now() >= *at,
        }
    }

    /// 남은 시간 (Never면 None)
    pub fn remaining(&self) -> Option<Duration> {
        match self {
            DeathTime::Never => None,
            DeathTime::At(at) => Some(at.saturating_duration_since(Instant::now())),
        }
    }
}

/// 역변환 샘플링: `scale * (-ln U)^(1/shape)` 초
fn weibull_lifetime<R: Rng + ?Sized>(scale: f64, shape: f64, rng: &mut R) -> Duration {
    // U ∈ (0, 1]
    let u: f64 = 1.0 - rng.gen::<f64>();
    let seconds = scale * (-u.ln()).powf(1.0 / shape);
    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
}
