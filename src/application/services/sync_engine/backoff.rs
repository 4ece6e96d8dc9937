use crate::shared::config::SyncConfig;
use std::time::Duration;

/// エンジン全体で共有する指数バックオフ（ジッター付き、上限あり）。
///
/// n 回連続失敗後の待ち時間は `min(cap, base * 2^(n-1) * (1 + jitter * u))`
/// （u ∈ [0, 1)）。jitter が 1 以下なら待ち時間は失敗回数に対して単調非減少になる。
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    jitter_ratio: f64,
    failures: u32,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration, jitter_ratio: f64) -> Self {
        Self {
            base,
            cap: cap.max(base),
            jitter_ratio: jitter_ratio.clamp(0.0, 1.0),
            failures: 0,
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.base_backoff(), config.max_backoff(), config.jitter_ratio)
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// 失敗を記録し、次の試行までの待ち時間を返す
    pub fn record_failure(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        self.delay_for(self.failures, rand::random::<f64>())
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn delay_for(&self, failures: u32, unit_jitter: f64) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let exponent = (failures - 1).min(32) as i32;
        let jitter = 1.0 + self.jitter_ratio * unit_jitter.clamp(0.0, 1.0);
        let millis = self.base.as_millis() as f64 * 2f64.powi(exponent) * jitter;
        let capped = millis.min(self.cap.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}
