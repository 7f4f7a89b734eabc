//! Built-in strategies selectable from a run config.

use barsim_core::domain::{BarSnapshot, InstrumentId};
use barsim_core::engine::StrategyContext;
use barsim_core::Strategy;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Strategy selection (serializable enum).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyConfig {
    /// Put `percent` of the account into one instrument on the first bar.
    BuyAndHold {
        instrument: InstrumentId,
        #[serde(default = "default_percent")]
        percent: f64,
    },

    /// Fully invested while the fast SMA is above the slow one.
    SmaCross {
        instrument: InstrumentId,
        fast: usize,
        slow: usize,
    },

    /// Never trades. Useful for benchmark-only runs.
    Noop,
}

fn default_percent() -> f64 {
    1.0
}

impl StrategyConfig {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::BuyAndHold { percent, .. } => {
                if !(*percent > 0.0 && *percent <= 1.0) {
                    return Err(format!("percent must be in (0, 1], got {percent}"));
                }
            }
            Self::SmaCross { fast, slow, .. } => {
                if *fast == 0 || fast >= slow {
                    return Err(format!("need 0 < fast < slow, got fast={fast} slow={slow}"));
                }
            }
            Self::Noop => {}
        }
        Ok(())
    }

    pub fn build(&self) -> Box<dyn Strategy + Send> {
        match self {
            Self::BuyAndHold {
                instrument,
                percent,
            } => Box::new(BuyAndHold::new(instrument.clone(), *percent)),
            Self::SmaCross {
                instrument,
                fast,
                slow,
            } => Box::new(SmaCross::new(instrument.clone(), *fast, *slow)),
            Self::Noop => Box::new(Noop),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::BuyAndHold { .. } => "BUY_AND_HOLD",
            Self::SmaCross { .. } => "SMA_CROSS",
            Self::Noop => "NOOP",
        }
    }
}

// ── Buy and hold ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BuyAndHold {
    instrument: InstrumentId,
    percent: f64,
    entered: bool,
}

impl BuyAndHold {
    pub fn new(instrument: InstrumentId, percent: f64) -> Self {
        Self {
            instrument,
            percent,
            entered: false,
        }
    }
}

impl Strategy for BuyAndHold {
    fn name(&self) -> &str {
        "buy-and-hold"
    }

    fn init(&mut self, ctx: &mut StrategyContext<'_, '_>) {
        ctx.update_universe([self.instrument.clone()]);
    }

    fn handle_bar(&mut self, ctx: &mut StrategyContext<'_, '_>, bars: &BarSnapshot) {
        if self.entered || !bars.contains(&self.instrument) {
            return;
        }
        self.entered = true;
        if let Err(rejected) = ctx.order_percent(self.instrument.clone(), self.percent) {
            tracing::warn!(%rejected, "initial purchase refused");
        }
    }
}

// ── SMA crossover ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SmaCross {
    instrument: InstrumentId,
    fast: usize,
    slow: usize,
    closes: VecDeque<f64>,
    was_above: Option<bool>,
}

impl SmaCross {
    pub fn new(instrument: InstrumentId, fast: usize, slow: usize) -> Self {
        Self {
            instrument,
            fast,
            slow,
            closes: VecDeque::with_capacity(slow + 1),
            was_above: None,
        }
    }

    fn mean_of_last(&self, n: usize) -> f64 {
        self.closes.iter().rev().take(n).sum::<f64>() / n as f64
    }
}

impl Strategy for SmaCross {
    fn name(&self) -> &str {
        "sma-cross"
    }

    fn init(&mut self, ctx: &mut StrategyContext<'_, '_>) {
        ctx.update_universe([self.instrument.clone()]);
    }

    fn handle_bar(&mut self, ctx: &mut StrategyContext<'_, '_>, bars: &BarSnapshot) {
        let Some(bar) = bars.get(&self.instrument) else {
            return;
        };
        self.closes.push_back(bar.close);
        if self.closes.len() > self.slow {
            self.closes.pop_front();
        }
        if self.closes.len() < self.slow {
            return;
        }

        let above = self.mean_of_last(self.fast) > self.mean_of_last(self.slow);
        let crossed = self.was_above.is_some_and(|was| was != above);
        self.was_above = Some(above);
        if !crossed {
            return;
        }

        let outcome = if above {
            ctx.order_target_percent(self.instrument.clone(), 1.0)
        } else {
            ctx.order_target_value(self.instrument.clone(), 0.0)
        };
        match outcome {
            Ok(order) => tracing::debug!(above, ?order, "crossover"),
            Err(rejected) => tracing::warn!(%rejected, "crossover order refused"),
        }
    }
}

// ── No-op ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct Noop;

impl Strategy for Noop {
    fn name(&self) -> &str {
        "noop"
    }

    fn handle_bar(&mut self, _ctx: &mut StrategyContext<'_, '_>, _bars: &BarSnapshot) {}
}
