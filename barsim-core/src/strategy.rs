//! Strategy trait: the user code driven by the event clock.

use crate::domain::BarSnapshot;
use crate::engine::environment::StrategyContext;

/// Callbacks invoked by `run_backtest`, in this order:
///
/// `init` once, then per trading date `before_trading`, `handle_bar` for each
/// bar of the date, `after_trading`.
///
/// Strategies see the market through the context and act only by entering or
/// cancelling orders. Only `handle_bar` is required.
pub trait Strategy {
    fn name(&self) -> &str {
        "strategy"
    }

    fn init(&mut self, _ctx: &mut StrategyContext<'_, '_>) {}

    fn before_trading(&mut self, _ctx: &mut StrategyContext<'_, '_>) {}

    fn handle_bar(&mut self, ctx: &mut StrategyContext<'_, '_>, bars: &BarSnapshot);

    fn after_trading(&mut self, _ctx: &mut StrategyContext<'_, '_>) {}
}

impl<S: Strategy + ?Sized> Strategy for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn init(&mut self, ctx: &mut StrategyContext<'_, '_>) {
        (**self).init(ctx)
    }

    fn before_trading(&mut self, ctx: &mut StrategyContext<'_, '_>) {
        (**self).before_trading(ctx)
    }

    fn handle_bar(&mut self, ctx: &mut StrategyContext<'_, '_>, bars: &BarSnapshot) {
        (**self).handle_bar(ctx, bars)
    }

    fn after_trading(&mut self, ctx: &mut StrategyContext<'_, '_>) {
        (**self).after_trading(ctx)
    }
}
