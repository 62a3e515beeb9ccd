//! Per-strategy trade statistics.

use super::position::{ExitReason, Trade};

#[derive(Debug, Clone, PartialEq)]
pub struct TradeStats {
    pub total_trades: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub trades_breakeven: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_win_pct: f64,
    pub avg_loss_pct: f64,
    pub largest_win_pct: f64,
    pub largest_loss_pct: f64,
    pub total_pnl_pct: f64,
    pub avg_pnl_pct: f64,
    /// Mean holding time in seconds.
    pub avg_hold_secs: f64,
    pub stop_losses: usize,
    pub take_profits: usize,
    pub reversals: usize,
    pub max_holds: usize,
}

impl TradeStats {
    pub fn compute(trades: &[Trade]) -> Self {
        let mut trades_won = 0usize;
        let mut trades_lost = 0usize;
        let mut trades_breakeven = 0usize;
        let mut total_wins = 0.0_f64;
        let mut total_losses = 0.0_f64;
        let mut largest_win = 0.0_f64;
        let mut largest_loss = 0.0_f64;
        let mut total_hold_ms = 0i64;
        let mut reasons = [0usize; 4];

        for trade in trades {
            let pnl = trade.pnl_pct;
            if pnl > 0.0 {
                trades_won += 1;
                total_wins += pnl;
                if pnl > largest_win {
                    largest_win = pnl;
                }
            } else if pnl < 0.0 {
                trades_lost += 1;
                total_losses += pnl.abs();
                if pnl.abs() > largest_loss {
                    largest_loss = pnl.abs();
                }
            } else {
                trades_breakeven += 1;
            }

            total_hold_ms += trade.duration_ms();
            let slot = match trade.exit_reason {
                ExitReason::StopLoss => 0,
                ExitReason::TakeProfit => 1,
                ExitReason::Reversal => 2,
                ExitReason::MaxHold => 3,
            };
            reasons[slot] += 1;
        }

        let total_trades = trades.len();
        let win_rate = if total_trades > 0 {
            trades_won as f64 / total_trades as f64
        } else {
            0.0
        };

        let profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let avg_win_pct = if trades_won > 0 {
            total_wins / trades_won as f64
        } else {
            0.0
        };

        let avg_loss_pct = if trades_lost > 0 {
            total_losses / trades_lost as f64
        } else {
            0.0
        };

        let total_pnl_pct = total_wins - total_losses;
        let (avg_pnl_pct, avg_hold_secs) = if total_trades > 0 {
            (
                total_pnl_pct / total_trades as f64,
                total_hold_ms as f64 / 1000.0 / total_trades as f64,
            )
        } else {
            (0.0, 0.0)
        };

        Self {
            total_trades,
            trades_won,
            trades_lost,
            trades_breakeven,
            win_rate,
            profit_factor,
            avg_win_pct,
            avg_loss_pct,
            largest_win_pct: largest_win,
            largest_loss_pct: largest_loss,
            total_pnl_pct,
            avg_pnl_pct,
            avg_hold_secs,
            stop_losses: reasons[0],
            take_profits: reasons[1],
            reversals: reasons[2],
            max_holds: reasons[3],
        }
    }
}
