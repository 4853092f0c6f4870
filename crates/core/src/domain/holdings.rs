use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Buy,
    Sell,
}

impl FromStr for TransactionKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Ok(Self::Buy),
            "sell" => Ok(Self::Sell),
            other => anyhow::bail!("unknown transaction type: {other}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub stock_id: i64,
    pub kind: TransactionKind,
    pub quantity: Decimal,
    pub price: Decimal,
    pub executed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Position {
    quantity: Decimal,
    avg_price: Decimal,
}

impl Position {
    fn apply(&mut self, tx: &Transaction) {
        match tx.kind {
            TransactionKind::Buy => {
                let new_qty = self.quantity + tx.quantity;
                if new_qty > Decimal::ZERO {
                    self.avg_price =
                        (self.avg_price * self.quantity + tx.price * tx.quantity) / new_qty;
                }
                self.quantity = new_qty;
            }
            TransactionKind::Sell => {
                // Selling keeps the average cost of what remains.
                self.quantity -= tx.quantity;
                if self.quantity <= Decimal::ZERO {
                    self.quantity = Decimal::ZERO;
                    self.avg_price = Decimal::ZERO;
                }
            }
        }
    }

    fn cost(&self) -> Decimal {
        if self.quantity <= Decimal::ZERO {
            Decimal::ZERO
        } else {
            self.quantity * self.avg_price
        }
    }
}

/// Replays each stock's history in chronological order; equal timestamps keep input order.
fn replay(transactions: &[Transaction]) -> BTreeMap<i64, Position> {
    let mut by_stock: BTreeMap<i64, Vec<&Transaction>> = BTreeMap::new();
    for tx in transactions {
        by_stock.entry(tx.stock_id).or_default().push(tx);
    }

    by_stock
        .into_iter()
        .map(|(stock_id, mut history)| {
            history.sort_by_key(|tx| tx.executed_at);
            let mut position = Position::default();
            for tx in history {
                position.apply(tx);
            }
            (stock_id, position)
        })
        .collect()
}

/// Sum of quantity x average purchase price over the still-open positions in `transactions`.
pub fn holdings_cost(transactions: &[Transaction]) -> Decimal {
    replay(transactions).values().map(Position::cost).sum()
}

/// Stock IDs whose replayed position is still open.
pub fn open_stock_ids(transactions: &[Transaction]) -> Vec<i64> {
    replay(transactions)
        .into_iter()
        .filter(|(_, position)| position.quantity > Decimal::ZERO)
        .map(|(id, _)| id)
        .collect()
}

/// `None` means unconstrained. Never negative.
pub fn remaining_budget(total_budget: Option<Decimal>, holdings_cost: Decimal) -> Option<Decimal> {
    total_budget.map(|total| (total - holdings_cost).max(Decimal::ZERO))
}
