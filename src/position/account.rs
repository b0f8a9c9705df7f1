//! The `Account` record (§3): per-user quote-currency balance.

#[derive(Debug, Clone)]
pub struct Account {
    pub user: String,
    pub available: i64,
    pub locked_margin: i64,
    pub realized_pnl: i64,
    pub unrealized_pnl: i64,
}

impl Account {
    pub fn new(user: &str) -> Self {
        Self {
            user: user.to_string(),
            available: 0,
            locked_margin: 0,
            realized_pnl: 0,
            unrealized_pnl: 0,
        }
    }

    /// `available + locked_margin + unrealized_pnl` (§3).
    pub fn equity(&self) -> i64 {
        self.available + self.locked_margin + self.unrealized_pnl
    }
}
