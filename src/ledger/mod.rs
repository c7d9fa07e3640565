// Ledger engine

mod balances;
mod chain;

pub use balances::BalanceTable;
pub use chain::Chain;
