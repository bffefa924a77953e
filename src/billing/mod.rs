//! Billing Module - Coin-Abrechnung pro Minute
//!
//! Dieses Modul verwaltet:
//! - den lokalen Ledger (Anzeige, Warnung, Beendigung bei 0)
//! - die Schnittstelle zum Wallet-Dienst

mod ledger;
mod wallet;

pub use ledger::{CoinLedger, LedgerEvent};
pub use wallet::{FinalizeRequest, InMemoryWallet, WalletError, WalletService, WalletTransaction};
