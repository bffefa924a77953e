//! Coin-Ledger: misst verstrichene Zeit in ganzen Minuten ab
//!
//! Die zahlende Seite verliert pro Minute `spend_rate` Coins (nie unter 0),
//! die verdienende Seite erhält 75% davon. Minuten werden genau einmal und
//! monoton abgerechnet. Der lokale Stand ist nur Anzeige, maßgeblich ist die
//! einmalige Abschlussbuchung beim Wallet-Dienst.

use super::wallet::FinalizeRequest;
use crate::session::{Denomination, Role};
use serde::Serialize;

/// Ereignis aus `CoinLedger::advance`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum LedgerEvent {
    /// Neue Minuten abgerechnet, `running` ist Restguthaben bzw. Verdienst
    #[serde(rename_all = "camelCase")]
    Advanced {
        minute: u64,
        delta: u64,
        running: f64,
    },
    /// Restguthaben ist erstmals auf oder unter die Warnschwelle gefallen
    LowBalance { remaining: f64 },
    /// Guthaben aufgebraucht, die Session muss beendet werden
    Exhausted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoinLedger {
    role: Role,
    denomination: Denomination,
    rate_per_minute: f64,
    opening_balance: f64,
    /// Restguthaben (Payer) oder Verdienst (Earner)
    running: f64,
    last_tick_minute: u64,
    low_balance_warned: bool,
    exhausted: bool,
    /// Letzter vom Wallet-Dienst gepushter Stand
    wallet_balance: Option<f64>,
}

impl CoinLedger {
    pub fn payer(denomination: Denomination, opening_balance: f64) -> Self {
        let opening_balance = opening_balance.max(0.0);
        Self {
            role: Role::Payer,
            denomination,
            rate_per_minute: denomination.spend_rate(),
            opening_balance,
            running: opening_balance,
            last_tick_minute: 0,
            low_balance_warned: false,
            exhausted: false,
            wallet_balance: None,
        }
    }

    pub fn earner(denomination: Denomination, opening_balance: f64) -> Self {
        Self {
            role: Role::Earner,
            denomination,
            rate_per_minute: denomination.earn_rate(),
            opening_balance,
            running: 0.0,
            last_tick_minute: 0,
            low_balance_warned: false,
            exhausted: false,
            wallet_balance: None,
        }
    }

    /// Ledger für die Rolle, `None` wenn nicht abgerechnet wird
    pub fn for_role(role: Role, denomination: Denomination, opening_balance: f64) -> Option<Self> {
        match role {
            Role::Payer => Some(Self::payer(denomination, opening_balance)),
            Role::Earner => Some(Self::earner(denomination, opening_balance)),
            Role::Neutral => None,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn denomination(&self) -> Denomination {
        self.denomination
    }

    pub fn rate_per_minute(&self) -> f64 {
        self.rate_per_minute
    }

    pub fn opening_balance(&self) -> f64 {
        self.opening_balance
    }

    /// Restguthaben (Payer) oder bisheriger Verdienst (Earner)
    pub fn running(&self) -> f64 {
        self.running
    }

    pub fn last_tick_minute(&self) -> u64 {
        self.last_tick_minute
    }

    pub fn billed_minutes(&self) -> u64 {
        self.last_tick_minute
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn wallet_balance(&self) -> Option<f64> {
        self.wallet_balance
    }

    /// Rechnet alle vollen Minuten bis `elapsed_secs` ab
    pub fn advance(&mut self, elapsed_secs: u64) -> Vec<LedgerEvent> {
        let minute = elapsed_secs / 60;
        if minute <= self.last_tick_minute {
            return Vec::new();
        }

        let delta = minute - self.last_tick_minute;
        self.last_tick_minute = minute;

        let mut events = Vec::new();
        match self.role {
            Role::Payer => {
                self.running = (self.running - delta as f64 * self.rate_per_minute).max(0.0);
                events.push(LedgerEvent::Advanced {
                    minute,
                    delta,
                    running: self.running,
                });

                if !self.low_balance_warned
                    && self.running > 0.0
                    && self.running <= self.denomination.low_balance_threshold()
                {
                    self.low_balance_warned = true;
                    tracing::warn!(
                        "Low balance: {} {} remaining",
                        self.running,
                        self.denomination
                    );
                    events.push(LedgerEvent::LowBalance {
                        remaining: self.running,
                    });
                }

                if self.running <= 0.0 && !self.exhausted {
                    self.exhausted = true;
                    tracing::warn!("Balance exhausted after {} minute(s)", minute);
                    events.push(LedgerEvent::Exhausted);
                }
            }
            Role::Earner => {
                self.running += delta as f64 * self.rate_per_minute;
                events.push(LedgerEvent::Advanced {
                    minute,
                    delta,
                    running: self.running,
                });
            }
            Role::Neutral => {}
        }

        tracing::debug!(
            "Ledger advanced to minute {} (+{}), running {}",
            minute,
            delta,
            self.running
        );
        events
    }

    /// Übernimmt einen Push des Wallet-Dienstes, ohne die Anzeige zu überschreiben
    pub fn record_wallet_push(&mut self, balance: f64) {
        self.wallet_balance = Some(balance);
    }

    /// Abgerechneter Betrag (ausgegeben bzw. verdient)
    pub fn amount(&self) -> f64 {
        match self.role {
            Role::Payer => self.opening_balance - self.running,
            _ => self.running,
        }
    }

    pub fn balance_after(&self) -> f64 {
        match self.role {
            Role::Payer => self.running,
            _ => self.opening_balance + self.running,
        }
    }

    pub fn finalize_request(
        &self,
        session_id: &str,
        participant_id: &str,
        duration_secs: u64,
    ) -> FinalizeRequest {
        FinalizeRequest {
            session_id: session_id.to_string(),
            participant_id: participant_id.to_string(),
            role: self.role,
            denomination: self.denomination,
            amount: self.amount(),
            duration_secs,
            billed_minutes: self.billed_minutes(),
            balance_before: self.opening_balance,
            balance_after: self.balance_after(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
