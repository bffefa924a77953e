//! Wallet-Dienst: Kontostand beim Join, einmalige Abschlussbuchung beim Ende

use crate::session::{Denomination, Role};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("Wallet service unavailable: {0}")]
    Unavailable(String),

    #[error("Transaction rejected: {0}")]
    Rejected(String),

    #[error("Session already finalized: {0}")]
    AlreadyFinalized(String),
}

/// Abschlussbuchung einer Session für einen Teilnehmer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeRequest {
    pub session_id: String,
    pub participant_id: String,
    pub role: Role,
    pub denomination: Denomination,
    pub amount: f64,
    pub duration_secs: u64,
    pub billed_minutes: u64,
    pub balance_before: f64,
    pub balance_after: f64,
}

/// Gebuchte Transaktion
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletTransaction {
    pub request: FinalizeRequest,
    pub recorded_at: DateTime<Utc>,
}

#[async_trait]
pub trait WalletService: Send + Sync {
    /// Aktueller Kontostand in der gegebenen Stückelung
    async fn balance(
        &self,
        participant_id: &str,
        denomination: Denomination,
    ) -> Result<f64, WalletError>;

    /// Bucht die Session. Wird pro Session und Teilnehmer genau einmal aufgerufen.
    async fn finalize(&self, request: FinalizeRequest) -> Result<(), WalletError>;
}

// ============================================================================
// IN-MEMORY WALLET
// ============================================================================

/// Wallet im Prozess, für Demo und Tests
#[derive(Debug, Default)]
pub struct InMemoryWallet {
    balances: RwLock<HashMap<(String, Denomination), f64>>,
    transactions: RwLock<Vec<WalletTransaction>>,
}

impl InMemoryWallet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balance(
        self,
        participant_id: impl Into<String>,
        denomination: Denomination,
        balance: f64,
    ) -> Self {
        self.balances
            .write()
            .insert((participant_id.into(), denomination), balance);
        self
    }

    pub fn transactions(&self) -> Vec<WalletTransaction> {
        self.transactions.read().clone()
    }
}

#[async_trait]
impl WalletService for InMemoryWallet {
    async fn balance(
        &self,
        participant_id: &str,
        denomination: Denomination,
    ) -> Result<f64, WalletError> {
        Ok(self
            .balances
            .read()
            .get(&(participant_id.to_string(), denomination))
            .copied()
            .unwrap_or(0.0))
    }

    async fn finalize(&self, request: FinalizeRequest) -> Result<(), WalletError> {
        let mut transactions = self.transactions.write();
        let duplicate = transactions.iter().any(|t| {
            t.request.session_id == request.session_id
                && t.request.participant_id == request.participant_id
        });
        if duplicate {
            return Err(WalletError::AlreadyFinalized(request.session_id));
        }

        tracing::info!(
            "Finalized session {} for {}: {} {} ({} -> {})",
            request.session_id,
            request.participant_id,
            request.amount,
            request.denomination,
            request.balance_before,
            request.balance_after
        );

        self.balances.write().insert(
            (request.participant_id.clone(), request.denomination),
            request.balance_after,
        );
        transactions.push(WalletTransaction {
            request,
            recorded_at: Utc::now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(session_id: &str) -> FinalizeRequest {
        FinalizeRequest {
            session_id: session_id.to_string(),
            participant_id: "alice".to_string(),
            role: Role::Payer,
            denomination: Denomination::Bronze,
            amount: 12.0,
            duration_secs: 185,
            billed_minutes: 3,
            balance_before: 100.0,
            balance_after: 88.0,
        }
    }

    #[tokio::test]
    async fn test_finalize_once_per_session() {
        let wallet = InMemoryWallet::new().with_balance("alice", Denomination::Bronze, 100.0);
        assert_eq!(
            wallet.balance("alice", Denomination::Bronze).await,
            Ok(100.0)
        );

        wallet.finalize(request("s-1")).await.unwrap();
        assert_eq!(wallet.balance("alice", Denomination::Bronze).await, Ok(88.0));
        assert_eq!(
            wallet.finalize(request("s-1")).await,
            Err(WalletError::AlreadyFinalized("s-1".to_string()))
        );
        assert_eq!(wallet.transactions().len(), 1);
    }

    #[test]
    fn test_request_wire_format() {
        let json = serde_json::to_value(request("s-1")).unwrap();
        assert_eq!(json["sessionId"], "s-1");
        assert_eq!(json["role"], "payer");
        assert_eq!(json["denomination"], "bronze");
        assert_eq!(json["balanceAfter"], 88.0);
    }
}
