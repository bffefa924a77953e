//! Verbindungs-Lebenszyklus einer Session
//!
//! Idle → Joining → Negotiating → Connected → Ended. Einzige Rückkante ist
//! die Renegotiation (Connected → Negotiating). Ended ist endgültig.
//! Offers erstellt nur der Offerer. Der Answerer fordert eine Renegotiation
//! beim Offerer an, damit kein eigenes Offer mit einem fremden kollidiert.
//! Remote ICE Candidates werden genau einmal angewendet und gepuffert,
//! solange noch keine Remote Description gesetzt ist.

use super::types::ConnectionState;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },

    #[error("Session already ended")]
    Ended,
}

/// Entscheidung für ein eingehendes Offer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferDecision {
    /// Offer annehmen und Answer erzeugen
    Accept,
    /// Beide Seiten haben gleichzeitig ein Offer gesendet, unseres gewinnt
    IgnoreGlare,
    /// Session nicht (mehr) aktiv
    Drop,
}

/// Nächster Schritt einer gewünschten Renegotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Renegotiation {
    /// Wir erstellen jetzt ein Offer
    Offer,
    /// Der Offerer soll ein Offer erstellen
    Request,
    /// Es läuft bereits eine Verhandlung, danach geht es weiter
    Queued,
}

/// Ausgang einer fehlgeschlagenen Verhandlung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationOutcome {
    /// Der bestehende Link bleibt, zurück nach Connected
    Restored,
    /// Der Link kam nie zustande
    Unrecoverable,
    /// Session bereits beendet
    Ignored,
}

/// Zustandsmaschine für Join, Offer/Answer und Candidate-Austausch
#[derive(Debug)]
pub struct ConnectionLifecycle {
    state: ConnectionState,
    offerer: bool,
    link_established: bool,
    local_offer_pending: bool,
    remote_description_set: bool,
    renegotiation_queued: bool,
    pending_candidates: Vec<String>,
    applied_candidates: HashSet<String>,
}

impl ConnectionLifecycle {
    pub fn new(offerer: bool) -> Self {
        Self {
            state: ConnectionState::Idle,
            offerer,
            link_established: false,
            local_offer_pending: false,
            remote_description_set: false,
            renegotiation_queued: false,
            pending_candidates: Vec::new(),
            applied_candidates: HashSet::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_ended(&self) -> bool {
        self.state == ConnectionState::Ended
    }

    pub fn is_offerer(&self) -> bool {
        self.offerer
    }

    pub fn link_established(&self) -> bool {
        self.link_established
    }

    /// Anzahl der gepufferten Candidates (noch ohne Remote Description)
    pub fn pending_candidates(&self) -> usize {
        self.pending_candidates.len()
    }

    /// Führt einen Zustandswechsel durch, gibt den vorherigen Zustand zurück
    pub fn transition(&mut self, to: ConnectionState) -> Result<ConnectionState, LifecycleError> {
        use ConnectionState::*;

        let from = self.state;
        if from == Ended {
            return Err(LifecycleError::Ended);
        }

        let allowed = matches!(
            (from, to),
            (Idle, Joining)
                | (Joining, Negotiating)
                | (Negotiating, Negotiating)
                | (Negotiating, Connected)
                | (Connected, Negotiating)
                | (_, Ended)
        );

        if !allowed {
            return Err(LifecycleError::InvalidTransition { from, to });
        }

        self.state = to;
        Ok(from)
    }

    /// Idle → Joining
    pub fn begin_join(&mut self) -> Result<(), LifecycleError> {
        self.transition(ConnectionState::Joining).map(|_| ())
    }

    /// Der Peer ist beigetreten. Gibt `true` zurück, wenn wir das Offer erstellen.
    pub fn on_peer_joined(&mut self) -> bool {
        if self.state != ConnectionState::Joining || !self.offerer {
            return false;
        }
        self.state = ConnectionState::Negotiating;
        self.local_offer_pending = true;
        true
    }

    /// Startet eine Renegotiation aus Connected heraus.
    ///
    /// Als Answerer wird nur eine Anfrage an den Offerer fällig. Läuft
    /// bereits eine Verhandlung, wird die Renegotiation vorgemerkt.
    pub fn begin_renegotiation(&mut self) -> Result<Renegotiation, LifecycleError> {
        match self.state {
            ConnectionState::Connected | ConnectionState::Negotiating if !self.offerer => {
                Ok(Renegotiation::Request)
            }
            ConnectionState::Connected => {
                self.state = ConnectionState::Negotiating;
                self.local_offer_pending = true;
                Ok(Renegotiation::Offer)
            }
            ConnectionState::Negotiating => {
                self.renegotiation_queued = true;
                Ok(Renegotiation::Queued)
            }
            ConnectionState::Ended => Err(LifecycleError::Ended),
            from => Err(LifecycleError::InvalidTransition {
                from,
                to: ConnectionState::Negotiating,
            }),
        }
    }

    /// Holt eine vorgemerkte Renegotiation ab, sobald wir wieder Connected sind
    pub fn take_queued_renegotiation(&mut self) -> bool {
        if self.state == ConnectionState::Connected && self.renegotiation_queued {
            self.renegotiation_queued = false;
            self.state = ConnectionState::Negotiating;
            self.local_offer_pending = true;
            return true;
        }
        false
    }

    pub fn on_remote_offer(&mut self) -> OfferDecision {
        match self.state {
            ConnectionState::Idle | ConnectionState::Ended => OfferDecision::Drop,
            // Kollision: unser Offer gewinnt, der Peer wartet auf unser Answer
            _ if self.local_offer_pending => OfferDecision::IgnoreGlare,
            _ => {
                self.state = ConnectionState::Negotiating;
                self.remote_description_set = false;
                OfferDecision::Accept
            }
        }
    }

    /// Ein Offer/Answer-Schritt ist gescheitert
    pub fn on_negotiation_failed(&mut self) -> NegotiationOutcome {
        if self.is_ended() {
            return NegotiationOutcome::Ignored;
        }
        self.local_offer_pending = false;
        if !self.link_established {
            return NegotiationOutcome::Unrecoverable;
        }
        // bisherige Descriptions gelten weiter
        self.remote_description_set = true;
        self.state = ConnectionState::Connected;
        NegotiationOutcome::Restored
    }

    /// Lokales Offer ist erstellt. `false` wenn es nicht mehr gesendet werden soll.
    pub fn on_local_offer_created(&mut self) -> bool {
        !self.is_ended() && self.local_offer_pending
    }

    /// Answer-SDP darf nur auf ein ausstehendes eigenes Offer angewendet werden
    pub fn accepts_answer(&self) -> bool {
        !self.is_ended() && self.local_offer_pending
    }

    /// Wir haben ein Answer erzeugt (Remote Description ist gesetzt)
    pub fn on_answer_created(&mut self) -> Vec<String> {
        if self.is_ended() {
            return Vec::new();
        }
        self.remote_description_set = true;
        self.complete_round();
        self.flush_candidates()
    }

    /// Das Answer des Peers wurde angewendet
    pub fn on_answer_applied(&mut self) -> Vec<String> {
        if self.is_ended() {
            return Vec::new();
        }
        self.local_offer_pending = false;
        self.remote_description_set = true;
        self.complete_round();
        self.flush_candidates()
    }

    /// Die Peer-Verbindung meldet "connected". `true` bei Wechsel nach Connected.
    pub fn on_link_connected(&mut self) -> bool {
        if self.is_ended() {
            return false;
        }
        self.link_established = true;
        if self.state == ConnectionState::Negotiating && !self.local_offer_pending {
            self.state = ConnectionState::Connected;
            return true;
        }
        false
    }

    /// Prüft einen Remote Candidate. `Some` heißt: jetzt anwenden.
    pub fn accept_remote_candidate(&mut self, candidate: String) -> Option<String> {
        if self.is_ended() {
            tracing::debug!("Discarding ICE candidate, session already ended");
            return None;
        }
        if self.applied_candidates.contains(&candidate) {
            tracing::debug!("Ignoring duplicate ICE candidate");
            return None;
        }
        if !self.remote_description_set {
            if !self.pending_candidates.contains(&candidate) {
                self.pending_candidates.push(candidate);
            }
            return None;
        }
        self.applied_candidates.insert(candidate.clone());
        Some(candidate)
    }

    /// Ended. Gibt `true` zurück, wenn die Session gerade erst beendet wurde.
    pub fn end(&mut self) -> bool {
        if self.is_ended() {
            return false;
        }
        self.state = ConnectionState::Ended;
        self.local_offer_pending = false;
        self.renegotiation_queued = false;
        self.pending_candidates.clear();
        true
    }

    fn complete_round(&mut self) {
        // Bei einer Renegotiation steht der Link bereits
        if self.state == ConnectionState::Negotiating
            && self.link_established
            && !self.local_offer_pending
        {
            self.state = ConnectionState::Connected;
        }
    }

    fn flush_candidates(&mut self) -> Vec<String> {
        let mut ready = Vec::new();
        for candidate in std::mem::take(&mut self.pending_candidates) {
            if self.applied_candidates.insert(candidate.clone()) {
                ready.push(candidate);
            }
        }
        ready
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn connected(offerer: bool) -> ConnectionLifecycle {
        let mut lc = ConnectionLifecycle::new(offerer);
        lc.begin_join().unwrap();
        if offerer {
            assert!(lc.on_peer_joined());
            lc.on_answer_applied();
        } else {
            assert_eq!(lc.on_remote_offer(), OfferDecision::Accept);
            lc.on_answer_created();
        }
        assert!(lc.on_link_connected());
        assert_eq!(lc.state(), ConnectionState::Connected);
        lc
    }

    #[test]
    fn test_offerer_flow() {
        let mut lc = ConnectionLifecycle::new(true);
        lc.begin_join().unwrap();
        assert_eq!(lc.state(), ConnectionState::Joining);

        assert!(lc.on_peer_joined());
        assert_eq!(lc.state(), ConnectionState::Negotiating);
        assert!(lc.on_local_offer_created());
        assert!(lc.accepts_answer());

        lc.on_answer_applied();
        assert_eq!(lc.state(), ConnectionState::Negotiating);
        assert!(lc.on_link_connected());
        assert_eq!(lc.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_answerer_waits_for_offer() {
        let mut lc = ConnectionLifecycle::new(false);
        lc.begin_join().unwrap();
        assert!(!lc.on_peer_joined());
        assert_eq!(lc.state(), ConnectionState::Joining);

        assert_eq!(lc.on_remote_offer(), OfferDecision::Accept);
        assert_eq!(lc.state(), ConnectionState::Negotiating);
        assert!(!lc.accepts_answer());
    }

    #[test]
    fn test_backward_transitions_are_rejected() {
        let mut lc = ConnectionLifecycle::new(true);
        assert_eq!(
            lc.transition(ConnectionState::Connected),
            Err(LifecycleError::InvalidTransition {
                from: ConnectionState::Idle,
                to: ConnectionState::Connected,
            })
        );
        lc.begin_join().unwrap();
        assert!(lc.transition(ConnectionState::Idle).is_err());
    }

    #[test]
    fn test_ended_is_absorbing() {
        let mut lc = connected(true);
        assert!(lc.end());
        assert!(!lc.end());
        assert_eq!(lc.transition(ConnectionState::Joining), Err(LifecycleError::Ended));
        assert_eq!(lc.begin_renegotiation(), Err(LifecycleError::Ended));
        assert_eq!(lc.on_remote_offer(), OfferDecision::Drop);
        assert!(!lc.on_link_connected());
        assert_eq!(lc.state(), ConnectionState::Ended);
    }

    #[test]
    fn test_candidates_buffered_until_remote_description() {
        let mut lc = ConnectionLifecycle::new(true);
        lc.begin_join().unwrap();
        lc.on_peer_joined();

        assert_eq!(lc.accept_remote_candidate("c1".to_string()), None);
        assert_eq!(lc.accept_remote_candidate("c1".to_string()), None);
        assert_eq!(lc.accept_remote_candidate("c2".to_string()), None);
        assert_eq!(lc.pending_candidates(), 2);

        let flushed = lc.on_answer_applied();
        assert_eq!(flushed, vec!["c1".to_string(), "c2".to_string()]);

        assert_eq!(
            lc.accept_remote_candidate("c3".to_string()),
            Some("c3".to_string())
        );
    }

    #[test]
    fn test_duplicate_candidate_applied_once() {
        let mut lc = connected(false);
        assert_eq!(
            lc.accept_remote_candidate("c1".to_string()),
            Some("c1".to_string())
        );
        assert_eq!(lc.accept_remote_candidate("c1".to_string()), None);
    }

    #[test]
    fn test_candidates_discarded_after_close() {
        let mut lc = connected(true);
        lc.end();
        assert_eq!(lc.accept_remote_candidate("late".to_string()), None);
        assert_eq!(lc.pending_candidates(), 0);
    }

    #[test]
    fn test_renegotiation_returns_to_connected() {
        let mut lc = connected(true);
        assert_eq!(lc.begin_renegotiation(), Ok(Renegotiation::Offer));
        assert_eq!(lc.state(), ConnectionState::Negotiating);

        lc.on_answer_applied();
        assert_eq!(lc.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_answerer_requests_renegotiation() {
        let mut lc = connected(false);
        assert_eq!(lc.begin_renegotiation(), Ok(Renegotiation::Request));
        assert_eq!(lc.state(), ConnectionState::Connected);
        assert!(!lc.accepts_answer());

        assert_eq!(lc.on_remote_offer(), OfferDecision::Accept);
        lc.on_answer_created();
        assert_eq!(lc.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_renegotiation_while_negotiating_is_queued() {
        let mut lc = connected(true);
        assert_eq!(lc.begin_renegotiation(), Ok(Renegotiation::Offer));
        assert_eq!(lc.begin_renegotiation(), Ok(Renegotiation::Queued));

        lc.on_answer_applied();
        assert_eq!(lc.state(), ConnectionState::Connected);
        assert!(lc.take_queued_renegotiation());
        assert_eq!(lc.state(), ConnectionState::Negotiating);
        assert!(!lc.take_queued_renegotiation());
    }

    #[test]
    fn test_glare_resolution() {
        // Offerer behält sein Offer und ignoriert das fremde
        let mut offerer = connected(true);
        offerer.begin_renegotiation().unwrap();
        assert_eq!(offerer.on_remote_offer(), OfferDecision::IgnoreGlare);
        assert!(offerer.accepts_answer());

        // Answerer hat nie ein eigenes Offer offen und nimmt an
        let mut answerer = connected(false);
        answerer.begin_renegotiation().unwrap();
        assert_eq!(answerer.on_remote_offer(), OfferDecision::Accept);
        answerer.on_answer_created();
        assert_eq!(answerer.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_failed_renegotiation_restores_connected() {
        let mut lc = connected(true);
        lc.begin_renegotiation().unwrap();
        lc.begin_renegotiation().unwrap();

        assert_eq!(lc.on_negotiation_failed(), NegotiationOutcome::Restored);
        assert_eq!(lc.state(), ConnectionState::Connected);
        assert!(!lc.accepts_answer());
        assert_eq!(
            lc.accept_remote_candidate("c1".to_string()),
            Some("c1".to_string())
        );

        // vorgemerkte Renegotiation läuft danach erneut an
        assert!(lc.take_queued_renegotiation());
        assert_eq!(lc.state(), ConnectionState::Negotiating);
    }

    #[test]
    fn test_failed_initial_negotiation_is_unrecoverable() {
        let mut lc = ConnectionLifecycle::new(true);
        lc.begin_join().unwrap();
        lc.on_peer_joined();
        assert_eq!(lc.on_negotiation_failed(), NegotiationOutcome::Unrecoverable);

        lc.end();
        assert_eq!(lc.on_negotiation_failed(), NegotiationOutcome::Ignored);
    }
}
