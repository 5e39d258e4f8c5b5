use crate::transport::SignalingState;
use serde::Serialize;

/// Where a peer stands in the offer/answer exchange, from the manager's side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NegotiationState {
    Stable,
    /// An offer task is creating and applying a local offer.
    MakingOffer,
    /// Local offer applied and sent.
    AwaitingAnswer,
    /// A remote offer was accepted; the answer is being produced.
    Answering,
}

/// Why an offer is wanted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferIntent {
    Renegotiate,
    IceRestart,
}

impl OfferIntent {
    pub fn ice_restart(self) -> bool {
        self == OfferIntent::IceRestart
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferDecision {
    /// Apply the offer and answer. `superseded_own` is set when a local offer
    /// was in flight or awaiting its answer and gets rolled back.
    Accept { superseded_own: bool },
    /// Impolite side in a collision: drop the offer silently.
    Ignore,
}

/// Perfect negotiation for one remote participant.
#[derive(Debug, Clone)]
pub struct Negotiation {
    polite: bool,
    state: NegotiationState,
    ignore_offer: bool,
    attempt: u64,
    restart_pending: bool,
}

impl Negotiation {
    pub fn new(polite: bool) -> Self {
        Self {
            polite,
            state: NegotiationState::Stable,
            ignore_offer: false,
            attempt: 0,
            restart_pending: false,
        }
    }

    pub fn polite(&self) -> bool {
        self.polite
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn making_offer(&self) -> bool {
        self.state == NegotiationState::MakingOffer
    }

    pub fn ignore_offer(&self) -> bool {
        self.ignore_offer
    }

    /// Sequence number of the latest offer attempt.
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn restart_pending(&self) -> bool {
        self.restart_pending
    }

    /// Starts an offer if both sides of the state are stable. A renegotiation
    /// that cannot start is dropped, since the link asks again once stable. An
    /// ICE restart is kept and handed back when negotiation settles.
    pub fn begin_offer(&mut self, intent: OfferIntent, signaling: SignalingState) -> bool {
        if self.state != NegotiationState::Stable || signaling != SignalingState::Stable {
            self.restart_pending |= intent.ice_restart();
            return false;
        }

        self.state = NegotiationState::MakingOffer;
        self.attempt += 1;
        if intent.ice_restart() {
            self.restart_pending = false;
        }
        true
    }

    /// The offer task for `attempt` ended. `applied` tells whether the local
    /// offer was set and sent. Stale attempts are ignored.
    pub fn finish_offer(&mut self, attempt: u64, applied: bool) -> Option<OfferIntent> {
        if self.state != NegotiationState::MakingOffer || attempt != self.attempt {
            return None;
        }

        if applied {
            self.state = NegotiationState::AwaitingAnswer;
            None
        } else {
            self.state = NegotiationState::Stable;
            self.take_restart()
        }
    }

    /// Collision check for an incoming offer.
    pub fn on_remote_offer(&mut self, signaling: SignalingState) -> OfferDecision {
        let collision = self.making_offer() || signaling != SignalingState::Stable;
        self.ignore_offer = !self.polite && collision;
        if self.ignore_offer {
            return OfferDecision::Ignore;
        }

        let superseded_own = matches!(
            self.state,
            NegotiationState::MakingOffer | NegotiationState::AwaitingAnswer
        );
        self.state = NegotiationState::Answering;
        OfferDecision::Accept { superseded_own }
    }

    /// The answer was sent, or producing it failed. Either way the exchange
    /// is over.
    pub fn finish_answer(&mut self) -> Option<OfferIntent> {
        if self.state == NegotiationState::Answering {
            self.state = NegotiationState::Stable;
        }
        self.settled()
    }

    /// A remote answer arrived; `applied` tells whether the link took it.
    /// The answer can overtake the report of the offer task that sent the
    /// offer, so an applied answer settles `MakingOffer` too and the task's
    /// late `finish_offer` is ignored.
    pub fn on_remote_answer(&mut self, applied: bool) -> Option<OfferIntent> {
        match self.state {
            NegotiationState::AwaitingAnswer => self.state = NegotiationState::Stable,
            NegotiationState::MakingOffer if applied => self.state = NegotiationState::Stable,
            _ => {}
        }
        self.settled()
    }

    /// A failed candidate is expected noise when it belongs to an offer we
    /// chose to ignore.
    pub fn candidate_failure_expected(&self) -> bool {
        self.ignore_offer
    }

    fn settled(&mut self) -> Option<OfferIntent> {
        if self.state == NegotiationState::Stable {
            self.take_restart()
        } else {
            None
        }
    }

    fn take_restart(&mut self) -> Option<OfferIntent> {
        std::mem::take(&mut self.restart_pending).then_some(OfferIntent::IceRestart)
    }
}
