//! Reaction Sampler.
//!
//! Every window's return is measured from the same baseline (`pre_event`)
//! price, so later windows show cumulative drift since the event rather than
//! drift between consecutive windows.

use chrono::{DateTime, Duration, Utc};
use corelib::{Asset, Event, PendingReason, ReactionKey, WindowReaction, WindowSpec};

use crate::config::WindowSet;
use crate::prices::PriceStore;
use crate::reactions::ReactionStore;

#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    Resolved(WindowReaction),
    Pending(PendingReason),
}

impl Sample {
    pub fn is_pending(&self) -> bool {
        matches!(self, Sample::Pending(_))
    }
}

/// `(post - baseline) / baseline * 100`; undefined for a non-positive baseline.
pub fn percent_return(baseline: f64, post: f64) -> Option<f64> {
    if !baseline.is_finite() || !post.is_finite() || baseline <= 0.0 {
        return None;
    }
    Some((post - baseline) / baseline * 100.0)
}

pub struct ReactionSampler<'a> {
    prices: &'a PriceStore,
    reactions: &'a ReactionStore,
    windows: &'a WindowSet,
    tolerance: Duration,
}

impl<'a> ReactionSampler<'a> {
    pub fn new(
        prices: &'a PriceStore,
        reactions: &'a ReactionStore,
        windows: &'a WindowSet,
        tolerance: Duration,
    ) -> Self {
        Self {
            prices,
            reactions,
            windows,
            tolerance,
        }
    }

    /// Resolves one (event, asset, window) cell, storing the reaction the
    /// first time it resolves. Never blocks and never synthesizes a price.
    pub fn sample(
        &self,
        event: &Event,
        asset: &Asset,
        window: &WindowSpec,
        now: DateTime<Utc>,
    ) -> Sample {
        let key = ReactionKey::new(event.id, asset.ticker.clone(), window.name.clone());
        if let Some(existing) = self.reactions.get(&key) {
            return Sample::Resolved(existing);
        }

        let target = window.target(event.anchor);
        if now < target {
            return Sample::Pending(PendingReason::NotElapsed);
        }

        let Some(snap) = self.prices.at_or_before(&asset.ticker, target, self.tolerance) else {
            return Sample::Pending(PendingReason::NoSnapshot);
        };

        let baseline_price = if self.windows.is_baseline(&window.name) {
            snap.price
        } else {
            let baseline_key = ReactionKey::new(
                event.id,
                asset.ticker.clone(),
                self.windows.baseline.name.clone(),
            );
            match self.reactions.get(&baseline_key) {
                Some(b) => b.post_price,
                None => return Sample::Pending(PendingReason::BaselinePending),
            }
        };

        let reaction = WindowReaction {
            event_id: event.id,
            ticker: asset.ticker.clone(),
            window: window.name.clone(),
            target_at: target,
            sampled_at: snap.at,
            baseline_price,
            post_price: snap.price,
            return_pct: percent_return(baseline_price, snap.price),
        };

        let (stored, _) = self.reactions.insert_if_absent(reaction);
        Sample::Resolved(stored)
    }

    /// Stored state of a cell. Never writes.
    pub fn peek(&self, event: &Event, asset: &Asset, window: &WindowSpec, now: DateTime<Utc>) -> Sample {
        let key = ReactionKey::new(event.id, asset.ticker.clone(), window.name.clone());
        match self.reactions.get(&key) {
            Some(r) => Sample::Resolved(r),
            None => Sample::Pending(self.pending_reason(event, asset, window, now)),
        }
    }

    /// Why a cell without a stored reaction is still pending, without sampling it.
    pub fn pending_reason(
        &self,
        event: &Event,
        asset: &Asset,
        window: &WindowSpec,
        now: DateTime<Utc>,
    ) -> PendingReason {
        if now < window.target(event.anchor) {
            return PendingReason::NotElapsed;
        }
        if !self.windows.is_baseline(&window.name) {
            let baseline_key = ReactionKey::new(
                event.id,
                asset.ticker.clone(),
                self.windows.baseline.name.clone(),
            );
            if !self.reactions.contains(&baseline_key) {
                return PendingReason::BaselinePending;
            }
        }
        PendingReason::NoSnapshot
    }
}
