//! Quest progress tracking.
//!
//! Counters move through IN_PROGRESS -> COMPLETED -> CLAIMED. Increments are
//! written by the award transaction itself, absolute observations come from an
//! external scheduler, and claims pay the reward through the ledger in the
//! same transaction.

use std::collections::HashMap;
use std::sync::Arc;

use labquest_domain::{
    GamificationEvent, ProgressionSnapshot, Quest, QuestEvent, QuestId, QuestProgress,
    QuestReward, QuestView, UserId,
};
use serde::Serialize;

use super::error::EngineError;
use crate::infrastructure::ports::{ClaimOutcome, ClockPort, QuestRepo, UserRepo};

/// Result of claiming a completed quest.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestClaim {
    pub progress: QuestProgress,
    pub reward: QuestReward,
    pub progression: ProgressionSnapshot,
    pub coins: i64,
    pub trophies: i64,
    pub events: Vec<GamificationEvent>,
}

/// Result of pushing an observed value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservedProgress {
    pub progress: QuestProgress,
    pub events: Vec<GamificationEvent>,
}

pub struct QuestTracker {
    users: Arc<dyn UserRepo>,
    quests: Arc<dyn QuestRepo>,
    clock: Arc<dyn ClockPort>,
}

impl QuestTracker {
    pub fn new(
        users: Arc<dyn UserRepo>,
        quests: Arc<dyn QuestRepo>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        Self {
            users,
            quests,
            clock,
        }
    }

    pub async fn save(&self, quest: &Quest) -> Result<(), EngineError> {
        quest.validate()?;
        self.quests.save(quest).await?;
        tracing::info!(quest_id = %quest.id, code = %quest.code, "Quest saved");
        Ok(())
    }

    /// Active quests with the user's progress, if any.
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<QuestView>, EngineError> {
        if self.users.get(user_id).await?.is_none() {
            return Err(EngineError::not_found("User", user_id));
        }
        let quests = self.quests.list_active().await?;
        let mut progress: HashMap<QuestId, QuestProgress> = self
            .quests
            .list_progress(user_id)
            .await?
            .into_iter()
            .map(|p| (p.quest_id, p))
            .collect();

        Ok(quests
            .into_iter()
            .map(|quest| {
                let progress = progress.remove(&quest.id);
                QuestView { quest, progress }
            })
            .collect())
    }

    /// Select what an award will feed: its events with a positive amount, and
    /// the active quests tracking one of their metrics.
    ///
    /// Runs before the award is written. Level and scope gates are applied by
    /// the store inside the award transaction, against the post-award balance.
    pub async fn feed_for(
        &self,
        user_id: UserId,
        events: Vec<QuestEvent>,
    ) -> Result<(Vec<Quest>, Vec<QuestEvent>), EngineError> {
        let usable: Vec<QuestEvent> = events
            .into_iter()
            .filter(|e| e.user_id == user_id && e.amount.is_finite() && e.amount > 0.0)
            .collect();
        if usable.is_empty() {
            return Ok((Vec::new(), usable));
        }

        let quests: Vec<Quest> = self
            .quests
            .list_active()
            .await?
            .into_iter()
            .filter(|q| usable.iter().any(|e| e.metric == q.requirement.metric))
            .collect();
        Ok((quests, usable))
    }

    /// Raise the counter to an externally measured value. Lower values are
    /// ignored so progress never decreases.
    pub async fn observe(
        &self,
        user_id: UserId,
        quest_id: QuestId,
        observed: f64,
    ) -> Result<ObservedProgress, EngineError> {
        if !observed.is_finite() || observed < 0.0 {
            return Err(EngineError::validation(
                "observed value must be a non-negative number",
            ));
        }
        let user = self
            .users
            .get(user_id)
            .await?
            .ok_or_else(|| EngineError::not_found("User", user_id))?;
        let quest = self
            .quests
            .get(quest_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Quest", quest_id))?;
        if !quest.active {
            return Err(EngineError::invalid_state(format!(
                "quest {} is not active",
                quest.code
            )));
        }
        let level = user.progression().level;
        if level < quest.min_level {
            return Err(EngineError::invalid_state(format!(
                "quest {} requires level {}",
                quest.code, quest.min_level
            )));
        }

        let update = self
            .quests
            .observe(user_id, &quest, observed, self.clock.now())
            .await?;

        let mut events = Vec::new();
        if update.newly_completed {
            tracing::info!(user_id = %user_id, quest_id = %quest.id, "Quest completed");
            events.push(GamificationEvent::QuestCompleted { user_id, quest_id });
        } else {
            tracing::debug!(
                user_id = %user_id,
                quest_id = %quest.id,
                progress = update.progress.progress_value,
                "Quest progress observed"
            );
        }
        Ok(ObservedProgress {
            progress: update.progress,
            events,
        })
    }

    /// Pay out a COMPLETED quest exactly once.
    pub async fn claim(&self, user_id: UserId, quest_id: QuestId) -> Result<QuestClaim, EngineError> {
        let quest = self
            .quests
            .get(quest_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Quest", quest_id))?;

        match self.quests.claim(user_id, &quest, self.clock.now()).await? {
            ClaimOutcome::Claimed { progress, user } => {
                let reward = quest.reward;
                let mut events = vec![GamificationEvent::QuestClaimed {
                    user_id,
                    quest_id,
                    xp: reward.xp,
                    coins: reward.coins,
                    trophies: reward.trophies,
                }];
                events.extend(GamificationEvent::progression_changes(
                    user_id,
                    user.points - reward.xp,
                    user.points,
                ));
                tracing::info!(
                    user_id = %user_id,
                    quest_id = %quest_id,
                    xp = reward.xp,
                    coins = reward.coins,
                    trophies = reward.trophies,
                    "Quest claimed"
                );
                Ok(QuestClaim {
                    progress,
                    reward,
                    progression: user.progression(),
                    coins: user.coins,
                    trophies: user.trophies,
                    events,
                })
            }
            ClaimOutcome::NotClaimable { status: Some(status) } => Err(EngineError::invalid_state(
                format!("quest {} is {status}, only COMPLETED quests can be claimed", quest.code),
            )),
            ClaimOutcome::NotClaimable { status: None } => Err(EngineError::invalid_state(
                format!("quest {} has no progress for user {user_id}", quest.code),
            )),
        }
    }
}
