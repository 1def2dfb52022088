//! Badge evaluation and manual awards.

use std::collections::HashSet;
use std::sync::Arc;

use labquest_domain::{
    Badge, BadgeId, BadgeRulesEngine, DomainError, GamificationEvent, SpecialCondition,
    SpecialConditionContext, UserBadge, UserId, UserStats,
};
use serde::Serialize;

use super::error::EngineError;
use crate::infrastructure::ports::{AwardRepo, BadgeRepo, ClockPort, UserRepo};

/// Badges granted to one user by an evaluation pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserBadgeGrants {
    pub user_id: UserId,
    pub badges: Vec<Badge>,
}

impl UserBadgeGrants {
    pub fn events(&self) -> Vec<GamificationEvent> {
        self.badges
            .iter()
            .map(|b| GamificationEvent::BadgeEarned {
                user_id: self.user_id,
                badge_id: b.id,
                badge_name: b.name.clone(),
            })
            .collect()
    }
}

/// Summary of an all-users pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeSweep {
    pub users_evaluated: usize,
    pub grants: Vec<UserBadgeGrants>,
}

pub struct BadgeEvaluator {
    users: Arc<dyn UserRepo>,
    awards: Arc<dyn AwardRepo>,
    badges: Arc<dyn BadgeRepo>,
    rules: BadgeRulesEngine,
    clock: Arc<dyn ClockPort>,
}

impl BadgeEvaluator {
    pub fn new(
        users: Arc<dyn UserRepo>,
        awards: Arc<dyn AwardRepo>,
        badges: Arc<dyn BadgeRepo>,
        rules: BadgeRulesEngine,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        Self {
            users,
            awards,
            badges,
            rules,
            clock,
        }
    }

    pub async fn list(&self) -> Result<Vec<Badge>, EngineError> {
        Ok(self.badges.list().await?)
    }

    /// Create or replace a badge definition. Special conditions must name a
    /// registered rule.
    pub async fn save(&self, badge: &Badge) -> Result<(), EngineError> {
        badge.validate()?;
        if let Some(special) = &badge.criteria.special {
            if !self.rules.registry().contains(special.key()) {
                return Err(EngineError::Configuration(format!(
                    "no rule registered for special condition {}",
                    special.key()
                )));
            }
        }
        self.badges.save(badge).await?;
        tracing::info!(badge_id = %badge.id, name = %badge.name, "Badge saved");
        Ok(())
    }

    /// Grant a badge by hand, bypassing its criteria.
    pub async fn award(
        &self,
        user_id: UserId,
        badge_id: BadgeId,
        awarded_by: Option<UserId>,
    ) -> Result<UserBadge, EngineError> {
        if self.users.get(user_id).await?.is_none() {
            return Err(EngineError::not_found("User", user_id));
        }
        let badge = self
            .badges
            .get(badge_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Badge", badge_id))?;

        let grant = UserBadge {
            user_id,
            badge_id,
            earned_at: self.clock.now(),
            earned_by: awarded_by,
        };
        if !self.badges.grant(&grant).await? {
            return Err(EngineError::invalid_state(format!(
                "user {user_id} already holds badge {}",
                badge.name
            )));
        }
        tracing::info!(
            user_id = %user_id,
            badge_id = %badge_id,
            awarded_by = ?awarded_by.map(|u| u.get()),
            "Badge awarded manually"
        );
        Ok(grant)
    }

    /// Test every active badge the user does not hold and grant the ones
    /// whose criteria pass.
    pub async fn evaluate_user(&self, user_id: UserId) -> Result<UserBadgeGrants, EngineError> {
        let candidates = self.badges.list().await?;
        self.evaluate_against(user_id, &candidates).await
    }

    /// Evaluate every known user against the active badges.
    pub async fn evaluate_all(&self) -> Result<BadgeSweep, EngineError> {
        let candidates = self.badges.list().await?;
        let user_ids = self.users.list_ids().await?;

        let mut grants = Vec::new();
        for user_id in &user_ids {
            let granted = self.evaluate_against(*user_id, &candidates).await?;
            if !granted.badges.is_empty() {
                grants.push(granted);
            }
        }

        tracing::info!(
            users = user_ids.len(),
            users_with_grants = grants.len(),
            "Badge sweep finished"
        );
        Ok(BadgeSweep {
            users_evaluated: user_ids.len(),
            grants,
        })
    }

    async fn evaluate_against(
        &self,
        user_id: UserId,
        candidates: &[Badge],
    ) -> Result<UserBadgeGrants, EngineError> {
        let user = self
            .users
            .get(user_id)
            .await?
            .ok_or_else(|| EngineError::not_found("User", user_id))?;
        let held: HashSet<BadgeId> = self
            .badges
            .list_for_user(user_id)
            .await?
            .into_iter()
            .map(|b| b.badge_id)
            .collect();

        let open: Vec<&Badge> = candidates
            .iter()
            .filter(|b| b.active && !held.contains(&b.id))
            .collect();
        if open.is_empty() {
            return Ok(UserBadgeGrants {
                user_id,
                badges: Vec::new(),
            });
        }

        let facts: Vec<_> = self
            .awards
            .list_for_user(user_id)
            .await?
            .iter()
            .map(|r| r.activity())
            .collect();
        let stats = UserStats::from_activity(user.points, &facts);

        let mut granted = Vec::new();
        for badge in open {
            // Only the first-to-reach rule looks at other holders.
            let badge_holders = match badge.criteria.special {
                Some(SpecialCondition::FirstToReach { .. }) => {
                    self.badges.holder_count(badge.id).await?
                }
                _ => 0,
            };
            let ctx = SpecialConditionContext {
                stats: &stats,
                role: user.role,
                badge_holders,
            };

            match self.rules.qualifies(badge, &ctx) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(DomainError::Configuration(reason)) => {
                    tracing::warn!(badge_id = %badge.id, %reason, "Skipping badge");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            let grant = UserBadge {
                user_id,
                badge_id: badge.id,
                earned_at: self.clock.now(),
                earned_by: None,
            };
            if self.badges.grant(&grant).await? {
                tracing::info!(user_id = %user_id, badge_id = %badge.id, "Badge earned");
                granted.push(badge.clone());
            } else {
                tracing::debug!(user_id = %user_id, badge_id = %badge.id, "Badge granted concurrently");
            }
        }

        Ok(UserBadgeGrants {
            user_id,
            badges: granted,
        })
    }
}
