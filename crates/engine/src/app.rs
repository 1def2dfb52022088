//! Application state and composition.

use std::sync::Arc;

use labquest_domain::BadgeRulesEngine;

use crate::infrastructure::{
    ports::{AwardRepo, BadgeRepo, ChestRepo, ClockPort, QuestRepo, RandomPort, StoryArcRepo, UserRepo},
    sqlite::SqliteRepositories,
};
use crate::use_cases;

/// Main application state.
///
/// Passed to HTTP handlers via Axum state.
pub struct App {
    pub use_cases: UseCases,
}

/// Container for all use cases.
pub struct UseCases {
    pub users: use_cases::UserProgression,
    pub awards: use_cases::AwardActivity,
    pub badges: Arc<use_cases::BadgeEvaluator>,
    pub quests: Arc<use_cases::QuestTracker>,
    pub chests: use_cases::ChestLoot,
    pub story_arcs: use_cases::StoryArcs,
}

impl App {
    /// Create a new App with all dependencies wired up.
    pub fn new(
        repos: SqliteRepositories,
        clock: Arc<dyn ClockPort>,
        random: Arc<dyn RandomPort>,
    ) -> Self {
        let user_repo: Arc<dyn UserRepo> = repos.users.clone();
        let award_repo: Arc<dyn AwardRepo> = repos.awards.clone();
        let badge_repo: Arc<dyn BadgeRepo> = repos.badges.clone();
        let quest_repo: Arc<dyn QuestRepo> = repos.quests.clone();
        let chest_repo: Arc<dyn ChestRepo> = repos.chests.clone();
        let story_arc_repo: Arc<dyn StoryArcRepo> = repos.story_arcs.clone();

        let badges = Arc::new(use_cases::BadgeEvaluator::new(
            user_repo.clone(),
            award_repo.clone(),
            badge_repo,
            BadgeRulesEngine::default(),
            clock.clone(),
        ));
        let quests = Arc::new(use_cases::QuestTracker::new(
            user_repo.clone(),
            quest_repo,
            clock.clone(),
        ));
        let awards = use_cases::AwardActivity::new(
            user_repo.clone(),
            award_repo,
            quests.clone(),
            badges.clone(),
            clock.clone(),
        );
        let chests =
            use_cases::ChestLoot::new(user_repo.clone(), chest_repo, random, clock.clone());
        let story_arcs = use_cases::StoryArcs::new(user_repo.clone(), story_arc_repo, clock);

        let use_cases = UseCases {
            users: use_cases::UserProgression::new(user_repo),
            awards,
            badges,
            quests,
            chests,
            story_arcs,
        };

        Self { use_cases }
    }
}
