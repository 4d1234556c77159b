//! In-memory challenge catalog and member roster.
//!
//! Challenges are write-once: a month can be defined a single time, and the
//! only later mutation is revealing its shadow track.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::error::{InputError, QuestlineError};
use crate::traits::{ChallengeCatalog, MemberRoster};
use crate::types::{Challenge, Member, MonthKey, UserId};

/// In-memory [`ChallengeCatalog`] and [`MemberRoster`].
#[derive(Default)]
pub struct MemoryCatalog {
    challenges: RwLock<BTreeMap<MonthKey, Challenge>>,
    members: RwLock<BTreeMap<UserId, Member>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a month's challenge.
    ///
    /// # Errors
    ///
    /// - [`InputError::ChallengeExists`] if the month is already defined
    /// - any validation error of [`Challenge::validate`]
    pub fn define_challenge(&self, challenge: Challenge) -> Result<(), QuestlineError> {
        challenge.validate()?;
        let mut challenges = self.challenges.write();
        if challenges.contains_key(&challenge.month) {
            return Err(InputError::ChallengeExists(challenge.month.to_string()).into());
        }
        challenges.insert(challenge.month, challenge);
        Ok(())
    }

    /// Mark a month's shadow track as revealed.
    pub fn reveal_shadow(&self, month: MonthKey) -> Result<(), QuestlineError> {
        let mut challenges = self.challenges.write();
        let challenge = challenges
            .get_mut(&month)
            .ok_or_else(|| InputError::UnknownChallenge(month.to_string()))?;
        if challenge.shadow.is_none() {
            return Err(InputError::MissingField("shadow").into());
        }
        challenge.shadow_revealed = true;
        Ok(())
    }

    /// Register a member.
    ///
    /// # Errors
    ///
    /// [`InputError::MemberExists`] if the id is already registered.
    pub fn register_member(&self, member: Member) -> Result<(), QuestlineError> {
        let mut members = self.members.write();
        if members.contains_key(&member.id) {
            return Err(InputError::MemberExists(member.id.to_string()).into());
        }
        members.insert(member.id.clone(), member);
        Ok(())
    }
}

impl ChallengeCatalog for MemoryCatalog {
    fn challenge(&self, month: MonthKey) -> Result<Option<Challenge>, QuestlineError> {
        Ok(self.challenges.read().get(&month).cloned())
    }

    fn months(&self) -> Result<Vec<MonthKey>, QuestlineError> {
        Ok(self.challenges.read().keys().copied().collect())
    }
}

impl MemberRoster for MemoryCatalog {
    fn members(&self) -> Result<Vec<Member>, QuestlineError> {
        Ok(self.members.read().values().cloned().collect())
    }

    fn member(&self, id: &UserId) -> Result<Option<Member>, QuestlineError> {
        Ok(self.members.read().get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GameId, TrackDefinition};

    fn challenge(year: i32, month: u32, shadow: bool) -> Challenge {
        let track = |game| TrackDefinition {
            game_id: GameId(game),
            progression: Default::default(),
            win: Default::default(),
            total_achievements: 10,
        };
        Challenge {
            month: MonthKey::new(year, month).unwrap(),
            main: track(1),
            shadow: shadow.then(|| track(2)),
            shadow_revealed: false,
        }
    }

    #[test]
    fn define_is_write_once() {
        let catalog = MemoryCatalog::new();
        catalog.define_challenge(challenge(2025, 2, false)).unwrap();
        let err = catalog.define_challenge(challenge(2025, 2, true)).unwrap_err();
        assert!(matches!(err, QuestlineError::Input(InputError::ChallengeExists(_))));
        assert!(catalog.challenge(MonthKey::new(2025, 2).unwrap()).unwrap().unwrap().shadow.is_none());
    }

    #[test]
    fn months_ascending() {
        let catalog = MemoryCatalog::new();
        catalog.define_challenge(challenge(2025, 3, false)).unwrap();
        catalog.define_challenge(challenge(2024, 11, false)).unwrap();
        catalog.define_challenge(challenge(2025, 1, false)).unwrap();
        let months: Vec<String> = catalog.months().unwrap().iter().map(|m| m.to_string()).collect();
        assert_eq!(months, ["2024-11", "2025-01", "2025-03"]);
    }

    #[test]
    fn absent_month_is_none() {
        let catalog = MemoryCatalog::new();
        assert!(catalog.challenge(MonthKey::new(2025, 2).unwrap()).unwrap().is_none());
    }

    #[test]
    fn reveal_shadow_flips_flag() {
        let catalog = MemoryCatalog::new();
        let month = MonthKey::new(2025, 2).unwrap();
        catalog.define_challenge(challenge(2025, 2, true)).unwrap();
        catalog.reveal_shadow(month).unwrap();
        assert!(catalog.challenge(month).unwrap().unwrap().shadow_revealed);
    }

    #[test]
    fn reveal_without_shadow_fails() {
        let catalog = MemoryCatalog::new();
        let month = MonthKey::new(2025, 2).unwrap();
        catalog.define_challenge(challenge(2025, 2, false)).unwrap();
        assert!(catalog.reveal_shadow(month).is_err());
        assert!(catalog.reveal_shadow(MonthKey::new(2025, 5).unwrap()).is_err());
    }

    #[test]
    fn roster_register_and_lookup() {
        let catalog = MemoryCatalog::new();
        let member = Member { id: UserId::new("42"), source_username: "Player42".into() };
        catalog.register_member(member.clone()).unwrap();
        assert_eq!(catalog.member(&member.id).unwrap(), Some(member.clone()));
        assert!(catalog.register_member(member).is_err());
        assert_eq!(catalog.members().unwrap().len(), 1);
    }
}
