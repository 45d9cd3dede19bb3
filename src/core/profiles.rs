//! Profile store access - the narrow interface the engine uses on alumni profiles.
//!
//! Profiles are owned by the portal. The engine reads them and writes only the permanent
//! birthday exclusion flag.

use crate::{
    entities::{AlumniProfile, alumni_profile},
    errors::{Error, Result},
};
use chrono::NaiveDate;
use sea_orm::{QueryOrder, Set, prelude::*};

/// What generation and the upcoming/past views need from a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSnapshot {
    /// Profile id
    pub profile_id: i64,
    /// Birth date (always present in snapshots)
    pub birth_date: NaiveDate,
    /// Graduation cohort
    pub alumni_cohort: Option<String>,
    /// Current exclusion flag
    pub is_excluded: bool,
    /// Display name
    pub display_name: String,
    /// Delivery address
    pub phone_number: Option<String>,
}

impl TryFrom<alumni_profile::Model> for ProfileSnapshot {
    type Error = Error;

    fn try_from(profile: alumni_profile::Model) -> Result<Self> {
        let birth_date = profile.birth_date.ok_or_else(|| Error::Validation {
            message: format!("profile {} has no birth date", profile.id),
        })?;
        Ok(Self {
            profile_id: profile.id,
            birth_date,
            alumni_cohort: profile.alumni_cohort,
            is_excluded: profile.birthday_excluded,
            display_name: profile.full_name,
            phone_number: profile.phone_number,
        })
    }
}

/// Lists every active profile that has a birth date, ordered by id.
pub async fn list_active_profiles_with_birth_date<C>(db: &C) -> Result<Vec<ProfileSnapshot>>
where
    C: ConnectionTrait,
{
    let profiles = AlumniProfile::find()
        .filter(alumni_profile::Column::IsActive.eq(true))
        .filter(alumni_profile::Column::BirthDate.is_not_null())
        .order_by_asc(alumni_profile::Column::Id)
        .all(db)
        .await?;

    profiles.into_iter().map(ProfileSnapshot::try_from).collect()
}

/// Finds a profile by id.
pub async fn get_profile<C>(db: &C, profile_id: i64) -> Result<Option<alumni_profile::Model>>
where
    C: ConnectionTrait,
{
    AlumniProfile::find_by_id(profile_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Reads the permanent exclusion flag.
pub async fn get_exclusion_flag<C>(db: &C, profile_id: i64) -> Result<bool>
where
    C: ConnectionTrait,
{
    get_profile(db, profile_id)
        .await?
        .map(|profile| profile.birthday_excluded)
        .ok_or(Error::ProfileNotFound { profile_id })
}

/// Writes the permanent exclusion flag.
pub async fn set_exclusion_flag<C>(db: &C, profile_id: i64, excluded: bool) -> Result<()>
where
    C: ConnectionTrait,
{
    let profile = get_profile(db, profile_id)
        .await?
        .ok_or(Error::ProfileNotFound { profile_id })?;

    let mut active_model: alumni_profile::ActiveModel = profile.into();
    active_model.birthday_excluded = Set(excluded);
    active_model.update(db).await?;
    Ok(())
}

/// Counts active profiles with a known birth date.
pub async fn count_profiles_with_birth_date<C>(db: &C) -> Result<u64>
where
    C: ConnectionTrait,
{
    AlumniProfile::find()
        .filter(alumni_profile::Column::IsActive.eq(true))
        .filter(alumni_profile::Column::BirthDate.is_not_null())
        .count(db)
        .await
        .map_err(Into::into)
}

/// Counts active profiles currently opted out.
pub async fn count_excluded_profiles<C>(db: &C) -> Result<u64>
where
    C: ConnectionTrait,
{
    AlumniProfile::find()
        .filter(alumni_profile::Column::IsActive.eq(true))
        .filter(alumni_profile::Column::BirthdayExcluded.eq(true))
        .count(db)
        .await
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ProfileSeed, create_profile, date, setup_test_db};

    #[tokio::test]
    async fn test_list_skips_inactive_and_undated_profiles() -> Result<()> {
        let db = setup_test_db().await?;

        let dated = create_profile(&db, ProfileSeed::born("Dated", date(1990, 6, 15))).await?;
        create_profile(&db, ProfileSeed::undated("Undated")).await?;
        create_profile(
            &db,
            ProfileSeed {
                is_active: false,
                ..ProfileSeed::born("Inactive", date(1991, 1, 1))
            },
        )
        .await?;

        let profiles = list_active_profiles_with_birth_date(&db).await?;
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].profile_id, dated.id);
        assert_eq!(profiles[0].birth_date, date(1990, 6, 15));
        assert_eq!(count_profiles_with_birth_date(&db).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_exclusion_flag_round_trip() -> Result<()> {
        let db = setup_test_db().await?;
        let profile = create_profile(&db, ProfileSeed::born("Rina", date(1990, 6, 15))).await?;

        assert!(!get_exclusion_flag(&db, profile.id).await?);
        set_exclusion_flag(&db, profile.id, true).await?;
        assert!(get_exclusion_flag(&db, profile.id).await?);
        assert_eq!(count_excluded_profiles(&db).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_exclusion_flag_unknown_profile() -> Result<()> {
        let db = setup_test_db().await?;
        let result = set_exclusion_flag(&db, 404, true).await;
        assert!(matches!(
            result,
            Err(Error::ProfileNotFound { profile_id: 404 })
        ));
        Ok(())
    }
}
