//! Profile service
//!
//! Signup documents, profile reads, usernames and user search.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;

use super::{clamp_limit, normalize_optional_text};
use crate::data::{
    Document, DocumentPath, DocumentStore, ProfilePatch, SearchCategory, UserId, UserProfile,
    UserQuery, UserType, WriteBatch,
};
use crate::error::AppError;

const MAX_DISPLAY_NAME_CHARS: usize = 80;
const MAX_BIO_CHARS: usize = 500;
const MIN_USERNAME_CHARS: usize = 3;
const MAX_USERNAME_CHARS: usize = 30;

/// Signup form
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProfile {
    pub email: Option<String>,
    pub display_name: String,
    #[serde(default)]
    pub user_type: UserType,
    pub craft_type: Option<String>,
    pub location: Option<String>,
    pub bio: Option<String>,
}

/// Trim and lowercase a username, then check its shape.
pub fn normalize_username(raw: &str) -> Result<String, AppError> {
    let username = raw.trim().to_lowercase();
    let len = username.chars().count();
    if !(MIN_USERNAME_CHARS..=MAX_USERNAME_CHARS).contains(&len) {
        return Err(AppError::Validation(format!(
            "username must be {MIN_USERNAME_CHARS}-{MAX_USERNAME_CHARS} characters"
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(AppError::Validation(
            "username may only contain letters, numbers and underscores".to_string(),
        ));
    }
    Ok(username)
}

/// Profile service
pub struct ProfileService {
    store: Arc<dyn DocumentStore>,
    max_page_size: usize,
}

impl ProfileService {
    /// Create new profile service
    pub fn new(store: Arc<dyn DocumentStore>, max_page_size: usize) -> Self {
        Self {
            store,
            max_page_size,
        }
    }

    /// Write the signup document for `actor`.
    ///
    /// Calling it again updates the descriptive fields; the counters, the
    /// username and the creation time are kept.
    pub async fn create_profile(
        &self,
        actor: &UserId,
        input: NewProfile,
    ) -> Result<UserProfile, AppError> {
        let display_name = input.display_name.trim().to_string();
        if display_name.is_empty() {
            return Err(AppError::Validation(
                "display name cannot be empty".to_string(),
            ));
        }
        if display_name.chars().count() > MAX_DISPLAY_NAME_CHARS {
            return Err(AppError::Validation(format!(
                "display name must be at most {MAX_DISPLAY_NAME_CHARS} characters"
            )));
        }
        let bio = normalize_optional_text(input.bio);
        if bio
            .as_deref()
            .is_some_and(|bio| bio.chars().count() > MAX_BIO_CHARS)
        {
            return Err(AppError::Validation(format!(
                "bio must be at most {MAX_BIO_CHARS} characters"
            )));
        }

        let existing = self.find_profile(actor).await?;
        let now = Utc::now();
        let profile = UserProfile {
            id: actor.clone(),
            email: normalize_optional_text(input.email),
            display_name,
            // Only a merge changes the username of an existing profile.
            username: None,
            user_type: input.user_type,
            craft_type: normalize_optional_text(input.craft_type),
            location: normalize_optional_text(input.location),
            bio,
            followers: 0,
            following: 0,
            posts: 0,
            created_at: existing.as_ref().map_or(now, |p| p.created_at),
            updated_at: now,
        };

        self.store
            .transactional_write(
                WriteBatch::new().set(DocumentPath::User(actor.clone()), Document::User(profile)),
            )
            .await?;

        if existing.is_none() {
            tracing::info!(user = %actor, "Profile created");
        }
        self.get_profile(actor).await
    }

    /// Profile of `user`, or `NotFound`.
    pub async fn get_profile(&self, user: &UserId) -> Result<UserProfile, AppError> {
        self.find_profile(user).await?.ok_or(AppError::NotFound)
    }

    async fn find_profile(&self, user: &UserId) -> Result<Option<UserProfile>, AppError> {
        match self
            .store
            .read_document(&DocumentPath::User(user.clone()))
            .await?
        {
            Some(Document::User(profile)) => Ok(Some(profile)),
            Some(_) => Err(AppError::Internal(anyhow::anyhow!(
                "users/{user} does not hold a profile"
            ))),
            None => Ok(None),
        }
    }

    /// Set the unique handle of `actor`.
    pub async fn update_username(
        &self,
        actor: &UserId,
        raw: &str,
    ) -> Result<UserProfile, AppError> {
        let username = normalize_username(raw)?;
        let patch = ProfilePatch {
            username: Some(username.clone()),
            ..ProfilePatch::default()
        };
        self.store
            .transactional_write(WriteBatch::new().merge(DocumentPath::User(actor.clone()), patch))
            .await?;

        tracing::info!(user = %actor, %username, "Username updated");
        self.get_profile(actor).await
    }

    /// Case-insensitive search, newest profiles first. The actor is never
    /// part of the results.
    pub async fn search_users(
        &self,
        actor: Option<&UserId>,
        term: &str,
        category: SearchCategory,
        limit: Option<usize>,
    ) -> Result<Vec<UserProfile>, AppError> {
        let query = UserQuery {
            term: term.trim().to_string(),
            category,
            exclude: actor.cloned(),
            limit: clamp_limit(limit, self.max_page_size),
        };
        Ok(self.store.search_users(&query).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CounterPolicy, GraphConfig};
    use crate::data::StoreError;
    use crate::service::FollowGraphService;
    use crate::service::test_support::{create_store, uid};

    fn signup(name: &str, user_type: UserType) -> NewProfile {
        NewProfile {
            email: Some(format!("{}@example.com", name.to_lowercase())),
            display_name: name.to_string(),
            user_type,
            ..NewProfile::default()
        }
    }

    #[test]
    fn usernames_are_trimmed_and_lowercased() {
        assert_eq!(normalize_username("  Potter_42 ").unwrap(), "potter_42");
        assert!(normalize_username("ab").is_err());
        assert!(normalize_username(&"a".repeat(31)).is_err());
        assert!(normalize_username("has space").is_err());
        assert!(normalize_username("dash-ed").is_err());
    }

    #[tokio::test]
    async fn create_profile_starts_with_zero_counters() {
        let (store, _temp_dir) = create_store().await;
        let service = ProfileService::new(store, 100);

        let profile = service
            .create_profile(&uid("u1"), signup("  Alice  ", UserType::Artisan))
            .await
            .unwrap();

        assert_eq!(profile.display_name, "Alice");
        assert_eq!(profile.user_type, UserType::Artisan);
        assert_eq!((profile.followers, profile.following, profile.posts), (0, 0, 0));
    }

    #[tokio::test]
    async fn create_profile_validates_display_name() {
        let (store, _temp_dir) = create_store().await;
        let service = ProfileService::new(store, 100);

        let result = service
            .create_profile(&uid("u1"), signup("   ", UserType::Customer))
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let result = service
            .create_profile(&uid("u1"), signup(&"x".repeat(81), UserType::Customer))
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn recreating_a_profile_keeps_counters_and_username() {
        let (store, _temp_dir) = create_store().await;
        let profiles = ProfileService::new(store.clone(), 100);
        let graph = FollowGraphService::new(
            store,
            &GraphConfig {
                counter_policy: CounterPolicy::Guarded,
                max_page_size: 100,
            },
        );
        profiles
            .create_profile(&uid("u1"), signup("Alice", UserType::Customer))
            .await
            .unwrap();
        profiles
            .create_profile(&uid("u2"), signup("Bob", UserType::Artisan))
            .await
            .unwrap();
        profiles.update_username(&uid("u2"), "bob").await.unwrap();
        graph.follow(Some(&uid("u1")), &uid("u2")).await.unwrap();

        let again = profiles
            .create_profile(&uid("u2"), signup("Bob the Potter", UserType::Artisan))
            .await
            .unwrap();

        assert_eq!(again.display_name, "Bob the Potter");
        assert_eq!(again.followers, 1);
        assert_eq!(again.username.as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn taken_username_is_a_conflict() {
        let (store, _temp_dir) = create_store().await;
        let service = ProfileService::new(store, 100);
        for (id, name) in [("u1", "Alice"), ("u2", "Bob")] {
            service
                .create_profile(&uid(id), signup(name, UserType::Customer))
                .await
                .unwrap();
        }

        service.update_username(&uid("u1"), "Clay_Works").await.unwrap();
        let profile = service.get_profile(&uid("u1")).await.unwrap();
        assert_eq!(profile.username.as_deref(), Some("clay_works"));

        // Setting your own username again is fine.
        service.update_username(&uid("u1"), "clay_works").await.unwrap();

        let result = service.update_username(&uid("u2"), "clay_works").await;
        assert!(matches!(
            result,
            Err(AppError::Store(StoreError::Conflict(_)))
        ));
    }

    #[tokio::test]
    async fn username_for_unknown_user_is_not_found() {
        let (store, _temp_dir) = create_store().await;
        let service = ProfileService::new(store, 100);

        let result = service.update_username(&uid("ghost"), "ghost").await;
        assert!(matches!(
            result,
            Err(AppError::Store(StoreError::MissingDocument(_)))
        ));
    }

    #[tokio::test]
    async fn search_filters_by_category_and_excludes_actor() {
        let (store, _temp_dir) = create_store().await;
        let service = ProfileService::new(store, 100);
        service
            .create_profile(&uid("u1"), signup("Alice Weaver", UserType::Artisan))
            .await
            .unwrap();
        service
            .create_profile(&uid("u2"), signup("Bob Weaver", UserType::Artisan))
            .await
            .unwrap();
        service
            .create_profile(&uid("u3"), signup("Carol Weaver", UserType::Customer))
            .await
            .unwrap();

        let found = service
            .search_users(Some(&uid("u1")), "weaver", SearchCategory::All, None)
            .await
            .unwrap();
        let mut ids: Vec<&str> = found.iter().map(|p| p.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, ["u2", "u3"]);

        let artisans = service
            .search_users(None, "WEAVER", SearchCategory::Artisan, None)
            .await
            .unwrap();
        assert_eq!(artisans.len(), 2);
        assert!(artisans.iter().all(|p| p.user_type == UserType::Artisan));
    }
}
