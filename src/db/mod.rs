//! Member registry boundary.
//!
//! `MemberStore` is the seam to the external document store. The service
//! only relies on create / find / update-by-id semantics plus a phone
//! uniqueness constraint; `dynamodb` provides the production
//! implementation and `memory` a process-local one for tests and local
//! development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod dynamodb;
pub mod memory;

/// A registered member. The phone number is the natural key and never
/// changes after creation; `id` is server-assigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberProfile {
    pub id: String,
    pub phone: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub profile_complete: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemberProfile {
    /// Builds a new profile for registration. Registration supplies all
    /// required fields, so the profile starts complete.
    pub fn new(phone: String, name: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            phone,
            name,
            email: None,
            gender: None,
            date_of_birth: None,
            bio: None,
            avatar_url: None,
            profile_complete: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies the mutable fields of `update` and bumps `updated_at`.
    pub fn apply(&mut self, update: &ProfileUpdate) {
        if let Some(name) = &update.name {
            self.name = name.clone();
        }
        if let Some(email) = &update.email {
            self.email = Some(email.clone());
        }
        if let Some(gender) = &update.gender {
            self.gender = Some(gender.clone());
        }
        if let Some(dob) = &update.date_of_birth {
            self.date_of_birth = Some(dob.clone());
        }
        if let Some(bio) = &update.bio {
            self.bio = Some(bio.clone());
        }
        if let Some(avatar_url) = &update.avatar_url {
            self.avatar_url = Some(avatar_url.clone());
        }
        self.updated_at = Utc::now();
    }
}

/// Allow-list of mutable profile fields.
///
/// This is the only shape an update can take, so `phone`, `id`,
/// `profileComplete` and the timestamps are dropped before validation
/// simply by not being representable here (serde ignores unknown input
/// fields).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub gender: Option<String>,
    pub date_of_birth: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
}

impl ProfileUpdate {
    /// True when no mutable field survived the allow-list.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.gender.is_none()
            && self.date_of_birth.is_none()
            && self.bio.is_none()
            && self.avatar_url.is_none()
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("an account with this phone number already exists")]
    Duplicate,
    #[error("member not found")]
    NotFound,
    #[error("storage backend error: {0}")]
    Backend(#[source] anyhow::Error),
}

/// Persistence operations the service needs from the document store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MemberStore: Send + Sync {
    /// Persists a new profile. Fails with [`StoreError::Duplicate`] when a
    /// profile with the same phone already exists, including when a
    /// concurrent create wins the race.
    async fn create(&self, profile: MemberProfile) -> Result<MemberProfile, StoreError>;

    async fn find_by_phone(&self, phone: &str) -> Result<Option<MemberProfile>, StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<MemberProfile>, StoreError>;

    /// Applies `update` to the profile with `id`.
    async fn update(&self, id: &str, update: ProfileUpdate) -> Result<MemberProfile, StoreError>;

    async fn list(&self) -> Result<Vec<MemberProfile>, StoreError>;

    /// Health probe for the backing store.
    async fn ping(&self) -> bool;
}
