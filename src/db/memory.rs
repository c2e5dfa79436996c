//! In-memory member store.
//!
//! Used by tests and local development. Mirrors the DynamoDB store's
//! semantics, including the phone uniqueness constraint.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{MemberProfile, MemberStore, ProfileUpdate, StoreError};

#[derive(Default)]
pub struct MemoryStore {
    // Keyed by phone, the natural key.
    members: RwLock<HashMap<String, MemberProfile>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemberStore for MemoryStore {
    async fn create(&self, profile: MemberProfile) -> Result<MemberProfile, StoreError> {
        let mut members = self.members.write().await;
        if members.contains_key(&profile.phone) {
            return Err(StoreError::Duplicate);
        }
        members.insert(profile.phone.clone(), profile.clone());
        Ok(profile)
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<MemberProfile>, StoreError> {
        Ok(self.members.read().await.get(phone).cloned())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<MemberProfile>, StoreError> {
        Ok(self
            .members
            .read()
            .await
            .values()
            .find(|p| p.id == id)
            .cloned())
    }

    async fn update(&self, id: &str, update: ProfileUpdate) -> Result<MemberProfile, StoreError> {
        let mut members = self.members.write().await;
        let profile = members
            .values_mut()
            .find(|p| p.id == id)
            .ok_or(StoreError::NotFound)?;
        profile.apply(&update);
        Ok(profile.clone())
    }

    async fn list(&self) -> Result<Vec<MemberProfile>, StoreError> {
        let mut members: Vec<_> = self.members.read().await.values().cloned().collect();
        members.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(members)
    }

    async fn ping(&self) -> bool {
        true
    }
}
