use crate::application_port::AuthError;
use crate::domain_model::*;
use crate::domain_port::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Every operation runs under one lock with no await inside, which makes it all-or-nothing.
pub struct MemoryCredentialStore {
    records: Mutex<HashMap<RefreshTokenId, RefreshRecord>>,
    clock: Arc<dyn Clock>,
}

impl MemoryCredentialStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RefreshTokenId, RefreshRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of active records for `user_id` across all devices.
    pub fn active_count(&self, user_id: UserId) -> usize {
        let now = self.clock.now();
        self.lock()
            .values()
            .filter(|r| r.user_id == user_id && r.is_active(now))
            .count()
    }

    pub fn get(&self, id: RefreshTokenId) -> Option<RefreshRecord> {
        self.lock().get(&id).cloned()
    }

    fn revoke_where(
        records: &mut HashMap<RefreshTokenId, RefreshRecord>,
        now: chrono::DateTime<chrono::Utc>,
        predicate: impl Fn(&RefreshRecord) -> bool,
    ) -> u64 {
        let mut revoked = 0;
        for record in records.values_mut() {
            if record.revoked_at.is_none() && predicate(record) {
                record.revoked_at = Some(now);
                revoked += 1;
            }
        }
        revoked
    }
}

#[async_trait::async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn save(&self, record: &RefreshRecord) -> Result<(), AuthError> {
        let now = self.clock.now();
        let mut records = self.lock();
        Self::revoke_where(&mut records, now, |r| {
            r.user_id == record.user_id && r.device_id == record.device_id
        });
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn find_active(
        &self,
        user_id: UserId,
        device_id: &DeviceId,
    ) -> Result<Option<RefreshRecord>, AuthError> {
        let now = self.clock.now();
        Ok(self
            .lock()
            .values()
            .find(|r| r.user_id == user_id && &r.device_id == device_id && r.is_active(now))
            .cloned())
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshRecord>, AuthError> {
        Ok(self
            .lock()
            .values()
            .find(|r| r.token_hash == token_hash)
            .cloned())
    }

    async fn rotate(
        &self,
        predecessor: RefreshTokenId,
        successor: &RefreshRecord,
    ) -> Result<RotateOutcome, AuthError> {
        let now = self.clock.now();
        let mut records = self.lock();
        match records.get_mut(&predecessor) {
            Some(record) if record.revoked_at.is_none() => record.revoked_at = Some(now),
            _ => return Ok(RotateOutcome::AlreadyRevoked),
        }
        Self::revoke_where(&mut records, now, |r| {
            r.user_id == successor.user_id && r.device_id == successor.device_id
        });
        records.insert(successor.id, successor.clone());
        Ok(RotateOutcome::Rotated)
    }

    async fn revoke(&self, id: RefreshTokenId) -> Result<bool, AuthError> {
        let now = self.clock.now();
        Ok(Self::revoke_where(&mut self.lock(), now, |r| r.id == id) > 0)
    }

    async fn revoke_family(&self, family_id: TokenFamilyId) -> Result<u64, AuthError> {
        let now = self.clock.now();
        Ok(Self::revoke_where(&mut self.lock(), now, |r| {
            r.family_id == family_id
        }))
    }

    async fn revoke_all(&self, user_id: UserId) -> Result<u64, AuthError> {
        let now = self.clock.now();
        Ok(Self::revoke_where(&mut self.lock(), now, |r| {
            r.user_id == user_id
        }))
    }
}
