use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use time::{OffsetDateTime, UtcOffset};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    password::PasswordHash,
    repo::UserRepo,
    repo_types::{AdminUserUpdate, NewUser, ProfileUpdate, User, UserFilter},
};
use crate::{
    error::{AppError, AppResult},
    images::DEFAULT_PHOTO,
    response::Pagination,
};

/// In-process credential store used by the HTTP tests.
#[derive(Default)]
pub struct MemoryUserRepo {
    users: RwLock<HashMap<Uuid, User>>,
    fail_deletes: AtomicBool,
}

fn contains_ci(haystack: &str, needle: &Option<String>) -> bool {
    match needle {
        Some(n) => haystack.to_lowercase().contains(&n.to_lowercase()),
        None => true,
    }
}

fn apply_profile(user: &mut User, p: ProfileUpdate) {
    if let Some(v) = p.name {
        user.name = v;
    }
    if let Some(v) = p.city {
        user.city = v;
    }
    if let Some(v) = p.province {
        user.province = v;
    }
    if let Some(v) = p.address {
        user.address = v;
    }
    if let Some(v) = p.phone {
        user.phone = v;
    }
    if let Some(v) = p.birthday {
        user.birthday = Some(v);
    }
    if let Some(v) = p.avatar {
        user.avatar = v;
    }
}

fn duplicate() -> AppError {
    AppError::validation("Duplicate field value entered")
}

fn build_user(new: NewUser) -> User {
    let p = new.profile;
    User {
        id: Uuid::new_v4(),
        name: p.name.unwrap_or_default(),
        email: new.email,
        birthday: p.birthday,
        city: p.city.unwrap_or_default(),
        province: p.province.unwrap_or_default(),
        address: p.address.unwrap_or_default(),
        phone: p.phone.unwrap_or_default(),
        avatar: DEFAULT_PHOTO.to_string(),
        role: new.role,
        password_hash: new.password.into_string(),
        reset_password_token: None,
        reset_password_expire: None,
        created_at: OffsetDateTime::now_utc(),
    }
}

impl MemoryUserRepo {
    /// Raw access for tests that need to inspect or age stored state.
    pub async fn snapshot(&self, id: Uuid) -> Option<User> {
        self.users.read().await.get(&id).cloned()
    }

    pub async fn force_reset_expiry(&self, id: Uuid, expire: OffsetDateTime) {
        if let Some(u) = self.users.write().await.get_mut(&id) {
            u.reset_password_expire = Some(expire);
        }
    }

    /// Makes `delete` fail, as a dropped database connection would.
    pub fn set_failing_deletes(&self, failing: bool) {
        self.fail_deletes.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl UserRepo for MemoryUserRepo {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_by_reset_token(
        &self,
        hash: &str,
        now: OffsetDateTime,
    ) -> AppResult<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| {
                u.reset_password_token.as_deref() == Some(hash)
                    && u.reset_password_expire.is_some_and(|exp| exp > now)
            })
            .cloned())
    }

    async fn create(&self, new: NewUser) -> AppResult<User> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == new.email) {
            return Err(duplicate());
        }
        let user = build_user(new);
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn create_many(&self, batch: Vec<NewUser>) -> AppResult<Vec<User>> {
        let mut users = self.users.write().await;
        let mut seen: HashSet<String> = users.values().map(|u| u.email.clone()).collect();
        if !batch.iter().all(|n| seen.insert(n.email.clone())) {
            return Err(duplicate());
        }
        let created: Vec<User> = batch.into_iter().map(build_user).collect();
        for user in &created {
            users.insert(user.id, user.clone());
        }
        Ok(created)
    }

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> AppResult<Option<User>> {
        let mut users = self.users.write().await;
        Ok(users.get_mut(&id).map(|u| {
            apply_profile(u, update);
            u.clone()
        }))
    }

    async fn admin_update(&self, id: Uuid, update: AdminUserUpdate) -> AppResult<Option<User>> {
        let mut users = self.users.write().await;
        if let Some(email) = &update.email {
            if users.values().any(|u| u.id != id && &u.email == email) {
                return Err(duplicate());
            }
        }
        Ok(users.get_mut(&id).map(|u| {
            if let Some(email) = update.email {
                u.email = email;
            }
            if let Some(role) = update.role {
                u.role = role;
            }
            if let Some(pw) = update.password {
                u.password_hash = pw.into_string();
                u.reset_password_token = None;
                u.reset_password_expire = None;
            }
            apply_profile(u, update.profile);
            u.clone()
        }))
    }

    async fn set_password(&self, id: Uuid, password: PasswordHash) -> AppResult<bool> {
        let mut users = self.users.write().await;
        Ok(match users.get_mut(&id) {
            Some(u) => {
                u.password_hash = password.into_string();
                u.reset_password_token = None;
                u.reset_password_expire = None;
                true
            }
            None => false,
        })
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token: Option<(String, OffsetDateTime)>,
    ) -> AppResult<()> {
        if let Some(u) = self.users.write().await.get_mut(&id) {
            let (hash, expire) = token.unzip();
            u.reset_password_token = hash;
            u.reset_password_expire = expire;
        }
        Ok(())
    }

    async fn list(&self, filter: UserFilter, page: Pagination) -> AppResult<(Vec<User>, i64)> {
        let page = page.normalized();
        let users = self.users.read().await;
        let mut matched: Vec<User> = users
            .values()
            .filter(|u| {
                contains_ci(&u.name, &filter.name)
                    && contains_ci(&u.email, &filter.email)
                    && contains_ci(&u.city, &filter.city)
                    && contains_ci(&u.address, &filter.address)
                    && contains_ci(&u.phone, &filter.phone)
                    && filter.birthday.map_or(true, |day| {
                        u.birthday.map(|b| b.to_offset(UtcOffset::UTC).date()) == Some(day)
                    })
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matched.len() as i64;
        let items = matched
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .collect();
        Ok((items, total))
    }

    async fn all(&self) -> AppResult<Vec<User>> {
        let mut users: Vec<User> = self.users.read().await.values().cloned().collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(users)
    }

    async fn delete(&self, id: Uuid) -> AppResult<bool> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(AppError::Internal(anyhow::anyhow!("connection reset")));
        }
        Ok(self.users.write().await.remove(&id).is_some())
    }
}
