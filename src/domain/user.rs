use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type UserId = Uuid;

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 20;
pub const PASSWORD_MIN_LEN: usize = 6;
pub const NAME_MAX_LEN: usize = 50;

/// A registered user. The password is only ever held as an Argon2 PHC string.
#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        username: String,
        password_hash: String,
        first_name: String,
        last_name: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            username,
            password_hash,
            first_name,
            last_name,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            username: self.username.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// The public view of a user, safe to show to other users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

/// Signup input, before hashing.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

impl NewUser {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
        }
    }

    /// Check every field against the signup rules.
    pub fn validate(&self) -> Result<(), String> {
        validate_username(&self.username)?;
        validate_password(&self.password)?;
        validate_name("first name", &self.first_name)?;
        validate_name("last name", &self.last_name)?;
        Ok(())
    }
}

/// Partial profile change. Fields left as `None` are untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password: Option<String>,
}

impl ProfileUpdate {
    pub fn with_first_name(mut self, first_name: impl Into<String>) -> Self {
        self.first_name = Some(first_name.into());
        self
    }

    pub fn with_last_name(mut self, last_name: impl Into<String>) -> Self {
        self.last_name = Some(last_name.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.first_name.is_none() && self.last_name.is_none() && self.password.is_none()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.is_empty() {
            return Err("nothing to update".to_string());
        }
        if let Some(first_name) = &self.first_name {
            validate_name("first name", first_name)?;
        }
        if let Some(last_name) = &self.last_name {
            validate_name("last name", last_name)?;
        }
        if let Some(password) = &self.password {
            validate_password(password)?;
        }
        Ok(())
    }
}

pub fn validate_username(username: &str) -> Result<(), String> {
    let len = username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err(format!(
            "username must be between {} and {} characters long",
            USERNAME_MIN_LEN, USERNAME_MAX_LEN
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err("username can only contain letters, numbers, and underscores".to_string());
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.chars().count() < PASSWORD_MIN_LEN {
        return Err(format!(
            "password must be at least {} characters long",
            PASSWORD_MIN_LEN
        ));
    }
    Ok(())
}

pub fn validate_name(field: &str, name: &str) -> Result<(), String> {
    let len = name.trim().chars().count();
    if len == 0 {
        return Err(format!("{} is required", field));
    }
    if len > NAME_MAX_LEN {
        return Err(format!("{} is too long", field));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_rules() {
        assert!(validate_username("ada_99").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("a".repeat(21).as_str()).is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username("dash-ed").is_err());
    }

    #[test]
    fn test_new_user_validation() {
        let ok = NewUser::new("grace", "hopper1", "Grace", "Hopper");
        assert!(ok.validate().is_ok());

        let short_password = NewUser::new("grace", "12345", "Grace", "Hopper");
        assert!(short_password.validate().is_err());

        let blank_name = NewUser::new("grace", "hopper1", "   ", "Hopper");
        assert!(blank_name.validate().is_err());
    }

    #[test]
    fn test_profile_update_requires_a_field() {
        assert!(ProfileUpdate::default().validate().is_err());
        assert!(
            ProfileUpdate::default()
                .with_last_name("Lovelace")
                .validate()
                .is_ok()
        );
        assert!(
            ProfileUpdate::default()
                .with_password("abc")
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_profile_hides_password_hash() {
        let user = User::new(
            "ada".into(),
            "$argon2id$hash".into(),
            "Ada".into(),
            "Lovelace".into(),
        );
        let profile = user.profile();
        assert_eq!(profile.id, user.id);
        assert_eq!(profile.username, "ada");
        assert_eq!(user.full_name(), "Ada Lovelace");
    }
}
