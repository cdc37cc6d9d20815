//! Users who bookmark and rate POIs, and staff who manage regions.

use thiserror::Error;

use crate::UserId;

/// Longest accepted username, in characters.
pub const MAX_USERNAME_LEN: usize = 150;

/// An account known to the engine.
///
/// Credentials live with the authentication collaborator; the engine only
/// needs identity, the staff/superuser flags used by region scoping, and the
/// active flag used to refuse actions from closed accounts.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct User {
    /// Unique identifier.
    pub id: UserId,
    /// Unique login name.
    pub username: String,
    /// Whether the user may use the staff editing surface.
    #[cfg_attr(feature = "serde", serde(default))]
    pub is_staff: bool,
    /// Whether the user bypasses region scoping.
    #[cfg_attr(feature = "serde", serde(default))]
    pub is_superuser: bool,
    /// Closed accounts are inactive.
    #[cfg_attr(feature = "serde", serde(default = "active_default"))]
    pub is_active: bool,
}

#[cfg(feature = "serde")]
const fn active_default() -> bool {
    true
}

/// Errors returned by [`User::new`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UserError {
    /// The username was empty.
    #[error("username must not be empty")]
    EmptyUsername,
    /// The username exceeded [`MAX_USERNAME_LEN`].
    #[error("username must be at most {MAX_USERNAME_LEN} characters")]
    UsernameTooLong,
    /// The username contained something other than letters, digits and `_`.
    #[error("username {0:?} may only contain letters, digits and _")]
    InvalidUsername(String),
}

impl User {
    /// Validate the username and construct an active, non-staff user.
    ///
    /// # Examples
    /// ```
    /// use poimark_core::{User, UserId};
    ///
    /// let user = User::new(UserId(1), "ana_maria").unwrap();
    /// assert!(user.is_active);
    /// assert!(User::new(UserId(2), "no spaces").is_err());
    /// ```
    pub fn new(id: UserId, username: impl Into<String>) -> Result<Self, UserError> {
        let username = username.into();
        validate_username(&username)?;
        Ok(Self {
            id,
            username,
            is_staff: false,
            is_superuser: false,
            is_active: true,
        })
    }

    /// Grant staff status.
    #[must_use]
    pub const fn with_staff(mut self) -> Self {
        self.is_staff = true;
        self
    }

    /// Grant superuser status, which implies staff.
    #[must_use]
    pub const fn with_superuser(mut self) -> Self {
        self.is_staff = true;
        self.is_superuser = true;
        self
    }

    /// Close the account. Bookmarks and ratings are kept.
    pub const fn deactivate(&mut self) {
        self.is_active = false;
    }
}

fn validate_username(username: &str) -> Result<(), UserError> {
    if username.is_empty() {
        return Err(UserError::EmptyUsername);
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(UserError::UsernameTooLong);
    }
    if !username.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(UserError::InvalidUsername(username.to_owned()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("ana")]
    #[case("ana_maria_2")]
    #[case("josé")]
    fn accepts_word_characters(#[case] username: &str) {
        assert!(User::new(UserId(1), username).is_ok());
    }

    #[rstest]
    #[case("", UserError::EmptyUsername)]
    #[case("dash-ed", UserError::InvalidUsername("dash-ed".into()))]
    #[case("a.b", UserError::InvalidUsername("a.b".into()))]
    fn rejects_bad_usernames(#[case] username: &str, #[case] expected: UserError) {
        assert_eq!(User::new(UserId(1), username), Err(expected));
    }

    #[rstest]
    fn rejects_long_usernames() {
        let username = "x".repeat(MAX_USERNAME_LEN + 1);
        assert_eq!(
            User::new(UserId(1), username),
            Err(UserError::UsernameTooLong)
        );
    }

    #[rstest]
    fn deactivation_keeps_identity() {
        let mut user = User::new(UserId(4), "closer").expect("valid user");
        user.deactivate();
        assert!(!user.is_active);
        assert_eq!(user.id, UserId(4));
    }
}
