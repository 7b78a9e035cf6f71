use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use super::{
    dto::{AuthResponse, LoginRequest, PublicUser, RegisterRequest},
    jwt::JwtKeys,
    password::{hash_password, verify_password},
    repo::{NewUser, UserRepo},
};
use crate::error::{AppError, AppResult};

const MIN_PASSWORD_LEN: usize = 8;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn required<'a>(value: &'a str, field: &str) -> AppResult<&'a str> {
    let v = value.trim();
    if v.is_empty() {
        return Err(AppError::validation(format!("{field} is required")));
    }
    Ok(v)
}

fn issue(
    keys: &JwtKeys,
    user: impl Into<PublicUser>,
    with_refresh: bool,
) -> AppResult<AuthResponse> {
    let user = user.into();
    let access_token = keys.sign_access(user.id)?;
    let refresh_token = if with_refresh {
        Some(keys.sign_refresh(user.id)?)
    } else {
        None
    };
    Ok(AuthResponse {
        access_token,
        refresh_token,
        user,
    })
}

/// Creates the account and logs the new user in.
#[instrument(skip_all)]
pub async fn register(
    users: &dyn UserRepo,
    keys: &JwtKeys,
    req: RegisterRequest,
) -> AppResult<AuthResponse> {
    let email = required(&req.email, "email")?;
    let username = required(&req.username, "username")?;
    if req.password.is_empty() || req.password_again.is_empty() {
        return Err(AppError::validation("password is required"));
    }

    if !is_valid_email(email) {
        warn!(%email, "invalid email");
        return Err(AppError::validation("Invalid email"));
    }
    if req.password != req.password_again {
        return Err(AppError::validation("Passwords do not match"));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation("Password too short"));
    }

    if users.find_by_email(email).await?.is_some() {
        warn!(%email, "email already registered");
        return Err(AppError::DuplicateEmail);
    }

    let password_hash = hash_password(&req.password)?;
    let user = users
        .create(NewUser {
            email,
            username,
            password_hash: &password_hash,
        })
        .await?;

    info!(user_id = user.id, email = %user.email, "user registered");
    issue(keys, user, true)
}

#[instrument(skip_all)]
pub async fn login(
    users: &dyn UserRepo,
    keys: &JwtKeys,
    req: LoginRequest,
) -> AppResult<AuthResponse> {
    let email = required(&req.email, "email")?;
    if req.password.is_empty() {
        return Err(AppError::validation("password is required"));
    }

    let Some(user) = users.find_by_email(email).await? else {
        warn!(%email, "login unknown email");
        return Err(AppError::Unauthorized("Invalid credentials"));
    };

    if !verify_password(&req.password, &user.password_hash)? {
        warn!(%email, user_id = user.id, "login invalid password");
        return Err(AppError::Unauthorized("Invalid credentials"));
    }

    info!(user_id = user.id, remember_me = req.remember_me, "user logged in");
    issue(keys, user, req.remember_me)
}

#[instrument(skip_all)]
pub async fn refresh(
    users: &dyn UserRepo,
    keys: &JwtKeys,
    refresh_token: &str,
) -> AppResult<AuthResponse> {
    let claims = keys.verify_refresh(refresh_token).map_err(|e| {
        warn!(error = %e, "refresh rejected");
        AppError::Unauthorized("Invalid refresh token")
    })?;
    let user = users
        .find_by_id(claims.sub)
        .await?
        .ok_or(AppError::Unauthorized("User not found"))?;
    issue(keys, user, true)
}

pub async fn me(users: &dyn UserRepo, user_id: i64) -> AppResult<PublicUser> {
    users
        .find_by_id(user_id)
        .await?
        .map(PublicUser::from)
        .ok_or(AppError::Unauthorized("User not found"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_jwt_keys, MemoryUserRepo};

    fn register_req(email: &str, password: &str, again: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.into(),
            username: "alice".into(),
            password: password.into(),
            password_again: again.into(),
        }
    }

    #[test]
    fn email_shape_check() {
        assert!(is_valid_email("a@b.co"));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("two words@b.co"));
        assert!(!is_valid_email("a@nodot"));
    }

    #[tokio::test]
    async fn register_then_login() {
        let users = MemoryUserRepo::default();
        let keys = test_jwt_keys();

        let reg = register(&users, &keys, register_req("a@b.co", "longpassword", "longpassword"))
            .await
            .unwrap();
        assert_eq!(reg.user.email, "a@b.co");
        assert_eq!(keys.verify(&reg.access_token).unwrap().sub, reg.user.id);

        let res = login(
            &users,
            &keys,
            LoginRequest {
                email: "a@b.co".into(),
                password: "longpassword".into(),
                remember_me: false,
            },
        )
        .await
        .unwrap();
        assert_eq!(res.user.id, reg.user.id);
        assert!(res.refresh_token.is_none());
    }

    #[tokio::test]
    async fn duplicate_email_creates_no_second_user() {
        let users = MemoryUserRepo::default();
        let keys = test_jwt_keys();
        register(&users, &keys, register_req("dup@b.co", "longpassword", "longpassword"))
            .await
            .unwrap();

        let err = register(&users, &keys, register_req("dup@b.co", "otherpassword", "otherpassword"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::DuplicateEmail));
        assert_eq!(users.count_with_email("dup@b.co"), 1);
    }

    #[tokio::test]
    async fn email_is_case_sensitive_as_stored() {
        let users = MemoryUserRepo::default();
        let keys = test_jwt_keys();
        register(&users, &keys, register_req("Bob@b.co", "longpassword", "longpassword"))
            .await
            .unwrap();
        register(&users, &keys, register_req("bob@b.co", "longpassword", "longpassword"))
            .await
            .expect("different case is a different email");
    }

    #[tokio::test]
    async fn register_validation() {
        let users = MemoryUserRepo::default();
        let keys = test_jwt_keys();

        let mismatch = register(&users, &keys, register_req("a@b.co", "longpassword", "longpasswor"))
            .await
            .unwrap_err();
        assert_eq!(mismatch.to_string(), "Passwords do not match");

        let short = register(&users, &keys, register_req("a@b.co", "short", "short"))
            .await
            .unwrap_err();
        assert_eq!(short.to_string(), "Password too short");

        let bad_email = register(&users, &keys, register_req("nope", "longpassword", "longpassword"))
            .await
            .unwrap_err();
        assert_eq!(bad_email.to_string(), "Invalid email");

        let mut blank = register_req("a@b.co", "longpassword", "longpassword");
        blank.username = "  ".into();
        let err = register(&users, &keys, blank).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        assert_eq!(users.count_with_email("a@b.co"), 0);
    }

    #[tokio::test]
    async fn login_rejects_bad_credentials() {
        let users = MemoryUserRepo::default();
        let keys = test_jwt_keys();
        register(&users, &keys, register_req("a@b.co", "longpassword", "longpassword"))
            .await
            .unwrap();

        for (email, password) in [("a@b.co", "wrongpassword"), ("ghost@b.co", "longpassword")] {
            let err = login(
                &users,
                &keys,
                LoginRequest {
                    email: email.into(),
                    password: password.into(),
                    remember_me: true,
                },
            )
            .await
            .unwrap_err();
            assert!(matches!(err, AppError::Unauthorized("Invalid credentials")));
        }
    }

    #[tokio::test]
    async fn remember_me_grants_refresh_token() {
        let users = MemoryUserRepo::default();
        let keys = test_jwt_keys();
        register(&users, &keys, register_req("a@b.co", "longpassword", "longpassword"))
            .await
            .unwrap();

        let res = login(
            &users,
            &keys,
            LoginRequest {
                email: "a@b.co".into(),
                password: "longpassword".into(),
                remember_me: true,
            },
        )
        .await
        .unwrap();
        let refresh_token = res.refresh_token.expect("refresh token issued");

        let renewed = refresh(&users, &keys, &refresh_token).await.unwrap();
        assert_eq!(renewed.user.id, res.user.id);

        let err = refresh(&users, &keys, &res.access_token).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }
}
