use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::entities::{buyer, driver, otp, passenger, user};
use crate::error::{AppError, AppResult};
use crate::utils::jwt::create_token;
use crate::utils::otp::{generate_code, OtpSender};

/// Registration payload, discriminated by `userType`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub phone_number: String,
    pub password: String,
    #[serde(flatten)]
    pub profile: RegistrationProfile,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "userType", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum RegistrationProfile {
    Passenger {
        first_name: String,
        last_name: String,
        email: Option<String>,
    },
    Driver {
        license_number: String,
        first_name: Option<String>,
        last_name: Option<String>,
    },
    Buyer {
        company_name: String,
        contact_person: String,
        email: String,
    },
}

impl RegistrationProfile {
    pub fn kind(&self) -> &'static str {
        match self {
            RegistrationProfile::Passenger { .. } => "passenger",
            RegistrationProfile::Driver { .. } => "driver",
            RegistrationProfile::Buyer { .. } => "buyer",
        }
    }

    fn validate(&self) -> AppResult<()> {
        let blank = |s: &str| s.trim().is_empty();
        let message = match self {
            RegistrationProfile::Passenger {
                first_name,
                last_name,
                ..
            } if blank(first_name) || blank(last_name) => {
                "First name and last name are required for passengers"
            }
            RegistrationProfile::Driver { license_number, .. } if blank(license_number) => {
                "License number is required for drivers"
            }
            RegistrationProfile::Buyer {
                company_name,
                contact_person,
                email,
            } if blank(company_name) || blank(contact_person) || blank(email) => {
                "Company name, contact person, and email are required for buyers"
            }
            _ => return Ok(()),
        };
        Err(AppError::BadRequest(message.to_string()))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registered {
    pub user_id: Uuid,
    pub user_type: &'static str,
}

#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub user_id: Uuid,
    pub phone_number: String,
    pub is_verified: bool,
}

#[derive(Debug, Serialize)]
pub struct VerifiedSession {
    pub token: String,
    pub user: UserInfo,
}

fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

fn verify_password(password: &str, stored_hash: &str) -> AppResult<()> {
    let parsed_hash = PasswordHash::new(stored_hash)
        .map_err(|e| AppError::Internal(format!("Failed to parse password hash: {}", e)))?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AppError::Unauthorized("Invalid phone number or password".to_string()))
}

/// Create the account and its profile row in one transaction
pub async fn register(db: &DatabaseConnection, request: RegisterRequest) -> AppResult<Registered> {
    let phone_number = request.phone_number.trim().to_string();
    if phone_number.is_empty() || request.password.is_empty() {
        return Err(AppError::BadRequest(
            "Phone number and password are required".to_string(),
        ));
    }
    if request.password.len() < 6 {
        return Err(AppError::BadRequest(
            "Password must be at least 6 characters".to_string(),
        ));
    }
    request.profile.validate()?;

    let password_hash = hash_password(&request.password)?;
    let user_id = Uuid::new_v4();
    let user_type = request.profile.kind();

    let txn = db.begin().await?;

    user::ActiveModel {
        id: Set(user_id),
        phone_number: Set(phone_number.clone()),
        password_hash: Set(password_hash),
        is_verified: Set(false),
        created_at: Set(Utc::now().into()),
    }
    .insert(&txn)
    .await
    .map_err(|e| AppError::conflict_on_unique(e, "User already exists"))?;

    match request.profile {
        RegistrationProfile::Passenger {
            first_name,
            last_name,
            email,
        } => {
            passenger::ActiveModel {
                user_id: Set(user_id),
                first_name: Set(first_name.trim().to_string()),
                last_name: Set(last_name.trim().to_string()),
                email: Set(email.filter(|e| !e.trim().is_empty())),
            }
            .insert(&txn)
            .await?;
        }
        RegistrationProfile::Driver {
            license_number,
            first_name,
            last_name,
        } => {
            driver::ActiveModel {
                user_id: Set(user_id),
                license_number: Set(license_number.trim().to_string()),
                first_name: Set(first_name),
                last_name: Set(last_name),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
        }
        RegistrationProfile::Buyer {
            company_name,
            contact_person,
            email,
        } => {
            buyer::ActiveModel {
                user_id: Set(user_id),
                company_name: Set(company_name),
                contact_person: Set(contact_person),
                email: Set(email),
            }
            .insert(&txn)
            .await?;
        }
    }

    txn.commit().await?;

    tracing::info!(user_id = %user_id, user_type, "User registered");
    Ok(Registered { user_id, user_type })
}

/// Check credentials and send a one-time code to the phone.
/// Returns the code only when echoing is enabled.
pub async fn login(
    db: &DatabaseConnection,
    config: &Config,
    sender: &OtpSender,
    phone_number: &str,
    password: &str,
) -> AppResult<Option<String>> {
    let phone_number = phone_number.trim();
    if phone_number.is_empty() {
        return Err(AppError::BadRequest("Phone number is required".to_string()));
    }

    let user = user::Entity::find()
        .filter(user::Column::PhoneNumber.eq(phone_number))
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found. Please register first.".to_string()))?;

    verify_password(password, &user.password_hash)?;

    let code = generate_code();
    otp::ActiveModel {
        id: Set(Uuid::new_v4()),
        phone_number: Set(user.phone_number.clone()),
        code: Set(code.clone()),
        expires_at: Set((Utc::now() + Duration::minutes(config.otp_ttl_minutes)).into()),
    }
    .insert(db)
    .await?;

    sender.send(&user.phone_number, &code).await?;

    Ok(config.otp_echo.then_some(code))
}

/// The most recent code for a phone must match and be unexpired
pub fn check_otp(latest: Option<&otp::Model>, code: &str, now: DateTime<Utc>) -> AppResult<()> {
    let latest = latest.ok_or_else(|| {
        AppError::BadRequest("No OTP found. Please login again.".to_string())
    })?;
    if latest.code != code.trim() {
        return Err(AppError::BadRequest("Invalid OTP".to_string()));
    }
    if now > latest.expires_at {
        return Err(AppError::BadRequest("OTP expired".to_string()));
    }
    Ok(())
}

/// Consume a code, mark the phone verified and issue a session token
pub async fn verify_phone(
    db: &DatabaseConnection,
    config: &Config,
    phone_number: &str,
    code: &str,
) -> AppResult<VerifiedSession> {
    let phone_number = phone_number.trim();
    if phone_number.is_empty() || code.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Phone number and OTP are required".to_string(),
        ));
    }

    let latest = otp::Entity::find()
        .filter(otp::Column::PhoneNumber.eq(phone_number))
        .order_by_desc(otp::Column::ExpiresAt)
        .one(db)
        .await?;
    check_otp(latest.as_ref(), code, Utc::now())?;

    let txn = db.begin().await?;

    let user = user::Entity::find()
        .filter(user::Column::PhoneNumber.eq(phone_number))
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let mut active: user::ActiveModel = user.into();
    active.is_verified = Set(true);
    let user = active.update(&txn).await?;

    otp::Entity::delete_many()
        .filter(otp::Column::PhoneNumber.eq(phone_number))
        .exec(&txn)
        .await?;

    txn.commit().await?;

    let token = create_token(
        user.id,
        &user.phone_number,
        &config.jwt_secret,
        config.jwt_expiration_hours,
    )?;

    tracing::info!(user_id = %user.id, "Phone number verified");

    Ok(VerifiedSession {
        token,
        user: UserInfo {
            user_id: user.id,
            phone_number: user.phone_number,
            is_verified: user.is_verified,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn otp_row(code: &str, expires_at: DateTime<Utc>) -> otp::Model {
        otp::Model {
            id: Uuid::new_v4(),
            phone_number: "+233200000001".into(),
            code: code.into(),
            expires_at: expires_at.into(),
        }
    }

    #[test]
    fn test_register_request_is_tagged_by_user_type() {
        let request: RegisterRequest = serde_json::from_value(serde_json::json!({
            "phoneNumber": "+233200000001",
            "password": "hunter22",
            "userType": "passenger",
            "firstName": "Kofi",
            "lastName": "Mensah"
        }))
        .unwrap();

        assert_eq!(request.phone_number, "+233200000001");
        assert!(matches!(
            request.profile,
            RegistrationProfile::Passenger { ref first_name, email: None, .. } if first_name == "Kofi"
        ));

        let request: RegisterRequest = serde_json::from_value(serde_json::json!({
            "phoneNumber": "+233200000002",
            "password": "hunter22",
            "userType": "driver",
            "licenseNumber": "GR-4410-21"
        }))
        .unwrap();
        assert_eq!(request.profile.kind(), "driver");
    }

    #[test]
    fn test_unknown_user_type_is_rejected() {
        let result = serde_json::from_value::<RegisterRequest>(serde_json::json!({
            "phoneNumber": "+233200000001",
            "password": "hunter22",
            "userType": "admin"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_profile_requirements() {
        let passenger = RegistrationProfile::Passenger {
            first_name: "Kofi".into(),
            last_name: " ".into(),
            email: None,
        };
        assert!(passenger.validate().is_err());

        let buyer = RegistrationProfile::Buyer {
            company_name: "Acme Freight".into(),
            contact_person: "Efua".into(),
            email: "ops@acme.test".into(),
        };
        assert!(buyer.validate().is_ok());
    }

    #[test]
    fn test_otp_checks() {
        let now = Utc::now();
        let fresh = otp_row("482913", now + Duration::minutes(4));
        let stale = otp_row("482913", now - Duration::seconds(1));

        assert!(check_otp(Some(&fresh), "482913", now).is_ok());
        assert!(matches!(check_otp(Some(&fresh), "000000", now), Err(AppError::BadRequest(ref m)) if m == "Invalid OTP"));
        assert!(matches!(check_otp(Some(&stale), "482913", now), Err(AppError::BadRequest(ref m)) if m == "OTP expired"));
        assert!(check_otp(None, "482913", now).is_err());
    }

    #[test]
    fn test_password_hash_round_trip() {
        let hash = hash_password("hunter22").unwrap();
        assert!(verify_password("hunter22", &hash).is_ok());
        assert!(matches!(
            verify_password("hunter23", &hash),
            Err(AppError::Unauthorized(_))
        ));
    }
}
