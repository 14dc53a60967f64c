//! Bootstraps the portal with an admin plus one demo account per staff role.
//! Does nothing once any admin exists.

use mongodb::bson::doc;
use portal_service::{
    config::PortalConfig,
    models::{Role, User},
    services::MongoDb,
    utils::{hash_password, Password},
};
use service_core::error::AppError;
use service_core::observability::init_tracing;

struct SeedAccount {
    role: Role,
    name_var: &'static str,
    default_name: &'static str,
    email_var: &'static str,
    default_email: &'static str,
    password_var: &'static str,
    default_password: &'static str,
}

const ACCOUNTS: [SeedAccount; 3] = [
    SeedAccount {
        role: Role::Admin,
        name_var: "SEED_ADMIN_NAME",
        default_name: "System Admin",
        email_var: "SEED_ADMIN_EMAIL",
        default_email: "admin@littleride.et",
        password_var: "SEED_ADMIN_PASSWORD",
        default_password: "admin123",
    },
    SeedAccount {
        role: Role::SalesAgent,
        name_var: "SEED_SALES_NAME",
        default_name: "Demo Sales Agent",
        email_var: "SEED_SALES_EMAIL",
        default_email: "sales@littleride.et",
        password_var: "SEED_SALES_PASSWORD",
        default_password: "sales123",
    },
    SeedAccount {
        role: Role::Operations,
        name_var: "SEED_OPS_NAME",
        default_name: "Demo Operations Officer",
        email_var: "SEED_OPS_EMAIL",
        default_email: "ops@littleride.et",
        password_var: "SEED_OPS_PASSWORD",
        default_password: "ops123",
    },
];

fn env_or(var: &str, default: &str) -> String {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

impl SeedAccount {
    fn build(&self) -> Result<User, AppError> {
        let password = Password::new(env_or(self.password_var, self.default_password));
        if !password.meets_min_length() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "{} must be at least 6 characters",
                self.password_var
            )));
        }
        let hash = hash_password(&password)?;

        Ok(User::new(
            &env_or(self.email_var, self.default_email),
            hash.into_string(),
            env_or(self.name_var, self.default_name),
            self.role,
            None,
        ))
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();

    let config = PortalConfig::from_env()?;
    init_tracing("portal-seed", &config.log_level, None);

    let db = MongoDb::connect(&config.mongodb.uri, &config.mongodb.database).await?;
    db.health_check().await?;
    db.initialize_indexes().await?;

    let users = db.users();
    if users
        .find_one(doc! { "role": Role::Admin.as_str() }, None)
        .await?
        .is_some()
    {
        tracing::info!("An admin account already exists, skipping seed");
        return Ok(());
    }

    for account in &ACCOUNTS {
        let user = account.build()?;
        if users
            .find_one(doc! { "email": user.email.as_str() }, None)
            .await?
            .is_some()
        {
            tracing::info!(email = %user.email, "Account already exists");
            continue;
        }

        users.insert_one(&user, None).await?;
        tracing::info!(email = %user.email, role = user.role.as_str(), "Seeded account");
    }

    tracing::info!("Seeding complete");
    Ok(())
}
