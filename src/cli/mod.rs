use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use uuid::Uuid;

use crate::application::LedgerService;
use crate::config::LedgerConfig;
use crate::domain::{NewUser, Principal, ProfileUpdate, format_cents, parse_cents};

/// Remit - peer-to-peer balance transfers
#[derive(Parser)]
#[command(name = "remit")]
#[command(about = "Register users and move funds between their accounts")]
#[command(version)]
pub struct Cli {
    /// Database file path (overrides the config file)
    #[arg(short, long, env = "REMIT_DATABASE")]
    pub database: Option<String>,

    /// JSON config file
    #[arg(short, long, env = "REMIT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Credentials checked on every authenticated command.
#[derive(Args)]
pub struct Credentials {
    /// Username to act as
    #[arg(short, long)]
    pub user: String,

    /// Password for the user
    #[arg(long, env = "REMIT_PASSWORD", hide_env_values = true)]
    pub password: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Register a new user and open their account
    Signup {
        /// Username (3-20 letters, numbers or underscores)
        username: String,

        #[arg(long)]
        first_name: String,

        #[arg(long)]
        last_name: String,

        /// Password (at least 6 characters)
        #[arg(long, env = "REMIT_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Verify credentials and print the user id
    Signin {
        username: String,

        #[arg(long, env = "REMIT_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Show your own profile
    Me {
        #[command(flatten)]
        auth: Credentials,
    },

    /// Update your names or password
    Update {
        #[command(flatten)]
        auth: Credentials,

        #[arg(long)]
        first_name: Option<String>,

        #[arg(long)]
        last_name: Option<String>,

        #[arg(long)]
        new_password: Option<String>,
    },

    /// Find users by first or last name
    Users {
        /// Text contained in the first or last name (omit to list everyone)
        #[arg(short, long, default_value = "")]
        filter: String,
    },

    /// Show your balance
    Balance {
        #[command(flatten)]
        auth: Credentials,
    },

    /// Send money to another user
    Transfer {
        /// Amount to send (e.g., "50.00" or "50")
        amount: String,

        /// Recipient user id
        #[arg(long)]
        to: String,

        #[command(flatten)]
        auth: Credentials,
    },

    /// Show the sum of all balances
    Total,
}

impl Cli {
    /// Resolve the effective configuration.
    pub fn ledger_config(&self) -> Result<LedgerConfig> {
        let mut config = match &self.config {
            Some(path) => LedgerConfig::load(path)?,
            None => LedgerConfig::default(),
        };
        if let Some(database) = &self.database {
            config.database = database.clone();
        }
        Ok(config)
    }

    pub async fn run(self) -> Result<()> {
        let config = self.ledger_config()?;
        let json = self.json;

        let service = if matches!(self.command, Commands::Init) {
            LedgerService::init(&config).await?
        } else {
            LedgerService::connect(&config)
                .await
                .context("Database not initialized. Run 'remit init' first.")?
        };

        match self.command {
            Commands::Init => {
                println!("Initialized ledger at {}", config.database);
            }

            Commands::Signup {
                username,
                first_name,
                last_name,
                password,
            } => {
                let result = service
                    .signup(NewUser::new(username, password, first_name, last_name))
                    .await?;
                if json {
                    print_json(&result.user)?;
                } else {
                    println!("Signed up {} ({})", result.user.username, result.user.id);
                    println!("Opening balance: {}", format_cents(result.account.balance));
                }
            }

            Commands::Signin { username, password } => {
                let principal = service.authenticate(&username, &password).await?;
                if json {
                    print_json(&principal)?;
                } else {
                    println!("{}", principal);
                }
            }

            Commands::Me { auth } => {
                let principal = authenticate(&service, &auth).await?;
                let profile = service.me(&principal).await?;
                if json {
                    print_json(&profile)?;
                } else {
                    println!("Id:         {}", profile.id);
                    println!("Username:   {}", profile.username);
                    println!("First name: {}", profile.first_name);
                    println!("Last name:  {}", profile.last_name);
                }
            }

            Commands::Update {
                auth,
                first_name,
                last_name,
                new_password,
            } => {
                let principal = authenticate(&service, &auth).await?;
                let update = ProfileUpdate {
                    first_name,
                    last_name,
                    password: new_password,
                };
                let profile = service.update_profile(&principal, update).await?;
                if json {
                    print_json(&profile)?;
                } else {
                    println!("Updated {}", profile.username);
                }
            }

            Commands::Users { filter } => {
                let users = service.find_users(&filter).await?;
                if json {
                    print_json(&users)?;
                } else if users.is_empty() {
                    println!("No users found.");
                } else {
                    println!("{:<36}  {:<20}  NAME", "ID", "USERNAME");
                    for user in users {
                        println!(
                            "{:<36}  {:<20}  {} {}",
                            user.id, user.username, user.first_name, user.last_name
                        );
                    }
                }
            }

            Commands::Balance { auth } => {
                let principal = authenticate(&service, &auth).await?;
                let entry = service.get_balance(principal.user_id()).await?;
                if json {
                    print_json(&serde_json::json!({ "balance": entry.balance }))?;
                } else {
                    println!("{}", format_cents(entry.balance));
                }
            }

            Commands::Transfer { amount, to, auth } => {
                let amount_cents = parse_cents(&amount)
                    .map_err(|e| anyhow::anyhow!("Invalid amount '{}': {}", amount, e))?;
                let recipient = Uuid::parse_str(&to)
                    .with_context(|| format!("Invalid recipient id '{}'", to))?;
                let principal = authenticate(&service, &auth).await?;

                let receipt = service
                    .transfer(&principal, recipient, amount_cents)
                    .await?;
                if json {
                    print_json(&receipt)?;
                } else {
                    println!(
                        "Sent {} to {} (transfer {})",
                        format_cents(receipt.amount),
                        receipt.recipient,
                        receipt.id
                    );
                    println!("New balance: {}", format_cents(receipt.sender_balance));
                }
            }

            Commands::Total => {
                let total = service.total_balance().await?;
                if json {
                    print_json(&serde_json::json!({ "total": total }))?;
                } else {
                    println!("{}", format_cents(total));
                }
            }
        }

        Ok(())
    }
}

async fn authenticate(service: &LedgerService, auth: &Credentials) -> Result<Principal> {
    Ok(service.authenticate(&auth.user, &auth.password).await?)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_transfer_command() {
        let cli = Cli::try_parse_from([
            "remit",
            "--database",
            "ledger.db",
            "transfer",
            "12.50",
            "--to",
            "8d3c2c1e-0c7a-4a55-9a0e-6d1f5b0f2a11",
            "--user",
            "alice",
            "--password",
            "secret1",
        ])
        .unwrap();

        let config = cli.ledger_config().unwrap();
        assert_eq!(config.database, "ledger.db");
        match cli.command {
            Commands::Transfer { amount, to, auth } => {
                assert_eq!(amount, "12.50");
                assert_eq!(to, "8d3c2c1e-0c7a-4a55-9a0e-6d1f5b0f2a11");
                assert_eq!(auth.user, "alice");
            }
            _ => panic!("expected transfer command"),
        }
    }

    #[test]
    fn test_users_filter_defaults_to_everyone() {
        let cli = Cli::try_parse_from(["remit", "users"]).unwrap();
        match cli.command {
            Commands::Users { filter } => assert!(filter.is_empty()),
            _ => panic!("expected users command"),
        }
    }
}
