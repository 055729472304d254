pub mod account;
pub mod catalog;
pub mod download;

use crate::blob_store::FirebaseStorage;
use crate::config::AppConfig;
use crate::download::Platform;
use crate::service::DataAccessService;
use crate::session::SessionSlot;
use crate::store::FirestoreStore;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "apk-store", version, about = "Browse and download APKs from the catalog")]
pub struct Cli {
    /// Config file (defaults to $APK_STORE_CONFIG or the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List categories
    Categories,
    /// List APKs, optionally filtered by category id
    Apks {
        #[arg(long)]
        category: Option<String>,
    },
    /// Follow the APK list live until Ctrl-C
    Watch {
        #[arg(long)]
        category: Option<String>,
    },
    /// Download an APK by URL or catalog id (default: the first listed)
    Download {
        #[arg(long, conflicts_with = "id")]
        url: Option<String>,
        #[arg(long)]
        id: Option<String>,
        /// Override the detected platform
        #[arg(long)]
        platform: Option<Platform>,
    },
    /// Log in with DNI and password
    Login {
        dni: String,
        #[arg(long, env = "APK_STORE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// End the current session
    Logout,
    /// Show the logged-in user
    Whoami,
    /// Create a category
    AddCategory {
        nombre: String,
        #[arg(long)]
        descripcion: Option<String>,
    },
    /// Delete an APK document
    DeleteApk { id: String },
    /// Print the stored form of a password, for seeding user documents
    HashPassword {
        #[arg(env = "APK_STORE_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

/// Everything a command needs, built once from the config.
pub struct AppContext {
    pub config: AppConfig,
    pub service: DataAccessService<FirestoreStore>,
}

impl AppContext {
    pub fn from_config(config: AppConfig) -> Result<Self, String> {
        let store = FirestoreStore::from_config(&config).map_err(|e| e.to_string())?;
        let bucket = config
            .storage_bucket
            .clone()
            .or_else(|| {
                config
                    .project_id
                    .as_ref()
                    .map(|p| format!("{}.appspot.com", p))
            })
            .ok_or("no storage bucket configured (storage_bucket)")?;
        let blobs = FirebaseStorage::new(&bucket, Duration::from_secs(config.http_timeout_secs));
        let ttl = config.session_ttl().map_err(|e| e.to_string())?;
        let session = SessionSlot::persistent(config.session_file(), ttl);

        Ok(Self {
            service: DataAccessService::new(Arc::new(store), Arc::new(blobs), Arc::new(session)),
            config,
        })
    }
}

pub async fn dispatch(cli: Cli) -> Result<(), String> {
    // Offline commands first; they need no backend.
    if let Command::HashPassword { password } = &cli.command {
        return account::hash_password(password);
    }

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    }
    .map_err(|e| e.to_string())?;
    let ctx = AppContext::from_config(config)?;

    match cli.command {
        Command::Categories => catalog::list_categories(&ctx).await,
        Command::Apks { category } => catalog::list_apks(&ctx, category).await,
        Command::Watch { category } => catalog::watch_apks(&ctx, category).await,
        Command::Download { url, id, platform } => {
            download::download(&ctx, url, id, platform).await
        }
        Command::Login { dni, password } => account::login(&ctx, &dni, &password).await,
        Command::Logout => account::logout(&ctx),
        Command::Whoami => account::whoami(&ctx).await,
        Command::AddCategory {
            nombre,
            descripcion,
        } => catalog::add_category(&ctx, nombre, descripcion).await,
        Command::DeleteApk { id } => catalog::delete_apk(&ctx, &id).await,
        Command::HashPassword { password } => account::hash_password(&password),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_download_by_id() {
        let cli = Cli::try_parse_from(["apk-store", "download", "--id", "abc", "--platform", "web"])
            .unwrap();
        match cli.command {
            Command::Download { url, id, platform } => {
                assert!(url.is_none());
                assert_eq!(id.as_deref(), Some("abc"));
                assert_eq!(platform, Some(Platform::Web));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_download_target_is_exclusive() {
        assert!(Cli::try_parse_from(["apk-store", "download"]).is_ok());
        assert!(
            Cli::try_parse_from(["apk-store", "download", "--url", "u", "--id", "i"]).is_err()
        );
    }

    #[test]
    fn test_parse_login() {
        let cli = Cli::try_parse_from(["apk-store", "login", "30111222", "--password", "pw"])
            .unwrap();
        assert!(matches!(cli.command, Command::Login { ref dni, .. } if dni == "30111222"));
    }

    #[test]
    fn test_context_requires_project() {
        let err = AppContext::from_config(AppConfig::default())
            .err()
            .expect("missing project must fail");
        assert!(err.contains("project_id"));
    }
}
