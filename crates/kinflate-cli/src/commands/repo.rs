//! Repository management commands

use console::style;
use kinflate_repo::{Credentials, Getters, Repository, RepositoryConfig, RepositoryManager};

use super::settings;
use crate::error::{CliError, Result};

/// Credentials from the `repo add` flags
pub fn credentials(
    username: Option<String>,
    password: Option<String>,
    token: Option<String>,
    env: Vec<String>,
) -> Result<Option<Credentials>> {
    if let Some(token) = token {
        return Ok(Some(Credentials::bearer(token)));
    }
    if let [username_var, password_var] = env.as_slice() {
        return Ok(Some(Credentials::Env {
            username_var: username_var.clone(),
            password_var: password_var.clone(),
        }));
    }
    match (username, password) {
        (Some(user), Some(pass)) => Ok(Some(Credentials::basic(user, pass))),
        (None, None) => Ok(None),
        _ => Err(CliError::config(
            "provide both --username and --password, or a --token",
        )),
    }
}

/// Add a repository; the configuration is left unchanged when its index cannot be fetched
pub async fn add(name: &str, url: &str, credentials: Option<Credentials>) -> Result<()> {
    let settings = settings()?;
    let original =
        RepositoryConfig::load_from(&settings.config_path).map_err(CliError::repository)?;

    let mut repo = Repository::new(name, url).map_err(CliError::repository)?;
    if let Some(credentials) = credentials {
        repo = repo.with_credentials(credentials);
    }
    let mut config = original.clone();
    config.add(repo).map_err(CliError::repository)?;
    config
        .save_to(&settings.config_path)
        .map_err(CliError::repository)?;

    let alias = format!("@{}", name);
    let getters = Getters::new().map_err(CliError::repository)?;
    let fetched = match RepositoryManager::resolve([alias.as_str()], false, &settings, &getters) {
        Ok(manager) => manager.update_index().await,
        Err(e) => Err(e),
    };
    if let Err(e) = fetched {
        original
            .save_to(&settings.config_path)
            .map_err(CliError::repository)?;
        return Err(CliError::repository(e));
    }

    println!("{} has been added to your repositories", style(name).green());
    Ok(())
}

/// List configured repositories
pub fn list() -> Result<()> {
    let settings = settings()?;
    let config = RepositoryConfig::load_from(&settings.config_path).map_err(CliError::repository)?;

    if config.repositories.is_empty() {
        println!("No repositories configured.");
        println!();
        println!("Add one with: kinflate repo add <name> <url>");
        return Ok(());
    }

    println!(
        "{}",
        style(format!("{:<20} {:<50} {}", "NAME", "URL", "AUTH")).bold()
    );
    for repo in &config.repositories {
        let auth = match &repo.credentials {
            None => "none",
            Some(Credentials::Basic { .. }) => "basic",
            Some(Credentials::Bearer { .. }) => "token",
            Some(Credentials::Env { .. }) => "env",
        };
        println!("{:<20} {:<50} {}", repo.name, repo.url, auth);
    }
    Ok(())
}

/// Remove a repository and its cached index
pub fn remove(name: &str) -> Result<()> {
    let settings = settings()?;
    let mut config =
        RepositoryConfig::load_from(&settings.config_path).map_err(CliError::repository)?;
    let repo = config.remove(name).map_err(CliError::repository)?;
    config
        .save_to(&settings.config_path)
        .map_err(CliError::repository)?;

    match std::fs::remove_file(settings.index_path(&repo.url)) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    println!("{} has been removed from your repositories", style(name).green());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_from_flags() {
        assert_eq!(credentials(None, None, None, vec![]).unwrap(), None);
        assert_eq!(
            credentials(None, None, Some("t".into()), vec![]).unwrap(),
            Some(Credentials::bearer("t"))
        );
        assert_eq!(
            credentials(Some("u".into()), Some("p".into()), None, vec![]).unwrap(),
            Some(Credentials::basic("u", "p"))
        );
        assert!(matches!(
            credentials(None, None, None, vec!["USER".into(), "PASS".into()]).unwrap(),
            Some(Credentials::Env { .. })
        ));
        assert!(credentials(Some("u".into()), None, None, vec![]).is_err());
    }
}
