use std::path::{Path, PathBuf};

use crate::error::PomError;
use crate::parse::{child_element, child_text};

/// The subset of `~/.m2/settings.xml` the resolver consumes: the local
/// repository override and the server credentials matched against remote
/// repository ids.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub local_repository: Option<PathBuf>,
    pub servers: Vec<Server>,
}

/// A `<server>` credentials entry.
#[derive(Debug, Clone, Default)]
pub struct Server {
    pub id: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Settings {
    /// Read the user's settings. Missing or malformed settings degrade to
    /// the defaults; the resolver must work on machines without Maven.
    pub fn load() -> Settings {
        let Some(path) = home_dir().map(|home| home.join(".m2").join("settings.xml")) else {
            return Settings::default();
        };

        match Settings::load_from(&path) {
            Ok(settings) => settings,
            Err(err) => {
                tracing::debug!(
                    target = "gavel.settings",
                    path = %path.display(),
                    error = %err,
                    "falling back to default settings"
                );
                Settings::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Settings, PomError> {
        let contents = std::fs::read_to_string(path).map_err(|source| PomError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let doc =
            roxmltree::Document::parse(&contents).map_err(|source| PomError::Xml { source })?;
        let root = doc.root_element();

        let local_repository = child_text(&root, "localRepository")
            .filter(|value| !value.contains("${"))
            .map(PathBuf::from);

        let servers = child_element(&root, "servers")
            .map(|servers| {
                servers
                    .children()
                    .filter(|n| n.is_element() && n.has_tag_name("server"))
                    .filter_map(|server| {
                        Some(Server {
                            id: child_text(&server, "id")?,
                            username: child_text(&server, "username"),
                            password: child_text(&server, "password"),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Settings {
            local_repository,
            servers,
        })
    }
}

pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}
