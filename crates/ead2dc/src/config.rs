//! Configuration for building and serving the static repository.
//!
//! Settings are read from a TOML file with one table per concern:
//!
//! ```toml
//! [archivesspace]
//! base_url = "https://aspace.example.edu/api"
//! username = "oai"
//! repository = 2
//!
//! [repository]
//! name = "Caltech Archives Digital Collections"
//! base_url = "https://apps.library.caltech.edu/ead2dc/oai"
//!
//! [build]
//! use_exclude = ["URL-Redirected"]
//! host_exclude = ["github.com"]
//!
//! [paths]
//! xml = "/srv/ead2dc/caltecharchives.xml"
//!
//! [server]
//! bind = "0.0.0.0:8080"
//! max_records = 250
//! ```
//!
//! Every key is optional. A missing file yields the defaults, and the ArchivesSpace
//! password can be supplied through `EAD2DC_ASPACE_PASSWORD` instead of the file.

use super::*;

/// Environment variable overriding `archivesspace.password`.
pub const PASSWORD_ENV: &str = "EAD2DC_ASPACE_PASSWORD";

/// Upper bound for `archivesspace.max_retries`.
pub const MAX_RETRIES: u32 = 10;

/// Boilerplate `dc:rights` statement attached to every record.
pub const DEFAULT_RIGHTS: &str = "The copyright and related rights status of this Item has not \
                                  been evaluated. Please contact Caltech Archives and Special \
                                  Collections for more information. You are free to use this \
                                  Item in any way that is permitted by the copyright and related \
                                  rights legislation that applies to your use.";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  /// ArchivesSpace API access
  pub archivesspace: ApiSettings,
  /// Values published in the `Identify` response and in every record
  pub repository:    RepositorySettings,
  /// Filtering rules applied while building records
  pub build:         BuildSettings,
  /// File locations
  pub paths:         PathSettings,
  /// OAI-PMH responder settings
  pub server:        ServerSettings,
}

/// Connection settings for the ArchivesSpace backend API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
  /// Backend API root, e.g. `http://localhost:8089`
  pub base_url:     String,
  /// Login name
  pub username:     String,
  /// Login password
  pub password:     String,
  /// Repository number whose digital objects are published
  pub repository:   u32,
  /// Page size for paginated listings
  pub page_size:    u32,
  /// Retries for connection failures, timeouts and `5xx` responses
  pub max_retries:  u32,
  /// Per-request timeout
  pub timeout_secs: u64,
}

impl Default for ApiSettings {
  fn default() -> Self {
    Self {
      base_url:     "http://localhost:8089".to_string(),
      username:     "admin".to_string(),
      password:     String::new(),
      repository:   2,
      page_size:    250,
      max_retries:  3,
      timeout_secs: 60,
    }
  }
}

/// Values describing the published repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositorySettings {
  /// `repositoryName`
  pub name:              String,
  /// `baseURL`, also echoed in every response's `request` element
  pub base_url:          String,
  /// `adminEmail`
  pub admin_email:       String,
  /// Prepended to an archival object's path to form the record identifier
  pub identifier_prefix: String,
  /// `dc:rights` statement
  pub rights:            String,
}

impl Default for RepositorySettings {
  fn default() -> Self {
    Self {
      name:              "Caltech Archives Digital Collections".to_string(),
      base_url:          "https://apps.library.caltech.edu/ead2dc/oai".to_string(),
      admin_email:       "archives@caltech.edu".to_string(),
      identifier_prefix: "collections.archives.caltech.edu".to_string(),
      rights:            DEFAULT_RIGHTS.to_string(),
    }
  }
}

/// File-version filtering and host classification rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSettings {
  /// Use statements whose file versions are never published
  pub use_exclude:   Vec<String>,
  /// Domains whose file URIs are never published
  pub host_exclude:  Vec<String>,
  /// Domains counted as Caltech-operated
  pub caltech_hosts: Vec<String>,
}

impl Default for BuildSettings {
  fn default() -> Self {
    Self {
      use_exclude:   vec!["URL-Redirected".to_string()],
      host_exclude:  vec!["github.com".to_string()],
      caltech_hosts: vec!["caltech.edu".to_string(), "californiarevealed.org".to_string()],
    }
  }
}

/// Where the database and the static repository live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
  /// SQLite database
  pub database: PathBuf,
  /// Static repository XML file
  pub xml:      PathBuf,
}

impl Default for PathSettings {
  fn default() -> Self {
    let dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("ead2dc");
    Self { database: dir.join("ead2dc.db"), xml: dir.join("caltecharchives.xml") }
  }
}

/// Settings of the HTTP responder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
  /// Socket address to listen on
  pub bind:        String,
  /// Records per `ListRecords`/`ListIdentifiers` page
  pub max_records: usize,
}

impl Default for ServerSettings {
  fn default() -> Self { Self { bind: "127.0.0.1:8080".to_string(), max_records: 250 } }
}

impl Config {
  /// Default configuration file location in the user's config directory.
  pub fn default_path() -> PathBuf {
    dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join("ead2dc").join("config.toml")
  }

  /// Loads the configuration at `path`.
  ///
  /// A missing file is not an error: the defaults are used and a warning is logged.
  /// A file that exists but does not parse is an error.
  pub fn load(path: &Path) -> Result<Self, Ead2dcError> {
    let mut config = match std::fs::read_to_string(path) {
      Ok(contents) => {
        debug!("Loading configuration from {}", path.display());
        Self::from_toml(&contents)?
      },
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        warn!("No configuration at {}, using defaults", path.display());
        Self::default()
      },
      Err(e) => return Err(e.into()),
    };

    if let Ok(password) = std::env::var(PASSWORD_ENV) {
      trace!("Using ArchivesSpace password from {PASSWORD_ENV}");
      config.archivesspace.password = password;
    }

    config.validate()?;
    Ok(config)
  }

  /// Parses a configuration from TOML text.
  pub fn from_toml(contents: &str) -> Result<Self, Ead2dcError> { Ok(toml::from_str(contents)?) }

  /// Rejects values that would make a build or the responder misbehave.
  pub fn validate(&self) -> Result<(), Ead2dcError> {
    url::Url::parse(&self.archivesspace.base_url)?;
    if self.archivesspace.page_size == 0 {
      return Err(Ead2dcError::Config("archivesspace.page_size must be positive".into()));
    }
    if self.archivesspace.max_retries > MAX_RETRIES {
      return Err(Ead2dcError::Config(format!("archivesspace.max_retries must be at most {MAX_RETRIES}")));
    }
    if self.server.max_records == 0 {
      return Err(Ead2dcError::Config("server.max_records must be positive".into()));
    }
    if self.repository.identifier_prefix.contains('/') {
      return Err(Ead2dcError::Config("repository.identifier_prefix must not contain '/'".into()));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use tempfile::tempdir;

  use super::*;

  #[test]
  fn test_partial_file_keeps_defaults() {
    let config = Config::from_toml(
      r#"
        [archivesspace]
        base_url = "https://aspace.example.edu/api"

        [server]
        max_records = 2
      "#,
    )
    .unwrap();

    assert_eq!(config.archivesspace.base_url, "https://aspace.example.edu/api");
    assert_eq!(config.archivesspace.repository, 2);
    assert_eq!(config.server.max_records, 2);
    assert_eq!(config.server.bind, "127.0.0.1:8080");
    assert_eq!(config.build.use_exclude, vec!["URL-Redirected".to_string()]);
    assert_eq!(config.repository.identifier_prefix, "collections.archives.caltech.edu");
  }

  #[traced_test]
  #[test]
  fn test_missing_file_uses_defaults() {
    let dir = tempdir().unwrap();
    let config = Config::load(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.repository, RepositorySettings::default());
    assert!(logs_contain("using defaults"));
  }

  #[test]
  fn test_invalid_values_rejected() {
    let bad_page = Config::from_toml("[archivesspace]\npage_size = 0\n").unwrap();
    assert!(matches!(bad_page.validate(), Err(Ead2dcError::Config(_))));

    let bad_url = Config::from_toml("[archivesspace]\nbase_url = \"not a url\"\n").unwrap();
    assert!(matches!(bad_url.validate(), Err(Ead2dcError::InvalidUrl(_))));

    let many_retries = Config::from_toml("[archivesspace]\nmax_retries = 40\n").unwrap();
    assert!(matches!(many_retries.validate(), Err(Ead2dcError::Config(_))));
    let bounded = Config::from_toml("[archivesspace]\nmax_retries = 10\n").unwrap();
    assert!(bounded.validate().is_ok());

    assert!(matches!(Config::from_toml("[server]\nmax_records = \"many\"\n"), Err(Ead2dcError::Toml(_))));
  }
}
