use anyhow::{bail, Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::providers::optimizely::{EntityId, DEFAULT_ANALYTICS_MARKER, DEFAULT_TOTAL_ALLOCATION};

/// Configuration file structure for launchwatch.
///
/// Holds the Optimizely credentials, the tracked projects with their QA
/// audiences, and the notification target. CLI flags and environment
/// variables override whatever is loaded here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub optimizely: OptimizelyConfig,

    /// Projects to poll, in reporting order
    #[serde(default)]
    pub projects: Vec<ProjectConfig>,

    #[serde(default)]
    pub targeting: TargetingConfig,

    #[serde(default)]
    pub window: WindowConfig,

    #[serde(default)]
    pub notify: NotifyConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OptimizelyConfig {
    /// Optimizely personal access token
    pub token: Option<String>,

    /// REST API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Change history entries requested per page
    #[serde(default = "default_per_page")]
    pub per_page: usize,

    /// Upper bound on change history pages fetched per project
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Deadline for one complete run across all projects
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
}

/// A tracked Optimizely project and the audience that marks QA traffic in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProjectConfig {
    pub id: EntityId,

    #[serde(deserialize_with = "string_or_number")]
    pub qa_audience_id: String,

    /// Short name shown in notifications (e.g. "TH")
    #[serde(default)]
    pub label: Option<String>,
}

impl ProjectConfig {
    pub fn display_label(&self) -> String {
        self.label.clone().unwrap_or_else(|| self.id.to_string())
    }
}

/// Parses `<project-id>:<qa-audience-id>[:<label>]`.
impl FromStr for ProjectConfig {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let id = parts
            .next()
            .filter(|p| !p.is_empty())
            .ok_or("missing project id")?
            .parse::<EntityId>()
            .map_err(|e| format!("invalid project id: {e}"))?;
        let qa_audience_id = parts
            .next()
            .filter(|p| !p.is_empty())
            .ok_or("expected <project-id>:<qa-audience-id>[:<label>]")?
            .to_string();
        let label = parts.next().filter(|p| !p.is_empty()).map(str::to_string);

        Ok(Self {
            id,
            qa_audience_id,
            label,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TargetingConfig {
    /// Token in page conditions that marks a lower environment
    #[serde(default = "default_qa_page_marker")]
    pub qa_page_marker: String,

    /// Call in custom code that counts as a custom goal
    #[serde(default = "default_analytics_marker")]
    pub analytics_marker: String,

    /// Traffic in basis points split across variations
    #[serde(default = "default_total_allocation")]
    pub total_allocation: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WindowConfig {
    /// Length of the polling window
    #[serde(default = "default_window_minutes")]
    pub minutes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NotifyConfig {
    /// Microsoft Teams incoming webhook
    pub webhook_url: Option<String>,

    #[serde(default = "default_card_title")]
    pub title: String,

    /// Offset used to render the window in the card
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,

    #[serde(default = "default_timezone_label")]
    pub timezone_label: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,

    /// Pretty-print JSON output
    #[serde(default)]
    pub pretty: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Summary,
    Json,
    Csv,
}

impl Default for OptimizelyConfig {
    fn default() -> Self {
        Self {
            token: None,
            base_url: default_base_url(),
            per_page: default_per_page(),
            max_pages: default_max_pages(),
            request_timeout_secs: default_request_timeout_secs(),
            run_timeout_secs: default_run_timeout_secs(),
        }
    }
}

impl Default for TargetingConfig {
    fn default() -> Self {
        Self {
            qa_page_marker: default_qa_page_marker(),
            analytics_marker: default_analytics_marker(),
            total_allocation: default_total_allocation(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            minutes: default_window_minutes(),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            title: default_card_title(),
            utc_offset_minutes: default_utc_offset_minutes(),
            timezone_label: default_timezone_label(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.optimizely.com/v2/".to_string()
}

fn default_per_page() -> usize {
    25
}

fn default_max_pages() -> usize {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_run_timeout_secs() -> u64 {
    600
}

fn default_qa_page_marker() -> String {
    "devtest".to_string()
}

fn default_analytics_marker() -> String {
    DEFAULT_ANALYTICS_MARKER.to_string()
}

fn default_total_allocation() -> i64 {
    DEFAULT_TOTAL_ALLOCATION
}

fn default_window_minutes() -> u32 {
    60
}

fn default_card_title() -> String {
    "Optimizely client-side updates".to_string()
}

fn default_utc_offset_minutes() -> i32 {
    60
}

fn default_timezone_label() -> String {
    "CET".to_string()
}

// Audience ids are numeric in Optimizely but compared as text.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(u64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(text) => text,
        Id::Number(number) => number.to_string(),
    })
}

const CANDIDATES: [&str; 4] = [
    "launchwatch.toml",
    "launchwatch.json",
    "launchwatch.yaml",
    "launchwatch.yml",
];

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./launchwatch.{toml,json,yaml,yml}
    /// 3. <user config dir>/launchwatch/config.toml
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        match Self::discover(Path::new("."), dirs::config_dir()) {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Self::default()),
        }
    }

    fn discover(dir: &Path, user_config_dir: Option<PathBuf>) -> Option<PathBuf> {
        CANDIDATES
            .iter()
            .map(|candidate| dir.join(candidate))
            .chain(user_config_dir.map(|d| d.join("launchwatch").join("config.toml")))
            .find(|path| path.exists())
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => {
                // Try TOML first, then JSON, then YAML
                toml::from_str(&contents)
                    .or_else(|_| serde_json::from_str(&contents))
                    .or_else(|_| serde_yaml::from_str(&contents))
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))
            }
        }
    }

    /// Checks that a run can be attempted with these settings.
    pub fn validate(&self) -> Result<()> {
        if self
            .optimizely
            .token
            .as_deref()
            .map_or(true, |t| t.trim().is_empty())
        {
            bail!("An Optimizely token is required (--token, OPTLY_TOKEN or [optimizely] token)");
        }
        if self.projects.is_empty() {
            bail!("At least one project is required (--project or [[projects]])");
        }
        if let Some(project) = self
            .projects
            .iter()
            .find(|p| p.qa_audience_id.trim().is_empty())
        {
            bail!("Project {} has an empty qa-audience-id", project.id);
        }
        if self.window.minutes == 0 {
            bail!("The polling window must be at least one minute");
        }
        if self.optimizely.per_page == 0 {
            bail!("per-page must be greater than zero");
        }
        if self.targeting.total_allocation <= 0 {
            bail!("total-allocation must be positive");
        }
        Ok(())
    }

    /// Copy of the configuration that is safe to print.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.optimizely.token.is_some() {
            config.optimizely.token = Some("***".to_string());
        }
        if config.notify.webhook_url.is_some() {
            config.notify.webhook_url = Some("***".to_string());
        }
        config
    }
}

impl fmt::Display for ProjectConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (id {}, QA audience {})",
            self.display_label(),
            self.id,
            self.qa_audience_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn valid_config() -> Config {
        Config {
            optimizely: OptimizelyConfig {
                token: Some("2:token".to_string()),
                ..Default::default()
            },
            projects: vec![ProjectConfig {
                id: 100,
                qa_audience_id: "200".to_string(),
                label: None,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.optimizely.base_url, "https://api.optimizely.com/v2/");
        assert_eq!(config.optimizely.per_page, 25);
        assert_eq!(config.window.minutes, 60);
        assert_eq!(config.targeting.qa_page_marker, "devtest");
        assert_eq!(
            config.targeting.analytics_marker,
            "optimizely.sendAnalyticsEvents"
        );
        assert_eq!(config.targeting.total_allocation, 10_000);
        assert!(config.projects.is_empty());
        assert!(matches!(config.output.format, OutputFormat::Summary));
    }

    #[test]
    fn test_load_toml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        let toml_content = r#"
[optimizely]
token = "2:toml-token"
per-page = 50

[[projects]]
id = 1111
qa-audience-id = 2222
label = "TH"

[[projects]]
id = 3333
qa-audience-id = "4444"

[targeting]
qa-page-marker = "staging"

[window]
minutes = 30

[notify]
webhook-url = "https://example.webhook.office.com/abc"

[output]
format = "json"
pretty = true
"#;
        write!(temp_file, "{}", toml_content).unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.optimizely.token, Some("2:toml-token".to_string()));
        assert_eq!(config.optimizely.per_page, 50);
        assert_eq!(config.optimizely.max_pages, 10);
        assert_eq!(config.projects.len(), 2);
        assert_eq!(config.projects[0].qa_audience_id, "2222");
        assert_eq!(config.projects[0].display_label(), "TH");
        assert_eq!(config.projects[1].display_label(), "3333");
        assert_eq!(config.targeting.qa_page_marker, "staging");
        assert_eq!(config.window.minutes, 30);
        assert_eq!(
            config.notify.webhook_url.as_deref(),
            Some("https://example.webhook.office.com/abc")
        );
        assert!(matches!(config.output.format, OutputFormat::Json));
        assert!(config.output.pretty);
    }

    #[test]
    fn test_load_json_config() {
        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        let json_content = r#"{
  "optimizely": {"token": "2:json-token"},
  "projects": [{"id": 1, "qa-audience-id": "9"}],
  "output": {"format": "csv"}
}"#;
        write!(temp_file, "{}", json_content).unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.optimizely.token, Some("2:json-token".to_string()));
        assert_eq!(config.projects[0].id, 1);
        assert!(matches!(config.output.format, OutputFormat::Csv));
    }

    #[test]
    fn test_load_yaml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        let yaml_content = r#"
projects:
  - id: 5
    qa-audience-id: 6
    label: CK
notify:
  timezone-label: UTC
  utc-offset-minutes: 0
"#;
        write!(temp_file, "{}", yaml_content).unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.projects[0].display_label(), "CK");
        assert_eq!(config.notify.timezone_label, "UTC");
        assert_eq!(config.notify.utc_offset_minutes, 0);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let result = Config::load(Some(Path::new("does-not-exist.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_discover_prefers_working_directory() {
        let work_dir = tempfile::tempdir().unwrap();
        let user_dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(user_dir.path().join("launchwatch")).unwrap();
        std::fs::write(user_dir.path().join("launchwatch/config.toml"), "").unwrap();

        let found = Config::discover(work_dir.path(), Some(user_dir.path().to_path_buf()));
        assert_eq!(found, Some(user_dir.path().join("launchwatch/config.toml")));

        std::fs::write(work_dir.path().join("launchwatch.yaml"), "").unwrap();
        let found = Config::discover(work_dir.path(), Some(user_dir.path().to_path_buf()));
        assert_eq!(found, Some(work_dir.path().join("launchwatch.yaml")));
    }

    #[test]
    fn test_discover_finds_nothing() {
        let work_dir = tempfile::tempdir().unwrap();
        assert_eq!(Config::discover(work_dir.path(), None), None);
    }

    #[test]
    fn test_project_from_str() {
        let project: ProjectConfig = "123:456:TH".parse().unwrap();
        assert_eq!(project.id, 123);
        assert_eq!(project.qa_audience_id, "456");
        assert_eq!(project.label.as_deref(), Some("TH"));

        let unlabeled: ProjectConfig = "123:456".parse().unwrap();
        assert_eq!(unlabeled.label, None);

        assert!("123".parse::<ProjectConfig>().is_err());
        assert!("abc:456".parse::<ProjectConfig>().is_err());
        assert!(":456".parse::<ProjectConfig>().is_err());
    }

    #[test]
    fn test_validate() {
        assert!(valid_config().validate().is_ok());

        let mut no_token = valid_config();
        no_token.optimizely.token = Some("  ".to_string());
        assert!(no_token.validate().is_err());

        let mut no_projects = valid_config();
        no_projects.projects.clear();
        assert!(no_projects.validate().is_err());

        let mut empty_audience = valid_config();
        empty_audience.projects[0].qa_audience_id = String::new();
        assert!(empty_audience.validate().is_err());

        let mut no_window = valid_config();
        no_window.window.minutes = 0;
        assert!(no_window.validate().is_err());
    }

    #[test]
    fn test_redacted_hides_secrets() {
        let mut config = valid_config();
        config.notify.webhook_url = Some("https://hook".to_string());

        let redacted = config.redacted();
        assert_eq!(redacted.optimizely.token.as_deref(), Some("***"));
        assert_eq!(redacted.notify.webhook_url.as_deref(), Some("***"));

        let toml = toml::to_string_pretty(&redacted).unwrap();
        assert!(!toml.contains("2:token"));
    }
}
