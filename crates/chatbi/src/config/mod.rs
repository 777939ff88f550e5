use std::path::{Component, Path, PathBuf};

use anyhow::{Result, bail};

pub const DATA_DIR_NAME: &str = ".chatbi";
pub const DATABASE_FILE_NAME: &str = "chatbi.sqlite";
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;
pub const QUEUE_CAPACITY_ENV: &str = "CHATBI_QUEUE_CAPACITY";
pub const MODEL_API_URL_ENV: &str = "CHATBI_MODEL_API_URL";
pub const DEFAULT_MODEL_API_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePaths {
    pub home_dir: PathBuf,
    pub cwd: PathBuf,
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
}

pub fn resolve_runtime_paths(
    home_dir: &Path,
    cwd: &Path,
    data_dir_override: Option<&Path>,
) -> Result<RuntimePaths> {
    if !home_dir.is_absolute() {
        bail!("home_dir must be absolute: {}", home_dir.display());
    }
    if !cwd.is_absolute() {
        bail!("cwd must be absolute: {}", cwd.display());
    }

    let home_dir = normalize_lexical(home_dir);
    let cwd = normalize_lexical(cwd);
    let data_dir = match data_dir_override {
        Some(path) => resolve_user_path(path, &home_dir, &cwd)?,
        None => home_dir.join(DATA_DIR_NAME),
    };
    let data_dir = normalize_lexical(&data_dir);
    let database_path = data_dir.join(DATABASE_FILE_NAME);

    Ok(RuntimePaths {
        home_dir,
        cwd,
        data_dir,
        database_path,
    })
}

/// Tuning of the frame pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Bound of the transport frame queue; producers wait when it is full.
    pub queue_capacity: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl DecoderConfig {
    /// Explicit override first, then `CHATBI_QUEUE_CAPACITY`, then the default.
    pub fn resolve(queue_capacity_override: Option<usize>) -> Result<Self> {
        let queue_capacity = match queue_capacity_override {
            Some(capacity) => capacity,
            None => match std::env::var(QUEUE_CAPACITY_ENV) {
                Ok(raw) => match raw.trim().parse::<usize>() {
                    Ok(capacity) => capacity,
                    Err(_) => bail!("{QUEUE_CAPACITY_ENV} must be a positive integer: {raw}"),
                },
                Err(_) => DEFAULT_QUEUE_CAPACITY,
            },
        };
        if queue_capacity == 0 {
            bail!("queue capacity must be greater than zero");
        }

        Ok(Self { queue_capacity })
    }
}

/// Model service used for chart generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelApiConfig {
    /// Base URL; `None` leaves chart generation unavailable.
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

impl ModelApiConfig {
    /// Explicit URL first, then `CHATBI_MODEL_API_URL`.
    pub fn resolve(base_url_override: Option<&str>, timeout_secs: Option<u64>) -> Result<Self> {
        let env_url = std::env::var(MODEL_API_URL_ENV).ok();
        Self::from_sources(base_url_override, env_url.as_deref(), timeout_secs)
    }

    fn from_sources(
        base_url_override: Option<&str>,
        env_url: Option<&str>,
        timeout_secs: Option<u64>,
    ) -> Result<Self> {
        let base_url = base_url_override
            .or(env_url)
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string);
        if let Some(url) = &base_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                bail!("model API URL must start with http:// or https://: {url}");
            }
        }

        let timeout_secs = timeout_secs.unwrap_or(DEFAULT_MODEL_API_TIMEOUT_SECS);
        if timeout_secs == 0 {
            bail!("model API timeout must be greater than zero");
        }

        Ok(Self {
            base_url,
            timeout_secs,
        })
    }
}

fn resolve_user_path(path: &Path, home_dir: &Path, cwd: &Path) -> Result<PathBuf> {
    let expanded = expand_tilde(path, home_dir)?;
    let resolved = if expanded.is_absolute() {
        expanded
    } else {
        cwd.join(expanded)
    };

    Ok(normalize_lexical(&resolved))
}

fn expand_tilde(path: &Path, home_dir: &Path) -> Result<PathBuf> {
    let mut components = path.components();
    match components.next() {
        Some(Component::Normal(first)) if first == "~" => {
            let mut expanded = home_dir.to_path_buf();
            for component in components {
                expanded.push(component.as_os_str());
            }
            Ok(expanded)
        }
        Some(Component::Normal(first))
            if first
                .to_str()
                .is_some_and(|segment| segment.starts_with('~')) =>
        {
            bail!(
                "unsupported home expansion syntax (only `~` and `~/...` are supported): {}",
                path.display()
            )
        }
        _ => Ok(path.to_path_buf()),
    }
}

fn normalize_lexical(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component.as_os_str());
                }
            }
            _ => normalized.push(component.as_os_str()),
        }
    }

    normalized
}

#[cfg(test)]
mod tests {
    use super::{
        DEFAULT_MODEL_API_TIMEOUT_SECS, DEFAULT_QUEUE_CAPACITY, DecoderConfig, ModelApiConfig,
        resolve_runtime_paths,
    };
    use std::path::Path;

    #[test]
    fn defaults_data_dir_under_home() {
        let paths = resolve_runtime_paths(Path::new("/home/tester"), Path::new("/work/repo"), None)
            .expect("paths should resolve");

        assert_eq!(paths.home_dir, Path::new("/home/tester"));
        assert_eq!(paths.cwd, Path::new("/work/repo"));
        assert_eq!(paths.data_dir, Path::new("/home/tester/.chatbi"));
        assert_eq!(
            paths.database_path,
            Path::new("/home/tester/.chatbi/chatbi.sqlite")
        );
    }

    #[test]
    fn expands_tilde_override_against_home_dir() {
        let paths = resolve_runtime_paths(
            Path::new("/home/tester"),
            Path::new("/work/repo"),
            Some(Path::new("~/custom/data")),
        )
        .expect("tilde override should resolve");

        assert_eq!(paths.data_dir, Path::new("/home/tester/custom/data"));
    }

    #[test]
    fn resolves_relative_override_against_cwd() {
        let paths = resolve_runtime_paths(
            Path::new("/home/tester"),
            Path::new("/work/repo"),
            Some(Path::new("./state/../state/chat")),
        )
        .expect("relative override should resolve");

        assert_eq!(paths.data_dir, Path::new("/work/repo/state/chat"));
        assert_eq!(
            paths.database_path,
            Path::new("/work/repo/state/chat/chatbi.sqlite")
        );
    }

    #[test]
    fn rejects_non_absolute_home_dir() {
        let err = resolve_runtime_paths(Path::new("home/tester"), Path::new("/work/repo"), None)
            .expect_err("relative home dir must fail");

        assert!(
            err.to_string().contains("home_dir must be absolute"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn rejects_tilde_username_syntax() {
        let err = resolve_runtime_paths(
            Path::new("/home/tester"),
            Path::new("/work/repo"),
            Some(Path::new("~someone/data")),
        )
        .expect_err("~username syntax must fail");

        assert!(
            err.to_string()
                .contains("unsupported home expansion syntax"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn explicit_queue_capacity_wins_and_zero_is_rejected() {
        let config = DecoderConfig::resolve(Some(8)).expect("override should resolve");
        assert_eq!(config.queue_capacity, 8);
        assert_eq!(DecoderConfig::default().queue_capacity, DEFAULT_QUEUE_CAPACITY);

        let err = DecoderConfig::resolve(Some(0)).expect_err("zero capacity must fail");
        assert!(err.to_string().contains("greater than zero"));
    }

    #[test]
    fn model_api_flag_wins_over_environment() {
        let config = ModelApiConfig::from_sources(
            Some(" http://flag.local:8000 "),
            Some("http://env.local"),
            None,
        )
        .expect("config should resolve");
        assert_eq!(config.base_url.as_deref(), Some("http://flag.local:8000"));
        assert_eq!(config.timeout_secs, DEFAULT_MODEL_API_TIMEOUT_SECS);

        let config = ModelApiConfig::from_sources(None, Some("https://env.local"), Some(5))
            .expect("config should resolve");
        assert_eq!(config.base_url.as_deref(), Some("https://env.local"));
        assert_eq!(config.timeout_secs, 5);
    }

    #[test]
    fn model_api_rejects_bad_values() {
        assert!(ModelApiConfig::from_sources(Some("model.local"), None, None).is_err());
        assert!(ModelApiConfig::from_sources(None, None, Some(0)).is_err());
        let unset = ModelApiConfig::from_sources(None, Some("  "), None).expect("blank is unset");
        assert_eq!(unset.base_url, None);
    }
}
