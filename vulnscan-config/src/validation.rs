use thiserror::Error;

use super::models::{Config, LauncherKind};

#[derive(Debug, Error)]
pub enum ConfigGuardRailError {
    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },
    #[error(
        "DB_MIN_CONNECTIONS ({min}) must not exceed DB_MAX_CONNECTIONS ({max})"
    )]
    InvalidPoolBounds { min: u32, max: u32 },
    #[error("DB_MAX_CONNECTIONS must be greater than zero")]
    EmptyPool,
    #[error("SCAN_SCANNERS must name at least one scanner")]
    EmptyScanners,
    #[error("WORKER_IMAGE must be set when LAUNCHER_KIND=docker")]
    MissingWorkerImage,
}

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(
        &mut self,
        message: S,
        hint: H,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigWarning> {
        self.items.iter()
    }
}

pub fn apply_guard_rails(
    config: &Config,
) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let mut warnings = ConfigWarnings::default();

    if config.engine.timeout.is_zero() {
        return Err(ConfigGuardRailError::ZeroDuration {
            field: "SCAN_TIMEOUT",
        });
    }
    if config.engine.scanners.trim().is_empty() {
        return Err(ConfigGuardRailError::EmptyScanners);
    }

    if config.database.max_connections == 0 {
        return Err(ConfigGuardRailError::EmptyPool);
    }
    if config.database.min_connections > config.database.max_connections {
        return Err(ConfigGuardRailError::InvalidPoolBounds {
            min: config.database.min_connections,
            max: config.database.max_connections,
        });
    }

    if config.launcher.kind == LauncherKind::Docker
        && config.launcher.worker_image.trim().is_empty()
    {
        return Err(ConfigGuardRailError::MissingWorkerImage);
    }

    if let Some(interval) = config.reconciler.interval {
        if interval.is_zero() {
            return Err(ConfigGuardRailError::ZeroDuration {
                field: "RECONCILE_INTERVAL",
            });
        }
        if config.reconciler.pending_grace < config.engine.timeout {
            warnings.push_with_hint(
                "RECONCILE_PENDING_GRACE is shorter than SCAN_TIMEOUT; slow-starting units may be relaunched",
                "Raise RECONCILE_PENDING_GRACE above the scan timeout",
            );
        }
    }

    if config.database.primary_url.is_none() {
        warnings.push_with_hint(
            "No database URL configured",
            "Set DATABASE_URL or DB_HOST, DB_USER and DB_NAME",
        );
    }

    if config.launcher.kind == LauncherKind::Docker
        && config.launcher.worker_database_url.is_none()
        && config
            .database
            .primary_url
            .as_deref()
            .is_some_and(points_at_loopback)
    {
        warnings.push_with_hint(
            "Docker workers inherit a loopback DATABASE_URL they cannot reach",
            "Set WORKER_DATABASE_URL to an address reachable from the worker network",
        );
    }

    if !config.dev_mode && config.cors.is_wildcard_included() {
        warnings.push_with_hint(
            "CORS allows any origin",
            "Set CORS_ALLOWED_ORIGINS to the dashboard origin(s) outside development",
        );
    }

    Ok(warnings)
}

fn points_at_loopback(url: &str) -> bool {
    url::Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_owned))
        .is_some_and(|host| {
            host == "localhost" || host == "127.0.0.1" || host == "[::1]"
        })
}
