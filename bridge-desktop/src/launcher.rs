//! URL Launching via the system opener

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    launcher::{LaunchOptions, UrlLauncher},
};
use tokio::process::Command;
use tracing::{debug, warn};

/// Schemes the desktop opener is expected to handle
const DEFAULT_SCHEMES: &[&str] = &["http", "https", "mailto", "file", "tel", "sms"];

/// Launches URLs with the platform's opener
///
/// - **Linux/BSD**: `xdg-open <url>`
/// - **macOS**: `open <url>`
/// - **Windows**: `rundll32 url.dll,FileProtocolHandler <url>`
///
/// The URL is always passed as one argument to the opener, never through a
/// shell.
///
/// Desktop has no in-app web view; `use_web_view` requests open in the
/// default browser instead.
#[derive(Debug, Clone)]
pub struct SystemUrlLauncher {
    program: String,
    args: Vec<String>,
    schemes: Vec<String>,
}

impl SystemUrlLauncher {
    pub fn new() -> Self {
        let (program, args): (&str, &[&str]) = if cfg!(target_os = "macos") {
            ("open", &[])
        } else if cfg!(target_os = "windows") {
            ("rundll32", &["url.dll,FileProtocolHandler"])
        } else {
            ("xdg-open", &[])
        };

        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            schemes: DEFAULT_SCHEMES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Use a different opener; the URL is appended after `args`
    pub fn with_opener(mut self, program: impl Into<String>, args: Vec<String>) -> Self {
        self.program = program.into();
        self.args = args;
        self
    }

    /// Replace the set of accepted schemes
    pub fn with_schemes<I, S>(mut self, schemes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.schemes = schemes.into_iter().map(Into::into).collect();
        self
    }

    fn scheme(url: &str) -> Option<&str> {
        let (scheme, rest) = url.split_once(':')?;
        let valid = !scheme.is_empty()
            && !rest.is_empty()
            && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        valid.then_some(scheme)
    }

    fn accepts(&self, url: &str) -> bool {
        if url.chars().any(char::is_control) {
            return false;
        }
        Self::scheme(url).is_some_and(|scheme| {
            self.schemes
                .iter()
                .any(|accepted| accepted.eq_ignore_ascii_case(scheme))
        })
    }
}

impl Default for SystemUrlLauncher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UrlLauncher for SystemUrlLauncher {
    async fn can_launch(&self, url: &str) -> Result<bool> {
        Ok(self.accepts(url))
    }

    async fn launch(&self, url: &str, options: LaunchOptions) -> Result<bool> {
        if !self.accepts(url) {
            debug!(url = url, "No handler for URL scheme");
            return Ok(false);
        }
        if options.use_web_view {
            debug!("In-app web view unavailable on desktop, using default handler");
        }

        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(url)
            .status()
            .await
            .map_err(|e| {
                BridgeError::OperationFailed(format!("Failed to run {}: {}", self.program, e))
            })?;

        if !status.success() {
            warn!(program = %self.program, status = %status, "Opener reported failure");
        }
        Ok(status.success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_can_launch_by_scheme() {
        let launcher = SystemUrlLauncher::new();
        assert!(launcher.can_launch("https://flutter.dev").await.unwrap());
        assert!(launcher.can_launch("MAILTO:dev@example.com").await.unwrap());
        assert!(!launcher.can_launch("myapp://open").await.unwrap());
        assert!(!launcher.can_launch("not a url").await.unwrap());
        assert!(!launcher.can_launch("https:").await.unwrap());
    }

    #[test]
    fn test_default_opener_is_not_a_shell() {
        let launcher = SystemUrlLauncher::new();
        assert!(!["cmd", "sh", "bash", "powershell"].contains(&launcher.program.as_str()));
        assert!(!launcher.args.iter().any(|arg| arg.eq_ignore_ascii_case("/C")));
    }

    #[tokio::test]
    async fn test_control_characters_rejected() {
        let launcher = SystemUrlLauncher::new();
        assert!(!launcher.can_launch("https://x/\nrm").await.unwrap());
        assert!(!launcher.can_launch("https://x/\r\n").await.unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_url_with_ampersand_is_one_argument() {
        let url = "https://x/?a=1&calc";
        // Succeeds only when the URL arrives as a single untouched argument
        let launcher = SystemUrlLauncher::new().with_opener(
            "sh",
            vec![
                "-c".to_string(),
                format!("[ \"$#\" -eq 1 ] && [ \"$1\" = '{url}' ]"),
                "opener".to_string(),
            ],
        );
        assert!(launcher.launch(url, LaunchOptions::default()).await.unwrap());
    }

    #[tokio::test]
    async fn test_rejected_scheme_not_launched() {
        let launcher = SystemUrlLauncher::new().with_opener("definitely-missing-opener", vec![]);
        let launched = launcher
            .launch("myapp://open", LaunchOptions::default())
            .await
            .unwrap();
        assert!(!launched);
    }

    #[tokio::test]
    async fn test_missing_opener_is_an_error() {
        let launcher = SystemUrlLauncher::new().with_opener("definitely-missing-opener", vec![]);
        assert!(launcher
            .launch("https://flutter.dev", LaunchOptions::default())
            .await
            .is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_opener_exit_status() {
        let ok = SystemUrlLauncher::new().with_opener("true", vec![]);
        assert!(ok.launch("https://flutter.dev", LaunchOptions::default()).await.unwrap());

        let failing = SystemUrlLauncher::new().with_opener("false", vec![]);
        assert!(!failing
            .launch("https://flutter.dev", LaunchOptions::default())
            .await
            .unwrap());
    }
}
