use std::time::Duration;

use clap::Parser;
use wslink::signature::DEFAULT_LOGIN_URL;
use wslink::{DEFAULT_WS_URL, LinkConfig};

/// Keep an authenticated websocket session open and log every frame.
///
/// Credentials are read from the IP_USERNAME and IP_PASSWORD environment
/// variables (a .env file in the working directory is honored).
#[derive(Parser, Debug)]
#[command(name = "wslink", version, about, long_about = None)]
pub struct Args {
    /// Websocket endpoint
    #[arg(long, env = "WSLINK_URL", default_value = DEFAULT_WS_URL)]
    pub url: String,

    /// Login page used to obtain the session signature
    #[arg(long, env = "WSLINK_LOGIN_URL", default_value = DEFAULT_LOGIN_URL)]
    pub login_url: String,

    /// Seconds to wait between a disconnect and the next attempt
    #[arg(long, env = "WSLINK_RECONNECT_DELAY", default_value_t = 120)]
    pub reconnect_delay: u64,

    /// Give up on a login attempt after this many seconds (default: wait forever)
    #[arg(long, env = "WSLINK_AUTH_TIMEOUT")]
    pub auth_timeout: Option<u64>,

    /// Validate the websocket server certificate
    #[arg(long)]
    pub verify_tls: bool,

    /// Enable debug logging
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Load `.env`, then parse the command line so its values feed the
    /// `env` fallbacks above.
    pub fn load() -> Self {
        // .env may carry RUST_LOG and WSLINK_* settings as well as the credentials
        dotenvy::dotenv().ok();
        Self::parse()
    }

    pub fn link_config(&self) -> LinkConfig {
        LinkConfig::default()
            .with_url(self.url.clone())
            .with_reconnect_delay(Duration::from_secs(self.reconnect_delay))
            .with_auth_timeout(self.auth_timeout.map(Duration::from_secs))
            .with_danger_accept_invalid_certs(!self.verify_tls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    // Tests that read or write WSLINK_* variables hold this lock.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_defaults_match_library() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let args = Args::try_parse_from(["wslink"]).unwrap();
        let config = args.link_config();
        assert_eq!(config, LinkConfig::default());
        assert_eq!(args.login_url, DEFAULT_LOGIN_URL);
    }

    #[test]
    fn test_overrides() {
        let args = Args::try_parse_from([
            "wslink",
            "--url",
            "ws://127.0.0.1:9000",
            "--reconnect-delay",
            "5",
            "--auth-timeout",
            "30",
            "--verify-tls",
        ])
        .unwrap();
        let config = args.link_config();
        assert_eq!(config.url, "ws://127.0.0.1:9000");
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
        assert_eq!(config.auth_timeout, Some(Duration::from_secs(30)));
        assert!(!config.danger_accept_invalid_certs);
    }

    #[test]
    fn test_env_file_values_feed_arguments() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());

        let mut env_file = tempfile::NamedTempFile::new().unwrap();
        writeln!(env_file, "WSLINK_URL=ws://127.0.0.1:9100").unwrap();
        writeln!(env_file, "WSLINK_RECONNECT_DELAY=7").unwrap();
        dotenvy::from_path(env_file.path()).unwrap();

        let parsed = Args::try_parse_from(["wslink"]);

        // SAFETY: ENV_LOCK serializes every test touching these variables.
        unsafe {
            std::env::remove_var("WSLINK_URL");
            std::env::remove_var("WSLINK_RECONNECT_DELAY");
        }

        let config = parsed.unwrap().link_config();
        assert_eq!(config.url, "ws://127.0.0.1:9100");
        assert_eq!(config.reconnect_delay, Duration::from_secs(7));
    }

    #[test]
    fn test_command_line_overrides_env_file() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());

        let mut env_file = tempfile::NamedTempFile::new().unwrap();
        writeln!(env_file, "WSLINK_AUTH_TIMEOUT=90").unwrap();
        dotenvy::from_path(env_file.path()).unwrap();

        let parsed = Args::try_parse_from(["wslink", "--auth-timeout", "15"]);

        // SAFETY: ENV_LOCK serializes every test touching these variables.
        unsafe { std::env::remove_var("WSLINK_AUTH_TIMEOUT") };

        let config = parsed.unwrap().link_config();
        assert_eq!(config.auth_timeout, Some(Duration::from_secs(15)));
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        assert!(Args::try_parse_from(["wslink", "-v", "-q"]).is_err());
    }
}
