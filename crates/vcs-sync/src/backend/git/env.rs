//! Environment injected into every git invocation.
//!
//! Configuration is passed with `GIT_CONFIG_COUNT` / `GIT_CONFIG_KEY_<n>` /
//! `GIT_CONFIG_VALUE_<n>` so nothing is written to the user's config files.

use crate::config::GitEnvironment;
use std::ffi::OsString;

/// Hosts that need HTTP/1.1 and a longer LFS activity timeout
const SLOW_LFS_HOSTS: [&str; 2] = ["azure", "visualstudio"];

/// Config key/value pairs for the given environment and remote URL
pub(crate) fn config_overrides(
    environment: &GitEnvironment,
    remote_url: Option<&str>,
) -> Vec<(String, String)> {
    let mut config = vec![
        (
            "credential.helper".to_string(),
            environment.credential_helper.clone(),
        ),
        (
            "credential.https://dev.azure.com.usehttppath".to_string(),
            "1".to_string(),
        ),
    ];

    if environment.long_paths {
        config.push(("core.longPaths".to_string(), "1".to_string()));
    }

    let slow_host = remote_url.is_some_and(|url| {
        let url = url.to_ascii_lowercase();
        SLOW_LFS_HOSTS.iter().any(|host| url.contains(host))
    });
    if slow_host {
        config.push(("http.version".to_string(), "HTTP/1.1".to_string()));
        config.push(("lfs.activitytimeout".to_string(), "60".to_string()));
    }

    config
}

/// Environment variables for a git child process
pub(crate) fn build_env(
    environment: &GitEnvironment,
    remote_url: Option<&str>,
) -> Vec<(OsString, OsString)> {
    let config = config_overrides(environment, remote_url);

    let mut envs: Vec<(OsString, OsString)> = Vec::with_capacity(config.len() * 2 + 4);
    envs.push(("GIT_CONFIG_COUNT".into(), config.len().to_string().into()));
    for (i, (key, value)) in config.into_iter().enumerate() {
        envs.push((format!("GIT_CONFIG_KEY_{i}").into(), key.into()));
        envs.push((
            format!("GIT_CONFIG_VALUE_{i}").into(),
            value.replace('\\', "/").into(),
        ));
    }

    envs.push(("GIT_LFS_FORCE_PROGRESS".into(), "1".into()));
    envs.push(("GIT_TERMINAL_PROMPT".into(), "0".into()));

    if let Some(exec_path) = &environment.exec_path {
        envs.push(("GIT_EXEC_PATH".into(), exec_path.clone().into_os_string()));
    }

    envs
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn lookup<'a>(envs: &'a [(OsString, OsString)], key: &str) -> Option<&'a str> {
        envs.iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.to_str())
    }

    #[test]
    fn test_default_environment() {
        let env = GitEnvironment {
            long_paths: false,
            ..GitEnvironment::default()
        };
        let envs = build_env(&env, Some("https://github.com/org/game.git"));

        assert_eq!(lookup(&envs, "GIT_CONFIG_COUNT"), Some("2"));
        assert_eq!(lookup(&envs, "GIT_CONFIG_KEY_0"), Some("credential.helper"));
        assert_eq!(lookup(&envs, "GIT_CONFIG_VALUE_0"), Some("manager"));
        assert_eq!(
            lookup(&envs, "GIT_CONFIG_KEY_1"),
            Some("credential.https://dev.azure.com.usehttppath")
        );
        assert_eq!(lookup(&envs, "GIT_LFS_FORCE_PROGRESS"), Some("1"));
        assert_eq!(lookup(&envs, "GIT_EXEC_PATH"), None);
    }

    #[test]
    fn test_azure_remote_adds_http_settings() {
        let env = GitEnvironment {
            long_paths: true,
            ..GitEnvironment::default()
        };
        let config = config_overrides(&env, Some("https://org.visualstudio.com/_git/game"));
        let keys: Vec<_> = config.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "credential.helper",
                "credential.https://dev.azure.com.usehttppath",
                "core.longPaths",
                "http.version",
                "lfs.activitytimeout",
            ]
        );

        let envs = build_env(&env, Some("https://dev.AZURE.com/org/game"));
        assert_eq!(lookup(&envs, "GIT_CONFIG_COUNT"), Some("5"));
        assert_eq!(lookup(&envs, "GIT_CONFIG_VALUE_3"), Some("HTTP/1.1"));
    }

    #[test]
    fn test_backslashes_become_forward_slashes() {
        let env = GitEnvironment {
            credential_helper: r"C:\Program Files\Git\mingw64\bin\git-credential-manager.exe"
                .to_string(),
            exec_path: Some(PathBuf::from("/opt/git/libexec/git-core")),
            long_paths: false,
            ..GitEnvironment::default()
        };
        let envs = build_env(&env, None);
        assert_eq!(
            lookup(&envs, "GIT_CONFIG_VALUE_0"),
            Some("C:/Program Files/Git/mingw64/bin/git-credential-manager.exe")
        );
        assert_eq!(
            lookup(&envs, "GIT_EXEC_PATH"),
            Some("/opt/git/libexec/git-core")
        );
    }
}
