//! Shell profile integration.
//!
//! `swup init` hooks the generated environment script into the user's shell
//! profile so that new shells see the active toolchain on `PATH`.
//!
//! For bash/zsh:
//! ```bash
//! # Added by swup
//! . "$HOME/.local/share/swup/env.sh"
//! ```
//!
//! For fish:
//! ```fish
//! # Added by swup
//! source "$HOME/.local/share/swup/env.fish"
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Marks a profile that already sources a swup environment script.
const SWUP_MARKER: &str = "# Added by swup";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
}

impl Shell {
    const ALL: [Self; 3] = [Self::Bash, Self::Zsh, Self::Fish];

    /// Detects the user's shell from the SHELL environment variable.
    #[must_use]
    pub fn detect() -> Option<Self> {
        let shell_path = std::env::var("SHELL").ok()?;
        Self::from_path(&shell_path)
    }

    /// Parses a shell from a path such as `/bin/bash`.
    #[must_use]
    pub fn from_path(path: &str) -> Option<Self> {
        let shell_name = Path::new(path).file_name()?.to_str()?;
        match shell_name {
            "bash" => Some(Self::Bash),
            "zsh" => Some(Self::Zsh),
            "fish" => Some(Self::Fish),
            _ => None,
        }
    }

    /// Profile files in order of preference. The first one is created when
    /// none exists.
    #[must_use]
    pub fn profile_candidates(self, home_dir: &Path) -> Vec<PathBuf> {
        match self {
            Self::Bash => vec![
                home_dir.join(".bashrc"),
                home_dir.join(".bash_profile"),
                home_dir.join(".profile"),
            ],
            Self::Zsh => vec![home_dir.join(".zshrc"), home_dir.join(".zprofile")],
            Self::Fish => vec![home_dir.join(".config").join("fish").join("config.fish")],
        }
    }

    /// The environment script this shell sources.
    #[must_use]
    pub fn env_script(self, bash_script: &Path, fish_script: &Path) -> PathBuf {
        match self {
            Self::Bash | Self::Zsh => bash_script.to_path_buf(),
            Self::Fish => fish_script.to_path_buf(),
        }
    }

    /// The profile snippet sourcing `script`.
    #[must_use]
    pub fn source_snippet(self, script: &Path) -> String {
        let escaped = script
            .display()
            .to_string()
            .replace('\\', "\\\\")
            .replace('$', "\\$")
            .replace('`', "\\`")
            .replace('"', "\\\"");
        match self {
            Self::Bash | Self::Zsh => format!("\n{SWUP_MARKER}\n. \"{escaped}\"\n"),
            Self::Fish => format!("\n{SWUP_MARKER}\nsource \"{escaped}\"\n"),
        }
    }

    /// The command a user runs to pick up the change in the current shell.
    #[must_use]
    pub fn reload_command(self, script: &Path) -> String {
        match self {
            Self::Bash | Self::Zsh => format!(". \"{}\"", script.display()),
            Self::Fish => format!("source \"{}\"", script.display()),
        }
    }
}

/// Result of hooking the environment script into a shell profile.
#[derive(Debug)]
pub enum ConfigureResult {
    /// The profile now sources the script.
    Added {
        profile: PathBuf,
        reload_command: String,
    },
    /// The profile already sourced a swup script.
    AlreadyConfigured { profile: PathBuf },
    /// The shell could not be detected or is not supported.
    ShellNotDetected,
}

/// Adds a line sourcing the swup environment script to the user's profile.
///
/// # Errors
///
/// Returns an error if the profile cannot be read or written. An unknown
/// shell is reported as [`ConfigureResult::ShellNotDetected`].
pub fn configure_profile(
    user_home: &Path,
    env_sh: &Path,
    env_fish: &Path,
) -> Result<ConfigureResult> {
    let Some(shell) = Shell::detect() else {
        return Ok(ConfigureResult::ShellNotDetected);
    };
    configure_profile_for(shell, user_home, env_sh, env_fish)
}

fn configure_profile_for(
    shell: Shell,
    user_home: &Path,
    env_sh: &Path,
    env_fish: &Path,
) -> Result<ConfigureResult> {
    let candidates = shell.profile_candidates(user_home);
    let profile = match find_existing_profile(&candidates) {
        Some(profile) => profile,
        None => candidates[0].clone(),
    };

    if profile.exists() && is_profile_configured(&profile)? {
        return Ok(ConfigureResult::AlreadyConfigured { profile });
    }

    let script = shell.env_script(env_sh, env_fish);
    append_to_file(&profile, &shell.source_snippet(&script))?;
    tracing::info!(profile = %profile.display(), "shell profile updated");

    Ok(ConfigureResult::Added {
        profile,
        reload_command: shell.reload_command(&script),
    })
}

fn find_existing_profile(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates.iter().find(|p| p.exists()).cloned()
}

fn is_profile_configured(profile: &Path) -> Result<bool> {
    let content = std::fs::read_to_string(profile)
        .with_context(|| format!("Failed to read profile: {}", profile.display()))?;
    Ok(content.contains(SWUP_MARKER))
}

fn append_to_file(path: &Path, content: &str) -> Result<()> {
    use std::fs::OpenOptions;
    use std::io::Write;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open profile for writing: {}", path.display()))?;

    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write to profile: {}", path.display()))?;

    Ok(())
}

/// Removes the snippets `swup init` added from every known profile.
///
/// Returns the profiles that changed.
///
/// # Errors
///
/// Returns an error if a profile cannot be read or rewritten.
pub fn remove_from_profiles(
    user_home: &Path,
    env_sh: &Path,
    env_fish: &Path,
) -> Result<Vec<PathBuf>> {
    let mut changed = Vec::new();
    for shell in Shell::ALL {
        let snippet = shell.source_snippet(&shell.env_script(env_sh, env_fish));
        for profile in shell.profile_candidates(user_home) {
            if !profile.is_file() || changed.contains(&profile) {
                continue;
            }
            let content = std::fs::read_to_string(&profile)
                .with_context(|| format!("Failed to read profile: {}", profile.display()))?;
            if !content.contains(&snippet) {
                continue;
            }
            replace_file(&profile, &content.replace(&snippet, ""))?;
            tracing::info!(profile = %profile.display(), "shell profile restored");
            changed.push(profile);
        }
    }
    Ok(changed)
}

/// Rewrites `path` in one rename, keeping its permissions.
fn replace_file(path: &Path, content: &str) -> Result<()> {
    use std::io::Write;

    let dir = path.parent().unwrap_or(Path::new("."));
    let permissions = std::fs::metadata(path)
        .with_context(|| format!("Failed to read profile: {}", path.display()))?
        .permissions();
    let mut temp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create a file in {}", dir.display()))?;
    temp.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write to profile: {}", path.display()))?;
    std::fs::set_permissions(temp.path(), permissions)
        .with_context(|| format!("Failed to set permissions: {}", path.display()))?;
    temp.persist(path)
        .with_context(|| format!("Failed to replace profile: {}", path.display()))?;
    Ok(())
}

/// Describes a configuration result for the user.
#[must_use]
pub fn format_result_message(result: &ConfigureResult, env_sh: &Path) -> String {
    match result {
        ConfigureResult::Added {
            profile,
            reload_command,
        } => format!(
            "Updated {}\nRun '{reload_command}' to use swup in this shell.",
            profile.display()
        ),
        ConfigureResult::AlreadyConfigured { profile } => {
            format!("Shell profile already configured: {}", profile.display())
        }
        ConfigureResult::ShellNotDetected => format!(
            "Could not detect your shell. Add this line to your shell profile:\n  . \"{}\"",
            env_sh.display()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_from_path() {
        assert_eq!(Shell::from_path("/bin/bash"), Some(Shell::Bash));
        assert_eq!(Shell::from_path("/usr/local/bin/zsh"), Some(Shell::Zsh));
        assert_eq!(Shell::from_path("/usr/bin/fish"), Some(Shell::Fish));
        assert_eq!(Shell::from_path("/bin/tcsh"), None);
        assert_eq!(Shell::from_path(""), None);
    }

    #[test]
    fn bash_prefers_bashrc() {
        let candidates = Shell::Bash.profile_candidates(Path::new("/home/user"));
        assert_eq!(candidates[0], PathBuf::from("/home/user/.bashrc"));
        assert_eq!(candidates.len(), 3);
    }

    #[test]
    fn fish_sources_fish_script() {
        let script = Shell::Fish.env_script(Path::new("/h/env.sh"), Path::new("/h/env.fish"));
        assert_eq!(script, PathBuf::from("/h/env.fish"));
        let snippet = Shell::Fish.source_snippet(&script);
        assert!(snippet.contains(SWUP_MARKER));
        assert!(snippet.contains("source \"/h/env.fish\""));
    }

    #[test]
    fn snippet_escapes_shell_metacharacters() {
        let snippet = Shell::Zsh.source_snippet(Path::new("/home/$user/env.sh"));
        assert!(snippet.contains(". \"/home/\\$user/env.sh\""));
    }

    #[test]
    fn configure_creates_missing_profile() {
        let home = tempfile::tempdir().unwrap();
        let env_sh = home.path().join("swup/env.sh");
        let env_fish = home.path().join("swup/env.fish");

        let result = configure_profile_for(Shell::Fish, home.path(), &env_sh, &env_fish).unwrap();
        let ConfigureResult::Added { profile, .. } = result else {
            panic!("expected the profile to be created");
        };
        assert_eq!(profile, home.path().join(".config/fish/config.fish"));
        let content = std::fs::read_to_string(&profile).unwrap();
        assert!(content.contains("env.fish"));
    }

    #[test]
    fn configure_is_idempotent() {
        let home = tempfile::tempdir().unwrap();
        let bashrc = home.path().join(".bashrc");
        std::fs::write(&bashrc, "alias ll='ls -l'\n").unwrap();
        let env_sh = home.path().join("swup/env.sh");
        let env_fish = home.path().join("swup/env.fish");

        let first = configure_profile_for(Shell::Bash, home.path(), &env_sh, &env_fish).unwrap();
        assert!(matches!(first, ConfigureResult::Added { .. }));
        let second = configure_profile_for(Shell::Bash, home.path(), &env_sh, &env_fish).unwrap();
        assert!(matches!(second, ConfigureResult::AlreadyConfigured { .. }));

        let content = std::fs::read_to_string(&bashrc).unwrap();
        assert!(content.starts_with("alias ll"));
        assert_eq!(content.matches(SWUP_MARKER).count(), 1);
    }

    #[test]
    fn removal_restores_profiles_configure_touched() {
        let home = tempfile::tempdir().unwrap();
        let bashrc = home.path().join(".bashrc");
        std::fs::write(&bashrc, "alias ll='ls -l'\n").unwrap();
        std::fs::write(home.path().join(".zshrc"), "bindkey -e\n").unwrap();
        let env_sh = home.path().join("swup/env.sh");
        let env_fish = home.path().join("swup/env.fish");
        configure_profile_for(Shell::Bash, home.path(), &env_sh, &env_fish).unwrap();
        configure_profile_for(Shell::Fish, home.path(), &env_sh, &env_fish).unwrap();
        std::fs::write(&bashrc, std::fs::read_to_string(&bashrc).unwrap() + "export EDITOR=vi\n").unwrap();

        let changed = remove_from_profiles(home.path(), &env_sh, &env_fish).unwrap();

        let fish = home.path().join(".config/fish/config.fish");
        assert_eq!(changed, [bashrc.clone(), fish.clone()]);
        assert_eq!(
            std::fs::read_to_string(&bashrc).unwrap(),
            "alias ll='ls -l'\nexport EDITOR=vi\n"
        );
        assert_eq!(std::fs::read_to_string(&fish).unwrap(), "");
        assert_eq!(
            std::fs::read_to_string(home.path().join(".zshrc")).unwrap(),
            "bindkey -e\n"
        );
        assert!(remove_from_profiles(home.path(), &env_sh, &env_fish).unwrap().is_empty());
    }
}
