use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

/// Expand a leading `~/` to the home directory
pub fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

pub fn is_confirmed(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("yes")
}

/// Ask on stdout, read one line from stdin
pub fn confirm(prompt: &str) -> io::Result<bool> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(is_confirmed(&answer))
}

/// Environment variable that must be set and non-empty
pub fn require_env(name: &str) -> Result<String, saorsa_cloud::CloudError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| saorsa_cloud::CloudError::MissingEnvVar(name.to_string()))
}
