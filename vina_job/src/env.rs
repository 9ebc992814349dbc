use std::path::PathBuf;

use anyhow::{Context, Result};

/// Prepend `user_specified_paths`, `./bin` and the directory of the running
/// binary to `PATH` so bundled tools win over system ones.
pub fn set_path(user_specified_paths: &[PathBuf]) -> Result<()> {
    let current_exe = std::env::current_exe().context("Unable to locate the running binary")?;
    let mut paths = user_specified_paths.to_vec();
    paths.push(std::env::current_dir()?.join("bin"));
    if let Some(binary_directory) = current_exe.parent() {
        paths.push(binary_directory.to_path_buf());
    }
    let current_path_var = std::env::var_os("PATH").unwrap_or_default();
    paths.extend(std::env::split_paths(&current_path_var));
    let paths = std::env::join_paths(paths).context("Unable to build PATH")?;
    std::env::set_var("PATH", paths);
    Ok(())
}
