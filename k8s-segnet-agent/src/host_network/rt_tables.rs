use std::{io, path::PathBuf};

use tokio::fs;

pub const RT_TABLES_PATH: &str = "/etc/iproute2/rt_tables";

/// Registry of named policy routing tables, one `<id> <name>` line per table.
/// Lines starting with `#` are comments and are left untouched.
pub struct RtTablesFile {
    path: PathBuf,
}

impl Default for RtTablesFile {
    fn default() -> Self {
        Self {
            path: RT_TABLES_PATH.into(),
        }
    }
}

impl RtTablesFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Appends an entry for `name` unless one is already registered.
    /// Creates the registry file if it doesn't exist yet.
    pub async fn register(&self, id: u32, name: &str) -> io::Result<()> {
        let mut contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => String::new(),
            Err(error) => return Err(error),
        };

        if entry_names(&contents).any(|entry| entry == name) {
            return Ok(());
        }

        if !contents.is_empty() && !contents.ends_with('\n') {
            contents.push('\n');
        }

        contents.push_str(&format!("{id}\t{name}\n"));

        fs::write(&self.path, contents).await
    }

    /// Drops every entry registered under `name`. An absent entry and an
    /// absent registry file both count as success.
    pub async fn unregister(&self, name: &str) -> io::Result<()> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(error) => return Err(error),
        };

        let mut removed = false;
        let mut retained = String::with_capacity(contents.len());

        for line in contents.lines() {
            if entry_name(line) == Some(name) {
                removed = true;
                continue;
            }

            retained.push_str(line);
            retained.push('\n');
        }

        if !removed {
            return Ok(());
        }

        fs::write(&self.path, retained).await
    }
}

fn entry_name(line: &str) -> Option<&str> {
    let mut fields = line.split_whitespace();
    let id = fields.next()?;

    if id.starts_with('#') {
        return None;
    }

    fields.next()
}

fn entry_names(contents: &str) -> impl Iterator<Item = &str> {
    contents.lines().filter_map(entry_name)
}
