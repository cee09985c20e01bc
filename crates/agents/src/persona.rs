use std::path::Path;

use tracing::{info, warn};

/// Load the persona markdown that becomes the first system message.
///
/// Missing path, unreadable file, or blank contents all degrade to `None`
/// (the bot still answers, just without a persona) with a warning so the
/// operator notices.
pub fn load_persona(path: Option<&Path>) -> Option<String> {
    let path = path?;
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let trimmed = contents.trim();
            if trimmed.is_empty() {
                warn!(path = %path.display(), "persona file is empty, ignoring");
                None
            } else {
                info!(path = %path.display(), chars = trimmed.len(), "persona loaded");
                Some(trimmed.to_string())
            }
        },
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read persona file");
            None
        },
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, std::io::Write};

    #[test]
    fn loads_and_trims_persona() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "\nYou are Maple, a cheerful assistant.\n").unwrap();
        let persona = load_persona(Some(file.path())).unwrap();
        assert_eq!(persona, "You are Maple, a cheerful assistant.");
    }

    #[test]
    fn empty_file_yields_none() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(load_persona(Some(file.path())).is_none());
    }

    #[test]
    fn missing_path_yields_none() {
        assert!(load_persona(Some(Path::new("/no/such/persona.md"))).is_none());
        assert!(load_persona(None).is_none());
    }
}
