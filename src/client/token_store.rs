use std::fs;
use std::io;
use std::path::PathBuf;

/// Durable storage for the single credential token.
///
/// Read once at process start, written on login/signup, removed on logout.
/// This is the only client-side state that survives a restart.
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> io::Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let token = contents.trim().to_string();
                Ok(if token.is_empty() { None } else { Some(token) })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn save(&self, token: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, token)
    }

    pub fn clear(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_store() -> TokenStore {
        let path = std::env::temp_dir()
            .join(format!("token-store-test-{}", Uuid::new_v4()))
            .join("token");
        TokenStore::new(path)
    }

    #[test]
    fn test_load_missing_is_none() {
        let store = temp_store();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_save_load_clear() {
        let store = temp_store();
        store.save("tok-123").unwrap();
        assert_eq!(store.load().unwrap(), Some("tok-123".to_string()));

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);

        // Clearing again is a no-op
        store.clear().unwrap();
    }
}
