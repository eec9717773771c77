use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
}

impl Paths {
    pub fn new() -> Self {
        let base = dirs::home_dir()
            .map(|h| h.join(".clawbot"))
            .unwrap_or_else(|| PathBuf::from(".clawbot"));
        Self { base }
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.json")
    }

    pub fn workspace(&self) -> PathBuf {
        self.base.join("workspace")
    }

    pub fn memory_file(&self) -> PathBuf {
        self.base.join("memory.json")
    }

    pub fn browser_dir(&self) -> PathBuf {
        self.base.join("browser")
    }

    pub fn screenshots_dir(&self) -> PathBuf {
        self.browser_dir().join("screenshots")
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.base)?;
        std::fs::create_dir_all(self.workspace())?;
        std::fs::create_dir_all(self.browser_dir())?;
        std::fs::create_dir_all(self.screenshots_dir())?;
        Ok(())
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_layout() {
        let p = Paths::with_base(PathBuf::from("/tmp/clawbot-test"));
        assert_eq!(p.config_file(), PathBuf::from("/tmp/clawbot-test/config.json"));
        assert_eq!(p.memory_file(), PathBuf::from("/tmp/clawbot-test/memory.json"));
        assert!(p.screenshots_dir().starts_with(p.browser_dir()));
    }
}
