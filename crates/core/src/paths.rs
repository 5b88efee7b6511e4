use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
}

impl Paths {
    pub fn new() -> Self {
        let base = dirs::home_dir()
            .map(|h| h.join(".webgrip"))
            .unwrap_or_else(|| PathBuf::from(".webgrip"));
        Self { base }
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.json")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.base.join("sessions")
    }

    pub fn session_file(&self, name: &str) -> PathBuf {
        let safe_name = name.replace([':', '/', '\\'], "_");
        self.sessions_dir().join(format!("{}.json", safe_name))
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.base.join("downloads")
    }

    pub fn screenshots_dir(&self) -> PathBuf {
        self.base.join("screenshots")
    }

    pub fn traces_dir(&self) -> PathBuf {
        self.base.join("traces")
    }

    pub fn browser_profiles_dir(&self) -> PathBuf {
        self.base.join("profiles")
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.base)?;
        std::fs::create_dir_all(self.sessions_dir())?;
        std::fs::create_dir_all(self.downloads_dir())?;
        std::fs::create_dir_all(self.screenshots_dir())?;
        std::fs::create_dir_all(self.traces_dir())?;
        std::fs::create_dir_all(self.browser_profiles_dir())?;
        Ok(())
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}
