use std::{fmt, fs, io, path::Path, sync::LazyLock};

use regex::Regex;

use crate::error::{Result, WeatherError};

static API_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-f]{32}$").expect("static regex is valid"));

/// An OpenWeather API key: 32 lowercase hexadecimal characters.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if !API_KEY_RE.is_match(value) {
            return Err(WeatherError::InvalidInput(format!(
                "'{value}' is not a 32-character hexadecimal string"
            )));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Read a key from a plaintext file. `Ok(None)` when the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        match fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(WeatherError::storage(path, e)),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| WeatherError::storage(parent, e))?;
        }
        fs::write(path, &self.0).map_err(|e| WeatherError::storage(path, e))
    }
}

// Keep keys out of logs.
impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey({}…)", &self.0[..4])
    }
}
