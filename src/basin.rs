use crate::error::{AppError, Result};
use std::fmt;
use std::str::FromStr;

/// Drainage basins known to the GeoServer. The workspace and the storage
/// folder on the server both use the short identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Basin {
    Brb,
    Kaweah,
    Lakes,
    Merced,
    SanJoaquin,
    Tuolumne,
}

impl Basin {
    pub const ALL: [Basin; 6] = [
        Basin::Brb,
        Basin::Kaweah,
        Basin::Lakes,
        Basin::Merced,
        Basin::SanJoaquin,
        Basin::Tuolumne,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Basin::Brb => "brb",
            Basin::Kaweah => "kaweah",
            Basin::Lakes => "lakes",
            Basin::Merced => "merced",
            Basin::SanJoaquin => "sanjoaquin",
            Basin::Tuolumne => "tuolumne",
        }
    }

    pub fn workspace(&self) -> &'static str {
        self.id()
    }

    /// Folder under the remote data root holding this basin's files.
    pub fn storage_path(&self) -> &'static str {
        self.id()
    }

    pub fn title(&self) -> &'static str {
        match self {
            Basin::Brb => "Boise River Basin",
            Basin::Kaweah => "Kaweah",
            Basin::Lakes => "Lakes",
            Basin::Merced => "Merced",
            Basin::SanJoaquin => "San Joaquin",
            Basin::Tuolumne => "Tuolumne",
        }
    }
}

impl FromStr for Basin {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        Basin::ALL
            .into_iter()
            .find(|b| b.id() == wanted)
            .ok_or_else(|| AppError::UnknownBasin(s.to_string()))
    }
}

impl fmt::Display for Basin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Look up the remote storage path for a basin name.
pub fn resolve(name: &str) -> Result<&'static str> {
    name.parse::<Basin>().map(|b| b.storage_path())
}
