//! Stand-in collaborators for running without the physical display and
//! audio hardware.

use super::collaborators::{Display, Library, Playback};
use super::texts;
use crate::error::{ConfigError, PlaybackError};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Prints display text to stdout.
///
/// Device LCD commands are expanded to their display text first.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleDisplay;

impl Display for ConsoleDisplay {
    fn show(&self, text: &str) {
        let text = texts::device_command(text).unwrap_or_else(|| text.to_string());
        info!(text = %text.replace('\n', " | "), "Display");
        println!("┌─────────────────────────────");
        for line in text.lines() {
            println!("│ {line}");
        }
        println!("└─────────────────────────────");
    }
}

/// One playable item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: String,
    pub duration_secs: f64,
}

impl CatalogItem {
    pub fn duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.duration_secs).unwrap_or_default()
    }
}

/// Items grouped by category, as stored on disk.
pub type Catalog = BTreeMap<String, Vec<CatalogItem>>;

/// Picks a random item from a JSON catalog.
pub struct CatalogLibrary {
    catalog: Catalog,
    rng: StdRng,
}

impl CatalogLibrary {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic selection, for tests and replays.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Load a catalog file; `{ "<category>": [{ "id": .., "duration_secs": .. }] }`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        let catalog: Catalog =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        info!(
            path = %path.display(),
            categories = catalog.len(),
            "Loaded catalog"
        );
        Ok(Self::new(catalog))
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn duration_of(&self, id: &str) -> Option<Duration> {
        self.catalog
            .values()
            .flatten()
            .find(|item| item.id == id)
            .map(CatalogItem::duration)
    }
}

impl Library for CatalogLibrary {
    fn select(&mut self, category: &str) -> Option<String> {
        let item = self.catalog.get(category)?.choose(&mut self.rng)?;
        debug!(category, item = %item.id, "Selected item");
        Some(item.id.clone())
    }
}

/// Pretends to play items for their catalog duration.
#[derive(Debug, Default)]
pub struct SimulatedPlayback {
    durations: HashMap<String, Duration>,
    current: Option<(String, Instant, Duration)>,
    played: Vec<String>,
}

impl SimulatedPlayback {
    pub fn new(durations: HashMap<String, Duration>) -> Self {
        Self {
            durations,
            ..Self::default()
        }
    }

    pub fn from_catalog(catalog: &Catalog) -> Self {
        Self::new(
            catalog
                .values()
                .flatten()
                .map(|item| (item.id.clone(), item.duration()))
                .collect(),
        )
    }

    /// Items started so far, in order.
    pub fn played(&self) -> &[String] {
        &self.played
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_ref().map(|(id, _, _)| id.as_str())
    }
}

impl Playback for SimulatedPlayback {
    fn play(&mut self, item_id: &str) -> Result<Duration, PlaybackError> {
        let duration = *self
            .durations
            .get(item_id)
            .ok_or_else(|| PlaybackError::UnknownItem(item_id.to_string()))?;
        self.current = Some((item_id.to_string(), Instant::now(), duration));
        self.played.push(item_id.to_string());
        Ok(duration)
    }

    fn stop(&mut self) {
        if let Some((id, _, _)) = self.current.take() {
            debug!(item = %id, "Playback stopped");
        }
    }

    fn is_playing(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|(_, started, duration)| started.elapsed() < *duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog.insert(
            "calming".to_string(),
            vec![
                CatalogItem {
                    id: "rain".to_string(),
                    duration_secs: 0.05,
                },
                CatalogItem {
                    id: "waves".to_string(),
                    duration_secs: 240.0,
                },
            ],
        );
        catalog.insert("stress_relief".to_string(), Vec::new());
        catalog
    }

    #[test]
    fn test_library_selection() {
        let mut library = CatalogLibrary::new(catalog()).with_seed(7);
        for _ in 0..10 {
            let id = library.select("calming").unwrap();
            assert!(id == "rain" || id == "waves");
        }
        assert!(library.select("stress_relief").is_none());
        assert!(library.select("missing").is_none());
        assert_eq!(library.duration_of("waves"), Some(Duration::from_secs(240)));
    }

    #[test]
    fn test_library_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, serde_json::to_string(&catalog()).unwrap()).unwrap();

        let library = CatalogLibrary::load(&path).unwrap();
        assert_eq!(library.catalog().len(), 2);

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            CatalogLibrary::load(&path),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_simulated_playback() {
        let mut playback = SimulatedPlayback::from_catalog(&catalog());
        assert!(!playback.is_playing());
        assert!(matches!(
            playback.play("nope"),
            Err(PlaybackError::UnknownItem(_))
        ));

        let duration = playback.play("rain").unwrap();
        assert_eq!(duration, Duration::from_millis(50));
        assert!(playback.is_playing());
        std::thread::sleep(Duration::from_millis(80));
        assert!(!playback.is_playing());

        playback.play("waves").unwrap();
        playback.stop();
        assert!(!playback.is_playing());
        assert_eq!(playback.played(), ["rain", "waves"]);
    }
}
