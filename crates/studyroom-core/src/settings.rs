use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::events::{EventEmitter, StudyRoomEvent};

const MEDIA_SETTINGS_FILE: &str = "media-settings.json";

/// Remembered device preferences for the pre-join screen.
///
/// Stored strictly: every field must be present, anything else is treated as corrupt.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MediaSettings {
    pub video: bool,
    pub audio: bool,
    pub speaker: bool,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            video: false,
            audio: false,
            speaker: true,
        }
    }
}

/// Read media settings from `path`, falling back to defaults on any problem.
pub fn load_media_settings(path: &Path) -> MediaSettings {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return MediaSettings::default(),
        Err(e) => {
            tracing::warn!("reading {}: {e}, using default media settings", path.display());
            return MediaSettings::default();
        }
    };
    serde_json::from_str(&contents).unwrap_or_else(|e| {
        tracing::warn!("invalid media settings in {}: {e}, using defaults", path.display());
        MediaSettings::default()
    })
}

/// Write media settings to `path`. Failures are logged, never returned.
pub fn save_media_settings(path: &Path, settings: &MediaSettings) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!("creating {}: {e}", parent.display());
            return;
        }
    }
    match serde_json::to_string_pretty(settings) {
        Ok(json) => {
            if let Err(e) = std::fs::write(path, json) {
                tracing::warn!("writing {}: {e}", path.display());
            }
        }
        Err(e) => tracing::warn!("serializing media settings: {e}"),
    }
}

pub struct MediaSettingsStore {
    settings: Mutex<MediaSettings>,
    file_path: PathBuf,
    emitter: EventEmitter,
}

impl MediaSettingsStore {
    pub fn new(data_dir: impl AsRef<Path>, emitter: EventEmitter) -> Self {
        let file_path = data_dir.as_ref().join(MEDIA_SETTINGS_FILE);
        let settings = load_media_settings(&file_path);
        Self {
            settings: Mutex::new(settings),
            file_path,
            emitter,
        }
    }

    pub fn get(&self) -> MediaSettings {
        *self.settings.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set(&self, settings: MediaSettings) {
        self.update(|current| *current = settings);
    }

    pub fn set_video(&self, enabled: bool) {
        self.update(|s| s.video = enabled);
    }

    pub fn set_audio(&self, enabled: bool) {
        self.update(|s| s.audio = enabled);
    }

    pub fn set_speaker(&self, enabled: bool) {
        self.update(|s| s.speaker = enabled);
    }

    /// Change and persist under one guard so the file always holds the latest value.
    fn update(&self, change: impl FnOnce(&mut MediaSettings)) {
        let settings = {
            let mut guard = self.settings.lock().unwrap_or_else(|e| e.into_inner());
            change(&mut guard);
            save_media_settings(&self.file_path, &guard);
            *guard
        };
        self.emitter.emit(StudyRoomEvent::MediaSettingsChanged(settings));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[test]
    fn test_default_settings() {
        assert_eq!(
            MediaSettings::default(),
            MediaSettings { video: false, audio: false, speaker: true }
        );
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = temp_dir();
        let path = dir.path().join(MEDIA_SETTINGS_FILE);
        let saved = MediaSettings { video: true, audio: false, speaker: true };
        save_media_settings(&path, &saved);
        assert_eq!(load_media_settings(&path), saved);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = temp_dir();
        assert_eq!(
            load_media_settings(&dir.path().join(MEDIA_SETTINGS_FILE)),
            MediaSettings::default()
        );
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = temp_dir();
        let path = dir.path().join(MEDIA_SETTINGS_FILE);
        for junk in [
            "not json!!!",
            r#"{"video":true}"#,
            r#"{"video":"yes","audio":false,"speaker":true}"#,
            r#"{"video":true,"audio":true,"speaker":false,"extra":1}"#,
            "null",
        ] {
            fs::write(&path, junk).unwrap();
            assert_eq!(load_media_settings(&path), MediaSettings::default(), "input {junk}");
        }
    }

    #[test]
    fn test_store_setters_persist() {
        let dir = temp_dir();
        {
            let store = MediaSettingsStore::new(dir.path(), EventEmitter::new());
            store.set_video(true);
            store.set_speaker(false);
        }
        let store = MediaSettingsStore::new(dir.path(), EventEmitter::new());
        assert_eq!(store.get(), MediaSettings { video: true, audio: false, speaker: false });
    }

    #[test]
    fn test_unwritable_location_degrades_silently() {
        let dir = temp_dir();
        // A regular file where the data directory should be.
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();
        let store = MediaSettingsStore::new(&blocker, EventEmitter::new());
        store.set_audio(true);
        assert!(store.get().audio);
    }

    #[test]
    fn test_concurrent_setters_keep_every_field() {
        let dir = temp_dir();
        let store = MediaSettingsStore::new(dir.path(), EventEmitter::new());

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for i in 0..200 {
                    store.set_video(i % 2 == 0);
                }
                store.set_video(true);
            });
            scope.spawn(|| {
                for i in 0..200 {
                    store.set_audio(i % 2 == 1);
                }
                store.set_audio(true);
            });
            scope.spawn(|| {
                for _ in 0..200 {
                    store.set_speaker(false);
                }
            });
        });

        let expected = MediaSettings { video: true, audio: true, speaker: false };
        assert_eq!(store.get(), expected);
        assert_eq!(load_media_settings(&dir.path().join(MEDIA_SETTINGS_FILE)), expected);
    }
}
